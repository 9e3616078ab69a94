//! The two output regions of a capture session.
//!
//! Each region is an owned fixed-capacity byte buffer laid out as a `u32`
//! byte count followed by packed fixed-size records. Record fields are
//! written native-endian, exactly as an external consumer `memcpy`-ing the
//! region expects; the capture cycle's endianness guard keeps the emitted
//! format little-endian.
//!
//! Record layouts are parameterized by the bus count: multi-bus layouts
//! carry a leading bus-index byte per record that single-bus layouts omit.
//! The buffers are sized for the wider multi-bus records, so a single-bus
//! region leaves a small tail unused.

use crate::{MAX_PERIODIC_RECORDS, MAX_PERSISTENT_RECORDS};

const HEADER_SIZE: usize = 4;
const PERSISTENT_PAYLOAD: usize = 6;
const PERIODIC_PAYLOAD: usize = 8;

const PERSISTENT_BUF_LEN: usize = HEADER_SIZE + (1 + 2 + PERSISTENT_PAYLOAD) * MAX_PERSISTENT_RECORDS;
const PERIODIC_BUF_LEN: usize = HEADER_SIZE + (4 + 1 + 2 + PERIODIC_PAYLOAD) * MAX_PERIODIC_RECORDS;

/// Result of offering a frame to the persistent table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeOutcome {
    /// The key already existed; its payload was overwritten in place.
    Updated,
    /// A new entry was assigned the next sequential slot.
    Appended,
    /// The table is full; the frame was discarded and the table unchanged.
    Dropped,
}

/// Capacity-bounded, key-deduplicated table of identification payloads.
///
/// Keyed by `(bus, short id)`; entries keep their insertion-order index for
/// the life of the session and are only ever updated in place. Once the
/// table is full, new distinct keys are silently dropped (counted by
/// [`dropped`](Self::dropped)) while existing keys keep updating.
pub struct PersistentTable<const BUSES: usize> {
    buf: [u8; PERSISTENT_BUF_LEN],
    count: usize,
    dropped: u32,
}

impl<const BUSES: usize> PersistentTable<BUSES> {
    /// Bytes per record: bus index (multi-bus only), short id, payload.
    pub const RECORD_SIZE: usize = if BUSES > 1 { 1 + 2 + PERSISTENT_PAYLOAD } else { 2 + PERSISTENT_PAYLOAD };

    const KEY_SIZE: usize = Self::RECORD_SIZE - PERSISTENT_PAYLOAD;

    pub const fn new() -> Self {
        Self {
            buf: [0; PERSISTENT_BUF_LEN],
            count: 0,
            dropped: 0,
        }
    }

    /// Offer one identification frame. Linear key scan; the table is small
    /// enough that this stays well inside the tick budget.
    pub fn encode(&mut self, bus: u8, short_id: u16, data: &[u8; 8]) -> EncodeOutcome {
        for index in 0..self.count {
            let offset = HEADER_SIZE + index * Self::RECORD_SIZE;
            if self.key_matches(offset, bus, short_id) {
                let payload = offset + Self::KEY_SIZE;
                self.buf[payload..payload + PERSISTENT_PAYLOAD]
                    .copy_from_slice(&data[..PERSISTENT_PAYLOAD]);
                return EncodeOutcome::Updated;
            }
        }

        if self.count == MAX_PERSISTENT_RECORDS {
            self.dropped = self.dropped.wrapping_add(1);
            return EncodeOutcome::Dropped;
        }

        let offset = HEADER_SIZE + self.count * Self::RECORD_SIZE;
        self.write_key(offset, bus, short_id);
        let payload = offset + Self::KEY_SIZE;
        self.buf[payload..payload + PERSISTENT_PAYLOAD].copy_from_slice(&data[..PERSISTENT_PAYLOAD]);
        self.count += 1;
        EncodeOutcome::Appended
    }

    fn key_matches(&self, offset: usize, bus: u8, short_id: u16) -> bool {
        let id_offset = if BUSES > 1 {
            if self.buf[offset] != bus {
                return false;
            }
            offset + 1
        } else {
            offset
        };
        self.buf[id_offset..id_offset + 2] == short_id.to_ne_bytes()
    }

    fn write_key(&mut self, offset: usize, bus: u8, short_id: u16) {
        let id_offset = if BUSES > 1 {
            self.buf[offset] = bus;
            offset + 1
        } else {
            offset
        };
        self.buf[id_offset..id_offset + 2].copy_from_slice(&short_id.to_ne_bytes());
    }

    /// Write the size header. The count is cumulative over the session.
    pub fn finalize(&mut self) {
        let bytes = (self.count * Self::RECORD_SIZE) as u32;
        self.buf[..HEADER_SIZE].copy_from_slice(&bytes.to_ne_bytes());
    }

    /// The populated prefix of the region: header plus every record.
    pub fn region(&self) -> &[u8] {
        &self.buf[..HEADER_SIZE + self.count * Self::RECORD_SIZE]
    }

    /// Number of entries currently in the table.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Distinct keys discarded because the table was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<const BUSES: usize> Default for PersistentTable<BUSES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Capacity-bounded snapshot of the periodic frames drained in one tick.
///
/// Not deduplicated and fully overwritten each cycle: after
/// [`reset`](Self::reset), records land at sequential slots until the
/// capacity is reached, and anything beyond it is discarded for that tick
/// (counted by [`truncated`](Self::truncated)).
pub struct PeriodicBuffer<const BUSES: usize> {
    buf: [u8; PERIODIC_BUF_LEN],
    count: usize,
    truncated: u32,
}

impl<const BUSES: usize> PeriodicBuffer<BUSES> {
    /// Bytes per record: timestamp, bus index (multi-bus only), short id,
    /// payload.
    pub const RECORD_SIZE: usize = if BUSES > 1 { 4 + 1 + 2 + PERIODIC_PAYLOAD } else { 4 + 2 + PERIODIC_PAYLOAD };

    pub const fn new() -> Self {
        Self {
            buf: [0; PERIODIC_BUF_LEN],
            count: 0,
            truncated: 0,
        }
    }

    /// Begin a new tick's snapshot. Old record bytes are left in place;
    /// only the first `len` records count after the next finalize.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Write one status frame at the next sequential slot. `timestamp` is
    /// already projected into the caller's timebase by the capture cycle.
    pub fn encode(&mut self, timestamp: u32, bus: u8, short_id: u16, data: &[u8; 8]) {
        if self.count == MAX_PERIODIC_RECORDS {
            self.truncated = self.truncated.wrapping_add(1);
            return;
        }

        let mut offset = HEADER_SIZE + self.count * Self::RECORD_SIZE;
        self.buf[offset..offset + 4].copy_from_slice(&timestamp.to_ne_bytes());
        offset += 4;
        if BUSES > 1 {
            self.buf[offset] = bus;
            offset += 1;
        }
        self.buf[offset..offset + 2].copy_from_slice(&short_id.to_ne_bytes());
        self.buf[offset + 2..offset + 2 + PERIODIC_PAYLOAD].copy_from_slice(data);
        self.count += 1;
    }

    /// Write the size header. The count covers this tick only.
    pub fn finalize(&mut self) {
        let bytes = (self.count * Self::RECORD_SIZE) as u32;
        self.buf[..HEADER_SIZE].copy_from_slice(&bytes.to_ne_bytes());
    }

    /// The populated prefix of the region: header plus this tick's records.
    pub fn region(&self) -> &[u8] {
        &self.buf[..HEADER_SIZE + self.count * Self::RECORD_SIZE]
    }

    /// Number of records in the current tick's snapshot.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Frames discarded because a tick drained more than the capacity.
    pub fn truncated(&self) -> u32 {
        self.truncated
    }
}

impl<const BUSES: usize> Default for PeriodicBuffer<BUSES> {
    fn default() -> Self {
        Self::new()
    }
}
