use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::{
    address::{DEVICE_TYPE, FIRMWARE_API, MANUFACTURER},
    output::{EncodeOutcome, PeriodicBuffer, PersistentTable},
    registry::DeviceRegistry,
    transport::{StreamFilter, StreamHandle, StreamMessage, Transport},
    ApiClass, CanAddress, DISCOVERY_INTERVAL_TICKS, MAX_ALIASES_LEN, MAX_PERIODIC_RECORDS,
    MAX_PERSISTENT_RECORDS, MAX_READ_BATCH,
};

/// A capture session over `BUSES` CAN buses.
///
/// [`start`](Self::start) opens the filtered stream sessions and is
/// idempotent; [`tick`](Self::tick) is then invoked once per fixed period
/// by an external scheduler and runs the full cycle: discovery-request
/// scheduling, stream draining, registry updates, record encoding, and
/// size-header finalization. Once started a session runs for the life of
/// the process; there is no stop transition.
///
/// The session owns all state: the registry bitsets, both output regions,
/// and the transport. `tick` is the only writer of the regions; the
/// external publisher reads them on its own thread and must copy them
/// before use (the size header and record bytes are written in a fixed
/// order, so a torn read yields at worst a stale but bounded snapshot).
///
/// Timestamp policy: in the single-bus configuration, periodic frame
/// timestamps arrive in the transport's own base and are projected into
/// the caller's monotonic timebase with an offset computed once at start.
/// Multi-bus transports are expected to deliver already-normalized
/// timestamps, and the raw per-frame value is used as-is.
pub struct CaptureSession<T: Transport, const BUSES: usize> {
    transport: T,
    running: bool,
    tick_count: u32,
    time_offset: u32,
    registry: DeviceRegistry<BUSES>,
    persistent: PersistentTable<BUSES>,
    periodic: PeriodicBuffer<BUSES>,
    firmware_streams: [Option<StreamHandle>; BUSES],
    periodic_streams: [Option<StreamHandle>; BUSES],
    aliases: String<MAX_ALIASES_LEN>,
    batch: Vec<StreamMessage, MAX_READ_BATCH>,
}

impl<T: Transport, const BUSES: usize> CaptureSession<T, BUSES> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            running: false,
            tick_count: 0,
            time_offset: 0,
            registry: DeviceRegistry::new(),
            persistent: PersistentTable::new(),
            periodic: PeriodicBuffer::new(),
            firmware_streams: [None; BUSES],
            periodic_streams: [None; BUSES],
            aliases: String::new(),
            batch: Vec::new(),
        }
    }

    /// Open the per-bus stream sessions and compute the timestamp offset.
    ///
    /// `aliases` maps device ids to display names and is rendered once
    /// into the JSON document returned by [`aliases_json`](Self::aliases_json).
    ///
    /// Calling `start` on a running session logs a warning and changes
    /// nothing; it never re-opens streams or resets capture state.
    pub fn start(&mut self, aliases: &[(u8, &str)]) {
        if self.running {
            warn!("capture session cannot be started multiple times");
            return;
        }
        self.running = true;

        self.time_offset = self
            .transport
            .monotonic_millis()
            .wrapping_sub(self.transport.timestamp_base_millis());

        self.build_aliases(aliases);

        for bus in 0..BUSES as u8 {
            self.firmware_streams[bus as usize] = self.open_stream(bus, ApiClass::Firmware);
        }
        for bus in 0..BUSES as u8 {
            self.periodic_streams[bus as usize] = self.open_stream(bus, ApiClass::Periodic);
        }
    }

    fn open_stream(&mut self, bus: u8, class: ApiClass) -> Option<StreamHandle> {
        let depth = match class {
            ApiClass::Firmware => MAX_PERSISTENT_RECORDS as u32,
            ApiClass::Periodic => MAX_PERIODIC_RECORDS as u32,
        };
        match self
            .transport
            .open_stream(bus, StreamFilter::for_class(class), depth)
        {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!("failed to open stream session on bus {}: {}", bus, error);
                None
            }
        }
    }

    fn build_aliases(&mut self, aliases: &[(u8, &str)]) {
        let _ = self.aliases.push('{');
        let mut first = true;
        for (id, name) in aliases {
            let mut entry: String<80> = String::new();
            if write!(entry, "\"{}\":\"{}\"", id, name).is_err() {
                warn!("alias name for device {} too long, skipped", *id);
                continue;
            }
            if self.aliases.len() + entry.len() + 2 > MAX_ALIASES_LEN {
                warn!("alias table truncated");
                break;
            }
            if !first {
                let _ = self.aliases.push(',');
            }
            first = false;
            let _ = self.aliases.push_str(&entry);
        }
        let _ = self.aliases.push('}');
    }

    /// Run one capture cycle. A no-op before [`start`](Self::start).
    ///
    /// Must complete well within the scheduler period; every step is
    /// synchronous and bounded by the fixed region capacities.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        // The downstream viewer consumes little-endian regions and record
        // fields are written native-endian, so big-endian hosts skip
        // capture entirely instead of emitting a byte-swapped stream.
        if cfg!(target_endian = "big") {
            return;
        }

        self.request_missing_identification();
        self.drain_firmware();
        self.drain_periodic();
        self.persistent.finalize();
        self.periodic.finalize();
    }

    /// Every `DISCOVERY_INTERVAL_TICKS` ticks, solicit identification from
    /// every found-but-unidentified device. The slow cadence keeps
    /// discovery traffic non-bursty no matter how many devices are
    /// missing; a failed open or send simply leaves the slot for the next
    /// pass.
    fn request_missing_identification(&mut self) {
        self.tick_count += 1;
        if self.tick_count < DISCOVERY_INTERVAL_TICKS {
            return;
        }
        self.tick_count = 0;

        for bus in 0..BUSES as u8 {
            let mut pending = self.registry.unidentified(bus);
            while pending != 0 {
                let slot = pending.trailing_zeros() as u8;
                pending &= pending - 1;

                if self.registry.needs_handle(bus, slot) {
                    match self
                        .transport
                        .open_device(bus, MANUFACTURER, slot, DEVICE_TYPE)
                    {
                        Ok(handle) => self.registry.mark_handle_ready(bus, slot, handle),
                        Err(error) => {
                            debug!("device {} on bus {} not reachable: {}", slot, bus, error);
                            continue;
                        }
                    }
                }
                if let Some(handle) = self.registry.handle(bus, slot) {
                    if let Err(error) = self.transport.send_request(handle, FIRMWARE_API) {
                        debug!("discovery request to {} on bus {} failed: {}", slot, bus, error);
                    }
                }
            }
        }
    }

    fn drain_firmware(&mut self) {
        for bus in 0..BUSES as u8 {
            let Some(handle) = self.firmware_streams[bus as usize] else {
                continue;
            };
            if self
                .transport
                .read_stream(handle, MAX_PERSISTENT_RECORDS, &mut self.batch)
                .is_err()
            {
                continue;
            }
            for message in &self.batch {
                let address = CanAddress::new(message.id);
                if self.persistent.encode(bus, address.short_id(), &message.data)
                    == EncodeOutcome::Dropped
                {
                    trace!("persistent table full, device {} dropped", address.device_slot());
                }
                self.registry.mark_found(bus, address.device_slot());
                self.registry.mark_identified(bus, address.device_slot());
            }
        }
    }

    fn drain_periodic(&mut self) {
        self.periodic.reset();
        for bus in 0..BUSES as u8 {
            let Some(handle) = self.periodic_streams[bus as usize] else {
                continue;
            };
            if self
                .transport
                .read_stream(handle, MAX_PERIODIC_RECORDS, &mut self.batch)
                .is_err()
            {
                continue;
            }
            for message in &self.batch {
                let address = CanAddress::new(message.id);
                let timestamp = if BUSES == 1 {
                    message.timestamp.wrapping_add(self.time_offset)
                } else {
                    message.timestamp
                };
                self.periodic
                    .encode(timestamp, bus, address.short_id(), &message.data);
                self.registry.mark_found(bus, address.device_slot());
            }
        }
    }

    /// Header plus records of the persistent region. Copy before use.
    pub fn persistent_region(&self) -> &[u8] {
        self.persistent.region()
    }

    /// Header plus this tick's records of the periodic region. Copy before
    /// use.
    pub fn periodic_region(&self) -> &[u8] {
        self.periodic.region()
    }

    /// The alias JSON document built at start, to be emitted exactly once.
    pub fn aliases_json(&self) -> &str {
        &self.aliases
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn registry(&self) -> &DeviceRegistry<BUSES> {
        &self.registry
    }

    /// Distinct identification keys discarded because the table was full.
    pub fn dropped_persistent(&self) -> u32 {
        self.persistent.dropped()
    }

    /// Periodic frames discarded because a tick drained more than the
    /// snapshot capacity.
    pub fn truncated_periodic(&self) -> u32 {
        self.periodic.truncated()
    }
}
