use crate::{transport::DeviceHandle, MAX_DEVICES};

/// Per-bus bookkeeping of which device slots have been observed, which have
/// supplied identification data, and which have an open device handle.
///
/// All operations are O(1) bit manipulation and never allocate. State is
/// monotonic for the life of a capture session: a device that stops
/// transmitting stays `found`, and nothing is evicted or expired.
pub struct DeviceRegistry<const BUSES: usize> {
    found: [u64; BUSES],
    identified: [u64; BUSES],
    handle_ready: [u64; BUSES],
    handles: [[Option<DeviceHandle>; MAX_DEVICES]; BUSES],
}

impl<const BUSES: usize> DeviceRegistry<BUSES> {
    pub const fn new() -> Self {
        Self {
            found: [0; BUSES],
            identified: [0; BUSES],
            handle_ready: [0; BUSES],
            handles: [[None; MAX_DEVICES]; BUSES],
        }
    }

    /// Record that `slot` has been observed transmitting on `bus`.
    pub fn mark_found(&mut self, bus: u8, slot: u8) {
        self.found[bus as usize] |= 1 << slot;
    }

    /// Record that `slot` has supplied an identification payload.
    pub fn mark_identified(&mut self, bus: u8, slot: u8) {
        self.identified[bus as usize] |= 1 << slot;
    }

    pub fn is_identified(&self, bus: u8, slot: u8) -> bool {
        (self.identified[bus as usize] >> slot) & 1 == 1
    }

    /// Whether a discovery pass still has to open a device handle for
    /// `slot` before it can address a request to it.
    pub fn needs_handle(&self, bus: u8, slot: u8) -> bool {
        (self.handle_ready[bus as usize] >> slot) & 1 == 0
    }

    pub fn mark_handle_ready(&mut self, bus: u8, slot: u8, handle: DeviceHandle) {
        self.handles[bus as usize][slot as usize] = Some(handle);
        self.handle_ready[bus as usize] |= 1 << slot;
    }

    pub fn handle(&self, bus: u8, slot: u8) -> Option<DeviceHandle> {
        self.handles[bus as usize][slot as usize]
    }

    /// Mask of slots on `bus` that have been found but not yet identified,
    /// the set the discovery pass iterates.
    pub fn unidentified(&self, bus: u8) -> u64 {
        self.found[bus as usize] & !self.identified[bus as usize]
    }
}

impl<const BUSES: usize> Default for DeviceRegistry<BUSES> {
    fn default() -> Self {
        Self::new()
    }
}
