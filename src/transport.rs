use embedded_can::ExtendedId;
use heapless::Vec;

use crate::{address::class_filter, ApiClass, MAX_READ_BATCH};

/// Opaque handle to a filtered receive stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamHandle(pub u32);

/// Opaque handle for sending frames to one device slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceHandle(pub u32);

/// Identifier/mask pair a stream session matches received frames against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamFilter {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub id: ExtendedId,
    pub mask: u32,
}

impl StreamFilter {
    /// Filter selecting every frame of `class` from the fixed
    /// manufacturer/device-type population.
    pub fn for_class(class: ApiClass) -> Self {
        let (id, mask) = class_filter(class);
        let id = ExtendedId::new(id).expect("packed filter id fits in 29 bits");
        Self { id, mask }
    }
}

/// One received frame drained from a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamMessage {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub id: ExtendedId,
    /// Receive time in milliseconds of the transport's own timestamp base.
    pub timestamp: u32,
    pub data: [u8; 8],
    /// Number of valid bytes in `data`.
    pub len: u8,
}

/// Out-of-band status reported by a failed transport call.
///
/// The capture cycle never aborts on one of these: a failed open or read
/// yields no frames (or no handle) for that tick and the slot is retried on
/// the next discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("transport call failed with status {0}")]
pub struct TransportError(pub i32);

/// Synchronous, non-blocking seam to the platform CAN layer.
///
/// Every call returns immediately with whatever is available; none of them
/// waits for bus traffic.
pub trait Transport {
    /// Open a filtered receive stream on `bus` with the given queue depth.
    fn open_stream(
        &mut self,
        bus: u8,
        filter: StreamFilter,
        depth: u32,
    ) -> Result<StreamHandle, TransportError>;

    /// Drain at most `max` pending frames from a stream into `out`.
    ///
    /// `out` is cleared first; a short or empty batch is not an error.
    fn read_stream(
        &mut self,
        handle: StreamHandle,
        max: usize,
        out: &mut Vec<StreamMessage, MAX_READ_BATCH>,
    ) -> Result<(), TransportError>;

    /// Open a handle for addressing frames to one device slot.
    fn open_device(
        &mut self,
        bus: u8,
        manufacturer: u8,
        slot: u8,
        device_type: u8,
    ) -> Result<DeviceHandle, TransportError>;

    /// Send a single zero-payload remote request at the given API address.
    /// Fire-and-forget: a lost request is re-sent by a later discovery pass.
    fn send_request(&mut self, device: DeviceHandle, api: u16) -> Result<(), TransportError>;

    /// Milliseconds on the caller's monotonic clock.
    fn monotonic_millis(&mut self) -> u32;

    /// Milliseconds of the base clock frame timestamps are reported in.
    fn timestamp_base_millis(&mut self) -> u32;
}
