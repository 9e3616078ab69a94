#![no_std]

//! Capture engine for motor-controller CAN traffic.
//!
//! A fixed population of motor controllers broadcasts identification and
//! periodic status frames on one or more CAN buses. [`CaptureSession`]
//! drains those frames once per control-loop tick and packs them into two
//! size-prefixed binary regions that an external publisher transmits
//! unchanged:
//!
//! * the **persistent** region, a key-deduplicated table holding the latest
//!   6-byte identification payload per device, and
//! * the **periodic** region, a snapshot of the status frames drained in
//!   the current tick only.
//!
//! Both regions start with a `u32` little-endian byte count followed by
//! packed fixed-size records. Devices that have never answered an
//! identification request are solicited with a remote request every
//! [`DISCOVERY_INTERVAL_TICKS`] ticks.
//!
//! The platform CAN layer is reached through the [`Transport`] trait; every
//! call on it is synchronous and non-blocking, so a tick is bounded by the
//! fixed region capacities.

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod address;
mod capture;
mod output;
mod registry;
mod transport;

/// Device slots addressable per bus (6-bit device number field).
pub const MAX_DEVICES: usize = 64;

/// Capacity of the persistent identification table.
pub const MAX_PERSISTENT_RECORDS: usize = 200;

/// Capacity of the per-tick periodic snapshot.
pub const MAX_PERIODIC_RECORDS: usize = 500;

/// Upper bound on frames drained by a single stream read.
pub const MAX_READ_BATCH: usize = MAX_PERIODIC_RECORDS;

/// Ticks between discovery passes (~400 ms at the reference 20 ms period).
pub const DISCOVERY_INTERVAL_TICKS: u32 = 20;

/// Longest alias document a session will produce.
pub const MAX_ALIASES_LEN: usize = 2048;

pub use address::{ApiClass, CanAddress, DEVICE_TYPE, FIRMWARE_API, MANUFACTURER};
pub use capture::CaptureSession;
pub use output::{EncodeOutcome, PeriodicBuffer, PersistentTable};
pub use registry::DeviceRegistry;
pub use transport::{
    DeviceHandle, StreamFilter, StreamHandle, StreamMessage, Transport, TransportError,
};

pub use embedded_can::ExtendedId;
