use embedded_can::ExtendedId;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Manufacturer code of the captured device population.
pub const MANUFACTURER: u8 = 5;

/// Device type code for motor controllers.
pub const DEVICE_TYPE: u8 = 2;

const FIRMWARE_API_INDEX: u8 = 8;

/// 10-bit API address soliciting an identification response, sent as the
/// API field of a discovery request frame.
pub const FIRMWARE_API: u16 =
    ((ApiClass::Firmware as u16 & 0x3f) << 4) | (FIRMWARE_API_INDEX as u16 & 0xf);

/// The two frame categories the capture engine recognizes.
///
/// Every other identifier is screened out by the stream filters before it
/// reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ApiClass {
    /// Firmware/identification responses (API index narrows to one message).
    Firmware = 9,
    /// Periodic status broadcasts (all API indices within the class).
    Periodic = 46,
}

/// Identifier and mask matching every frame of `class` from the fixed
/// manufacturer/device-type population, on any device slot.
pub(crate) const fn class_filter(class: ApiClass) -> (u32, u32) {
    let base = ((DEVICE_TYPE as u32 & 0x1f) << 24) | ((MANUFACTURER as u32) << 16);
    match class {
        ApiClass::Firmware => (base | ((FIRMWARE_API as u32 & 0x3ff) << 6), 0x1fff_ffc0),
        ApiClass::Periodic => (base | ((ApiClass::Periodic as u32 & 0x3f) << 10), 0x1fff_fc00),
    }
}

/// Decomposed view of a received 29-bit message identifier.
///
/// Layout, high to low: device type (5 bits), manufacturer (8 bits), API
/// class (6 bits), API index (4 bits), device slot (6 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanAddress(#[cfg_attr(feature = "defmt", defmt(Debug2Format))] ExtendedId);

impl CanAddress {
    pub const fn new(id: ExtendedId) -> Self {
        Self(id)
    }

    pub const fn id(self) -> ExtendedId {
        self.0
    }

    /// Device slot on the source bus, 0..=63.
    pub fn device_slot(self) -> u8 {
        (self.0.as_raw() & 0x3f) as u8
    }

    /// Low 16 identifier bits, the record key of the wire format.
    pub fn short_id(self) -> u16 {
        (self.0.as_raw() & 0xffff) as u16
    }

    /// The frame's API class, if it is one the engine recognizes.
    pub fn api_class(self) -> Option<ApiClass> {
        ApiClass::try_from(((self.0.as_raw() >> 10) & 0x3f) as u8).ok()
    }
}

impl From<ExtendedId> for CanAddress {
    fn from(id: ExtendedId) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::ExtendedId;

    use super::{class_filter, ApiClass, CanAddress, FIRMWARE_API};

    #[test]
    fn firmware_api_address() {
        assert_eq!(FIRMWARE_API, 0x98);
    }

    #[test]
    fn stream_filters() {
        assert_eq!(class_filter(ApiClass::Firmware), (0x0205_2600, 0x1fff_ffc0));
        assert_eq!(class_filter(ApiClass::Periodic), (0x0205_b800, 0x1fff_fc00));
    }

    #[test]
    fn filters_match_own_class() {
        let (firmware_id, firmware_mask) = class_filter(ApiClass::Firmware);
        let (periodic_id, periodic_mask) = class_filter(ApiClass::Periodic);

        // A firmware response from slot 11.
        let id = firmware_id | 11;
        assert_eq!(id & firmware_mask, firmware_id);
        assert_ne!(id & periodic_mask, periodic_id);

        // A periodic status frame, API index 3, slot 11.
        let id = periodic_id | (3 << 6) | 11;
        assert_eq!(id & periodic_mask, periodic_id);
        assert_ne!(id & firmware_mask, firmware_id);
    }

    #[test]
    fn address_fields() {
        let (periodic_id, _) = class_filter(ApiClass::Periodic);
        let raw = periodic_id | (3 << 6) | 42;
        let address = CanAddress::new(ExtendedId::new(raw).unwrap());

        assert_eq!(address.device_slot(), 42);
        assert_eq!(address.short_id(), (raw & 0xffff) as u16);
        assert_eq!(address.api_class(), Some(ApiClass::Periodic));

        let (firmware_id, _) = class_filter(ApiClass::Firmware);
        let address = CanAddress::new(ExtendedId::new(firmware_id | 5).unwrap());
        assert_eq!(address.device_slot(), 5);
        assert_eq!(address.api_class(), Some(ApiClass::Firmware));
    }

    #[test]
    fn unrecognized_class() {
        let address = CanAddress::new(ExtendedId::new(0x0205_0000).unwrap());
        assert_eq!(address.api_class(), None);
    }
}
