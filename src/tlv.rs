//! Thread-style TLV fields carried in registration message payloads.
//!
//! A payload is a flat sequence of type-length-value fields. Unknown types are skipped when
//! scanning, so extensions remain backwards compatible. A truncated field terminates the scan:
//! everything after it is structurally unusable, and a lookup behaves as if the field is absent.

use bytes::BufMut;

pub use self::{
    addresses::{AddressListError, IPV6_ADDRESSES_NUM_MAX, IPV6_ADDRESSES_NUM_MIN},
    status::{DuaStatus, MlrStatus},
};

pub mod addresses;
pub mod status;

/// TLV type of the target EID of a domain unicast registration.
pub const TARGET_EID: u8 = 0;
/// TLV type of the mesh local interface identifier of the registering device.
pub const MESH_LOCAL_EID: u8 = 3;
/// TLV type of the status field in a response.
pub const STATUS: u8 = 4;
/// TLV type of the seconds since the registering device last communicated with its target.
pub const LAST_TRANSACTION_TIME: u8 = 6;
/// TLV type of the requested registration timeout in seconds.
pub const TIMEOUT: u8 = 11;
/// TLV type of a list of IPv6 addresses.
pub const IPV6_ADDRESSES: u8 = 14;
/// TLV type of the session id of the commissioner on whose behalf a request is made.
pub const COMMISSIONER_SESSION_ID: u8 = 15;

/// Find the value of the first TLV of the given type in a payload.
pub fn find(payload: &[u8], tlv_type: u8) -> Option<&[u8]> {
    let mut offset = 0;
    while payload.len() - offset >= 2 {
        let found_type = payload[offset];
        let length = payload[offset + 1] as usize;
        let value_start = offset + 2;
        if payload.len() - value_start < length {
            // Truncated field, nothing behind it can be trusted.
            return None;
        }
        if found_type == tlv_type {
            return Some(&payload[value_start..value_start + length]);
        }
        offset = value_start + length;
    }

    None
}

/// Find a TLV holding exactly a `u16`. A field of the right type but the wrong size is treated
/// as absent.
pub fn find_u16(payload: &[u8], tlv_type: u8) -> Option<u16> {
    let value = find(payload, tlv_type)?;
    Some(u16::from_be_bytes(value.try_into().ok()?))
}

/// Find a TLV holding exactly a `u32`. A field of the right type but the wrong size is treated
/// as absent.
pub fn find_u32(payload: &[u8], tlv_type: u8) -> Option<u32> {
    let value = find(payload, tlv_type)?;
    Some(u32::from_be_bytes(value.try_into().ok()?))
}

/// Append a TLV with an opaque value to a payload under construction.
pub fn append(dst: &mut bytes::BytesMut, tlv_type: u8, value: &[u8]) {
    debug_assert!(value.len() <= u8::MAX as usize);
    dst.put_u8(tlv_type);
    dst.put_u8(value.len() as u8);
    dst.put_slice(value);
}

/// Append a TLV holding a single `u8`.
pub fn append_u8(dst: &mut bytes::BytesMut, tlv_type: u8, value: u8) {
    append(dst, tlv_type, &[value]);
}

/// Append a TLV holding a `u16`.
pub fn append_u16(dst: &mut bytes::BytesMut, tlv_type: u8, value: u16) {
    append(dst, tlv_type, &value.to_be_bytes());
}

/// Append a TLV holding a `u32`.
pub fn append_u32(dst: &mut bytes::BytesMut, tlv_type: u8, value: u32) {
    append(dst, tlv_type, &value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    #[test]
    fn find_skips_unknown_types() {
        let mut payload = BytesMut::new();
        super::append(&mut payload, 200, &[9, 9, 9]);
        super::append_u32(&mut payload, super::TIMEOUT, 3600);

        assert_eq!(super::find_u32(&payload, super::TIMEOUT), Some(3600));
    }

    #[test]
    fn find_absent_type() {
        let mut payload = BytesMut::new();
        super::append_u32(&mut payload, super::TIMEOUT, 3600);

        assert_eq!(super::find(&payload, super::STATUS), None);
    }

    #[test]
    fn find_stops_at_truncated_field() {
        let mut payload = BytesMut::new();
        super::append_u16(&mut payload, super::COMMISSIONER_SESSION_ID, 0xcafe);
        // A field claiming 8 value bytes with only 2 present.
        payload.extend_from_slice(&[super::TIMEOUT, 8, 1, 2]);

        // The field in front of the truncation is still found, the truncated one is not.
        assert_eq!(
            super::find_u16(&payload, super::COMMISSIONER_SESSION_ID),
            Some(0xcafe)
        );
        assert_eq!(super::find(&payload, super::TIMEOUT), None);
    }

    #[test]
    fn fixed_width_lookups_check_length() {
        let mut payload = BytesMut::new();
        super::append(&mut payload, super::TIMEOUT, &[1, 2]);

        assert_eq!(super::find_u32(&payload, super::TIMEOUT), None);
        assert_eq!(super::find_u16(&payload, super::TIMEOUT), Some(0x0102));
    }

    #[test]
    fn append_wire_layout() {
        let mut payload = BytesMut::new();
        super::append_u8(&mut payload, super::STATUS, 5);

        assert_eq!(&payload[..], [super::STATUS, 1, 5]);
    }
}
