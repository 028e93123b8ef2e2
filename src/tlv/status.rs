//! Status TLV values for registration responses.
//!
//! The wire values are fixed by the protocol specification and must not be renumbered.

use core::fmt;

/// Status of a multicast listener registration response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MlrStatus {
    /// Every address was registered or removed as requested.
    Success = 0,
    /// At least one address is not a valid multicast listener address.
    Invalid = 2,
    /// A persistent registration (timeout `u32::MAX`) is not supported.
    NoPersistent = 3,
    /// Listener table capacity was exhausted for at least one address.
    NoResources = 4,
    /// The receiving backbone router is not the primary.
    BbrNotPrimary = 5,
    /// The request was understood but could not be processed.
    GeneralFailure = 6,
}

impl MlrStatus {
    /// Combine the status of a processed address into the status of the whole request. The first
    /// non-success outcome wins and is never overwritten by a later one.
    #[must_use]
    pub fn merge(self, other: MlrStatus) -> MlrStatus {
        if self == MlrStatus::Success {
            other
        } else {
            self
        }
    }
}

/// Status of a domain unicast address registration response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DuaStatus {
    /// The address was registered.
    Success = 0,
    /// The target is already registered by a different device.
    Duplicate = 1,
    /// Proxy table capacity is exhausted.
    NoResources = 2,
    /// The receiving backbone router is not the primary.
    NotPrimary = 3,
    /// The target is not part of the domain unicast prefix.
    Invalid = 4,
    /// The request was understood but could not be processed.
    GeneralFailure = 5,
}

impl From<MlrStatus> for u8 {
    fn from(status: MlrStatus) -> u8 {
        status as u8
    }
}

impl From<DuaStatus> for u8 {
    fn from(status: DuaStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for MlrStatus {
    type Error = InvalidStatus;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => MlrStatus::Success,
            2 => MlrStatus::Invalid,
            3 => MlrStatus::NoPersistent,
            4 => MlrStatus::NoResources,
            5 => MlrStatus::BbrNotPrimary,
            6 => MlrStatus::GeneralFailure,
            _ => return Err(InvalidStatus),
        })
    }
}

impl TryFrom<u8> for DuaStatus {
    type Error = InvalidStatus;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => DuaStatus::Success,
            1 => DuaStatus::Duplicate,
            2 => DuaStatus::NoResources,
            3 => DuaStatus::NotPrimary,
            4 => DuaStatus::Invalid,
            5 => DuaStatus::GeneralFailure,
            _ => return Err(InvalidStatus),
        })
    }
}

/// An error returned when converting an unknown wire value to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStatus;

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unknown status value")
    }
}

impl std::error::Error for InvalidStatus {}

impl fmt::Display for MlrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MlrStatus::Success => "success",
            MlrStatus::Invalid => "invalid",
            MlrStatus::NoPersistent => "no persistent",
            MlrStatus::NoResources => "no resources",
            MlrStatus::BbrNotPrimary => "not primary",
            MlrStatus::GeneralFailure => "general failure",
        })
    }
}

impl fmt::Display for DuaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DuaStatus::Success => "success",
            DuaStatus::Duplicate => "duplicate",
            DuaStatus::NoResources => "no resources",
            DuaStatus::NotPrimary => "not primary",
            DuaStatus::Invalid => "invalid",
            DuaStatus::GeneralFailure => "general failure",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DuaStatus, MlrStatus};

    #[test]
    fn merge_keeps_first_error() {
        assert_eq!(
            MlrStatus::Success.merge(MlrStatus::Invalid),
            MlrStatus::Invalid
        );
        assert_eq!(
            MlrStatus::Invalid.merge(MlrStatus::NoResources),
            MlrStatus::Invalid
        );
        assert_eq!(
            MlrStatus::NoResources.merge(MlrStatus::Success),
            MlrStatus::NoResources
        );
        assert_eq!(
            MlrStatus::Success.merge(MlrStatus::Success),
            MlrStatus::Success
        );
    }

    #[test]
    fn wire_values() {
        assert_eq!(u8::from(MlrStatus::Success), 0);
        assert_eq!(u8::from(MlrStatus::Invalid), 2);
        assert_eq!(u8::from(MlrStatus::NoPersistent), 3);
        assert_eq!(u8::from(MlrStatus::NoResources), 4);
        assert_eq!(u8::from(MlrStatus::BbrNotPrimary), 5);
        assert_eq!(u8::from(MlrStatus::GeneralFailure), 6);

        assert_eq!(u8::from(DuaStatus::Success), 0);
        assert_eq!(u8::from(DuaStatus::Duplicate), 1);
        assert_eq!(u8::from(DuaStatus::NoResources), 2);
        assert_eq!(u8::from(DuaStatus::NotPrimary), 3);
        assert_eq!(u8::from(DuaStatus::Invalid), 4);
        assert_eq!(u8::from(DuaStatus::GeneralFailure), 5);
    }

    #[test]
    fn roundtrip_from_wire() {
        for raw in [0u8, 2, 3, 4, 5, 6] {
            assert_eq!(u8::from(MlrStatus::try_from(raw).unwrap()), raw);
        }
        assert!(MlrStatus::try_from(1).is_err());

        for raw in 0u8..=5 {
            assert_eq!(u8::from(DuaStatus::try_from(raw).unwrap()), raw);
        }
        assert!(DuaStatus::try_from(6).is_err());
    }
}
