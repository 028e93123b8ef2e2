//! Response override hooks, used to force registration outcomes.

use std::sync::{Arc, Mutex};

use crate::interface_id::InterfaceId;
use crate::tlv::{DuaStatus, MlrStatus};

/// Overrides consulted before a registration request is processed.
///
/// When an override yields a status, the request is answered with that status
/// directly and normal processing is skipped.
pub trait ResponseOverrides: Send + Sync {
    /// Take a pending multicast listener registration override, if any.
    fn take_mlr_status(&self) -> Option<MlrStatus> {
        None
    }

    /// Take a pending unicast address registration override for the device
    /// identified by `ml_iid`, if any.
    fn take_dua_status(&self, ml_iid: InterfaceId) -> Option<DuaStatus> {
        let _ = ml_iid;
        None
    }
}

/// The default [`ResponseOverrides`], which never overrides anything.
pub struct NoOverrides;

impl ResponseOverrides for NoOverrides {}

/// [`ResponseOverrides`] with explicitly scheduled responses.
///
/// A scheduled response is consumed by the next matching request. Cloning is
/// cheap, all clones share the same scheduled responses.
#[derive(Clone, Default)]
pub struct ScriptedOverrides {
    mlr: Arc<Mutex<Option<MlrStatus>>>,
    dua: Arc<Mutex<Option<(Option<InterfaceId>, DuaStatus)>>>,
}

impl ScriptedOverrides {
    /// Create a new [`ScriptedOverrides`] with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the response for the next multicast listener registration.
    pub fn set_next_mlr_response(&self, status: MlrStatus) {
        *self.mlr.lock().expect("Lock is not poisoned; qed") = Some(status);
    }

    /// Schedule the response for the next unicast address registration.
    ///
    /// When `ml_iid` is given, only a registration from that device consumes
    /// the scheduled response.
    pub fn set_next_dua_response(&self, ml_iid: Option<InterfaceId>, status: DuaStatus) {
        *self.dua.lock().expect("Lock is not poisoned; qed") = Some((ml_iid, status));
    }
}

impl ResponseOverrides for ScriptedOverrides {
    fn take_mlr_status(&self) -> Option<MlrStatus> {
        self.mlr.lock().expect("Lock is not poisoned; qed").take()
    }

    fn take_dua_status(&self, ml_iid: InterfaceId) -> Option<DuaStatus> {
        let mut scheduled = self.dua.lock().expect("Lock is not poisoned; qed");
        match *scheduled {
            Some((Some(scoped), status)) if scoped == ml_iid => {
                *scheduled = None;
                Some(status)
            }
            Some((None, status)) => {
                *scheduled = None;
                Some(status)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interface_id::InterfaceId;
    use crate::tlv::{DuaStatus, MlrStatus};

    use super::{ResponseOverrides, ScriptedOverrides};

    #[test]
    fn mlr_override_is_consumed_once() {
        let overrides = ScriptedOverrides::new();
        overrides.set_next_mlr_response(MlrStatus::NoResources);

        assert_eq!(overrides.take_mlr_status(), Some(MlrStatus::NoResources));
        assert_eq!(overrides.take_mlr_status(), None);
    }

    #[test]
    fn scoped_dua_override_only_matches_its_device() {
        let overrides = ScriptedOverrides::new();
        let target = InterfaceId::from([0, 0, 0, 0, 0, 0, 0, 1]);
        let other = InterfaceId::from([0, 0, 0, 0, 0, 0, 0, 2]);
        overrides.set_next_dua_response(Some(target), DuaStatus::Duplicate);

        assert_eq!(overrides.take_dua_status(other), None);
        assert_eq!(
            overrides.take_dua_status(target),
            Some(DuaStatus::Duplicate)
        );
        assert_eq!(overrides.take_dua_status(target), None);
    }

    #[test]
    fn unscoped_dua_override_matches_any_device() {
        let overrides = ScriptedOverrides::new();
        let any = InterfaceId::from([9, 9, 9, 9, 9, 9, 9, 9]);
        overrides.set_next_dua_response(None, DuaStatus::NoResources);

        assert_eq!(
            overrides.take_dua_status(any),
            Some(DuaStatus::NoResources)
        );
    }
}
