//! Backbone router role state.
//!
//! Election of the primary backbone router happens outside of this crate. The elected state is
//! published on a [`watch`](tokio::sync::watch) channel so the registration manager observes
//! transitions live, without ever holding a copy of the state.

use core::fmt;

/// The role of this device on the backbone network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoleState {
    /// The backbone router function is disabled.
    #[default]
    Disabled,
    /// Enabled, but another backbone router holds primacy.
    Secondary,
    /// Enabled and elected as the primary backbone router.
    Primary,
}

impl RoleState {
    /// Checks if the backbone router function is enabled at all.
    pub fn is_enabled(self) -> bool {
        !matches!(self, RoleState::Disabled)
    }

    /// Checks if this device is the primary backbone router.
    pub fn is_primary(self) -> bool {
        matches!(self, RoleState::Primary)
    }
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoleState::Disabled => "disabled",
            RoleState::Secondary => "secondary",
            RoleState::Primary => "primary",
        })
    }
}
