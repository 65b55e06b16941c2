use std::fmt;

/// The FailOverCache bridge's health as seen by this volume (spec §4.1
/// "State machine"). `Ok_Standalone` means no FailOverCache is configured at
/// all; `Ok_Sync` means one is configured and healthy; `Degraded` is entered
/// on any FOC exception and is sticky until a repair succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeFailOverState {
    OkStandalone,
    OkSync,
    Degraded,
}

impl fmt::Display for VolumeFailOverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeFailOverState::OkStandalone => "Ok_Standalone",
            VolumeFailOverState::OkSync => "Ok_Sync",
            VolumeFailOverState::Degraded => "Degraded",
        };
        write!(f, "{s}")
    }
}
