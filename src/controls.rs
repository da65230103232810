// This is free and unencumbered software released into the public domain.

use crate::request::{AeMode, AfMode};
use derive_more::Display;

/// Host-facing flash mode names. "Off" still leaves auto-exposure on;
/// only the flash firing policy changes.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum FlashMode {
    #[display("off")]
    Off,
    #[display("auto")]
    Auto,
    #[display("on")]
    On,
    #[display("redeye")]
    Redeye,
    #[display("external")]
    External,
}

impl FlashMode {
    /// Parse a host-supplied mode name. Unknown names map to `None`,
    /// which callers report and ignore.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(Self::Off),
            "auto" => Some(Self::Auto),
            "on" => Some(Self::On),
            "redeye" => Some(Self::Redeye),
            "external" => Some(Self::External),
            _ => None,
        }
    }

    pub fn to_ae_mode(self) -> AeMode {
        match self {
            Self::Off => AeMode::On,
            Self::Auto => AeMode::OnAutoFlash,
            Self::On => AeMode::OnAlwaysFlash,
            Self::Redeye => AeMode::OnAutoFlashRedeye,
            Self::External => AeMode::OnExternalFlash,
        }
    }

    /// Name for a device-reported AE mode, `"unknown"` for values we
    /// have no flash mapping for.
    pub fn name_for_ae_mode(mode: AeMode) -> &'static str {
        match mode {
            AeMode::On => "off",
            AeMode::OnAutoFlash => "auto",
            AeMode::OnAlwaysFlash => "on",
            AeMode::OnAutoFlashRedeye => "redeye",
            AeMode::OnExternalFlash => "external",
            AeMode::Off => "unknown",
        }
    }
}

pub const DEFAULT_FLASH_MODE: FlashMode = FlashMode::Off;
pub const DEFAULT_TORCH_ON: bool = false;
pub const DEFAULT_AF_MODE: AfMode = AfMode::Off;
pub const DEFAULT_ZOOM_FACTOR: f32 = 1.0;

/// Control values shared between the host-facing thread and the
/// background capture-processing thread. All access happens under the
/// coordinator's single state lock.
#[derive(Clone, Copy, Debug)]
pub struct ControlState {
    pub flash_mode: FlashMode,
    pub torch_on: bool,
    pub af_mode: AfMode,
    pub zoom_factor: f32,
    pub started: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            flash_mode: DEFAULT_FLASH_MODE,
            torch_on: DEFAULT_TORCH_ON,
            af_mode: DEFAULT_AF_MODE,
            zoom_factor: DEFAULT_ZOOM_FACTOR,
            started: false,
        }
    }
}

impl ControlState {
    /// Restore the control properties to their defaults. The started
    /// flag is lifecycle state, not a control property, and is left
    /// alone.
    pub fn reset_controls(&mut self) {
        self.flash_mode = DEFAULT_FLASH_MODE;
        self.torch_on = DEFAULT_TORCH_ON;
        self.af_mode = DEFAULT_AF_MODE;
        self.zoom_factor = DEFAULT_ZOOM_FACTOR;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_mode_names_round_trip() {
        for name in ["off", "auto", "on", "redeye", "external"] {
            let mode = FlashMode::from_name(name).unwrap();
            assert_eq!(mode.to_string(), name);
            assert_eq!(FlashMode::name_for_ae_mode(mode.to_ae_mode()), name);
        }
    }

    #[test]
    fn unknown_flash_mode_name_is_rejected() {
        assert_eq!(FlashMode::from_name("strobe"), None);
        assert_eq!(FlashMode::from_name(""), None);
    }

    #[test]
    fn ae_mode_off_has_no_flash_name() {
        assert_eq!(FlashMode::name_for_ae_mode(AeMode::Off), "unknown");
    }

    #[test]
    fn flash_off_keeps_auto_exposure_on() {
        assert_eq!(FlashMode::Off.to_ae_mode(), AeMode::On);
    }

    #[test]
    fn reset_restores_defaults_but_keeps_started() {
        let mut state = ControlState {
            flash_mode: FlashMode::On,
            torch_on: true,
            af_mode: AfMode::ContinuousPicture,
            zoom_factor: 4.0,
            started: true,
        };
        state.reset_controls();
        assert_eq!(state.flash_mode, DEFAULT_FLASH_MODE);
        assert!(!state.torch_on);
        assert_eq!(state.af_mode, DEFAULT_AF_MODE);
        assert_eq!(state.zoom_factor, DEFAULT_ZOOM_FACTOR);
        assert!(state.started);
    }
}
