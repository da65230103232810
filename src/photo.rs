// This is free and unencumbered software released into the public domain.

//! Still-photo capture sequencing.
//!
//! A still capture runs through a fixed handshake dictated by the
//! capture pipeline: acquire focus, calibrate auto-exposure for
//! pre-capture, wait for exposure to settle, then capture. The
//! calibration steps ride on the continuously repeating preview
//! request; the photo itself is a single capture call.
//!
//! Transitions are a pure function of the current state and the AF/AE
//! states of the incoming capture result, so the whole routine is
//! table-testable without a device.

use crate::platform::{AeState, AfState};

/// Any state other than `Preview` means a still capture is currently
/// outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoCaptureState {
    Preview,
    WaitingFocusLock,
    WaitingExposurePrecapture,
    WaitingExposureNonPrecapture,
    PictureTaken,
}

impl PhotoCaptureState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Preview => 0,
            Self::WaitingFocusLock => 1,
            Self::WaitingExposurePrecapture => 2,
            Self::WaitingExposureNonPrecapture => 3,
            Self::PictureTaken => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WaitingFocusLock,
            2 => Self::WaitingExposurePrecapture,
            3 => Self::WaitingExposureNonPrecapture,
            4 => Self::PictureTaken,
            _ => Self::Preview,
        }
    }
}

/// What the coordinator must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoAction {
    None,
    /// Finalize the still photo with a single capture call.
    CapturePhoto,
    /// Start auto-exposure pre-capture calibration on the preview
    /// request.
    TriggerPrecapture,
}

/// Advance the photo-capture routine with one capture result.
pub fn advance(
    state: PhotoCaptureState,
    af_state: Option<AfState>,
    ae_state: Option<AeState>,
) -> (PhotoCaptureState, PhotoAction) {
    use PhotoCaptureState::*;

    match state {
        Preview | PictureTaken => (state, PhotoAction::None),

        WaitingFocusLock => {
            let Some(af) = af_state else {
                // The device does not report AF state at all; there is
                // nothing to wait for.
                return (PictureTaken, PhotoAction::CapturePhoto);
            };

            // The focus can lock with or without finding a target;
            // either way scanning is over and we move on.
            let focus_locked = matches!(af, AfState::FocusedLocked | AfState::NotFocusedLocked);
            if !focus_locked {
                return (WaitingFocusLock, PhotoAction::None);
            }

            match ae_state {
                None | Some(AeState::Converged) => (PictureTaken, PhotoAction::CapturePhoto),
                Some(_) => (WaitingExposurePrecapture, PhotoAction::TriggerPrecapture),
            }
        },

        WaitingExposurePrecapture => match ae_state {
            None | Some(AeState::Precapture) => (WaitingExposureNonPrecapture, PhotoAction::None),
            Some(_) => (WaitingExposurePrecapture, PhotoAction::None),
        },

        WaitingExposureNonPrecapture => match ae_state {
            Some(AeState::Precapture) => (WaitingExposureNonPrecapture, PhotoAction::None),
            _ => (PictureTaken, PhotoAction::CapturePhoto),
        },
    }
}
