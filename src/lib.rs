// This is free and unencumbered software released into the public domain.

//! Coordination layer for camera and screen capture on Android-style
//! capture stacks.
//!
//! The host supplies the platform surface ([`CameraProvider`], and
//! [`screen::ProjectionProvider`] for display mirroring) plus an event
//! handler; this crate owns device/session lifecycle, the repeating
//! preview request, the still-photo focus/exposure routine, and the
//! capability queries over cached device characteristics.

mod camera;
pub use camera::*;

mod capability;
pub use capability::*;

mod controls;
pub use controls::*;

mod error;
pub use error::*;

mod events;
pub use events::*;

mod exif;
pub use exif::*;

mod frame;
pub use frame::*;

mod handler;
pub use handler::*;

mod photo;
pub use photo::*;

mod platform;
pub use platform::*;

mod request;
pub use request::*;

pub mod screen;
