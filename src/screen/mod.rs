// This is free and unencumbered software released into the public domain.

mod grabber;
mod service;

pub use grabber::*;
pub use service::*;
