// This is free and unencumbered software released into the public domain.

use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no camera device available")]
    NoCamera,

    #[error("no open camera device")]
    NoDevice,

    #[error("no configured capture session")]
    NoSession,

    #[error("access to the platform service was denied")]
    AccessDenied,

    #[error("all reader buffers are in flight")]
    ReaderStalled,

    #[error("screen projection is unavailable")]
    NoProjection,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("capture stopped")]
    Stopped,

    #[error("platform error while {context}")]
    PlatformError {
        context: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{0}")]
    Other(String),
}

impl CaptureError {
    #[inline]
    pub fn platform(context: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::PlatformError {
            context,
            source: Box::new(source),
        }
    }

    #[inline]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    #[inline]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
