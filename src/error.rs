//! Engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level engine error type.
///
/// Resource-creation failures (shaders, textures, framebuffers) are logged
/// and degrade visuals; they never abort the frame loop. Precondition
/// violations are debug assertions, not errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("uniform arena overflow: needed {needed} bytes, capacity is {capacity}")]
    ArenaOverflow { needed: u64, capacity: u64 },

    #[error("framebuffer incomplete: {0}")]
    Framebuffer(#[from] FramebufferError),

    #[error("shader program '{name}': {info_log}")]
    Shader { name: String, info_log: String },

    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    #[error("failed to create device: {0}")]
    DeviceCreation(String),

    #[error("failed to create surface: {0}")]
    SurfaceCreation(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to import model {}: {message}", .path.display())]
    Import { path: PathBuf, message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Every distinct way a framebuffer can be incomplete.
///
/// `Framebuffer::check_status` reports the first violated rule as its own
/// variant so callers and logs can tell the reasons apart.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferError {
    #[error("undefined: an attachment has a zero-sized backing image")]
    Undefined,
    #[error("incomplete attachment: color attachments disagree on resolution")]
    IncompleteAttachment,
    #[error("missing attachment: no attachments have been pushed")]
    MissingAttachment,
    #[error("incomplete draw buffer: draw list references color slot {slot} of {count}")]
    IncompleteDrawBuffer { slot: usize, count: usize },
    #[error("incomplete read buffer: read buffer references color slot {slot} of {count}")]
    IncompleteReadBuffer { slot: usize, count: usize },
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("incomplete multisample: attachments disagree on sample count")]
    IncompleteMultisample,
    #[error("incomplete layer targets: attachments mix layered and non-layered images")]
    IncompleteLayerTargets,
    #[error("unknown framebuffer error")]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ArenaOverflow {
            needed: 4096,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "uniform arena overflow: needed 4096 bytes, capacity is 1024"
        );

        let err = EngineError::Framebuffer(FramebufferError::IncompleteMultisample);
        assert_eq!(
            err.to_string(),
            "framebuffer incomplete: incomplete multisample: attachments disagree on sample count"
        );
    }
}
