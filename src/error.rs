// ============================================================================
// ERRORS — engine, library, and batch-export error taxonomy
// ============================================================================
//
// Per-layer problems (unknown effect, bad shader) are NOT errors: they are
// reported as `SkippedLayer` entries by the renderer and the chain keeps
// going.  Only resource-level failures surface as `EngineError`.

use std::path::PathBuf;

/// GPU resource failures.  Any of these leaves the engine unusable for the
/// call that produced it; `DeviceLost` is permanent for the instance.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("no usable GPU adapter: {0}")]
    Unavailable(String),

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("{width}x{height} exceeds the device texture limit of {max}")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("image has zero width or height")]
    EmptyImage,

    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("no source image loaded")]
    NoSource,

    #[error("GPU resource missing: {0}")]
    MissingResource(&'static str),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from the non-GPU parts of the crate (registry, presets, I/O).
#[derive(thiserror::Error, Debug)]
pub enum FxError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("preset error: {0}")]
    Preset(String),

    #[error("shader fetch failed for '{path}': {reason}")]
    Fetch { path: String, reason: String },
}

impl FxError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    pub fn preset(msg: impl Into<String>) -> Self {
        Self::Preset(msg.into())
    }
}

pub type FxResult<T> = Result<T, FxError>;

/// Errors raised while exporting a batch.  Per-frame failures are collected
/// in the report instead; these abort the whole run.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("chunk delivery failed: {0}")]
    Sink(String),
}
