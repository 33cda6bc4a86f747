#![allow(clippy::too_many_arguments)]

pub mod cli;
pub mod components;
pub mod effects;
pub mod error;
pub mod gpu;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;
pub mod status;

pub use components::layers::{Layer, LayerId, LayerStack};
pub use effects::{EffectId, EffectRegistry};
pub use error::{EngineError, EngineResult, ExportError, FxError, FxResult};
pub use gpu::{GpuRenderer, RenderReport};
