//! Export job engine.
//!
//! Owns the in-memory job registry and runs each submitted job through the
//! render pipeline on its own task:
//!
//! 1. Loading video
//! 2. Applying effects
//! 3. Processing subtitles
//! 4. Processing audio
//! 5. Rendering video
//!
//! Progress is pushed into a per-job channel that a live consumer may drain;
//! jobs can always be polled through the registry.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod registry;

pub use config::EngineConfig;
pub use engine::ExportEngine;
pub use error::{EngineError, EngineResult};
pub use executor::{RenderExecutor, StageObserver};
pub use logging::JobLogger;
pub use progress::{progress_channel, ProgressReceiver, ProgressSender};
pub use registry::{JobEntry, JobRegistry};
