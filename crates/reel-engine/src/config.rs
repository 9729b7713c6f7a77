//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Export engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum renders running at once; `0` disables admission control
    pub max_concurrent_jobs: usize,
    /// Directory for generated output paths
    pub output_dir: PathBuf,
    /// Parent directory for per-job scratch directories
    pub work_dir: PathBuf,
    /// Root that media references are resolved against
    pub media_root: Option<PathBuf>,
    /// Upper bound on a single FFmpeg run
    pub encode_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            output_dir: PathBuf::from("./exports"),
            work_dir: std::env::temp_dir().join("reel"),
            media_root: None,
            encode_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("RENDER_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            output_dir: std::env::var("RENDER_OUTPUT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            work_dir: std::env::var("RENDER_WORK_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            media_root: std::env::var("MEDIA_ROOT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            encode_timeout: std::env::var("RENDER_ENCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}
