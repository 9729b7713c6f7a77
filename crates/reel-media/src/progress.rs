//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Output time in seconds.
    pub fn out_seconds(&self) -> f64 {
        self.out_time_us.max(0) as f64 / 1_000_000.0
    }

    /// Progress percentage given the total duration in seconds.
    pub fn percentage(&self, total_seconds: f64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if !(total_seconds > 0.0) {
            return 0.0;
        }
        (self.out_seconds() / total_seconds * 100.0).clamp(0.0, 100.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_seconds: f64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_us <= 0 || !(total_seconds > 0.0) {
            return None;
        }
        let remaining = total_seconds - self.out_seconds();
        if remaining <= 0.0 {
            return Some(0.0);
        }
        Some(remaining / self.speed)
    }

    /// Fold one `key=value` line into `self`. Returns a snapshot at the end
    /// of each progress block.
    pub fn update(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            // Despite the name, FFmpeg reports out_time_ms in microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = us;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(FfmpegProgress) + Send + 'static>;

/// Whether a stderr line belongs to the `-progress` key/value stream.
pub(crate) fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us",
        "out_time_ms", "out_time", "dup_frames", "drop_frames", "speed", "progress",
    ];
    line.split_once('=')
        .map(|(k, _)| KEYS.contains(&k.trim()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();
        assert!(progress.update("frame=120").is_none());
        progress.update("out_time_us=5000000");
        progress.update("speed=2.0x");
        progress.update("speed=N/A");
        let snap = progress.update("progress=continue").unwrap();
        assert_eq!(snap.frame, 120);
        assert!((snap.out_seconds() - 5.0).abs() < 1e-9);
        assert!((snap.speed - 2.0).abs() < 1e-9);
        assert!(!snap.is_complete);

        let snap = progress.update("progress=end").unwrap();
        assert!(snap.is_complete);
        assert_eq!(snap.percentage(10.0), 100.0);
    }

    #[test]
    fn test_progress_percentage_and_eta() {
        let progress = FfmpegProgress {
            out_time_us: 5_000_000,
            speed: 2.0,
            ..Default::default()
        };
        assert!((progress.percentage(10.0) - 50.0).abs() < 0.01);
        assert_eq!(progress.percentage(0.0), 0.0);
        // 5 seconds remaining at 2x speed
        assert!((progress.eta_seconds(10.0).unwrap() - 2.5).abs() < 0.01);
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("out_time=00:00:01.000000"));
        assert!(!is_progress_line("Unknown encoder 'libfoo'"));
        assert!(!is_progress_line("[libx264 @ 0x1] width=3 not divisible"));
    }
}
