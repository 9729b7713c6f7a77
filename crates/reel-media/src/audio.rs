//! Audio track attachment.

use reel_models::AudioTrackSpec;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::MediaStore;
use crate::stream::{AudioSource, VideoStream};

/// Picks the first usable audio track and attaches it to the stream.
///
/// A track is usable when its path resolves through the [`MediaStore`] and
/// its gain is valid. When no track is usable the stream keeps its original
/// audio; this is never an error.
#[derive(Clone)]
pub struct AudioAttacher {
    store: Arc<dyn MediaStore>,
}

impl AudioAttacher {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self { store }
    }

    pub async fn attach(&self, stream: VideoStream, tracks: &[AudioTrackSpec]) -> VideoStream {
        for track in tracks {
            if !track.has_valid_gain() {
                warn!(path = %track.path, gain = ?track.gain, "Skipping audio track with invalid gain");
                continue;
            }
            match self.store.resolve(&track.path).await {
                Ok(path) => {
                    debug!(path = %path.display(), "Attaching audio track");
                    let gain = track.gain.filter(|g| (*g - 1.0).abs() > f64::EPSILON);
                    return stream.with_audio(AudioSource::External { path, gain });
                }
                Err(e) => {
                    warn!(path = %track.path, error = %e, "Audio track unavailable");
                }
            }
        }

        if !tracks.is_empty() {
            warn!("No usable audio track, keeping original audio");
        }
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, MediaResult};
    use crate::probe::VideoInfo;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct OnlyStore(&'static str);

    #[async_trait]
    impl MediaStore for OnlyStore {
        async fn resolve(&self, reference: &str) -> MediaResult<PathBuf> {
            if reference == self.0 {
                Ok(PathBuf::from("/media").join(reference))
            } else {
                Err(MediaError::FileNotFound(PathBuf::from(reference)))
            }
        }
    }

    fn stream() -> VideoStream {
        VideoStream::open(
            "a.mp4",
            VideoInfo {
                duration: 4.0,
                width: 640,
                height: 360,
                fps: Some(25.0),
                codec: "h264".into(),
                has_audio: true,
                size: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_no_tracks_keeps_original() {
        let attacher = AudioAttacher::new(Arc::new(OnlyStore("x.wav")));
        assert_eq!(attacher.attach(stream(), &[]).await, stream());
    }

    #[tokio::test]
    async fn test_missing_track_falls_back_to_original() {
        let attacher = AudioAttacher::new(Arc::new(OnlyStore("x.wav")));
        let out = attacher
            .attach(stream(), &[AudioTrackSpec::new("missing.wav")])
            .await;
        assert_eq!(out.audio(), &AudioSource::Original);
    }

    #[tokio::test]
    async fn test_first_usable_track_wins() {
        let attacher = AudioAttacher::new(Arc::new(OnlyStore("music.mp3")));
        let out = attacher
            .attach(
                stream(),
                &[
                    AudioTrackSpec::new("missing.wav"),
                    AudioTrackSpec::new("music.mp3").with_gain(-2.0),
                    AudioTrackSpec::new("music.mp3").with_gain(0.5),
                ],
            )
            .await;
        assert_eq!(
            out.audio(),
            &AudioSource::External {
                path: PathBuf::from("/media/music.mp3"),
                gain: Some(0.5)
            }
        );
    }
}
