//! Load animation frames from a GIF file, going through the frame cache.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::frame_cache::FrameCache;
use crate::pipeline::{from_gif_all_frames, Frame, PipelineError, TransformOptions};

/// Decode a GIF into frames, using `cache` when given
///
/// A missing source file is not an error: it is logged and `Ok(None)` is
/// returned so a layout with a stale path keeps loading the other buttons.
/// Cache read and write failures are logged and otherwise ignored.
pub async fn load_gif_frames(
    path: &Path,
    options: TransformOptions,
    cache: Option<&FrameCache>,
) -> Result<Option<Vec<Frame>>, PipelineError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!("GIF not found, skipping: {}", path.display());
        return Ok(None);
    }

    let path: PathBuf = path.to_path_buf();
    let cache = cache.cloned();
    let frames = tokio::task::spawn_blocking(move || decode_with_cache(&path, &options, cache.as_ref()))
        .await
        .map_err(std::io::Error::other)??;
    Ok(Some(frames))
}

fn decode_with_cache(
    path: &Path,
    options: &TransformOptions,
    cache: Option<&FrameCache>,
) -> Result<Vec<Frame>, PipelineError> {
    let key = cache.and_then(|c| match c.key(path, options) {
        Ok(key) => Some((c, key)),
        Err(e) => {
            warn!("Frame cache disabled for {}: {}", path.display(), e);
            None
        }
    });

    if let Some((cache, key)) = &key {
        if let Some(frames) = cache.get(key) {
            info!("Loaded {} frames for {} from cache", frames.len(), path.display());
            return Ok(frames);
        }
    }

    let bytes = std::fs::read(path)?;
    let frames = from_gif_all_frames(&bytes, options)?;
    debug!("Decoded {} frames from {}", frames.len(), path.display());

    if let Some((cache, key)) = &key {
        if let Err(e) = cache.put(key, &frames) {
            warn!("Could not cache frames for {}: {}", path.display(), e);
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{encode_empty_gif, encode_gif, gif_frame};

    #[tokio::test]
    async fn missing_file_is_soft_skip() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_gif_frames(&dir.path().join("nope.gif"), TransformOptions::default(), None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn second_load_comes_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let gif_path = dir.path().join("spin.gif");
        std::fs::write(
            &gif_path,
            encode_gif(8, 8, &[gif_frame(8, 8, 0, 0, 0, 50), gif_frame(8, 8, 0, 0, 1, 50)]),
        )
        .unwrap();
        let cache = FrameCache::new(dir.path().join("cache"));

        let first = load_gif_frames(&gif_path, TransformOptions::default(), Some(&cache))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(cache.entries().unwrap().len(), 1);

        // Source no longer decodes, so only the cache can satisfy this
        std::fs::write(&gif_path, b"not a gif any more").unwrap();
        let second = load_gif_frames(&gif_path, TransformOptions::default(), Some(&cache))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].pixels.as_bytes(), first[1].pixels.as_bytes());
        assert_eq!(second[0].delay_ms, 500);
    }

    #[tokio::test]
    async fn unwritable_cache_still_returns_frames() {
        let dir = tempfile::tempdir().unwrap();
        let gif_path = dir.path().join("spin.gif");
        std::fs::write(&gif_path, encode_gif(8, 8, &[gif_frame(8, 8, 0, 0, 1, 30)])).unwrap();

        // The cache directory path is taken by a regular file
        let blocked = dir.path().join("cache");
        std::fs::write(&blocked, b"").unwrap();
        let cache = FrameCache::new(blocked.clone());

        let frames = load_gif_frames(&gif_path, TransformOptions::default(), Some(&cache))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].delay_ms, 300);
        assert!(blocked.is_file());
    }

    #[tokio::test]
    async fn empty_gif_propagates_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        let gif_path = dir.path().join("empty.gif");
        std::fs::write(&gif_path, encode_empty_gif()).unwrap();
        assert!(matches!(
            load_gif_frames(&gif_path, TransformOptions::default(), None).await,
            Err(PipelineError::NoFrames)
        ));
    }

    #[tokio::test]
    async fn undecodable_gif_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gif_path = dir.path().join("bad.gif");
        std::fs::write(&gif_path, b"GIF89a broken").unwrap();
        assert!(load_gif_frames(&gif_path, TransformOptions::default(), None)
            .await
            .is_err());
    }
}
