use crate::models::DebugConfig;
use image::DynamicImage;
use log::{debug, warn};
use std::path::PathBuf;

/// Persists intermediate images of one invocation under
/// `<output_dir>/<invocation_id>/`. Write failures never reach the pipeline.
pub struct DebugArtifacts {
    root: Option<PathBuf>,
    invocation_id: String,
    urls: Vec<String>,
}

impl DebugArtifacts {
    pub fn new(config: &DebugConfig, invocation_id: &str) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        DebugArtifacts {
            root: Some(config.output_dir.join(invocation_id)),
            invocation_id: invocation_id.to_string(),
            urls: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        DebugArtifacts {
            root: None,
            invocation_id: String::new(),
            urls: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Save `image` for `stage`. Returns the relative path when it was written.
    pub fn save(&mut self, stage: &str, image: &DynamicImage) -> Option<String> {
        let root = self.root.as_ref()?;

        if let Err(e) = std::fs::create_dir_all(root) {
            warn!("Could not create debug directory {}: {}", root.display(), e);
            return None;
        }

        let file_name = format!("{:02}_{}.png", self.urls.len() + 1, stage);
        let path = root.join(&file_name);

        // Debug images are always written as 8-bit RGB PNGs.
        match DynamicImage::ImageRgb8(image.to_rgb8()).save(&path) {
            Ok(()) => {
                let url = format!("{}/{}", self.invocation_id, file_name);
                debug!("Saved debug artifact {}", url);
                self.urls.push(url.clone());
                Some(url)
            }
            Err(e) => {
                warn!("Could not write debug artifact {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])))
    }

    #[test]
    fn test_disabled_artifacts_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = DebugConfig {
            enabled: false,
            output_dir: dir.path().to_path_buf(),
        };

        let mut artifacts = DebugArtifacts::new(&config, "run-a");
        assert!(artifacts.save("source", &sample()).is_none());
        assert!(artifacts.urls().is_empty());
        assert!(!dir.path().join("run-a").exists());
    }

    #[test]
    fn test_enabled_artifacts_are_keyed_by_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let config = DebugConfig {
            enabled: true,
            output_dir: dir.path().to_path_buf(),
        };

        let mut first = DebugArtifacts::new(&config, "run-a");
        let mut second = DebugArtifacts::new(&config, "run-b");

        let url_a = first.save("source", &sample()).unwrap();
        let url_b = second.save("source", &sample()).unwrap();
        first.save("normalized", &sample()).unwrap();

        assert_eq!(url_a, "run-a/01_source.png");
        assert_eq!(url_b, "run-b/01_source.png");
        assert!(dir.path().join("run-a/02_normalized.png").exists());
        assert_eq!(first.into_urls().len(), 2);
    }
}
