use std::path::{Path, PathBuf};

/// Default on-disk extension for captured images.
pub const IMAGE_EXT: &str = ".png";

/// Suffix inserted before the extension for downsampled copies.
pub const THUMB_SUFFIX: &str = "_thumb";

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".argus"))
            .unwrap_or_else(|| PathBuf::from(".argus"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn pages_file(&self) -> PathBuf {
        self.base.join("pages.json")
    }

    pub fn cookies_file(&self) -> PathBuf {
        self.base.join("cookies.json")
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.base.join("screenshots")
    }

    pub fn log_file(&self) -> PathBuf {
        self.base.join("argus.log")
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.capture_dir().join(version)
    }

    /// Captured image for one page of one environment inside a version folder,
    /// named `{alias}{page}.png`.
    pub fn image_path(&self, version: &str, alias: &str, page: &str) -> PathBuf {
        self.version_dir(version)
            .join(format!("{}{}{}", alias, page, IMAGE_EXT))
    }

    pub fn thumb_path(&self, version: &str, alias: &str, page: &str) -> PathBuf {
        self.version_dir(version)
            .join(format!("{}{}{}{}", alias, page, THUMB_SUFFIX, IMAGE_EXT))
    }

    pub fn status_file(&self, version: &str) -> PathBuf {
        self.version_dir(version).join("status.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.capture_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a captured image path into its thumbnail path.
pub fn thumb_for(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    image.with_file_name(format!("{}{}{}", stem, THUMB_SUFFIX, IMAGE_EXT))
}
