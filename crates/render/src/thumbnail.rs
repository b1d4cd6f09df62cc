use image::imageops::FilterType;
use std::path::Path;

use argus_core::{Error, Result};

/// Downsamples a captured image so clients can list rounds without loading
/// full captures.
pub trait Thumbnailer: Send + Sync {
    fn thumbnail(&self, src: &Path, dest: &Path) -> Result<()>;
}

pub struct ImageThumbnailer {
    pub height: u32,
}

impl ImageThumbnailer {
    pub fn new(height: u32) -> Self {
        Self { height }
    }
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self { height: 200 }
    }
}

impl Thumbnailer for ImageThumbnailer {
    fn thumbnail(&self, src: &Path, dest: &Path) -> Result<()> {
        let img = image::open(src)
            .map_err(|e| Error::Thumbnail(format!("open {}: {}", src.display(), e)))?;

        let scaled = img.resize(u32::MAX, self.height, FilterType::Triangle);
        scaled
            .save(dest)
            .map_err(|e| Error::Thumbnail(format!("save {}: {}", dest.display(), e)))?;
        Ok(())
    }
}
