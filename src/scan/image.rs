//! Read-only access to the source image being scanned.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;

/// Memory-mapped source image.
///
/// Scans touch candidate offsets across the whole file; mapping keeps
/// memory use independent of image size.
pub struct SourceImage {
    mmap: Mmap,
}

impl SourceImage {
    /// Map an image read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open source image {}", path.display()))?;
        // The mapping is only sound while no other process truncates the
        // file; scan input is treated as immutable for the scan's duration.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map source image {}", path.display()))?;
        Ok(Self { mmap })
    }

    /// The full image contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Image size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the image is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
