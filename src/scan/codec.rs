//! Decompression and quality-assessment collaborators.
//!
//! The scan controller knows nothing about compression formats; it only
//! depends on the [`SpriteCodec`] contract. [`ZlibCodec`] is the reference
//! implementation, good enough to scan for zlib streams embedded in a
//! binary image from the command line.

use std::io::Read;

use flate2::read::ZlibDecoder;

/// Bytes per tile in 4bpp planar format.
pub const TILE_SIZE: usize = 32;

/// Decompression attempt + quality heuristic at candidate offsets.
pub trait SpriteCodec: Send + Sync {
    /// Try to decompress data starting at `offset`.
    ///
    /// `size_limit` caps the decompressed output; a stream that would grow
    /// past it is rejected, so callers can probe the same offset with a
    /// ladder of limits. Returns the number of compressed bytes consumed
    /// and the decompressed bytes, or `None` when the offset does not hold
    /// a stream this codec understands.
    fn try_decompress(&self, data: &[u8], offset: usize, size_limit: usize)
        -> Option<(usize, Vec<u8>)>;

    /// Heuristic in [0, 1] estimating how likely `bytes` are genuine tile
    /// data.
    fn quality(&self, bytes: &[u8]) -> f64;
}

/// Reference codec for zlib streams.
pub struct ZlibCodec;

impl SpriteCodec for ZlibCodec {
    fn try_decompress(
        &self,
        data: &[u8],
        offset: usize,
        size_limit: usize,
    ) -> Option<(usize, Vec<u8>)> {
        let slice = data.get(offset..)?;
        if slice.is_empty() {
            return None;
        }

        let mut decoder = ZlibDecoder::new(slice);
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = decoder.read(&mut buf).ok()?;
            if n == 0 {
                break;
            }
            if out.len() + n > size_limit {
                // Too big for this limit; a larger variant may accept it.
                return None;
            }
            out.extend_from_slice(&buf[..n]);
        }

        if out.is_empty() {
            return None;
        }
        Some((decoder.total_in() as usize, out))
    }

    fn quality(&self, bytes: &[u8]) -> f64 {
        if bytes.is_empty() {
            return 0.0;
        }

        // Tile-aligned data is the strongest signal.
        let alignment = if bytes.len() % TILE_SIZE == 0 { 0.4 } else { 0.1 };

        // Genuine tile data uses a spread of byte values; long runs of a
        // single value are usually padding or garbage.
        let mut seen = [false; 256];
        for &b in bytes {
            seen[b as usize] = true;
        }
        let distinct = seen.iter().filter(|&&s| s).count();
        let diversity = (distinct as f64 / 64.0).min(1.0) * 0.3;

        // Sprites are mostly drawn pixels with some transparency, so the
        // non-zero fraction should sit in a wide middle band.
        let nonzero = bytes.iter().filter(|&&b| b != 0).count() as f64 / bytes.len() as f64;
        let density = if (0.05..=0.95).contains(&nonzero) { 0.3 } else { 0.0 };

        (alignment + diversity + density).clamp(0.0, 1.0)
    }
}
