//! Scan execution: controller, collaborator contracts, and source access.
//!
//! The controller in [`controller`] owns the loop; [`codec`] defines the
//! decompression/quality contract it delegates to; [`observer`] is the
//! outward-facing event interface; [`image`] maps the source read-only.

pub mod codec;
pub mod controller;
pub mod image;
pub mod observer;

pub use codec::{SpriteCodec, ZlibCodec, TILE_SIZE};
pub use controller::{ScanConfig, ScanController, ScanError, ScanState};
pub use image::SourceImage;
pub use observer::{NullObserver, ScanObserver, ScanOutcome};
