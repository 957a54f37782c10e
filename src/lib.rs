//! Async reading of pyramidal tiled scientific images.
//!
//! `slidekit` opens tiled TIFF, BigTIFF, and Aperio SVS files and exposes
//! them through a normalized descriptor model and an async region-read API.
//! Opening an image parses only the container structure; pixels are fetched
//! tile by tile, concurrently, when a region is requested.
//!
//! ```no_run
//! use slidekit::{ImageHandle, RegionRequest};
//!
//! # async fn example() -> Result<(), slidekit::ImageError> {
//! let image = ImageHandle::open("slide.svs").await?;
//! println!("{} {:?}", image.dims(), image.shape());
//!
//! let region = image
//!     .read_region(RegionRequest::new(1024, 2048, 512, 512).at_level(0))
//!     .await?;
//! assert_eq!(region.shape()[2] as usize, region.channel_names().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`io`]: the [`io::RangeReader`] trait and its file/memory backends
//! - [`format`]: TIFF/BigTIFF structure parsing and SVS vendor metadata
//! - [`meta`]: the normalized [`meta::ImageMetadata`] descriptor
//! - [`tile`]: per-level tile geometry and tile payload decoding
//! - [`region`]: concurrent region extraction
//! - [`handle`]: the top-level [`ImageHandle`]

pub mod error;
pub mod format;
pub mod handle;
pub mod io;
pub mod meta;
pub mod region;
pub mod tile;

pub use error::{ImageError, IoError, TiffError};
pub use handle::{ImageHandle, OpenOptions};
pub use meta::{Axis, ChannelPolicy, ImageMetadata, PixelType, ResolutionInfo};
pub use region::{Region, RegionRequest};
