//! Container format parsing: TIFF/BigTIFF structure and vendor metadata.

pub mod svs;
pub mod tiff;

pub use svs::{is_svs_description, SvsProperties};
pub use tiff::{Compression, Photometric, SampleFormat, TiffHeader, TiffPage, TiffPyramid};
