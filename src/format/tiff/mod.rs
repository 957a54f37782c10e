//! TIFF/BigTIFF container parsing.
//!
//! Tiled TIFF is the foundation for the supported pyramidal formats,
//! including Aperio SVS. The submodules split the work the same way the
//! file format does:
//!
//! - [`parser`]: header and IFD structure
//! - [`tags`]: tag/field-type/enumerated-value vocabulary
//! - [`values`]: entry value decoding (inline vs offset storage)
//! - [`pyramid`]: level and associated-image classification, tile arrays

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use pyramid::{ifd_metadata, TiffPage, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, Photometric, SampleFormat, TiffTag};
pub use values::ValueReader;
