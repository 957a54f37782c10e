//! Tile geometry and decoding.
//!
//! [`TileIndex`] maps level pixel coordinates to the stored tiles that cover
//! them; [`TileCodec`] turns a stored tile's bytes into interleaved samples.
//! Both are pure with respect to I/O: the region reader fetches the byte
//! ranges and drives them.

pub mod decode;
pub mod index;

pub use decode::{DecodeError, DecodedTile, TileCodec};
pub use index::{Rect, TileCover, TileIndex, TileRef};
