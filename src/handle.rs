//! The image handle: open, describe, read.
//!
//! [`ImageHandle`] owns a range reader and the parsed container structure.
//! Opening parses the header and classifies the IFD chain, builds the full
//! metadata descriptor, and eagerly indexes level 0; deeper levels and
//! associated images are indexed on first use. Pixel data is never read at
//! open time.
//!
//! Handles are cheap to clone and safe to share across tasks; all state
//! behind the handle is immutable after open apart from the closed flag.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Map;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{ImageError, TiffError};
use crate::format::svs::{is_svs_description, SvsProperties};
use crate::format::tiff::{ifd_metadata, TiffPage, TiffPyramid, TileData};
use crate::io::{FileRangeReader, RangeReader};
use crate::meta::{build_primary_metadata, ChannelPolicy, ImageMetadata, PixelType, ResolutionInfo};
use crate::region::{Region, RegionReader, RegionRequest};
use crate::tile::TileIndex;

// =============================================================================
// OpenOptions
// =============================================================================

/// Options controlling how an image is opened.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// How stored channel counts map to advertised ones
    pub channel_policy: ChannelPolicy,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel policy.
    pub fn channel_policy(mut self, policy: ChannelPolicy) -> Self {
        self.channel_policy = policy;
        self
    }
}

// =============================================================================
// ImageHandle
// =============================================================================

struct HandleInner<R> {
    reader: Arc<R>,
    pyramid: TiffPyramid,
    metadata: ImageMetadata,
    normalized_channels: u16,
    policy: ChannelPolicy,
    svs: Option<SvsProperties>,
    levels: Vec<OnceCell<Arc<TileIndex>>>,
    closed: AtomicBool,
}

/// An open pyramidal image.
pub struct ImageHandle<R = FileRangeReader> {
    inner: Arc<HandleInner<R>>,
}

impl<R> Clone for ImageHandle<R> {
    fn clone(&self) -> Self {
        ImageHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RangeReader> fmt::Debug for ImageHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("source", &self.inner.reader.identifier())
            .field("levels", &self.inner.pyramid.level_count())
            .field("shape", &self.inner.metadata.shape())
            .field("closed", &self.inner.closed)
            .finish_non_exhaustive()
    }
}

impl ImageHandle<FileRangeReader> {
    /// Open an image file with default options.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        Self::open_with(path, OpenOptions::default()).await
    }

    /// Open an image file.
    pub async fn open_with(
        path: impl AsRef<Path>,
        options: OpenOptions,
    ) -> Result<Self, ImageError> {
        let reader = FileRangeReader::open(path).await?;
        Self::from_reader(reader, options).await
    }
}

impl<R: RangeReader + 'static> ImageHandle<R> {
    /// Open an image through any range reader.
    pub async fn from_reader(reader: R, options: OpenOptions) -> Result<Self, ImageError> {
        let reader = Arc::new(reader);
        let pyramid = TiffPyramid::parse(reader.as_ref()).await?;

        if pyramid.levels.is_empty() {
            return Err(ImageError::UnsupportedFormat {
                reason: "no tiled image pages found".to_string(),
            });
        }
        for level in &pyramid.levels {
            if !level.compression.is_supported() {
                return Err(ImageError::UnsupportedFormat {
                    reason: format!(
                        "level {} uses unsupported compression {:?}",
                        level.level_index, level.compression
                    ),
                });
            }
        }

        let base = &pyramid.levels[0];
        let svs = base
            .description
            .as_deref()
            .filter(|d| is_svs_description(d))
            .map(SvsProperties::parse);

        let tiff_tags = ifd_metadata(reader.as_ref(), &pyramid.header, &base.ifd)
            .await
            .map_err(ImageError::CorruptHeader)?;

        let normalized_channels = options.channel_policy.normalized_channels(base.samples_per_pixel);
        let metadata =
            build_primary_metadata(&pyramid, normalized_channels, tiff_tags, svs.as_ref());

        let levels: Vec<OnceCell<Arc<TileIndex>>> =
            (0..pyramid.levels.len()).map(|_| OnceCell::new()).collect();

        let handle = ImageHandle {
            inner: Arc::new(HandleInner {
                reader,
                pyramid,
                metadata,
                normalized_channels,
                policy: options.channel_policy,
                svs,
                levels,
                closed: AtomicBool::new(false),
            }),
        };

        // Level 0 is indexed up front so the common read path never pays the
        // tag-array fetch.
        handle.level_index(0).await?;

        info!(
            source = handle.inner.reader.identifier(),
            levels = handle.level_count(),
            width = handle.inner.pyramid.levels[0].width,
            height = handle.inner.pyramid.levels[0].height,
            "opened image"
        );
        Ok(handle)
    }

    fn ensure_open(&self) -> Result<(), ImageError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ImageError::ClosedHandle);
        }
        Ok(())
    }

    /// Release the handle. Idempotent; in-flight reads finish, later reads
    /// fail with [`ImageError::ClosedHandle`].
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(source = self.inner.reader.identifier(), "closed image");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Descriptor accessors
    // -------------------------------------------------------------------------

    /// The full metadata descriptor.
    pub fn metadata(&self) -> &ImageMetadata {
        &self.inner.metadata
    }

    /// Axis labels, e.g. "YXC".
    pub fn dims(&self) -> String {
        self.inner.metadata.dims_str()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.inner.metadata.ndim()
    }

    /// Level-0 shape in `dims` order.
    pub fn shape(&self) -> &[u64] {
        self.inner.metadata.shape()
    }

    /// Extents by dimension-order string, e.g. "XYC".
    pub fn size(&self, order: &str) -> Result<Vec<u64>, ImageError> {
        self.inner.metadata.size(order)
    }

    /// Pixel element type.
    pub fn dtype(&self) -> PixelType {
        self.inner.metadata.dtype()
    }

    /// Numpy-style type string for the pixel type.
    pub fn typestr(&self) -> String {
        self.inner.metadata.dtype().typestr()
    }

    /// Channel names at the advertised channel count.
    pub fn channel_names(&self) -> &[String] {
        self.inner.metadata.channel_names()
    }

    /// Physical spacing; `None` keeps `dims` order.
    pub fn spacing(&self, order: Option<&str>) -> Result<Vec<f64>, ImageError> {
        self.inner.metadata.spacing_ordered(order)
    }

    /// Units for each spacing element.
    pub fn spacing_units(&self) -> &[String] {
        self.inner.metadata.spacing_units()
    }

    /// Physical location of the origin voxel.
    pub fn origin(&self) -> [f64; 3] {
        self.inner.metadata.origin()
    }

    /// Direction cosines.
    pub fn direction(&self) -> [[f64; 3]; 3] {
        self.inner.metadata.direction()
    }

    /// Coordinate frame of the direction cosines.
    pub fn coord_sys(&self) -> &str {
        self.inner.metadata.coord_sys()
    }

    /// Resolution pyramid descriptor.
    pub fn resolutions(&self) -> &ResolutionInfo {
        self.inner.metadata.resolutions()
    }

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.inner.pyramid.level_count()
    }

    /// The smallest level whose downsample covers the requested factor.
    pub fn best_level_for_downsample(&self, downsample: f64) -> usize {
        self.inner
            .pyramid
            .best_level_for_downsample(downsample)
            .unwrap_or(0)
    }

    /// Names of associated images.
    pub fn associated_images(&self) -> impl Iterator<Item = &str> {
        self.inner.metadata.associated_images().iter().map(String::as_str)
    }

    /// Namespaced metadata map.
    pub fn metadata_map(&self) -> &Map<String, serde_json::Value> {
        self.inner.metadata.metadata()
    }

    /// Format-native metadata serialization.
    pub fn raw_metadata(&self) -> &str {
        self.inner.metadata.raw_metadata()
    }

    /// Parsed SVS vendor properties, when the source is an Aperio file.
    pub fn svs_properties(&self) -> Option<&SvsProperties> {
        self.inner.svs.as_ref()
    }

    /// Handles materialize pixels on the CPU.
    pub fn device(&self) -> &str {
        "cpu"
    }

    /// The handle itself holds no pixel data; reads materialize regions.
    pub fn is_loaded(&self) -> bool {
        false
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    async fn level_index(&self, level: usize) -> Result<Arc<TileIndex>, ImageError> {
        let cell = &self.inner.levels[level];
        let index = cell
            .get_or_try_init(|| async {
                let page = &self.inner.pyramid.levels[level];
                let data =
                    TileData::load(self.inner.reader.as_ref(), &self.inner.pyramid.header, page)
                        .await?;
                let index = Arc::new(TileIndex::build(page, data));
                debug!(level, tiles = index.tile_count(), "built tile index");
                Ok::<_, TiffError>(index)
            })
            .await
            .map_err(ImageError::CorruptHeader)?;
        Ok(Arc::clone(index))
    }

    /// Read a region of the pyramid.
    pub async fn read_region(&self, request: RegionRequest) -> Result<Region, ImageError> {
        self.ensure_open()?;
        if request.level >= self.level_count() {
            return Err(ImageError::InvalidLevel {
                level: request.level,
                level_count: self.level_count(),
            });
        }

        let index = self.level_index(request.level).await?;
        let downsample = self.inner.pyramid.levels[request.level].downsample;
        let reader = RegionReader::new(
            Arc::clone(&self.inner.reader),
            index,
            request.level,
            downsample,
        );
        reader
            .read(&request, &self.inner.metadata, self.inner.normalized_channels)
            .await
    }

    /// Read an associated image (e.g. "thumbnail", "label", "macro") in
    /// full, as a region with its own descriptor.
    pub async fn associated_image(&self, name: &str) -> Result<Region, ImageError> {
        self.ensure_open()?;
        let page = self
            .inner
            .pyramid
            .associated
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
            .ok_or_else(|| ImageError::UnknownAssociatedImage {
                name: name.to_string(),
            })?;

        debug!(name, width = page.width, height = page.height, "reading associated image");
        let (index, metadata, normalized) = self.page_view(page).await?;
        let reader = RegionReader::new(Arc::clone(&self.inner.reader), index, 0, 1.0);
        let request = RegionRequest::new(0, 0, page.width, page.height);
        reader.read(&request, &metadata, normalized).await
    }

    /// Index and descriptor for a standalone page (associated images are
    /// read rarely, so their indexes are transient).
    async fn page_view(
        &self,
        page: &TiffPage,
    ) -> Result<(Arc<TileIndex>, ImageMetadata, u16), ImageError> {
        let data = TileData::load(self.inner.reader.as_ref(), &self.inner.pyramid.header, page)
            .await
            .map_err(ImageError::CorruptHeader)?;
        if !page.compression.is_supported() {
            return Err(ImageError::UnsupportedFormat {
                reason: format!("associated image uses unsupported compression {:?}", page.compression),
            });
        }
        let index = Arc::new(TileIndex::build(page, data));

        let mut standalone = page.clone();
        standalone.level_index = 0;
        standalone.downsample = 1.0;
        let view = TiffPyramid {
            header: self.inner.pyramid.header,
            levels: vec![standalone],
            associated: Vec::new(),
        };
        let normalized = self.inner.policy.normalized_channels(page.samples_per_pixel);
        let metadata = build_primary_metadata(&view, normalized, Map::new(), None);
        Ok((index, metadata, normalized))
    }
}
