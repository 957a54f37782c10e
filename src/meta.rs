//! Normalized image descriptor model.
//!
//! [`ImageMetadata`] is the single, immutable representation of what an
//! image source contains: dimension semantics, shape, pixel type, channel
//! naming, physical calibration, the resolution pyramid, associated-image
//! names, and the raw format-native metadata. It is built once at open time
//! from parsed container headers and is read-only thereafter; regions carry
//! their own scoped copy.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ImageError;
use crate::format::svs::SvsProperties;
use crate::format::tiff::{SampleFormat, TiffPage, TiffPyramid};

/// Namespace under which this crate publishes its derived metadata fields.
pub const METADATA_NAMESPACE: &str = "slidekit";

/// Namespace for verbatim TIFF tag values.
pub const TIFF_NAMESPACE: &str = "tiff";

/// Namespace for Aperio SVS vendor properties.
pub const APERIO_NAMESPACE: &str = "aperio";

/// Default physical unit for spatial axes.
const SPATIAL_UNIT: &str = "micrometer";

/// Unit reported for the channel axis.
const CHANNEL_UNIT: &str = "color";

// =============================================================================
// Axis
// =============================================================================

/// Axis labels from the fixed dimension vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    /// Row (height) axis
    Y,
    /// Column (width) axis
    X,
    /// Channel axis
    C,
    /// Depth axis
    Z,
    /// Time axis
    T,
}

impl Axis {
    /// Parse an axis from its single-letter label.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'Y' => Some(Axis::Y),
            'X' => Some(Axis::X),
            'C' => Some(Axis::C),
            'Z' => Some(Axis::Z),
            'T' => Some(Axis::T),
            _ => None,
        }
    }

    /// The single-letter label for this axis.
    pub fn as_char(self) -> char {
        match self {
            Axis::Y => 'Y',
            Axis::X => 'X',
            Axis::C => 'C',
            Axis::Z => 'Z',
            Axis::T => 'T',
        }
    }

    /// Whether the axis measures physical space.
    pub fn is_spatial(self) -> bool {
        !matches!(self, Axis::C)
    }
}

// =============================================================================
// PixelType
// =============================================================================

/// Pixel element type as a (code, bits, lanes) triple.
///
/// `code` follows the DLPack convention: 0 = signed int, 1 = unsigned int,
/// 2 = float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelType {
    /// Type-class code (0 = int, 1 = uint, 2 = float)
    pub code: u8,

    /// Bits per element
    pub bits: u8,

    /// Vector lanes (1 for scalar pixels)
    pub lanes: u16,
}

impl PixelType {
    /// Unsigned 8-bit.
    pub const UINT8: PixelType = PixelType {
        code: 1,
        bits: 8,
        lanes: 1,
    };

    /// Unsigned 16-bit.
    pub const UINT16: PixelType = PixelType {
        code: 1,
        bits: 16,
        lanes: 1,
    };

    pub(crate) fn from_tiff(format: SampleFormat, bits: u16) -> Self {
        let code = match format {
            SampleFormat::Uint => 1,
            SampleFormat::Int => 0,
            SampleFormat::Float => 2,
        };
        PixelType {
            code,
            bits: bits as u8,
            lanes: 1,
        }
    }

    /// Bytes per element.
    pub fn bytes(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Numpy-style type string, e.g. `|u1` or `<u2`.
    pub fn typestr(&self) -> String {
        let order = if self.bits <= 8 { '|' } else { '<' };
        let kind = match self.code {
            0 => 'i',
            2 => 'f',
            _ => 'u',
        };
        format!("{}{}{}", order, kind, self.bytes())
    }
}

// =============================================================================
// ChannelPolicy
// =============================================================================

/// Policy deciding the channel count an image is advertised (and decoded)
/// with, relative to the channel count stored in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPolicy {
    /// Report and return exactly the stored channel count.
    Native,

    /// Follow the RGBA convention of tiled whole-slide containers: 3-sample
    /// sources stay RGB and 4-sample sources stay RGBA, while 1- and
    /// 2-sample sources are expanded to RGBA (gray replicated into R/G/B,
    /// stored alpha kept when present, otherwise fully opaque).
    #[default]
    RgbaConvention,
}

impl ChannelPolicy {
    /// The advertised channel count for a source with `stored` samples.
    pub fn normalized_channels(self, stored: u16) -> u16 {
        match self {
            ChannelPolicy::Native => stored,
            ChannelPolicy::RgbaConvention => match stored {
                1 | 2 => 4,
                n => n,
            },
        }
    }
}

// =============================================================================
// Channel naming
// =============================================================================

/// Synthesize channel names for a source that does not declare them:
/// 3 channels are RGB, 4 are RGBA, anything else gets positional labels.
pub fn synthesize_channel_names(count: u16) -> Vec<String> {
    match count {
        3 => vec!["R".into(), "G".into(), "B".into()],
        4 => vec!["R".into(), "G".into(), "B".into(), "A".into()],
        n => (0..n).map(|i| format!("C{}", i)).collect(),
    }
}

/// Adjust a name list to a new channel count: one extra channel is a
/// trailing alpha named "A", fewer channels truncate, anything else is
/// resynthesized.
pub fn adjust_channel_names(names: &[String], count: u16) -> Vec<String> {
    let count = count as usize;
    if names.len() == count {
        names.to_vec()
    } else if count == names.len() + 1 {
        let mut adjusted = names.to_vec();
        adjusted.push("A".into());
        adjusted
    } else if count < names.len() {
        names[..count].to_vec()
    } else {
        synthesize_channel_names(count as u16)
    }
}

// =============================================================================
// ResolutionInfo
// =============================================================================

/// Descriptor of the resolution pyramid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionInfo {
    /// Number of pyramid levels (>= 1)
    pub level_count: usize,

    /// (width, height) per level, decreasing
    pub level_dimensions: Vec<(u32, u32)>,

    /// Downsample factor per level; level 0 is 1.0, non-decreasing
    pub level_downsamples: Vec<f64>,

    /// Nominal (tile_width, tile_height) per level
    pub level_tile_sizes: Vec<(u32, u32)>,
}

// =============================================================================
// ImageMetadata
// =============================================================================

/// Normalized, immutable descriptor of one image source.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    dims: Vec<Axis>,
    shape: Vec<u64>,
    dtype: PixelType,
    channel_names: Vec<String>,
    spacing: Vec<f64>,
    spacing_units: Vec<String>,
    origin: [f64; 3],
    direction: [[f64; 3]; 3],
    coord_sys: String,
    resolutions: ResolutionInfo,
    associated_images: BTreeSet<String>,
    metadata: Map<String, Value>,
    raw_metadata: String,
}

impl ImageMetadata {
    /// Ordered axis labels.
    pub fn dims(&self) -> &[Axis] {
        &self.dims
    }

    /// Axis labels as a string, e.g. "YXC".
    pub fn dims_str(&self) -> String {
        self.dims.iter().map(|a| a.as_char()).collect()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Per-axis extents, in `dims` order.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Pixel element type.
    pub fn dtype(&self) -> PixelType {
        self.dtype
    }

    /// Channel names; length equals the channel-axis extent.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Physical spacing per axis, in `dims` order.
    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    /// Units for each spacing element.
    pub fn spacing_units(&self) -> &[String] {
        &self.spacing_units
    }

    /// Physical location of the (0, 0, 0) voxel.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Direction cosines.
    pub fn direction(&self) -> [[f64; 3]; 3] {
        self.direction
    }

    /// Coordinate frame of the direction cosines.
    pub fn coord_sys(&self) -> &str {
        &self.coord_sys
    }

    /// Resolution pyramid descriptor.
    pub fn resolutions(&self) -> &ResolutionInfo {
        &self.resolutions
    }

    /// Names of associated images stored alongside the pyramid.
    pub fn associated_images(&self) -> &BTreeSet<String> {
        &self.associated_images
    }

    /// Namespaced metadata: this crate's derived fields under
    /// [`METADATA_NAMESPACE`], plus one namespace per source-format tag set.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// The format-native metadata serialization.
    pub fn raw_metadata(&self) -> &str {
        &self.raw_metadata
    }

    /// Map a dimension-order string to indices into `dims`.
    ///
    /// Fails with [`ImageError::InvalidAxis`] if `order` names an axis not
    /// present in `dims` or names an axis twice.
    fn axis_indices(&self, order: &str) -> Result<Vec<usize>, ImageError> {
        let mut seen = BTreeSet::new();
        let mut indices = Vec::with_capacity(order.len());
        for c in order.chars() {
            let invalid = || ImageError::InvalidAxis {
                axis: c,
                dims: self.dims_str(),
            };
            let axis = Axis::from_char(c).ok_or_else(invalid)?;
            if !seen.insert(axis) {
                return Err(invalid());
            }
            let index = self
                .dims
                .iter()
                .position(|&a| a == axis)
                .ok_or_else(invalid)?;
            indices.push(index);
        }
        Ok(indices)
    }

    /// Extents reordered/filtered by a dimension-order string, e.g. "XYC".
    pub fn size(&self, order: &str) -> Result<Vec<u64>, ImageError> {
        Ok(self
            .axis_indices(order)?
            .into_iter()
            .map(|i| self.shape[i])
            .collect())
    }

    /// Spacing reordered by a dimension-order string; `None` keeps the
    /// declared `dims` order.
    pub fn spacing_ordered(&self, order: Option<&str>) -> Result<Vec<f64>, ImageError> {
        match order {
            None => Ok(self.spacing.clone()),
            Some(order) => Ok(self
                .axis_indices(order)?
                .into_iter()
                .map(|i| self.spacing[i])
                .collect()),
        }
    }
}

// =============================================================================
// Construction
// =============================================================================

fn derived_json(dims: &str, shape: &[u64]) -> String {
    // Key order matters for a stable raw_metadata string; serde_json's
    // default map is sorted, and "axes" < "shape".
    serde_json::to_string(&json!({ "axes": dims, "shape": shape }))
        .unwrap_or_default()
}

fn derived_namespace(
    dims: &str,
    shape: &[u64],
    dtype: PixelType,
    channel_names: &[String],
    resolutions: &ResolutionInfo,
) -> Value {
    json!({
        "axes": dims,
        "shape": shape,
        "dtype": dtype,
        "typestr": dtype.typestr(),
        "channel_names": channel_names,
        "resolutions": resolutions,
    })
}

/// Physical spacing of a page in micrometers per pixel, if derivable.
///
/// SVS files carry MPP directly; plain TIFFs may carry XResolution /
/// YResolution in pixels per inch or centimeter.
fn page_spacing(page: &TiffPage, svs: Option<&SvsProperties>) -> (f64, f64) {
    if let Some(mpp) = svs.and_then(|p| p.mpp) {
        return (mpp, mpp);
    }
    if let (Some((x_res, y_res)), Some(unit)) = (page.resolution, page.resolution_unit) {
        let micrometers_per_unit = match unit {
            2 => Some(25_400.0), // inch
            3 => Some(10_000.0), // centimeter
            _ => None,
        };
        if let Some(per_unit) = micrometers_per_unit {
            if x_res > 0.0 && y_res > 0.0 {
                return (per_unit / x_res, per_unit / y_res);
            }
        }
    }
    (1.0, 1.0)
}

/// Build the primary image descriptor from a classified pyramid.
///
/// One pure function per supported source format; this is the TIFF/SVS one.
pub(crate) fn build_primary_metadata(
    pyramid: &TiffPyramid,
    normalized_channels: u16,
    tiff_tags: Map<String, Value>,
    svs: Option<&SvsProperties>,
) -> ImageMetadata {
    let base = &pyramid.levels[0];

    let dims = vec![Axis::Y, Axis::X, Axis::C];
    let shape = vec![
        base.height as u64,
        base.width as u64,
        normalized_channels as u64,
    ];
    let dtype = PixelType::from_tiff(base.sample_format, base.bits_per_sample);
    let channel_names = synthesize_channel_names(normalized_channels);

    let (spacing_x, spacing_y) = page_spacing(base, svs);
    let spacing = vec![spacing_y, spacing_x, 1.0];
    let spacing_units = dims
        .iter()
        .map(|a| {
            if a.is_spatial() {
                SPATIAL_UNIT.to_string()
            } else {
                CHANNEL_UNIT.to_string()
            }
        })
        .collect();

    let resolutions = ResolutionInfo {
        level_count: pyramid.levels.len(),
        level_dimensions: pyramid.levels.iter().map(|l| (l.width, l.height)).collect(),
        level_downsamples: pyramid.levels.iter().map(|l| l.downsample).collect(),
        level_tile_sizes: pyramid
            .levels
            .iter()
            .map(|l| (l.tile_width, l.tile_height))
            .collect(),
    };

    let associated_images: BTreeSet<String> =
        pyramid.associated.iter().map(|(n, _)| n.clone()).collect();

    let dims_str: String = dims.iter().map(|a| a.as_char()).collect();
    let raw_metadata = derived_json(&dims_str, &shape);

    let mut metadata = Map::new();
    metadata.insert(
        METADATA_NAMESPACE.to_string(),
        derived_namespace(&dims_str, &shape, dtype, &channel_names, &resolutions),
    );
    metadata.insert(TIFF_NAMESPACE.to_string(), Value::Object(tiff_tags));
    if let Some(svs) = svs {
        metadata.insert(APERIO_NAMESPACE.to_string(), json!(svs.properties));
    }

    ImageMetadata {
        dims,
        shape,
        dtype,
        channel_names,
        spacing,
        spacing_units,
        origin: [0.0; 3],
        direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        coord_sys: "LPS".to_string(),
        resolutions,
        associated_images,
        metadata,
        raw_metadata,
    }
}

impl ImageMetadata {
    /// Derive the scoped descriptor for a region extracted from this image.
    ///
    /// `x`/`y` are the requested pixel origin in level coordinates (the
    /// buffer's (0, 0) corner, which may lie outside the level for padded
    /// reads), `downsample` the level's downsample factor, and
    /// `channel_names` the post-normalization names (their length is the
    /// region channel count).
    pub(crate) fn scoped_for_region(
        &self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        channel_names: Vec<String>,
        downsample: f64,
    ) -> ImageMetadata {
        let channels = channel_names.len() as u64;
        let shape = vec![height as u64, width as u64, channels];
        let dims_str = self.dims_str();

        // spacing is (Y, X, C) ordered; origin is physical (x, y, z).
        let mut origin = self.origin;
        origin[0] += x as f64 * self.spacing[1] * downsample;
        origin[1] += y as f64 * self.spacing[0] * downsample;

        let resolutions = ResolutionInfo {
            level_count: 1,
            level_dimensions: vec![(width, height)],
            level_downsamples: vec![1.0],
            level_tile_sizes: vec![(width, height)],
        };

        let raw_metadata = derived_json(&dims_str, &shape);
        let mut metadata = Map::new();
        metadata.insert(
            METADATA_NAMESPACE.to_string(),
            derived_namespace(&dims_str, &shape, self.dtype, &channel_names, &resolutions),
        );

        ImageMetadata {
            dims: self.dims.clone(),
            shape,
            dtype: self.dtype,
            channel_names,
            spacing: self.spacing.clone(),
            spacing_units: self.spacing_units.clone(),
            origin,
            direction: self.direction,
            coord_sys: self.coord_sys.clone(),
            resolutions,
            associated_images: BTreeSet::new(),
            metadata,
            raw_metadata,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
