//! Aperio SVS vendor metadata.
//!
//! SVS files are tiled TIFFs whose ImageDescription tag carries a
//! pipe-separated `key = value` property list, e.g.
//!
//! ```text
//! Aperio Image Library v12.0.0
//! 46000x32914 [0,100 46000x32814] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990|...
//! ```
//!
//! The properties feed physical spacing (MPP, microns per pixel) and the
//! "aperio" metadata namespace.

use std::collections::BTreeMap;

/// Marker string identifying the Aperio vendor in an ImageDescription.
const APERIO_MARKER: &str = "Aperio";

/// Check whether an ImageDescription identifies an Aperio SVS file.
pub fn is_svs_description(description: &str) -> bool {
    description.contains(APERIO_MARKER)
}

/// Parsed SVS vendor properties.
#[derive(Debug, Clone, Default)]
pub struct SvsProperties {
    /// Microns per pixel at level 0
    pub mpp: Option<f64>,

    /// Objective magnification (e.g. 20, 40)
    pub magnification: Option<f64>,

    /// All `key = value` pairs from the description, verbatim
    pub properties: BTreeMap<String, String>,
}

impl SvsProperties {
    /// Parse the pipe-separated property list of an ImageDescription.
    pub fn parse(description: &str) -> Self {
        let mut parsed = SvsProperties::default();

        for part in description.split('|') {
            let part = part.trim();
            let Some(eq) = part.find('=') else { continue };
            let key = part[..eq].trim();
            let value = part[eq + 1..].trim();
            if key.is_empty() {
                continue;
            }

            match key {
                "MPP" => parsed.mpp = value.parse().ok(),
                "AppMag" => parsed.magnification = value.parse().ok(),
                _ => {}
            }
            parsed.properties.insert(key.to_string(), value.to_string());
        }

        parsed
    }
}
