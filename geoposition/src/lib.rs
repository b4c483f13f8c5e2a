use std::fmt;

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both coordinates are finite and inside their geographic range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Axis-aligned box enclosing a set of positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub south_west: GeoPosition,
    pub north_east: GeoPosition,
}

impl Bounds {
    pub fn from_corners(a: GeoPosition, b: GeoPosition) -> Self {
        Self {
            south_west: GeoPosition::new(a.latitude.min(b.latitude), a.longitude.min(b.longitude)),
            north_east: GeoPosition::new(a.latitude.max(b.latitude), a.longitude.max(b.longitude)),
        }
    }
}

/// Screen-space margin kept around fitted bounds, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Padding {
    pub x: u32,
    pub y: u32,
}

impl Padding {
    pub const fn uniform(px: u32) -> Self {
        Self { x: px, y: px }
    }
}
