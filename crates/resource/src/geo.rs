use crate::error::{ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Address of one tile in the `z/x/y` pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}
impl TileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }
}
impl Display for TileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A geographic rectangle in degrees.
///
/// The default value is [`empty`](Self::empty), which contains nothing and
/// describes a region with no area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}
impl LatLngBounds {
    /// Bounds from a south-west and a north-east corner.
    ///
    /// Rejects latitudes outside ±90°, longitudes outside ±180°, and corners
    /// that are the wrong way round.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self> {
        let valid_lat = |lat: f64| (-90.0..=90.0).contains(&lat);
        let valid_lng = |lng: f64| (-180.0..=180.0).contains(&lng);
        if !(valid_lat(south) && valid_lat(north) && valid_lng(west) && valid_lng(east)) {
            exn::bail!(ErrorKind::InvalidCoordinates(format!("[{south}, {west}, {north}, {east}]")));
        }
        if south > north || west > east {
            exn::bail!(ErrorKind::InvalidCoordinates(format!(
                "south-west ({south}, {west}) is not below north-east ({north}, {east})"
            )));
        }
        Ok(Self { south, west, north, east })
    }

    /// Inverted bounds that contain nothing; extending them by a point yields
    /// a zero-area rectangle around that point.
    pub const fn empty() -> Self {
        Self {
            south: 90.0,
            west: 180.0,
            north: -90.0,
            east: -180.0,
        }
    }

    pub const fn world() -> Self {
        Self {
            south: -90.0,
            west: -180.0,
            north: 90.0,
            east: 180.0,
        }
    }

    /// The smallest bounds containing every point.
    pub fn hull(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        points.into_iter().fold(Self::empty(), |bounds, point| bounds.extend(point))
    }

    /// Grow the bounds to include a `(lat, lng)` point.
    pub fn extend(self, (lat, lng): (f64, f64)) -> Self {
        Self {
            south: self.south.min(lat),
            west: self.west.min(lng),
            north: self.north.max(lat),
            east: self.east.max(lng),
        }
    }

    /// `true` when the rectangle has no area (including inverted bounds).
    pub fn is_empty(&self) -> bool {
        self.south >= self.north || self.west >= self.east
    }

    pub fn contains(&self, (lat, lng): (f64, f64)) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lng)
    }

    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        self.south <= other.north && other.south <= self.north && self.west <= other.east && other.west <= self.east
    }
}
impl Default for LatLngBounds {
    fn default() -> Self {
        Self::empty()
    }
}
impl Display for LatLngBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}, {}, {}, {}]", self.south, self.west, self.north, self.east)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_and_world() {
        assert!(LatLngBounds::empty().is_empty());
        assert!(LatLngBounds::default().is_empty());
        assert!(!LatLngBounds::world().is_empty());
        assert!(LatLngBounds::world().contains((51.5, -0.12)));
        assert!(!LatLngBounds::empty().contains((0.0, 0.0)));
    }

    #[test]
    fn test_hull() {
        let bounds = LatLngBounds::hull([(51.4, -0.3), (51.6, 0.1)]);
        assert_eq!(bounds, LatLngBounds::new(51.4, -0.3, 51.6, 0.1).unwrap());
        // A single point has no area.
        assert!(LatLngBounds::hull([(51.4, -0.3)]).is_empty());
    }

    #[rstest]
    #[case(-91.0, 0.0, 10.0, 10.0)]
    #[case(0.0, -181.0, 10.0, 10.0)]
    #[case(10.0, 0.0, 0.0, 10.0)]
    fn test_invalid_bounds(#[case] south: f64, #[case] west: f64, #[case] north: f64, #[case] east: f64) {
        let err = LatLngBounds::new(south, west, north, east).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidCoordinates(_)));
    }

    #[test]
    fn test_intersects() {
        let london = LatLngBounds::new(51.4, -0.3, 51.6, 0.1).unwrap();
        let paris = LatLngBounds::new(48.8, 2.2, 48.9, 2.4).unwrap();
        assert!(london.intersects(&LatLngBounds::world()));
        assert!(!london.intersects(&paris));
    }

    #[test]
    fn test_tile_display() {
        assert_eq!(TileId::new(3, 1, 2).to_string(), "3/1/2");
    }
}
