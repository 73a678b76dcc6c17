use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use crate::firestore::error::{invalid_argument, FirestoreResult};

const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// A latitude/longitude pair in degrees. Both coordinates are finite and in range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> FirestoreResult<Self> {
        check_coordinate("Latitude", latitude, LATITUDE_RANGE)?;
        check_coordinate("Longitude", longitude, LONGITUDE_RANGE)?;
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Orders by latitude, then longitude. Total because coordinates are never NaN.
    pub fn compare(&self, other: &GeoPoint) -> Ordering {
        self.latitude
            .total_cmp(&other.latitude)
            .then_with(|| self.longitude.total_cmp(&other.longitude))
    }
}

fn check_coordinate(name: &str, value: f64, range: std::ops::RangeInclusive<f64>) -> FirestoreResult<()> {
    if range.contains(&value) {
        return Ok(());
    }
    Err(invalid_argument(format!(
        "{name} must be a number between {} and {}, got {value}.",
        range.start(),
        range.end()
    )))
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_range_edges() {
        let point = GeoPoint::new(-90.0, 180.0).unwrap();
        assert_eq!(point.to_string(), "[-90, 180]");
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert!(GeoPoint::new(0.0, 200.0).is_err());
        let err = GeoPoint::new(f64::NAN, 0.0).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
        assert!(err.message().starts_with("Latitude"));
    }

    #[test]
    fn latitude_orders_first() {
        let south = GeoPoint::new(-10.0, 170.0).unwrap();
        let north = GeoPoint::new(10.0, -170.0).unwrap();
        assert_eq!(south.compare(&north), Ordering::Less);
        assert_eq!(north.compare(&north), Ordering::Equal);
    }
}
