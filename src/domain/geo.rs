//! Geographic point type shared by tasks, policies, and provider requests.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// A validated geographic coordinate, optionally labeled with a city/country.
///
/// Invariant: `latitude` and `longitude` are always within range — construct
/// via [`GeoPoint::new`], never with struct-literal syntax outside this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl GeoPoint {
    pub fn new(
        latitude: f64,
        longitude: f64,
        city: Option<String>,
        country: Option<String>,
    ) -> Result<Self, AppError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::BadRequest(format!(
                "latitude {} out of range [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::BadRequest(format!(
                "longitude {} out of range [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            city,
            country,
        })
    }

    /// Cache key component: provider name + coordinates rounded to 6 decimal
    /// places (§4.1), chosen to keep distinct stations from aliasing while
    /// collapsing floating-point jitter from repeated requests.
    pub fn rounded_key(&self) -> String {
        format!("{:.6}:{:.6}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_values() {
        assert!(GeoPoint::new(90.0, 180.0, None, None).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0, None, None).is_ok());
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(GeoPoint::new(90.1, 0.0, None, None).is_err());
        assert!(GeoPoint::new(-90.1, 0.0, None, None).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(GeoPoint::new(0.0, 180.1, None, None).is_err());
        assert!(GeoPoint::new(0.0, -180.1, None, None).is_err());
    }

    #[test]
    fn rounded_key_is_stable() {
        let a = GeoPoint::new(47.123456789, 8.987654321, None, None).unwrap();
        assert_eq!(a.rounded_key(), "47.123457:8.987654");
    }
}
