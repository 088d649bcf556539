//! Geographic calculations

use crate::types::Coordinates;

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_seattle_portland() {
        let seattle = Coordinates { lat: 47.6062, lng: -122.3321 };
        let portland = Coordinates { lat: 45.5152, lng: -122.6784 };

        // Straight-line distance is ~234 km
        let distance = haversine_distance(&seattle, &portland);
        assert!(distance > 220.0 && distance < 250.0, "got {} km", distance);
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = Coordinates { lat: 47.6062, lng: -122.3321 };
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }
}
