use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, String> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err("latitude must be between -90 and 90".to_string());
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err("longitude must be between -180 and 180".to_string());
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Great-circle distance in metres
pub fn haversine_distance_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_m: f64,
    pub enabled: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct GeofenceCheck {
    pub distance_m: f64,
    pub inside: bool,
}

impl Geofence {
    /// A disabled fence admits every point but still reports the distance.
    pub fn check(&self, point: Coordinates) -> GeofenceCheck {
        let distance_m = haversine_distance_m(self.center, point);
        GeofenceCheck {
            distance_m,
            inside: !self.enabled || distance_m <= self.radius_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[test]
    fn same_point_is_zero_metres() {
        assert_eq!(haversine_distance_m(c(23.81, 90.41), c(23.81, 90.41)), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_distance_m(c(0.0, 0.0), c(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn known_city_pair() {
        // Paris -> London, roughly 343.5 km
        let d = haversine_distance_m(c(48.8566, 2.3522), c(51.5074, -0.1278));
        assert!((d - 343_500.0).abs() < 1_500.0, "got {d}");
    }

    #[test]
    fn antipodes_do_not_produce_nan() {
        let d = haversine_distance_m(c(0.0, 0.0), c(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinates::new(90.1, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn geofence_inside_and_outside() {
        let fence = Geofence {
            center: c(23.8103, 90.4125),
            radius_m: 100.0,
            enabled: true,
        };
        // ~55 m north
        assert!(fence.check(c(23.8108, 90.4125)).inside);
        // ~1.1 km north
        let far = fence.check(c(23.8203, 90.4125));
        assert!(!far.inside);
        assert!(far.distance_m > 1_000.0);
    }

    #[test]
    fn disabled_geofence_admits_everything() {
        let fence = Geofence {
            center: c(0.0, 0.0),
            radius_m: 10.0,
            enabled: false,
        };
        let check = fence.check(c(10.0, 10.0));
        assert!(check.inside);
        assert!(check.distance_m > 1_000_000.0);
    }
}
