use std::f64::consts::PI;

pub const ONE_MINUTE: i64 = 60;
pub const ONE_HOUR: i64 = 60 * ONE_MINUTE;
pub const ONE_DAY: i64 = 24 * ONE_HOUR;

/// Meters spanned by one degree of latitude. Shared by every swimming kernel.
pub const ONE_DEG_LATITUDE_IN_METER: f64 = 111_138.0;

/// Convert a metric displacement at `lat` degrees into `(d_lon, d_lat)` degrees.
pub fn meters_to_degrees(dx: f64, dy: f64, lat: f64) -> (f64, f64) {
    let d_lat = dy / ONE_DEG_LATITUDE_IN_METER;
    let d_lon = dx / (ONE_DEG_LATITUDE_IN_METER * (PI * lat / 180.0).cos());
    (d_lon, d_lat)
}

/// Convert a speed from cm/s to m/s.
pub fn cm_to_m(speed_cm_s: f64) -> f64 {
    speed_cm_s / 100.0
}

pub fn seconds_to_days(seconds: f64) -> f64 {
    seconds / ONE_DAY as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equator_degree_is_symmetric() {
        let (d_lon, d_lat) = meters_to_degrees(ONE_DEG_LATITUDE_IN_METER, ONE_DEG_LATITUDE_IN_METER, 0.0);
        assert!((d_lon - 1.0).abs() < 1e-12);
        assert!((d_lat - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn latitude_step_ignores_latitude(dy in -1.0e5f64..1.0e5, lat in -80.0f64..80.0) {
            let (_, d_lat) = meters_to_degrees(0.0, dy, lat);
            prop_assert!((d_lat - dy / ONE_DEG_LATITUDE_IN_METER).abs() < 1e-12);
        }

        #[test]
        fn longitude_step_grows_towards_poles(dx in 1.0f64..1.0e5, lat in 0.0f64..80.0) {
            let (at_equator, _) = meters_to_degrees(dx, 0.0, 0.0);
            let (at_lat, _) = meters_to_degrees(dx, 0.0, lat);
            prop_assert!(at_lat >= at_equator);
        }
    }
}
