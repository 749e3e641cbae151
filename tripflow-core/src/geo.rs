//! Great-circle distance and the trip rates derived from it.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two points given in degrees.
///
/// Identical points yield exactly `0.0`. NaN coordinates propagate to a NaN
/// result; callers reject incomplete rows before getting here.
pub fn great_circle_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` past 1.0 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Element-wise distance over `(lat1, lon1, lat2, lon2)` tuples.
pub fn great_circle_distances_km(points: &[(f64, f64, f64, f64)]) -> Vec<f64> {
    points
        .iter()
        .map(|&(lat1, lon1, lat2, lon2)| great_circle_distance_km(lat1, lon1, lat2, lon2))
        .collect()
}

pub fn trip_duration_minutes(duration_seconds: f64) -> f64 {
    duration_seconds / 60.0
}

/// Average speed; zero when the trip has no positive duration.
pub fn speed_kmh(distance_km: f64, duration_min: f64) -> f64 {
    if duration_min > 0.0 {
        distance_km / (duration_min / 60.0)
    } else {
        0.0
    }
}

/// Fare per kilometre, undefined without a fare or without distance travelled.
pub fn fare_per_km(fare_amount: Option<f64>, distance_km: f64) -> Option<f64> {
    match fare_amount {
        Some(fare) if distance_km > 0.0 => Some(fare / distance_km),
        _ => None,
    }
}
