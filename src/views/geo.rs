//! Distance-to-point filtering for list views.
//!
//! Reads `distance` (meters by default) and `point` (`lat,lng`) query
//! parameters. The policy is permissive: any missing or unparsable value
//! disables the filter instead of erroring. Distances are computed
//! in-process with the haversine formula; SQLite has no earthdistance
//! analog.

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const METERS_PER_MILE: f64 = 1_609.34;

/// Unit the `distance` parameter is expressed in.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DistanceUnit {
    #[default]
    Meter,
    Mile,
}

impl DistanceUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "meter" | "meters" | "m" => Some(Self::Meter),
            "mile" | "miles" => Some(Self::Mile),
            _ => None,
        }
    }
}

/// A validated distance filter: everything within `meters` of (lat, lng).
#[derive(Clone, Copy, Debug)]
pub struct DistanceFilter {
    pub meters: f64,
    pub lat: f64,
    pub lng: f64,
}

impl DistanceFilter {
    /// Build the filter from raw query values. Returns `None` (filter off)
    /// when either parameter is absent or malformed.
    pub fn from_params(
        distance: Option<&str>,
        point: Option<&str>,
        unit: DistanceUnit,
    ) -> Option<Self> {
        let distance: f64 = distance?.trim().parse().ok()?;
        if !distance.is_finite() || distance < 0.0 {
            return None;
        }

        let (lat, lng) = parse_point(point?)?;

        let meters = match unit {
            DistanceUnit::Meter => distance,
            DistanceUnit::Mile => distance * METERS_PER_MILE,
        };

        Some(Self { meters, lat, lng })
    }

    /// Distance in meters from the filter point, or `None` when the row has
    /// no coordinates (such rows never match).
    pub fn distance_to(&self, lat: Option<f64>, lng: Option<f64>) -> Option<f64> {
        Some(haversine_meters(self.lat, self.lng, lat?, lng?))
    }

    pub fn matches(&self, distance_meters: f64) -> bool {
        distance_meters <= self.meters
    }
}

fn parse_point(raw: &str) -> Option<(f64, f64)> {
    let mut parts = raw.split(',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lng: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || !lat.is_finite() || !lng.is_finite() {
        return None;
    }
    Some((lat, lng))
}

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * a.sqrt().asin() * EARTH_RADIUS_METERS
}
