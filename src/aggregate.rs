use serde::{Deserialize, Serialize};

use crate::gpx_types::{Category, Point, Timestamp, TrackExtract};
use crate::options::SpeedPolicy;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance and average speed of one track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_distance_km: f64,
    pub avg_speed_kmh: f64,
}

impl AggregateStats {
    /// Stats recorded when an extract is first stored.
    ///
    /// Waypoint collections are not continuous movement, so only routes get
    /// an average speed.
    pub fn at_upload(extract: &TrackExtract) -> Self {
        Self::recompute(
            &extract.points,
            extract.category,
            extract.start_time,
            extract.end_time,
            SpeedPolicy::Bounds,
        )
    }

    /// Stats for a stored track, recomputed from its points.
    pub fn recompute(
        points: &[Point],
        category: Category,
        start_time: Option<Timestamp>,
        end_time: Option<Timestamp>,
        policy: SpeedPolicy,
    ) -> Self {
        if points.len() < 2 {
            return Self::default();
        }
        let total_distance_km = compute_distance(points);
        let avg_speed_kmh = match policy {
            SpeedPolicy::PreferSamples if has_speed_samples(points) => {
                compute_avg_speed_from_samples(points)
            }
            _ if category == Category::Route => {
                compute_avg_speed(total_distance_km, start_time, end_time)
            }
            _ => 0.0,
        };
        Self {
            total_distance_km,
            avg_speed_kmh,
        }
    }
}

/// An extract together with the stats computed for it at upload time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReport {
    #[serde(flatten)]
    pub extract: TrackExtract,
    pub stats: AggregateStats,
}

impl TrackReport {
    pub fn new(extract: TrackExtract) -> Self {
        let stats = AggregateStats::at_upload(&extract);
        Self { extract, stats }
    }
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(from: &Point, to: &Point) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_phi = (to.latitude - from.latitude).to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Path length over consecutive points in kilometers, rounded to 2 decimals.
pub fn compute_distance(points: &[Point]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let total: f64 = points.windows(2).map(|w| haversine_km(&w[0], &w[1])).sum();
    round2(total)
}

/// Average speed in km/h over the elapsed time between `start` and `end`.
///
/// Zero when the distance is zero, a bound is unknown, or no time elapsed.
pub fn compute_avg_speed(
    total_distance_km: f64,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) -> f64 {
    let (Some(start), Some(end)) = (start, end) else {
        return 0.0;
    };
    if total_distance_km == 0.0 {
        return 0.0;
    }
    let elapsed = end - start;
    let hours = match elapsed.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => elapsed.num_seconds() as f64 / 3_600.0,
    };
    if hours <= 0.0 {
        return 0.0;
    }
    round2(total_distance_km / hours)
}

/// Mean of the recorded per-point speed samples, rounded to 2 decimals.
///
/// Missing and zero samples are ignored; zero when nothing is left.
pub fn compute_avg_speed_from_samples(points: &[Point]) -> f64 {
    let (sum, count) = speed_samples(points).fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
    if count == 0 {
        return 0.0;
    }
    round2(sum / count as f64)
}

pub fn has_speed_samples(points: &[Point]) -> bool {
    speed_samples(points).next().is_some()
}

fn speed_samples(points: &[Point]) -> impl Iterator<Item = f64> + '_ {
    points
        .iter()
        .filter_map(|p| p.speed)
        .filter(|s| *s != 0.0 && !s.is_nan())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
