use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

/// A single recorded position (from wpt or trkpt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub speed: Option<f64>,
    pub timestamp: Option<Timestamp>,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: 0.0,
            speed: None,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Where an extract came from: the document's loose waypoints or one of its tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Waypoints,
    Route,
}

impl Category {
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Waypoints => "Waypoints",
            Self::Route => "Route",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waypoints => "waypoints",
            Self::Route => "route",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waypoints" => Ok(Self::Waypoints),
            "route" => Ok(Self::Route),
            other => Err(format!("unknown track category '{other}'")),
        }
    }
}

/// One self-contained point sequence parsed out of a GPX document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExtract {
    pub points: Vec<Point>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub name: String,
    pub category: Category,
}

impl TrackExtract {
    /// Build an extract from already collected points, deriving the time bounds.
    pub fn new(category: Category, name: Option<String>, points: Vec<Point>) -> Self {
        let mut builder = ExtractBuilder::new(category);
        builder.offer_name(name);
        for point in points {
            builder.push(point);
        }
        builder.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Accumulates points for one extract, keeping the time bounds current as
/// points arrive.
#[derive(Debug)]
pub(crate) struct ExtractBuilder {
    category: Category,
    name: Option<String>,
    points: Vec<Point>,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
}

impl ExtractBuilder {
    pub(crate) fn new(category: Category) -> Self {
        Self {
            category,
            name: None,
            points: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Keep the first non-blank name offered.
    pub(crate) fn offer_name(&mut self, name: Option<String>) {
        if self.name.is_some() {
            return;
        }
        self.name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
    }

    pub(crate) fn push(&mut self, point: Point) {
        if let Some(t) = point.timestamp {
            if self.start_time.is_none_or(|start| t < start) {
                self.start_time = Some(t);
            }
            if self.end_time.is_none_or(|end| t > end) {
                self.end_time = Some(t);
            }
        }
        self.points.push(point);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub(crate) fn finish(self) -> TrackExtract {
        TrackExtract {
            points: self.points,
            start_time: self.start_time,
            end_time: self.end_time,
            name: normalize_name(self.name.as_deref(), self.category),
            category: self.category,
        }
    }
}

/// Resolve the display name of an extract.
///
/// Devices often name tracks after a numeric id or a date ("20240615"); a name
/// that starts and ends with a digit falls back to the category default.
pub fn normalize_name(name: Option<&str>, category: Category) -> String {
    let default = category.default_name();
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return default.to_string();
    };
    if name == default {
        return name.to_string();
    }
    let first = name.chars().next().is_some_and(|c| c.is_ascii_digit());
    let last = name.chars().next_back().is_some_and(|c| c.is_ascii_digit());
    if first && last {
        default.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_numeric_name_falls_back_to_default() {
        assert_eq!(normalize_name(Some("20240615"), Category::Route), "Route");
        assert_eq!(normalize_name(Some("1 to 2"), Category::Waypoints), "Waypoints");
    }

    #[test]
    fn test_regular_names_preserved() {
        assert_eq!(normalize_name(Some("MorningRide"), Category::Route), "MorningRide");
        assert_eq!(normalize_name(Some("Ride 2"), Category::Route), "Ride 2");
        assert_eq!(normalize_name(Some("7 hills"), Category::Route), "7 hills");
    }

    #[test]
    fn test_missing_or_blank_name() {
        assert_eq!(normalize_name(None, Category::Route), "Route");
        assert_eq!(normalize_name(Some("   "), Category::Waypoints), "Waypoints");
    }

    #[test]
    fn test_bounds_are_min_and_max() {
        let extract = TrackExtract::new(
            Category::Route,
            None,
            vec![
                Point::new(1.0, 1.0).with_timestamp(at(10, 0)),
                Point::new(1.0, 1.1),
                Point::new(1.0, 1.2).with_timestamp(at(9, 30)),
                Point::new(1.0, 1.3).with_timestamp(at(10, 45)),
            ],
        );
        assert_eq!(extract.start_time, Some(at(9, 30)));
        assert_eq!(extract.end_time, Some(at(10, 45)));
        assert_eq!(extract.points.len(), 4);
    }

    #[test]
    fn test_empty_extract_has_no_bounds() {
        let extract = TrackExtract::new(Category::Route, Some("Empty".into()), Vec::new());
        assert!(extract.is_empty());
        assert_eq!(extract.start_time, None);
        assert_eq!(extract.end_time, None);
        assert_eq!(extract.name, "Empty");
    }

    #[test]
    fn test_first_name_wins() {
        let mut builder = ExtractBuilder::new(Category::Waypoints);
        builder.offer_name(None);
        builder.offer_name(Some("Summit".into()));
        builder.offer_name(Some("Hut".into()));
        assert_eq!(builder.finish().name, "Summit");
    }

    #[test]
    fn test_category_round_trips_through_str() {
        assert_eq!("route".parse::<Category>(), Ok(Category::Route));
        assert_eq!(Category::Waypoints.to_string(), "waypoints");
        assert!("track".parse::<Category>().is_err());
    }
}
