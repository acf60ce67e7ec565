use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::aggregate::{AggregateStats, TrackReport};
use crate::gpx_types::{Category, Point, Timestamp};
use crate::ingest::TrackDetail;
use crate::options::ViewOptions;

/// Convert freshly parsed tracks to a GeoJSON FeatureCollection.
pub fn to_feature_collection(reports: &[TrackReport], opts: &ViewOptions) -> FeatureCollection {
    let features = reports
        .iter()
        .filter(|r| opts.should_include(r.extract.category))
        .map(|r| {
            track_to_feature(
                TrackView {
                    id: None,
                    name: &r.extract.name,
                    category: r.extract.category,
                    start_time: r.extract.start_time,
                    end_time: r.extract.end_time,
                    points: &r.extract.points,
                    stats: r.stats,
                },
                opts,
            )
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Convert a stored track with recomputed stats to a single Feature.
pub fn detail_to_feature(detail: &TrackDetail, opts: &ViewOptions) -> Feature {
    let track = &detail.track;
    let mut feature = track_to_feature(
        TrackView {
            id: Some(track.id),
            name: &track.name,
            category: track.category,
            start_time: track.start_time,
            end_time: track.end_time,
            points: &track.points,
            stats: detail.stats,
        },
        opts,
    );
    if let Some(props) = feature.properties.as_mut() {
        props.insert("driver".to_string(), JsonValue::String(track.driver.clone()));
        props.insert("vehicle".to_string(), JsonValue::String(track.vehicle.clone()));
    }
    feature
}

struct TrackView<'a> {
    id: Option<i64>,
    name: &'a str,
    category: Category,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    points: &'a [Point],
    stats: AggregateStats,
}

/// An empty track keeps its feature with a null geometry so its stats stay listed.
fn track_to_feature(view: TrackView<'_>, opts: &ViewOptions) -> Feature {
    let geometry = match view.points {
        [] => None,
        [single] => Some(Geometry::new(Value::Point(point_coords(
            single,
            opts.include_elevation,
        )))),
        points => Some(Geometry::new(Value::LineString(
            points
                .iter()
                .map(|pt| point_coords(pt, opts.include_elevation))
                .collect(),
        ))),
    };

    let mut props = Map::new();
    props.insert("name".to_string(), JsonValue::String(view.name.to_string()));
    props.insert(
        "category".to_string(),
        JsonValue::String(view.category.as_str().to_string()),
    );
    props.insert(
        "totalDistanceKm".to_string(),
        number(view.stats.total_distance_km),
    );
    props.insert("avgSpeedKmh".to_string(), number(view.stats.avg_speed_kmh));
    insert_time(&mut props, "startTime", view.start_time);
    insert_time(&mut props, "endTime", view.end_time);

    let mut coord_props = Map::new();
    if opts.include_time {
        insert_series(&mut coord_props, "times", view.points, |pt| {
            pt.timestamp.map(|t| JsonValue::String(t.to_rfc3339()))
        });
    }
    if opts.include_speed {
        insert_series(&mut coord_props, "speeds", view.points, |pt| pt.speed.map(number));
    }
    if !coord_props.is_empty() {
        props.insert(
            "coordinateProperties".to_string(),
            JsonValue::Object(coord_props),
        );
    }

    Feature {
        bbox: None,
        geometry,
        id: view.id.map(|id| geojson::feature::Id::Number(id.into())),
        properties: Some(props),
        foreign_members: None,
    }
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(pt: &Point, include_elevation: bool) -> Vec<f64> {
    if include_elevation {
        vec![pt.longitude, pt.latitude, pt.elevation]
    } else {
        vec![pt.longitude, pt.latitude]
    }
}

fn number(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn insert_time(props: &mut Map<String, JsonValue>, key: &str, time: Option<Timestamp>) {
    if let Some(t) = time {
        props.insert(key.to_string(), JsonValue::String(t.to_rfc3339()));
    }
}

/// Per-coordinate values; only included if at least one is present.
fn insert_series(
    props: &mut Map<String, JsonValue>,
    key: &str,
    points: &[Point],
    value: impl Fn(&Point) -> Option<JsonValue>,
) {
    let series: Vec<JsonValue> = points
        .iter()
        .map(|pt| value(pt).unwrap_or(JsonValue::Null))
        .collect();
    if series.iter().any(|v| !v.is_null()) {
        props.insert(key.to_string(), JsonValue::Array(series));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract_tracks;

    fn reports(xml: &str) -> Vec<TrackReport> {
        extract_tracks(xml)
            .unwrap()
            .into_iter()
            .map(TrackReport::new)
            .collect()
    }

    #[test]
    fn test_track_with_times_and_stats() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <name>Run</name>
    <trkseg>
      <trkpt lat="0.0" lon="0.0"><ele>12</ele><time>2025-01-01T00:00:00Z</time></trkpt>
      <trkpt lat="0.0" lon="0.045"><time>2025-01-01T00:30:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let fc = to_feature_collection(&reports(xml), &ViewOptions::default());

        assert_eq!(fc.features.len(), 1);
        let f = &fc.features[0];
        match &f.geometry.as_ref().unwrap().value {
            Value::LineString(coords) => {
                assert_eq!(coords.len(), 2);
                assert_eq!(coords[0], vec![0.0, 0.0, 12.0]);
                assert_eq!(coords[1], vec![0.045, 0.0, 0.0]);
            }
            _ => panic!("Expected LineString"),
        }

        let props = f.properties.as_ref().unwrap();
        assert_eq!(props["name"], "Run");
        assert_eq!(props["category"], "route");
        assert_eq!(props["totalDistanceKm"], 5.0);
        assert_eq!(props["avgSpeedKmh"], 10.0);
        assert_eq!(props["startTime"], "2025-01-01T00:00:00+00:00");

        let coord_props = props["coordinateProperties"].as_object().unwrap();
        let times = coord_props["times"].as_array().unwrap();
        assert_eq!(times.len(), 2);
        assert!(!coord_props.contains_key("speeds"));
    }

    #[test]
    fn test_single_point_and_empty_tracks() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0"/>
  <trk><name>Empty</name></trk>
</gpx>"#;
        let fc = to_feature_collection(&reports(xml), &ViewOptions::default());
        assert_eq!(fc.features.len(), 2);
        assert!(matches!(
            fc.features[0].geometry.as_ref().unwrap().value,
            Value::Point(_)
        ));
        assert!(fc.features[1].geometry.is_none());
        assert_eq!(fc.features[1].properties.as_ref().unwrap()["totalDistanceKm"], 0.0);
    }

    #[test]
    fn test_no_elevation_and_category_filter() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0"><ele>100.0</ele></wpt>
  <trk><trkseg><trkpt lat="35.0" lon="139.0"/><trkpt lat="36.0" lon="140.0"/></trkseg></trk>
</gpx>"#;
        let opts = ViewOptions {
            include_elevation: false,
            categories: Some(vec![Category::Waypoints]),
            ..Default::default()
        };
        let fc = to_feature_collection(&reports(xml), &opts);
        assert_eq!(fc.features.len(), 1);
        match &fc.features[0].geometry.as_ref().unwrap().value {
            Value::Point(coords) => assert_eq!(coords.len(), 2),
            _ => panic!("Expected Point"),
        }
    }

    #[test]
    fn test_speed_series() {
        let xml = r#"<gpx><trk><trkseg>
  <trkpt lat="0" lon="0"><speed>3.5</speed></trkpt>
  <trkpt lat="0" lon="0.01"/>
</trkseg></trk></gpx>"#;
        let fc = to_feature_collection(&reports(xml), &ViewOptions::default());
        let props = fc.features[0].properties.as_ref().unwrap();
        let speeds = props["coordinateProperties"]["speeds"].as_array().unwrap();
        assert_eq!(speeds[0], 3.5);
        assert!(speeds[1].is_null());
    }
}
