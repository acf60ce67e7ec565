//! Upload and detail-view workflows on top of a [`TrackRepository`].

use std::path::Path;

use crate::aggregate::{AggregateStats, TrackReport};
use crate::error::{IngestError, StoreError};
use crate::options::{IngestOptions, SpeedPolicy};
use crate::parser::extract_tracks_from_bytes;
use crate::store::{NewTrack, StoredTrack, TrackId, TrackRepository};

/// Driver and vehicle an upload belongs to, taken from its file name
/// (`driver_vehicle_anything.gpx`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadKey {
    pub driver: String,
    pub vehicle: String,
}

impl UploadKey {
    pub fn from_filename(file_name: &str) -> Result<Self, IngestError> {
        let invalid = || IngestError::InvalidFilename(file_name.to_string());
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(invalid)?;

        let mut parts = stem.split('_');
        let driver = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let vehicle = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (driver, vehicle) {
            (Some(driver), Some(vehicle)) => Ok(Self {
                driver: driver.to_string(),
                vehicle: vehicle.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The file was parsed and its tracks stored under these ids.
    Stored(Vec<TrackId>),
    /// A file with the same storage path was already recorded; nothing was written.
    Duplicate,
}

/// Parse an uploaded GPX file and store every extract with its stats.
///
/// Nothing is written when the file name does not follow the convention,
/// the file was uploaded before, or the document fails to parse.
pub fn ingest_upload<R: TrackRepository>(
    repo: &mut R,
    opts: &IngestOptions,
    file_name: &str,
    contents: &[u8],
) -> Result<IngestOutcome, IngestError> {
    let key = UploadKey::from_filename(file_name)?;
    let file_path = opts.storage_path(file_name);

    if repo.contains_file(&file_path)? {
        tracing::info!(file = %file_path, "skipping already uploaded file");
        return Ok(IngestOutcome::Duplicate);
    }

    let tracks: Vec<NewTrack> = extract_tracks_from_bytes(contents)?
        .into_iter()
        .map(|extract| {
            let TrackReport { extract, stats } = TrackReport::new(extract);
            NewTrack {
                name: extract.name,
                category: extract.category,
                file_path: file_path.clone(),
                driver: key.driver.clone(),
                vehicle: key.vehicle.clone(),
                date: extract.start_time.map(|t| t.date_naive()),
                stats,
                start_time: extract.start_time,
                end_time: extract.end_time,
                points: extract.points,
            }
        })
        .collect();

    let ids = repo.save_tracks(&tracks)?;
    tracing::info!(
        file = %file_path,
        driver = %key.driver,
        vehicle = %key.vehicle,
        tracks = ids.len(),
        "stored uploaded GPX file"
    );
    Ok(IngestOutcome::Stored(ids))
}

/// A stored track with stats recomputed from its points.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDetail {
    pub track: StoredTrack,
    pub stats: AggregateStats,
}

/// Load a track for display, recomputing its stats under `policy`.
pub fn track_detail<R: TrackRepository>(
    repo: &R,
    id: TrackId,
    policy: SpeedPolicy,
) -> Result<Option<TrackDetail>, StoreError> {
    let Some(track) = repo.load_track(id)? else {
        return Ok(None);
    };
    let stats = AggregateStats::recompute(
        &track.points,
        track.category,
        track.start_time,
        track.end_time,
        policy,
    );
    if stats != track.stats {
        tracing::debug!(track = id, ?stats, cached = ?track.stats, "recomputed stats differ from upload");
    }
    Ok(Some(TrackDetail { track, stats }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TRIP: &str = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="0.0" lon="0.0"><name>Depot</name><time>2024-06-15T07:55:00Z</time></wpt>
  <trk>
    <name>Delivery</name>
    <trkseg>
      <trkpt lat="0.0" lon="0.0"><time>2024-06-15T08:00:00Z</time></trkpt>
      <trkpt lat="0.0" lon="0.0225"><time>2024-06-15T08:15:00Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="0.0" lon="0.045"><time>2024-06-15T08:30:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_upload_key_from_filename() {
        let key = UploadKey::from_filename("anna_van_2024-06-15.gpx").unwrap();
        assert_eq!(key.driver, "anna");
        assert_eq!(key.vehicle, "van");

        let key = UploadKey::from_filename("bob_truck.gpx").unwrap();
        assert_eq!(key.vehicle, "truck");

        let key = UploadKey::from_filename("incoming/carl_bike_x.gpx").unwrap();
        assert_eq!(key.driver, "carl");
    }

    #[test]
    fn test_upload_key_rejects_bad_names() {
        for name in ["track.gpx", "_van_1.gpx", "anna__1.gpx", ""] {
            assert!(
                matches!(UploadKey::from_filename(name), Err(IngestError::InvalidFilename(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_ingest_stores_every_extract() {
        let mut store = MemoryStore::new();
        let outcome =
            ingest_upload(&mut store, &IngestOptions::default(), "anna_van_1.gpx", TRIP.as_bytes())
                .unwrap();
        let IngestOutcome::Stored(ids) = outcome else {
            panic!("expected tracks to be stored");
        };
        assert_eq!(ids.len(), 2);

        let waypoints = store.load_track(ids[0]).unwrap().unwrap();
        assert_eq!(waypoints.name, "Depot");
        assert_eq!(waypoints.stats, AggregateStats::default());
        assert_eq!(waypoints.file_path, "uploads/anna_van_1.gpx");

        let route = store.load_track(ids[1]).unwrap().unwrap();
        assert_eq!(route.name, "Delivery");
        assert_eq!(route.driver, "anna");
        assert_eq!(route.vehicle, "van");
        assert_eq!(route.points.len(), 3);
        assert_eq!(route.stats.total_distance_km, 5.0);
        assert_eq!(route.stats.avg_speed_kmh, 10.0);
        assert_eq!(route.date, chrono::NaiveDate::from_ymd_opt(2024, 6, 15));
    }

    #[test]
    fn test_duplicate_upload_is_noop() {
        let mut store = MemoryStore::new();
        let opts = IngestOptions::default();
        ingest_upload(&mut store, &opts, "anna_van_1.gpx", TRIP.as_bytes()).unwrap();
        let again = ingest_upload(&mut store, &opts, "anna_van_1.gpx", TRIP.as_bytes()).unwrap();
        assert_eq!(again, IngestOutcome::Duplicate);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_malformed_upload_stores_nothing() {
        let mut store = MemoryStore::new();
        let truncated = &TRIP.as_bytes()[..TRIP.len() - 30];
        let err = ingest_upload(&mut store, &IngestOptions::default(), "anna_van_1.gpx", truncated)
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_detail_recomputes_stats() {
        let mut store = MemoryStore::new();
        let IngestOutcome::Stored(ids) =
            ingest_upload(&mut store, &IngestOptions::default(), "anna_van_1.gpx", TRIP.as_bytes())
                .unwrap()
        else {
            panic!("expected tracks to be stored");
        };
        let detail = track_detail(&store, ids[1], SpeedPolicy::PreferSamples)
            .unwrap()
            .unwrap();
        assert_eq!(detail.stats, detail.track.stats);
        assert!(track_detail(&store, 999, SpeedPolicy::Bounds).unwrap().is_none());
    }

    #[test]
    fn test_detail_of_single_point_track_has_no_speed() {
        let lone = r#"<gpx><trk><trkseg>
  <trkpt lat="0.0" lon="0.0"><time>2024-06-15T08:00:00Z</time><speed>42.0</speed></trkpt>
</trkseg></trk></gpx>"#;
        let mut store = MemoryStore::new();
        let IngestOutcome::Stored(ids) =
            ingest_upload(&mut store, &IngestOptions::default(), "anna_van_2.gpx", lone.as_bytes())
                .unwrap()
        else {
            panic!("expected the track to be stored");
        };
        let detail = track_detail(&store, ids[0], SpeedPolicy::PreferSamples)
            .unwrap()
            .unwrap();
        assert_eq!(detail.stats, AggregateStats::default());
        assert_eq!(detail.stats, detail.track.stats);
    }
}
