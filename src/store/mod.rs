//! Persistence of parsed tracks keyed by driver and vehicle.
//!
//! The parser and aggregator only deal in plain values; a [`TrackRepository`]
//! maps those onto whatever storage the host application uses.

mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod sqlite;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::AggregateStats;
use crate::error::StoreError;
use crate::gpx_types::{Category, Point, Timestamp};

pub use memory::MemoryStore;
#[cfg(not(target_arch = "wasm32"))]
pub use sqlite::{Database, SqliteStore};

pub type TrackId = i64;

/// A track ready to be written, one per extract of an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub name: String,
    pub category: Category,
    pub file_path: String,
    pub driver: String,
    pub vehicle: String,
    pub date: Option<NaiveDate>,
    pub stats: AggregateStats,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub points: Vec<Point>,
}

/// A persisted track with its points, as loaded for the detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTrack {
    pub id: TrackId,
    pub name: String,
    pub category: Category,
    pub file_path: String,
    pub driver: String,
    pub vehicle: String,
    pub date: Option<NaiveDate>,
    /// Stats cached at upload time.
    pub stats: AggregateStats,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub points: Vec<Point>,
}

/// One row of the filtered track list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub id: TrackId,
    pub driver: String,
    pub vehicle: String,
    pub name: String,
    pub date: Option<NaiveDate>,
}

/// Criteria for listing tracks; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFilter {
    pub driver: Option<String>,
    pub vehicle: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl TrackFilter {
    pub fn matches(&self, driver: &str, vehicle: &str, date: Option<NaiveDate>) -> bool {
        if self.driver.as_deref().is_some_and(|d| d != driver) {
            return false;
        }
        if self.vehicle.as_deref().is_some_and(|v| v != vehicle) {
            return false;
        }
        // A bound never matches a track without a date.
        if let Some(from) = self.date_from {
            if date.is_none_or(|d| d < from) {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if date.is_none_or(|d| d > to) {
                return false;
            }
        }
        true
    }
}

/// Save/query contract of the track store.
pub trait TrackRepository {
    /// Whether a file has already been recorded under this storage path.
    fn contains_file(&self, file_path: &str) -> Result<bool, StoreError>;

    /// Store every track of one upload, creating drivers and vehicles as
    /// needed. Either all tracks and their points are stored or none are.
    fn save_tracks(&mut self, tracks: &[NewTrack]) -> Result<Vec<TrackId>, StoreError>;

    fn load_track(&self, id: TrackId) -> Result<Option<StoredTrack>, StoreError>;

    /// Tracks matching `filter`, ordered by date then id, undated first.
    fn find_tracks(&self, filter: &TrackFilter) -> Result<Vec<TrackSummary>, StoreError>;

    /// Distinct driver names, sorted.
    fn driver_names(&self) -> Result<Vec<String>, StoreError>;

    /// Distinct vehicle names, sorted.
    fn vehicle_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Tracks nested by driver, then vehicle, preserving list order within each group.
pub type GroupedTracks = BTreeMap<String, BTreeMap<String, Vec<TrackSummary>>>;

pub fn group_by_driver_vehicle(tracks: Vec<TrackSummary>) -> GroupedTracks {
    let mut grouped = GroupedTracks::new();
    for track in tracks {
        grouped
            .entry(track.driver.clone())
            .or_default()
            .entry(track.vehicle.clone())
            .or_default()
            .push(track);
    }
    grouped
}
