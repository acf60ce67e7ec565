use std::collections::BTreeSet;

use super::{NewTrack, StoredTrack, TrackFilter, TrackId, TrackRepository, TrackSummary};
use crate::error::StoreError;

/// Repository kept entirely in memory. Used in tests and in the browser build.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tracks: Vec<StoredTrack>,
    next_id: TrackId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl TrackRepository for MemoryStore {
    fn contains_file(&self, file_path: &str) -> Result<bool, StoreError> {
        Ok(self.tracks.iter().any(|t| t.file_path == file_path))
    }

    fn save_tracks(&mut self, tracks: &[NewTrack]) -> Result<Vec<TrackId>, StoreError> {
        let mut ids = Vec::with_capacity(tracks.len());
        for track in tracks {
            self.next_id += 1;
            ids.push(self.next_id);
            self.tracks.push(StoredTrack {
                id: self.next_id,
                name: track.name.clone(),
                category: track.category,
                file_path: track.file_path.clone(),
                driver: track.driver.clone(),
                vehicle: track.vehicle.clone(),
                date: track.date,
                stats: track.stats,
                start_time: track.start_time,
                end_time: track.end_time,
                points: track.points.clone(),
            });
        }
        Ok(ids)
    }

    fn load_track(&self, id: TrackId) -> Result<Option<StoredTrack>, StoreError> {
        Ok(self.tracks.iter().find(|t| t.id == id).cloned())
    }

    fn find_tracks(&self, filter: &TrackFilter) -> Result<Vec<TrackSummary>, StoreError> {
        let mut found: Vec<TrackSummary> = self
            .tracks
            .iter()
            .filter(|t| filter.matches(&t.driver, &t.vehicle, t.date))
            .map(|t| TrackSummary {
                id: t.id,
                driver: t.driver.clone(),
                vehicle: t.vehicle.clone(),
                name: t.name.clone(),
                date: t.date,
            })
            .collect();
        found.sort_by_key(|t| (t.date, t.id));
        Ok(found)
    }

    fn driver_names(&self) -> Result<Vec<String>, StoreError> {
        let names: BTreeSet<&str> = self.tracks.iter().map(|t| t.driver.as_str()).collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }

    fn vehicle_names(&self) -> Result<Vec<String>, StoreError> {
        let names: BTreeSet<&str> = self.tracks.iter().map(|t| t.vehicle.as_str()).collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }
}
