use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, ToSql, params, params_from_iter};

use super::{NewTrack, StoredTrack, TrackFilter, TrackId, TrackRepository, TrackSummary};
use crate::aggregate::AggregateStats;
use crate::error::StoreError;
use crate::gpx_types::{Category, Point, Timestamp};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS driver (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS vehicle (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS track (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        category TEXT NOT NULL DEFAULT 'route',
        file_path TEXT NOT NULL,
        vehicle_id INTEGER NOT NULL REFERENCES vehicle(id),
        driver_id INTEGER NOT NULL REFERENCES driver(id),
        date TEXT,
        total_distance REAL NOT NULL DEFAULT 0,
        avg_speed REAL NOT NULL DEFAULT 0,
        start_time TEXT,
        end_time TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_track_file_path ON track(file_path);

    CREATE TABLE IF NOT EXISTS coordinate (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        ele REAL NOT NULL DEFAULT 0.0,
        speed REAL,
        time TEXT,
        track_id INTEGER NOT NULL REFERENCES track(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_coordinate_track ON coordinate(track_id);
"#;

/// Location of the track database. Hands out one connection per request scope.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
        };
        db.session()?;
        Ok(db)
    }

    /// A fresh connection, closed when the returned store is dropped.
    pub fn session(&self) -> Result<SqliteStore, StoreError> {
        SqliteStore::open(&self.path)
    }
}

/// [`TrackRepository`] over a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("track database schema ready");
        Ok(Self { conn })
    }
}

fn lookup_or_insert(conn: &Connection, table: &str, name: &str) -> rusqlite::Result<i64> {
    let existing = conn
        .prepare_cached(&format!("SELECT id FROM {table} WHERE name = ?1"))?
        .query_row(params![name], |row| row.get(0))
        .optional()?;
    match existing {
        Some(id) => Ok(id),
        None => {
            conn.prepare_cached(&format!("INSERT INTO {table} (name) VALUES (?1)"))?
                .execute(params![name])?;
            Ok(conn.last_insert_rowid())
        }
    }
}

fn parse_category(id: TrackId, raw: &str) -> Result<Category, StoreError> {
    raw.parse()
        .map_err(|reason| StoreError::Corrupt { id, reason })
}

impl TrackRepository for SqliteStore {
    fn contains_file(&self, file_path: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM track WHERE file_path = ?1 LIMIT 1",
                params![file_path],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn save_tracks(&mut self, tracks: &[NewTrack]) -> Result<Vec<TrackId>, StoreError> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(tracks.len());

        for track in tracks {
            let driver_id = lookup_or_insert(&tx, "driver", &track.driver)?;
            let vehicle_id = lookup_or_insert(&tx, "vehicle", &track.vehicle)?;

            tx.execute(
                "INSERT INTO track (name, category, file_path, vehicle_id, driver_id, date,
                                    total_distance, avg_speed, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    track.name,
                    track.category.as_str(),
                    track.file_path,
                    vehicle_id,
                    driver_id,
                    track.date,
                    track.stats.total_distance_km,
                    track.stats.avg_speed_kmh,
                    track.start_time,
                    track.end_time,
                ],
            )?;
            let track_id = tx.last_insert_rowid();

            let mut insert_point = tx.prepare_cached(
                "INSERT INTO coordinate (lat, lon, ele, speed, time, track_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for point in &track.points {
                insert_point.execute(params![
                    point.latitude,
                    point.longitude,
                    point.elevation,
                    point.speed,
                    point.timestamp,
                    track_id,
                ])?;
            }
            ids.push(track_id);
        }

        tx.commit()?;
        tracing::debug!(tracks = ids.len(), "stored tracks");
        Ok(ids)
    }

    fn load_track(&self, id: TrackId) -> Result<Option<StoredTrack>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT t.name, t.category, t.file_path, d.name, v.name, t.date,
                        t.total_distance, t.avg_speed, t.start_time, t.end_time
                 FROM track t
                 JOIN driver d ON d.id = t.driver_id
                 JOIN vehicle v ON v.id = t.vehicle_id
                 WHERE t.id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<NaiveDate>>(5)?,
                        AggregateStats {
                            total_distance_km: row.get(6)?,
                            avg_speed_kmh: row.get(7)?,
                        },
                        row.get::<_, Option<Timestamp>>(8)?,
                        row.get::<_, Option<Timestamp>>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, category, file_path, driver, vehicle, date, stats, start_time, end_time)) =
            row
        else {
            return Ok(None);
        };
        let category = parse_category(id, &category)?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT lat, lon, ele, speed, time FROM coordinate WHERE track_id = ?1 ORDER BY id",
        )?;
        let points = stmt
            .query_map(params![id], |row| {
                Ok(Point {
                    latitude: row.get(0)?,
                    longitude: row.get(1)?,
                    elevation: row.get(2)?,
                    speed: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(StoredTrack {
            id,
            name: name.unwrap_or_else(|| category.default_name().to_string()),
            category,
            file_path,
            driver,
            vehicle,
            date,
            stats,
            start_time,
            end_time,
            points,
        }))
    }

    fn find_tracks(&self, filter: &TrackFilter) -> Result<Vec<TrackSummary>, StoreError> {
        let mut sql = String::from(
            "SELECT t.id, d.name, v.name, t.name, t.date
             FROM track t
             JOIN driver d ON d.id = t.driver_id
             JOIN vehicle v ON v.id = t.vehicle_id
             WHERE 1 = 1",
        );
        let mut args: Vec<&dyn ToSql> = Vec::new();
        if let Some(vehicle) = &filter.vehicle {
            sql.push_str(" AND v.name = ?");
            args.push(vehicle);
        }
        if let Some(driver) = &filter.driver {
            sql.push_str(" AND d.name = ?");
            args.push(driver);
        }
        if let Some(from) = &filter.date_from {
            sql.push_str(" AND t.date >= ?");
            args.push(from);
        }
        if let Some(to) = &filter.date_to {
            sql.push_str(" AND t.date <= ?");
            args.push(to);
        }
        sql.push_str(" ORDER BY t.date ASC, t.id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map(params_from_iter(args), |row| {
                Ok(TrackSummary {
                    id: row.get(0)?,
                    driver: row.get(1)?,
                    vehicle: row.get(2)?,
                    name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    date: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn driver_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare_cached("SELECT name FROM driver ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn vehicle_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare_cached("SELECT name FROM vehicle ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn new_track(file: &str, driver: &str, vehicle: &str, day: u32) -> NewTrack {
        let start = Utc.with_ymd_and_hms(2024, 6, day, 8, 0, 0).unwrap();
        NewTrack {
            name: format!("Run {day}"),
            category: Category::Route,
            file_path: format!("uploads/{file}"),
            driver: driver.into(),
            vehicle: vehicle.into(),
            date: Some(start.date_naive()),
            stats: AggregateStats {
                total_distance_km: 5.0,
                avg_speed_kmh: 10.0,
            },
            start_time: Some(start),
            end_time: Some(start + chrono::Duration::minutes(30)),
            points: vec![
                Point::new(0.0, 0.0).with_timestamp(start),
                Point::new(0.0, 0.0225).with_speed(9.5),
            ],
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let mut store = SqliteStore::in_memory().unwrap();
        let track = new_track("anna_van_1.gpx", "anna", "van", 15);
        let ids = store.save_tracks(std::slice::from_ref(&track)).unwrap();
        assert_eq!(ids.len(), 1);

        let loaded = store.load_track(ids[0]).unwrap().unwrap();
        assert_eq!(loaded.name, track.name);
        assert_eq!(loaded.category, Category::Route);
        assert_eq!(loaded.driver, "anna");
        assert_eq!(loaded.vehicle, "van");
        assert_eq!(loaded.date, track.date);
        assert_eq!(loaded.stats, track.stats);
        assert_eq!(loaded.start_time, track.start_time);
        assert_eq!(loaded.end_time, track.end_time);
        assert_eq!(loaded.points, track.points);
    }

    #[test]
    fn test_missing_track() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.load_track(42).unwrap().is_none());
    }

    #[test]
    fn test_contains_file() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .save_tracks(&[new_track("anna_van_1.gpx", "anna", "van", 15)])
            .unwrap();
        assert!(store.contains_file("uploads/anna_van_1.gpx").unwrap());
        assert!(!store.contains_file("uploads/anna_van_2.gpx").unwrap());
    }

    #[test]
    fn test_drivers_and_vehicles_are_shared() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .save_tracks(&[
                new_track("a.gpx", "anna", "van", 15),
                new_track("a.gpx", "anna", "truck", 16),
            ])
            .unwrap();
        store
            .save_tracks(&[new_track("b.gpx", "bob", "van", 17)])
            .unwrap();
        assert_eq!(store.driver_names().unwrap(), vec!["anna", "bob"]);
        assert_eq!(store.vehicle_names().unwrap(), vec!["truck", "van"]);
    }

    #[test]
    fn test_find_tracks_filters_and_orders_by_date() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .save_tracks(&[
                new_track("a.gpx", "anna", "van", 20),
                new_track("a.gpx", "anna", "van", 10),
                new_track("a.gpx", "bob", "van", 12),
                new_track("a.gpx", "anna", "truck", 11),
            ])
            .unwrap();

        let all = store.find_tracks(&TrackFilter::default()).unwrap();
        let names: Vec<&str> = all.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Run 10", "Run 11", "Run 12", "Run 20"]);

        let anna_van = store
            .find_tracks(&TrackFilter {
                driver: Some("anna".into()),
                vehicle: Some("van".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(anna_van.len(), 2);

        let window = store
            .find_tracks(&TrackFilter {
                date_from: NaiveDate::from_ymd_opt(2024, 6, 11),
                date_to: NaiveDate::from_ymd_opt(2024, 6, 12),
                ..Default::default()
            })
            .unwrap();
        let names: Vec<&str> = window.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Run 11", "Run 12"]);
    }

    #[test]
    fn test_session_per_request_shares_file() {
        let path = std::env::temp_dir().join(format!(
            "gpx-track-stats-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let db = Database::open(&path).unwrap();
        {
            let mut session = db.session().unwrap();
            session
                .save_tracks(&[new_track("anna_van_1.gpx", "anna", "van", 15)])
                .unwrap();
        }
        {
            let session = db.session().unwrap();
            assert!(session.contains_file("uploads/anna_van_1.gpx").unwrap());
        }
        std::fs::remove_file(&path).unwrap();
    }
}
