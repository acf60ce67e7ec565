use serde::Deserialize;

use crate::gpx_types::Category;

/// Options for the GeoJSON view of extracts and stored tracks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOptions {
    /// Include elevation as the 3rd coordinate value (default: true)
    #[serde(default = "default_true")]
    pub include_elevation: bool,

    /// Include timestamps in coordinateProperties.times (default: true)
    #[serde(default = "default_true")]
    pub include_time: bool,

    /// Include speed samples in coordinateProperties.speeds (default: true)
    #[serde(default = "default_true")]
    pub include_speed: bool,

    /// Which categories to include (default: all)
    #[serde(default)]
    pub categories: Option<Vec<Category>>,

    /// How the detail view derives average speed (default: preferSamples)
    #[serde(default)]
    pub speed_policy: SpeedPolicy,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            include_elevation: true,
            include_time: true,
            include_speed: true,
            categories: None,
            speed_policy: SpeedPolicy::default(),
        }
    }
}

impl ViewOptions {
    pub fn should_include(&self, category: Category) -> bool {
        match &self.categories {
            None => true,
            Some(categories) => categories.contains(&category),
        }
    }
}

/// Source of the average speed shown for a stored track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpeedPolicy {
    /// Mean of the recorded speed samples, falling back to `Bounds` when a
    /// track has none.
    #[default]
    PreferSamples,
    /// Distance over the time between the first and last timestamp. Always
    /// reproduces the value computed at upload.
    Bounds,
}

/// Settings for the upload workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    /// Directory uploads are stored under; prefixes the duplicate-detection key.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

impl IngestOptions {
    /// Path an uploaded file is recorded under.
    pub fn storage_path(&self, file_name: &str) -> String {
        let dir = self.upload_dir.trim_end_matches(['/', '\\']);
        match (self.upload_dir.is_empty(), dir.is_empty()) {
            (true, _) => file_name.to_string(),
            // Filesystem root: keep the separator the trim removed.
            (false, true) => format!("{}{file_name}", &self.upload_dir[..1]),
            (false, false) => format!("{dir}/{file_name}"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}
