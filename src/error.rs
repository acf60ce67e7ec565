use std::str::Utf8Error;

use quick_xml::events::attributes::AttrError;
use thiserror::Error;
use wasm_bindgen::JsValue;

/// Raised when a document is not well-formed GPX.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] Utf8Error),
    #[error("document has no root element")]
    MissingRoot,
    #[error("expected <gpx> root element, found <{root}>")]
    NotGpx { root: String },
    #[error("missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("unexpected content after the <gpx> root element")]
    TrailingContent,
    #[error("unexpected end of document inside <{element}>")]
    UnexpectedEof { element: &'static str },
}

impl From<ParseError> for JsValue {
    fn from(e: ParseError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

/// Failures of a [`TrackRepository`](crate::store::TrackRepository).
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(not(target_arch = "wasm32"))]
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt stored track {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file name '{0}' does not follow the driver_vehicle_* convention")]
    InvalidFilename(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
