pub mod aggregate;
pub mod converter;
pub mod error;
pub mod gpx_types;
pub mod ingest;
pub mod options;
pub mod parser;
pub mod store;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::aggregate::TrackReport;
use crate::error::ParseError;
use crate::options::ViewOptions;

/// Parse a GPX document and compute the upload-time stats of every extract.
pub fn analyze_gpx(xml: &str) -> Result<Vec<TrackReport>, ParseError> {
    Ok(parser::extract_tracks(xml)?
        .into_iter()
        .map(TrackReport::new)
        .collect())
}

/// Parse GPX and return the extracts with their stats as JS objects.
#[wasm_bindgen(js_name = extractTracks)]
pub fn extract_tracks_js(gpx_string: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let reports = analyze_gpx(gpx_string)?;
    // Maps become plain objects rather than JS Map instances.
    reports
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert GPX to a GeoJSON preview of its tracks, returned as a JS object.
#[wasm_bindgen(js_name = gpxToGeoJson)]
pub fn gpx_to_geojson(gpx_string: &str, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let reports = analyze_gpx(gpx_string)?;
    let fc = converter::to_feature_collection(&reports, &opts);
    fc.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert GPX to a GeoJSON preview of its tracks, returned as a JSON string.
#[wasm_bindgen(js_name = gpxToGeoJsonString)]
pub fn gpx_to_geojson_string(gpx_string: &str, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let reports = analyze_gpx(gpx_string)?;
    let fc = converter::to_feature_collection(&reports, &opts);
    serde_json::to_string(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_options(options: JsValue) -> Result<ViewOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ViewOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
