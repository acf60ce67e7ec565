use chrono::{NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;
use crate::gpx_types::*;

type Result<T> = std::result::Result<T, ParseError>;

/// Extract track sequences from a GPX document held in memory as bytes.
pub fn extract_tracks_from_bytes(bytes: &[u8]) -> Result<Vec<TrackExtract>> {
    extract_tracks(std::str::from_utf8(bytes)?)
}

/// Extract track sequences from a GPX document.
///
/// Loose waypoints become one [`Category::Waypoints`] extract placed first,
/// followed by one [`Category::Route`] extract per `<trk>` in document order.
/// The segments of a track are concatenated.
pub fn extract_tracks(xml: &str) -> Result<Vec<TrackExtract>> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                expect_gpx_root(&e)?;
                let extracts = parse_document(&mut reader)?;
                expect_end_of_document(&mut reader)?;
                return Ok(extracts);
            }
            Event::Empty(e) => {
                expect_gpx_root(&e)?;
                expect_end_of_document(&mut reader)?;
                return Ok(Vec::new());
            }
            Event::Eof => return Err(ParseError::MissingRoot),
            _ => {}
        }
    }
}

/// Only comments, processing instructions and whitespace may follow the root.
fn expect_end_of_document<'a>(reader: &mut Reader<&'a [u8]>) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Eof => return Ok(()),
            Event::Start(_) | Event::Empty(_) | Event::End(_) | Event::CData(_) | Event::GeneralRef(_) => {
                return Err(ParseError::TrailingContent);
            }
            Event::Text(e) if !e.iter().all(u8::is_ascii_whitespace) => {
                return Err(ParseError::TrailingContent);
            }
            _ => {}
        }
    }
}

fn expect_gpx_root(e: &BytesStart<'_>) -> Result<()> {
    if e.local_name().as_ref() == b"gpx" {
        Ok(())
    } else {
        Err(ParseError::NotGpx {
            root: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        })
    }
}

/// Parse the children of `<gpx>`. Called after receiving Event::Start for the root.
fn parse_document<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Vec<TrackExtract>> {
    let mut waypoints = ExtractBuilder::new(Category::Waypoints);
    let mut tracks = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"wpt" => {
                    let (point, name) = parse_point(&e, reader, "wpt")?;
                    waypoints.offer_name(name);
                    // Waypoints are stationary, a device speed reading there is meaningless.
                    waypoints.push(Point { speed: None, ..point });
                }
                b"trk" => tracks.push(parse_track(reader)?),
                _ => skip_element(reader, &e)?,
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"wpt" => {
                    let (lat, lon) = parse_lat_lon(&e, "wpt")?;
                    waypoints.push(Point::new(lat, lon));
                }
                b"trk" => tracks.push(ExtractBuilder::new(Category::Route).finish()),
                _ => {}
            },
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof { element: "gpx" }),
            _ => {}
        }
    }

    let mut extracts = Vec::with_capacity(tracks.len() + 1);
    if !waypoints.is_empty() {
        extracts.push(waypoints.finish());
    }
    extracts.extend(tracks);

    tracing::debug!(extracts = extracts.len(), "parsed GPX document");
    Ok(extracts)
}

/// Parse lat/lon attributes from a point element's start tag.
fn parse_lat_lon(e: &BytesStart<'_>, element: &'static str) -> Result<(f64, f64)> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result?;
        let slot = match attr.key.local_name().as_ref() {
            b"lat" => (&mut lat, "lat"),
            b"lon" => (&mut lon, "lon"),
            _ => continue,
        };
        let val = String::from_utf8_lossy(&attr.value);
        let parsed = val
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParseError::InvalidAttribute {
                element,
                attribute: slot.1,
                value: val.to_string(),
            })?;
        *slot.0 = Some(parsed);
    }

    let lat = lat.ok_or(ParseError::MissingAttribute {
        element,
        attribute: "lat",
    })?;
    let lon = lon.ok_or(ParseError::MissingAttribute {
        element,
        attribute: "lon",
    })?;

    Ok((lat, lon))
}

/// Parse a point element (wpt, trkpt) and its children, returning the point
/// and its declared name.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    element: &'static str,
) -> Result<(Point, Option<String>)> {
    let (lat, lon) = parse_lat_lon(start, element)?;
    let mut point = Point::new(lat, lon);
    let mut name = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"ele" => {
                    point.elevation = parse_number(&read_text_owned(reader, &e)?).unwrap_or(0.0);
                }
                b"time" => {
                    point.timestamp = parse_time(&read_text_owned(reader, &e)?);
                }
                b"speed" => {
                    point.speed = parse_number(&read_text_owned(reader, &e)?);
                }
                b"name" => {
                    name = Some(read_text_owned(reader, &e)?);
                }
                b"extensions" => {
                    if let Some(speed) = parse_extension_speed(reader)? {
                        point.speed = point.speed.or(Some(speed));
                    }
                }
                _ => skip_element(reader, &e)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof { element }),
            _ => {}
        }
    }

    Ok((point, name))
}

/// Look for a `<speed>` element at any depth inside `<extensions>`.
fn parse_extension_speed<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Option<f64>> {
    let mut speed = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"speed" => {
                let value = parse_number(&read_text_owned(reader, &e)?);
                speed = speed.or(value);
            }
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(ParseError::UnexpectedEof { element: "extensions" }),
            _ => {}
        }
    }

    Ok(speed)
}

/// Parse a <trk> element into a single extract.
fn parse_track<'a>(reader: &mut Reader<&'a [u8]>) -> Result<TrackExtract> {
    let mut track = ExtractBuilder::new(Category::Route);

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => track.offer_name(Some(read_text_owned(reader, &e)?)),
                b"trkseg" => parse_segment(reader, &mut track)?,
                _ => skip_element(reader, &e)?,
            },
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof { element: "trk" }),
            _ => {}
        }
    }

    Ok(track.finish())
}

/// Parse a <trkseg> element, appending its points to the enclosing track.
fn parse_segment<'a>(reader: &mut Reader<&'a [u8]>, track: &mut ExtractBuilder) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" => {
                    let (point, _) = parse_point(&e, reader, "trkpt")?;
                    track.push(point);
                }
                _ => skip_element(reader, &e)?,
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"trkpt" {
                    let (lat, lon) = parse_lat_lon(&e, "trkpt")?;
                    track.push(Point::new(lat, lon));
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof { element: "trkseg" }),
            _ => {}
        }
    }

    Ok(())
}

fn skip_element<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<()> {
    reader.read_to_end(start.name())?;
    Ok(())
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    match &*e {
                        b"amp" => text.push('&'),
                        b"lt" => text.push('<'),
                        b"gt" => text.push('>'),
                        b"quot" => text.push('"'),
                        b"apos" => text.push('\''),
                        _ => {}
                    }
                }
            }
            // Nested markup is skipped along with its content.
            Event::Start(e) => skip_element(reader, &e)?,
            Event::End(_) => break,
            Event::Eof => {
                return Err(ParseError::UnexpectedEof {
                    element: text_element_name(start),
                });
            }
            _ => {}
        }
    }

    Ok(text.trim().to_string())
}

fn text_element_name(start: &BytesStart<'_>) -> &'static str {
    match start.local_name().as_ref() {
        b"ele" => "ele",
        b"time" => "time",
        b"speed" => "speed",
        b"name" => "name",
        _ => "text",
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a GPX timestamp. Values without an offset are taken as UTC.
fn parse_time(text: &str) -> Option<Timestamp> {
    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    tracing::warn!(value = text, "ignoring unparseable GPX timestamp");
    None
}
