//! # Record Normalizer
//!
//! Pure mapping from one raw upstream record to zero or one canonical
//! [`Observation`]. Records without parseable coordinates or a timestamp are
//! dropped here, silently, one at a time.
//!
//! The providers have shipped several coordinate and media encodings over
//! the years, including a stringified-object artifact where a media list was
//! flattened into `{type=StillImage, url=https://...}` text. Each known
//! format gets its own small parser; the chains below try them in priority
//! order and take the first success.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use crate::models::{Observation, Source};
use crate::taxa::TaxonName;

const UNKNOWN_SPECIES: &str = "Unknown Fungus";

/// Normalizes one raw record. `taxa` is the resolver's current table and is
/// only consulted for primary-index records.
pub fn normalize(
    raw: &Value,
    source: Source,
    taxa: Option<&HashMap<String, TaxonName>>,
) -> Option<Observation> {
    let (latitude, longitude) = coordinates(raw)?;
    let timestamp = timestamp(raw)?;

    let native_id = native_id(raw, source)
        .unwrap_or_else(|| format!("{latitude:.5}-{longitude:.5}-{}", timestamp.timestamp()));
    let (scientific_name, common_name) = names(raw, source, taxa);
    let image_url = image_url(raw);
    let thumbnail_url = image_url.as_deref().and_then(thumbnail_url);
    let (location, habitat, notes, observer) = descriptive_fields(raw, source);

    Some(Observation {
        id: format!("{}-{native_id}", source.prefix()),
        scientific_name,
        common_name,
        latitude,
        longitude,
        timestamp,
        source,
        verified: verified(raw, source),
        image_url,
        thumbnail_url,
        location,
        habitat,
        notes,
        observer,
        source_url: source_url(raw, source, &native_id),
        external_id: Some(native_id),
    })
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

type CoordinateParser = fn(&Value) -> Option<(f64, f64)>;

/// Ordered chain of coordinate parsers, first success wins.
const COORDINATE_PARSERS: &[CoordinateParser] =
    &[numeric_fields, packed_lng_lat_string, lng_lat_pair];

/// Returns `(latitude, longitude)` if any known format parses to a usable
/// position. Zero and non-finite coordinates are rejected: upstream encodes
/// "no GPS fix" as `0, 0`.
pub fn coordinates(raw: &Value) -> Option<(f64, f64)> {
    COORDINATE_PARSERS
        .iter()
        .find_map(|parse| parse(raw))
        .filter(|&(lat, lng)| usable_coordinate(lat, lng))
}

fn usable_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && lat != 0.0
        && lng != 0.0
        && lat.abs() <= 90.0
        && lng.abs() <= 180.0
}

/// Direct numeric (or numeric-string) latitude/longitude fields.
fn numeric_fields(raw: &Value) -> Option<(f64, f64)> {
    const FIELD_PAIRS: &[(&str, &str)] = &[
        ("latitude", "longitude"),
        ("lat", "lng"),
        ("lat", "lon"),
        ("decimalLatitude", "decimalLongitude"),
    ];

    FIELD_PAIRS.iter().find_map(|(lat_key, lng_key)| {
        Some((f64_field(raw, lat_key)?, f64_field(raw, lng_key)?))
    })
}

/// A single `"lng lat"` space-separated string.
fn packed_lng_lat_string(raw: &Value) -> Option<(f64, f64)> {
    const STRING_FIELDS: &[&str] = &["coordinates", "location", "position"];

    STRING_FIELDS
        .iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .find_map(|text| {
            let mut parts = text.split_whitespace();
            let lng: f64 = parts.next()?.parse().ok()?;
            let lat: f64 = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            Some((lat, lng))
        })
}

/// A `[lng, lat]` pair, either flat or nested under a GeoJSON geometry.
fn lng_lat_pair(raw: &Value) -> Option<(f64, f64)> {
    let pair = raw
        .get("coordinates")
        .filter(|v| v.is_array())
        .or_else(|| raw.pointer("/geojson/coordinates"))?;

    let pair = pair.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let lng = value_as_f64(&pair[0])?;
    let lat = value_as_f64(&pair[1])?;
    Some((lat, lng))
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

const TIMESTAMP_FIELDS: &[&str] = &[
    "observed_at",
    "time_observed_at",
    "observed_on",
    "eventDate",
    "timestamp",
    "created_at",
];

pub fn timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .find_map(parse_instant)
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    // GBIF event dates may be ranges: keep the start.
    let text = text.split('/').next().unwrap_or(text).trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}

// ---------------------------------------------------------------------------
// Species / common name
// ---------------------------------------------------------------------------

fn names(
    raw: &Value,
    source: Source,
    taxa: Option<&HashMap<String, TaxonName>>,
) -> (String, Option<String>) {
    let resolved = match source {
        Source::Mindex => taxon_cache_names(raw, taxa)
            .or_else(|| inline_taxon_names(raw))
            .or_else(|| flat_names(raw)),
        Source::INaturalist => inat_names(raw),
        Source::Gbif => gbif_names(raw),
    };

    resolved.unwrap_or_else(|| (UNKNOWN_SPECIES.to_string(), None))
}

fn taxon_cache_names(
    raw: &Value,
    taxa: Option<&HashMap<String, TaxonName>>,
) -> Option<(String, Option<String>)> {
    let taxon_id = id_string(raw, "taxon_id")?;
    let entry = taxa?.get(&taxon_id)?;
    Some((entry.canonical_name.clone(), entry.common_name.clone()))
}

fn inline_taxon_names(raw: &Value) -> Option<(String, Option<String>)> {
    let taxon = raw.get("taxon")?;
    let canonical = str_field(taxon, "canonical_name")
        .or_else(|| str_field(taxon, "scientific_name"))
        .or_else(|| str_field(taxon, "name"))?;
    Some((
        canonical.to_string(),
        str_field(taxon, "common_name").map(str::to_string),
    ))
}

fn flat_names(raw: &Value) -> Option<(String, Option<String>)> {
    let scientific = str_field(raw, "scientific_name")?;
    Some((
        scientific.to_string(),
        str_field(raw, "common_name").map(str::to_string),
    ))
}

fn inat_names(raw: &Value) -> Option<(String, Option<String>)> {
    if let Some(taxon) = raw.get("taxon") {
        if let Some(name) = str_field(taxon, "name") {
            return Some((
                name.to_string(),
                str_field(taxon, "preferred_common_name").map(str::to_string),
            ));
        }
    }
    str_field(raw, "species_guess").map(|guess| (guess.to_string(), None))
}

fn gbif_names(raw: &Value) -> Option<(String, Option<String>)> {
    let scientific = str_field(raw, "species").or_else(|| str_field(raw, "scientificName"))?;
    Some((
        scientific.to_string(),
        str_field(raw, "vernacularName").map(str::to_string),
    ))
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn media_url_artifact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"url=([^,}\s]+)").expect("valid literal regex"))
}

/// First usable image URL, trying the known media encodings in order.
pub fn image_url(raw: &Value) -> Option<String> {
    media_object_array(raw)
        .or_else(|| stringified_media_artifact(raw))
        .or_else(|| flat_photo_fields(raw))
}

/// Proper media objects: `media: [{ url: ... }]` (GBIF uses `identifier`).
fn media_object_array(raw: &Value) -> Option<String> {
    raw.get("media")?.as_array()?.iter().find_map(|item| {
        str_field(item, "url")
            .or_else(|| str_field(item, "identifier"))
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    })
}

/// Historical artifact: media objects flattened to strings like
/// `"{type=StillImage, url=https://static.example.org/p/1.jpg}"`.
fn stringified_media_artifact(raw: &Value) -> Option<String> {
    let media = raw.get("media")?;
    let text = media
        .as_str()
        .or_else(|| media.as_array()?.iter().find_map(Value::as_str))?;
    media_url_artifact_regex()
        .captures(text)
        .map(|captures| captures[1].to_string())
}

fn flat_photo_fields(raw: &Value) -> Option<String> {
    raw.pointer("/photos/0/url")
        .and_then(Value::as_str)
        .or_else(|| str_field(raw, "image_url"))
        .map(str::to_string)
}

/// Derives a thumbnail by substituting the size token in the image URL,
/// when one is present.
pub fn thumbnail_url(image_url: &str) -> Option<String> {
    for token in ["original", "large", "medium"] {
        if image_url.contains(token) {
            return Some(image_url.replacen(token, "square", 1));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Remaining fields
// ---------------------------------------------------------------------------

fn native_id(raw: &Value, source: Source) -> Option<String> {
    match source {
        Source::Gbif => id_string(raw, "key").or_else(|| id_string(raw, "id")),
        _ => id_string(raw, "id"),
    }
}

fn verified(raw: &Value, source: Source) -> bool {
    match source {
        Source::Mindex => raw
            .get("verified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        Source::INaturalist => str_field(raw, "quality_grade") == Some("research"),
        // GBIF occurrences carry no quality-review marker we trust.
        Source::Gbif => false,
    }
}

fn source_url(raw: &Value, source: Source, native_id: &str) -> Option<String> {
    match source {
        Source::Mindex => str_field(raw, "source_url")
            .or_else(|| str_field(raw, "url"))
            .map(str::to_string),
        Source::INaturalist => Some(
            str_field(raw, "uri")
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!("https://www.inaturalist.org/observations/{native_id}")
                }),
        ),
        Source::Gbif => Some(format!("https://www.gbif.org/occurrence/{native_id}")),
    }
}

fn descriptive_fields(
    raw: &Value,
    source: Source,
) -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    let owned = |value: Option<&str>| value.map(str::to_string);

    match source {
        Source::Mindex => (
            owned(str_field(raw, "location_name").or_else(|| str_field(raw, "location"))),
            owned(str_field(raw, "habitat")),
            owned(str_field(raw, "notes").or_else(|| str_field(raw, "description"))),
            owned(str_field(raw, "observer")),
        ),
        Source::INaturalist => (
            owned(str_field(raw, "place_guess")),
            None,
            owned(str_field(raw, "description")),
            raw.pointer("/user/login")
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        Source::Gbif => (
            owned(str_field(raw, "locality").or_else(|| str_field(raw, "stateProvince"))),
            owned(str_field(raw, "habitat")),
            None,
            owned(str_field(raw, "recordedBy")),
        ),
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str().filter(|text| !text.is_empty())
}

/// Number, or a string holding a number. Upstream has shipped both.
pub(crate) fn f64_field(value: &Value, key: &str) -> Option<f64> {
    value_as_f64(value.get(key)?)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Identifier field that may be a string or an integer.
pub(crate) fn id_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
