//! Field-level helpers shared by every connector's normalizer.

use super::Author;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Collapse whitespace runs and decode HTML entities.
pub fn clean_text(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned text, or `None` when nothing is left.
pub fn clean_optional(text: Option<&str>) -> Option<String> {
    text.map(clean_text).filter(|t| !t.is_empty())
}

/// Strip resolver prefixes from a DOI.
pub fn clean_doi(doi: &str) -> Option<String> {
    let mut doi = doi.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest;
            break;
        }
    }
    if doi
        .get(..4)
        .is_some_and(|p| p.eq_ignore_ascii_case("doi:"))
    {
        doi = &doi[4..];
    }
    let doi = doi.trim();
    if doi.is_empty() {
        None
    } else {
        Some(doi.to_string())
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%B %d, %Y"];

/// Parse the date shapes academic providers emit, falling back to a leading year.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    raw.get(..4)
        .and_then(|prefix| prefix.parse::<i32>().ok())
        .and_then(year_start)
}

/// January 1st of a plausible publication year.
pub fn year_start(year: i32) -> Option<DateTime<Utc>> {
    if !(1000..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Authors from a list of names, a list of objects, or a comma-separated string.
pub fn extract_authors(value: &Value) -> Vec<Author> {
    match value {
        Value::Array(items) => items.iter().filter_map(author_from_value).collect(),
        Value::String(s) => s
            .split(',')
            .map(clean_text)
            .filter(|name| !name.is_empty())
            .map(Author::new)
            .collect(),
        _ => Vec::new(),
    }
}

fn author_from_value(value: &Value) -> Option<Author> {
    match value {
        Value::String(name) => {
            let name = clean_text(name);
            (!name.is_empty()).then(|| Author::new(name))
        }
        Value::Object(obj) => {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .map(clean_text)
                .filter(|n| !n.is_empty())?;
            let affiliation = obj
                .get("affiliation")
                .and_then(Value::as_str)
                .and_then(|a| clean_optional(Some(a)));
            let identifier = ["authorId", "id", "orcid"]
                .iter()
                .find_map(|key| obj.get(*key))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            Some(
                Author::new(name)
                    .with_affiliation(affiliation)
                    .with_identifier(identifier),
            )
        }
        _ => None,
    }
}
