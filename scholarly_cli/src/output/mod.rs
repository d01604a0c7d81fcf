use crate::cli::OutputFormat;
use crate::commands::Result;
use scholarly_core::federated::{DatabaseInfo, DatabaseStatus, FederatedSearchResponse};
use serde::Serialize;

pub mod pretty;

/// Terminal width for formatting (default fallback)
const DEFAULT_WIDTH: usize = 80;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OutputData {
    DatabaseList(Vec<DatabaseInfo>),
    DatabaseStatus(Vec<DatabaseStatus>),
    SearchResponse(FederatedSearchResponse),
}

pub fn format_output(data: &OutputData, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Text => format_text_output(data),
        OutputFormat::Pretty => format_pretty_output(data),
    }
    Ok(())
}

fn format_text_output(data: &OutputData) {
    match data {
        OutputData::DatabaseList(databases) => {
            for db in databases {
                println!("{}: {}", db.name, db.description);
            }
        }
        OutputData::DatabaseStatus(statuses) => {
            for status in statuses {
                let state = if status.is_available { "up" } else { "down" };
                match &status.last_error {
                    Some(err) => println!("{}: {} ({})", status.name, state, err),
                    None => println!("{}: {}", status.name, state),
                }
            }
        }
        OutputData::SearchResponse(response) => {
            println!("Search results for '{}':", response.query);
            for (i, result) in response.results.iter().enumerate() {
                let year = result
                    .year()
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "n.d.".to_string());
                println!(
                    "{}. {} ({}) [{}, {}]",
                    i + 1,
                    result.title,
                    year,
                    result.source_database,
                    result.access()
                );
                if let Some(url) = &result.url {
                    println!("   {}", url);
                }
            }
        }
    }
}

fn format_pretty_output(data: &OutputData) {
    match data {
        OutputData::SearchResponse(response) => print!("{}", pretty::format_response(response)),
        other => format_text_output(other),
    }
}

pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Truncate to `max_width` characters, adding "..." if truncated.
pub fn truncate_text(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        text.to_string()
    } else if max_width > 3 {
        let kept: String = text.chars().take(max_width - 3).collect();
        format!("{}...", kept)
    } else {
        text.chars().take(max_width).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("Schrödinger equations", 10), "Schrödi...");
        assert_eq!(truncate_text("abcdef", 2), "ab");
    }

    #[test]
    fn json_output_is_tagged() {
        let data = OutputData::DatabaseList(vec![DatabaseInfo {
            name: "arxiv".into(),
            description: "preprints".into(),
        }]);
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["type"], "DatabaseList");
        assert_eq!(value["data"][0]["name"], "arxiv");
    }
}
