//! Card-style rendering of papers and retrieved documents.

use super::{terminal_width, truncate_text};
use owo_colors::OwoColorize;
use scholarly_core::federated::{AccessType, FederatedSearchResponse, SearchResult};
use scholarly_core::store::SentDocument;
use std::fmt::Write;

/// Indent for card content (after number)
const CARD_INDENT: usize = 5;

/// Snippet lines shown per card
const SNIPPET_LINES: usize = 2;

fn access_badge(access: AccessType) -> String {
    match access {
        AccessType::Open => "open".green().to_string(),
        AccessType::Restricted => "restricted".yellow().to_string(),
    }
}

fn snippet(text: &str, width: usize) -> Vec<String> {
    let width = width.saturating_sub(CARD_INDENT).max(20);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > width {
            lines.push(std::mem::take(&mut current));
            if lines.len() == SNIPPET_LINES {
                if let Some(last) = lines.last_mut() {
                    *last = truncate_text(&format!("{} {}", last, word), width);
                }
                return lines;
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn author_line(result: &SearchResult) -> String {
    let names: Vec<&str> = result.authors.iter().map(|a| a.name.as_str()).collect();
    match names.len() {
        0 => "Unknown authors".to_string(),
        1..=3 => names.join(", "),
        _ => format!("{} et al.", names[..3].join(", ")),
    }
}

/// Render a federated search response.
pub fn format_response(response: &FederatedSearchResponse) -> String {
    let width = terminal_width();
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} {}",
        "Results for".bold().cyan(),
        format!("'{}'", response.query).bold()
    );
    let _ = writeln!(out);

    if response.results.is_empty() {
        let _ = writeln!(out, "  {}", "No results found".yellow());
    }

    for (i, result) in response.results.iter().enumerate() {
        let year = result
            .year()
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n.d.".to_string());
        let _ = writeln!(
            out,
            "{:>3}. {}",
            (i + 1).to_string().dimmed(),
            truncate_text(&result.title, width.saturating_sub(CARD_INDENT)).bold()
        );
        let _ = writeln!(
            out,
            "{:indent$}{} · {} · {} · {}",
            "",
            truncate_text(&author_line(result), 50).dimmed(),
            year.dimmed(),
            result.source_database.dimmed(),
            access_badge(result.access()),
            indent = CARD_INDENT
        );
        if let Some(abstract_text) = &result.abstract_text {
            for line in snippet(abstract_text, width) {
                let _ = writeln!(out, "{:indent$}{}", "", line, indent = CARD_INDENT);
            }
        }
        if let Some(url) = &result.url {
            let _ = writeln!(out, "{:indent$}{}", "", url.blue(), indent = CARD_INDENT);
        }
        let _ = writeln!(out);
    }

    let stats = &response.stats;
    let per_db: Vec<String> = stats
        .results_per_database
        .iter()
        .map(|(db, n)| format!("{} {}", db, n))
        .collect();
    let _ = writeln!(
        out,
        "{}",
        format!(
            "{} results ({} duplicates removed) in {} ms · {}",
            stats.total_results,
            stats.duplicates_removed,
            stats.search_time_ms,
            per_db.join(", ")
        )
        .dimmed()
    );
    out
}

/// Render the documents an answer will be grounded on.
pub fn format_documents(documents: &[SentDocument]) -> String {
    let width = terminal_width();
    let mut out = String::new();

    let _ = writeln!(out, "{}", "Sources".bold().cyan());
    for (i, doc) in documents.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {} {}",
            (i + 1).to_string().dimmed(),
            truncate_text(&doc.title, width.saturating_sub(CARD_INDENT + 8)).bold(),
            format!("{:.2}", doc.score).dimmed()
        );
        let _ = writeln!(
            out,
            "{:indent$}{} · {} · {}",
            "",
            truncate_text(&doc.authors, 50).dimmed(),
            doc.year.dimmed(),
            access_badge(doc.access),
            indent = CARD_INDENT
        );
        if !doc.url.is_empty() {
            let _ = writeln!(out, "{:indent$}{}", "", doc.url.blue(), indent = CARD_INDENT);
        }
    }
    let _ = writeln!(out);
    out
}
