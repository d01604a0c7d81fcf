use crate::cli::{Cli, OutputFormat};
use crate::commands::{create_search, load_settings, spinner, Result};
use crate::output::{format_output, OutputData};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Table};
use owo_colors::OwoColorize;

pub async fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let search = create_search(&settings)?;

    let progress = (cli.output == OutputFormat::Pretty).then(|| spinner("Probing databases..."));
    let statuses = search.database_status().await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    if cli.output != OutputFormat::Pretty {
        return format_output(&OutputData::DatabaseStatus(statuses), &cli.output);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Database", "Status", "Latency", "Last error"]);

    for status in &statuses {
        let label = if status.is_available {
            "available"
        } else {
            "unavailable"
        };
        let cells = vec![
            Cell::new(&status.name),
            Cell::new(label),
            Cell::new(
                status
                    .response_time_ms
                    .map(|ms| format!("{} ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(status.last_error.as_deref().unwrap_or("")),
        ];
        table.add_row(cells);
    }

    let available = statuses.iter().filter(|s| s.is_available).count();
    println!();
    println!("{}", table);
    println!();
    println!(
        "  {} of {} databases available",
        available.to_string().green().bold(),
        statuses.len()
    );
    Ok(())
}
