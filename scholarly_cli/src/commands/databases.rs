use crate::cli::{Cli, OutputFormat};
use crate::commands::{create_search, load_settings, Result};
use crate::output::{format_output, terminal_width, truncate_text, OutputData};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use owo_colors::OwoColorize;

pub async fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let search = create_search(&settings)?;
    let databases = search.available_databases();

    let output_data = OutputData::DatabaseList(databases.clone());
    match cli.output {
        OutputFormat::Pretty => {
            let desc_width = terminal_width().saturating_sub(30);

            println!();
            println!("{}", "Available Databases".bold().cyan());
            println!();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Name", "Default", "Description"]);

            for db in &databases {
                let default = if settings.search.default_databases.contains(&db.name) {
                    "yes"
                } else {
                    ""
                };
                table.add_row(vec![
                    db.name.clone(),
                    default.to_string(),
                    truncate_text(&db.description, desc_width.max(30)),
                ]);
            }

            println!("{}", table);
            println!();
            println!(
                "{} Use {} to check which databases respond",
                "Tip:".green().bold(),
                "scholarly status".cyan()
            );
        }
        _ => format_output(&output_data, &cli.output)?,
    }
    Ok(())
}
