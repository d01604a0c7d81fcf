use crate::cli::{AccessArg, Cli, OutputFormat};
use crate::commands::{create_search, load_settings, spinner, CommandError, Result};
use crate::output::{format_output, pretty, OutputData};
use owo_colors::OwoColorize;
use scholarly_core::federated::{DateRange, SearchQuery};
use serde_json::json;

pub struct SearchArgs<'a> {
    pub query: &'a str,
    pub databases: &'a [String],
    pub max_results: u32,
    pub from: Option<i32>,
    pub to: Option<i32>,
    pub access: Option<AccessArg>,
    pub category: &'a [String],
}

fn build_query(args: &SearchArgs<'_>) -> Result<SearchQuery> {
    let mut query = SearchQuery::new(args.query)
        .with_max_results(args.max_results)
        .with_access_filter(args.access.map(Into::into));
    if !args.databases.is_empty() {
        query = query.with_databases(args.databases.iter().cloned());
    }
    if args.from.is_some() || args.to.is_some() {
        if let (Some(from), Some(to)) = (args.from, args.to) {
            if from > to {
                return Err(CommandError::InvalidInput(format!(
                    "--from {} is after --to {}",
                    from, to
                )));
            }
        }
        query = query.with_date_range(DateRange::new(args.from, args.to));
    }
    if !args.category.is_empty() {
        query = query.with_filter("categories", json!(args.category));
    }
    query.validate().map_err(CommandError::InvalidInput)?;
    Ok(query)
}

pub async fn run(cli: &Cli, args: SearchArgs<'_>) -> Result<()> {
    let query = build_query(&args)?;
    let settings = load_settings(cli)?;
    let search = create_search(&settings)?;

    let progress = (cli.output == OutputFormat::Pretty).then(|| {
        let targets = search.resolve_databases(&query);
        spinner(format!(
            "Searching {} for '{}'...",
            targets.join(", "),
            query.query
        ))
    });
    let response = search.search(&query).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    match cli.output {
        OutputFormat::Pretty => {
            print!("{}", pretty::format_response(&response));
            for failure in &response.failed_databases {
                let kind = if failure.is_timeout {
                    "timed out"
                } else {
                    "failed"
                };
                eprintln!(
                    "{} {} {}: {}",
                    "Warning:".yellow().bold(),
                    failure.database,
                    kind,
                    failure.reason.dimmed()
                );
            }
        }
        _ => format_output(&OutputData::SearchResponse(response), &cli.output)?,
    }
    Ok(())
}
