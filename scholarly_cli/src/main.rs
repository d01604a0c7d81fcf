use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

const DEFAULT_FILTER: &str = "scholarly_cli=info,scholarly_core=warn";
const VERBOSE_FILTER: &str = "scholarly_cli=debug,scholarly_core=debug";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let fallback = if cli.verbose > 0 {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Search {
            query,
            databases,
            max_results,
            from,
            to,
            access,
            category,
        } => {
            search::run(
                &cli,
                search::SearchArgs {
                    query,
                    databases,
                    max_results: *max_results,
                    from: *from,
                    to: *to,
                    access: *access,
                    category,
                },
            )
            .await
        }
        Commands::Ask {
            question,
            history,
            no_clarify,
            events,
            top_k,
            max_results,
            databases,
            access,
            sse,
        } => {
            ask::run(
                &cli,
                ask::AskArgs {
                    question,
                    history,
                    no_clarify: *no_clarify,
                    events: *events,
                    top_k: *top_k,
                    max_results: *max_results,
                    databases,
                    access: *access,
                    sse: *sse,
                },
            )
            .await
        }
        Commands::Status => status::run(&cli).await,
        Commands::Databases => databases::run(&cli).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}
