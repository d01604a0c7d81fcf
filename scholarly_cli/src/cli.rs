use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scholarly")]
#[command(about = "Scholarly - federated academic search and cited research answers")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  scholarly databases                          List the configured databases
  scholarly status                             Check which databases respond
  scholarly search \"graph neural networks\"     Search every default database
  scholarly ask \"How is RAG evaluated?\"        Research a question with citations

\x1b[1;36mConfiguration:\x1b[0m
  ~/.config/scholarly/config.toml              Default config file
  MISTRAL_API_KEY, COHERE_API_KEY              Model provider keys
  SEARXNG_BASE_URL, QDRANT_URL                 Service endpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a config file (defaults to ~/.config/scholarly/config.toml)
    #[arg(long, global = true, env = "SCHOLARLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search academic databases in parallel
    ///
    /// Results from every selected database are merged, deduplicated and
    /// sorted newest first. Databases that fail or time out are reported but
    /// never fail the search.
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  scholarly search \"protein folding\"
  scholarly search \"attention\" --databases arxiv,semantic_scholar --max-results 10
  scholarly search \"crispr\" --from 2020 --to 2024 --access open
  scholarly search \"transformers\" --databases arxiv --category cs.CL")]
    Search {
        /// The search query
        query: String,
        /// Comma-separated databases to query (defaults to the configured set)
        #[arg(short, long, value_delimiter = ',')]
        databases: Vec<String>,
        /// Maximum results per database
        #[arg(short = 'n', long, default_value_t = 20)]
        max_results: u32,
        /// Earliest publication year
        #[arg(long)]
        from: Option<i32>,
        /// Latest publication year
        #[arg(long)]
        to: Option<i32>,
        /// Keep only open or restricted documents
        #[arg(long, value_enum)]
        access: Option<AccessArg>,
        /// Subject category filter (arXiv categories such as cs.CL)
        #[arg(long, value_delimiter = ',')]
        category: Vec<String>,
    },

    /// Answer a research question from retrieved papers
    ///
    /// Runs the full pipeline: query generation, federated search, indexing,
    /// retrieval, reranking and a streamed answer. On the first turn the
    /// assistant asks a clarifying question instead, unless --no-clarify is set.
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  scholarly ask \"How is retrieval augmented generation evaluated?\"
  scholarly ask \"Focus on faithfulness metrics\" \\
      --history \"user:How is RAG evaluated?\" \\
      --history \"assistant:Which aspect interests you?\"
  scholarly ask \"Sparse vs dense retrieval\" --no-clarify --events
  scholarly ask \"CRISPR delivery\" --no-clarify --access open --sse")]
    Ask {
        /// The question to research
        question: String,
        /// Earlier conversation turns as role:content (user, assistant or system)
        #[arg(long = "history", value_name = "ROLE:CONTENT")]
        history: Vec<String>,
        /// Skip the clarifying question on the first turn
        #[arg(long)]
        no_clarify: bool,
        /// Show progress, generated queries and retrieved documents
        #[arg(long)]
        events: bool,
        /// Number of chunks to retrieve for the answer
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Per-database candidates fetched for each generated query
        #[arg(short = 'n', long)]
        max_results: Option<u32>,
        /// Comma-separated databases to query
        #[arg(short, long, value_delimiter = ',')]
        databases: Vec<String>,
        /// Retrieve only open or restricted documents
        #[arg(long, value_enum)]
        access: Option<AccessArg>,
        /// Print raw server-sent event frames
        #[arg(long)]
        sse: bool,
    },

    /// Probe every configured database and report availability
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  scholarly status
  scholarly status --output json")]
    Status,

    /// List the databases compiled in and enabled by configuration
    #[command(alias = "ls")]
    Databases,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Pretty,
    /// JSON output
    Json,
    /// Plain text output
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AccessArg {
    Open,
    Restricted,
}

impl From<AccessArg> for scholarly_core::federated::AccessType {
    fn from(arg: AccessArg) -> Self {
        match arg {
            AccessArg::Open => Self::Open,
            AccessArg::Restricted => Self::Restricted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_flags() {
        let cli = Cli::try_parse_from([
            "scholarly",
            "search",
            "attention",
            "--databases",
            "arxiv,semantic_scholar",
            "--from",
            "2020",
            "--access",
            "open",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                databases,
                from,
                access,
                max_results,
                ..
            } => {
                assert_eq!(databases, vec!["arxiv", "semantic_scholar"]);
                assert_eq!(from, Some(2020));
                assert_eq!(access, Some(AccessArg::Open));
                assert_eq!(max_results, 20);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn parses_repeated_history() {
        let cli = Cli::try_parse_from([
            "scholarly",
            "ask",
            "follow up",
            "--history",
            "user:first",
            "--history",
            "assistant:reply",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Ask { history, .. } => assert_eq!(history.len(), 2),
            _ => panic!("expected ask"),
        }
    }
}
