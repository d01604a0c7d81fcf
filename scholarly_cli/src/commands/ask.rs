use crate::cli::{AccessArg, Cli, OutputFormat};
use crate::commands::{load_settings, spinner, CommandError, Result};
use crate::output::pretty;
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use scholarly_core::llm::{ChatMessage, ChatRole};
use scholarly_core::pipeline::Outcome;
use scholarly_core::{PipelineEvent, ResearchPipeline, ResearchRequest};
use std::io::Write;

pub struct AskArgs<'a> {
    pub question: &'a str,
    pub history: &'a [String],
    pub no_clarify: bool,
    pub events: bool,
    pub top_k: Option<usize>,
    pub max_results: Option<u32>,
    pub databases: &'a [String],
    pub access: Option<AccessArg>,
    pub sse: bool,
}

/// Parse a `role:content` history entry.
fn parse_turn(raw: &str) -> Result<ChatMessage> {
    let (role, content) = raw.split_once(':').ok_or_else(|| {
        CommandError::InvalidInput(format!(
            "history entry '{}' must look like role:content",
            raw
        ))
    })?;
    let role = match role.trim().to_ascii_lowercase().as_str() {
        "user" => ChatRole::User,
        "assistant" => ChatRole::Assistant,
        "system" => ChatRole::System,
        other => {
            return Err(CommandError::InvalidInput(format!(
                "unknown history role '{}', expected user, assistant or system",
                other
            )))
        }
    };
    Ok(ChatMessage {
        role,
        content: content.trim().to_string(),
    })
}

fn build_request(args: &AskArgs<'_>) -> Result<ResearchRequest> {
    let history = args
        .history
        .iter()
        .map(|raw| parse_turn(raw))
        .collect::<Result<Vec<_>>>()?;

    let mut request = ResearchRequest::new(args.question)
        .with_history(history)
        .with_access_filter(args.access.map(Into::into))
        .with_stream_events(args.events)
        .with_clarify_first_turn(!args.no_clarify);
    if !args.databases.is_empty() {
        request = request.with_databases(args.databases.to_vec());
    }
    if let Some(k) = args.top_k {
        request = request.with_top_k(k);
    }
    if let Some(n) = args.max_results {
        request = request.with_max_results(n);
    }
    request.validate()?;
    Ok(request)
}

pub async fn run(cli: &Cli, args: AskArgs<'_>) -> Result<()> {
    let request = build_request(&args)?;
    let settings = load_settings(cli)?;
    let pipeline = ResearchPipeline::from_settings(&settings)?;

    let mut rx = pipeline.run(request);
    let mut printer = EventPrinter::new(cli.output, args.sse);
    while let Some(event) = rx.recv().await {
        printer.print(&event)?;
    }
    printer.finish()
}

/// Renders pipeline events as they arrive.
struct EventPrinter {
    format: OutputFormat,
    sse: bool,
    progress: Option<ProgressBar>,
    answer_started: bool,
    failure: Option<String>,
}

impl EventPrinter {
    fn new(format: OutputFormat, sse: bool) -> Self {
        let progress = (format == OutputFormat::Pretty && !sse).then(|| spinner("Thinking..."));
        Self {
            format,
            sse,
            progress,
            answer_started: false,
            failure: None,
        }
    }

    fn clear_progress(&mut self) {
        if let Some(progress) = self.progress.take() {
            progress.finish_and_clear();
        }
    }

    fn print(&mut self, event: &PipelineEvent) -> Result<()> {
        match event {
            PipelineEvent::Error { message, .. } => self.failure = Some(message.clone()),
            PipelineEvent::Complete {
                outcome: Outcome::Errored,
                ..
            } if self.failure.is_none() => {
                self.failure = Some("run ended with an error".to_string());
            }
            _ => {}
        }

        let mut stdout = std::io::stdout();
        if self.sse {
            write!(stdout, "{}", event.to_sse_frame()?)?;
            stdout.flush()?;
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                writeln!(stdout, "{}", serde_json::to_string(event)?)?;
            }
            OutputFormat::Text => match event {
                PipelineEvent::ResponseChunk { content } => write!(stdout, "{}", content)?,
                PipelineEvent::Error { message, .. } => eprintln!("Error: {}", message),
                PipelineEvent::Complete { .. } => writeln!(stdout)?,
                _ => {}
            },
            OutputFormat::Pretty => self.print_pretty(event, &mut stdout)?,
        }
        stdout.flush()?;
        Ok(())
    }

    fn print_pretty(&mut self, event: &PipelineEvent, out: &mut impl Write) -> Result<()> {
        match event {
            PipelineEvent::Status { message, .. } => {
                if let Some(progress) = &self.progress {
                    progress.set_message(message.clone());
                }
            }
            PipelineEvent::Queries { queries } => {
                self.clear_progress();
                writeln!(out, "{}", "Search queries".bold().cyan())?;
                for q in queries {
                    writeln!(out, "  {} {}", q.query, format!("({})", q.focus).dimmed())?;
                }
                writeln!(out)?;
                self.progress = Some(spinner("Searching..."));
            }
            PipelineEvent::Documents { documents } => {
                self.clear_progress();
                write!(out, "{}", pretty::format_documents(documents))?;
                self.progress = Some(spinner("Generating response..."));
            }
            PipelineEvent::ResponseChunk { content } => {
                if !self.answer_started {
                    self.clear_progress();
                    self.answer_started = true;
                }
                write!(out, "{}", content)?;
            }
            PipelineEvent::Error { message, stage } => {
                self.clear_progress();
                let stage = stage.map(|s| format!(" during {}", s)).unwrap_or_default();
                eprintln!("{}{} {}", "Error".red().bold(), stage, message);
            }
            PipelineEvent::Complete {
                processing_time_ms,
                total_documents,
                ..
            } => {
                self.clear_progress();
                writeln!(out)?;
                writeln!(out)?;
                writeln!(
                    out,
                    "{}",
                    format!(
                        "{} documents, {:.1}s",
                        total_documents,
                        *processing_time_ms as f64 / 1000.0
                    )
                    .dimmed()
                )?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.clear_progress();
        match self.failure {
            Some(message) => Err(CommandError::RunFailed(message)),
            None => Ok(()),
        }
    }
}
