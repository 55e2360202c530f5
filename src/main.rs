// SYNOID Narrator Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use synoid_narrator::narration::llm_client::ChatCompletionClient;
use synoid_narrator::narration::queue::NarrationQueue;
use synoid_narrator::narration::{plan_narration, NarrationConfig, NarrationOptions, NarrationPipeline};
use synoid_narrator::server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synoid-narrator")]
#[command(about = "SYNOID Audio-Description Narrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build narration intervals and word budgets (no network)
    Plan {
        /// Content-analysis JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Narration language (e.g. en-US, ar-EG)
        #[arg(short, long)]
        language: Option<String>,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the full pipeline against the configured rewrite endpoint
    Narrate {
        /// Content-analysis JSON
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        language: Option<String>,

        /// Narration style hint (e.g. "calm documentary")
        #[arg(short, long, default_value = "")]
        style: String,

        /// Video title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Free-form background about the video
        #[arg(short, long, default_value = "")]
        context: String,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit `{startTime, endTime, description}` segments only
        #[arg(long)]
        legacy_format: bool,
    },

    /// Start the narration job API
    Serve {
        /// Port to run the server on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn read_analysis(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading analysis file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing analysis file {}", path.display()))
}

fn write_output(output: Option<&Path>, value: &impl serde::Serialize) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serializing output")?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!("Output saved to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("--- SYNOID NARRATOR v{} ---", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = NarrationConfig::load().context("loading narration config")?;

    match cli.command {
        Commands::Plan {
            input,
            language,
            output,
        } => {
            let analysis = read_analysis(&input)?;
            let language = language.unwrap_or_else(|| config.default_language.clone());
            let plan = plan_narration(&analysis, &language, &config)?;
            info!(
                "Planned {} intervals from {} shots ({} dropped attachments)",
                plan.intervals.len(),
                plan.shot_count,
                plan.dropped_attachments
            );
            write_output(output.as_deref(), &plan)?;
        }

        Commands::Narrate {
            input,
            language,
            style,
            title,
            context,
            output,
            legacy_format,
        } => {
            let analysis = read_analysis(&input)?;
            let client = ChatCompletionClient::new(config.endpoint.clone())?;
            info!("Rewrite endpoint: {}", client.config().endpoint());

            let pipeline = NarrationPipeline::new(config, Arc::new(client))
                .with_progress(Arc::new(|msg: &str| info!("[PROGRESS] {}", msg)));
            let options = NarrationOptions {
                language,
                narration_style: style,
                title,
                context,
            };

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, abandoning the current interval");
                    ctrl_c.cancel();
                }
            });

            let result = pipeline.run(&analysis, &options, &cancel, None).await?;
            info!(
                "Done: {} accepted, {} over/under budget, {} skipped",
                result.report.accepted, result.report.exhausted, result.report.skipped
            );

            if legacy_format {
                write_output(output.as_deref(), &result.legacy_segments())?;
            } else {
                write_output(output.as_deref(), &result)?;
            }
        }

        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server_port);
            let client = ChatCompletionClient::new(config.endpoint.clone())?;
            let queue = NarrationQueue::new(config, Arc::new(client));
            server::start_server(port, queue)
                .await
                .context("running narration API server")?;
        }
    }

    Ok(())
}
