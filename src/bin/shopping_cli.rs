use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shopcrawl::{AnswerKind, Pipeline, PipelineArgs};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "shopcrawl-cli",
    about = "Answer one shopping question from catalog and web search"
)]
struct ShopCli {
    /// Shopping question to answer
    #[arg(long)]
    query: String,

    /// Print the whole pipeline state as JSON instead of the answer text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Also print the per-stage debug log
    #[arg(long, default_value_t = false)]
    show_log: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopcrawl=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = ShopCli::parse();
    let pipeline = Pipeline::new(
        cli.pipeline.build_classifier()?,
        Arc::new(cli.pipeline.build_capabilities()?),
    )
    .with_controls(cli.pipeline.build_controls());

    // Ctrl-C abandons the query instead of waiting on slow capabilities.
    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let state = tokio::select! {
        _ = token.cancelled() => {
            eprintln!("cancelled.");
            return Ok(());
        }
        state = pipeline.run_state(&cli.query) => state,
    };

    if cli.json {
        let rendered =
            serde_json::to_string_pretty(&state).context("failed to serialize pipeline state")?;
        println!("{rendered}");
        return Ok(());
    }

    if cli.show_log {
        println!("--- Debug Log ---");
        for line in state.debug_log() {
            println!("{line}");
        }
        println!();
    }
    let Some(answer) = state.final_answer() else {
        println!("No answer produced.");
        return Ok(());
    };
    println!("--- Answer ---\n{}\n", answer.text);
    println!("--- Speech ---\n{}", answer.speech_text);
    if answer.kind == AnswerKind::Answered && !state.failed_capabilities().is_empty() {
        let failed: Vec<_> = state
            .failed_capabilities()
            .iter()
            .map(|tool| tool.as_str())
            .collect();
        eprintln!("note: partial results; failed capabilities: {}", failed.join(", "));
    }
    Ok(())
}
