pub mod cli;
pub mod config;
pub mod conversation;
pub mod inputs;
pub mod logging;
pub mod model;
pub mod output;
pub mod providers;
pub mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

use cli::Cli;
use config::Config;
use model::SamplingParams;
use output::CsvSink;
use runner::{Batch, RunContext};

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    let temperature = config::clamp_temperature(cli.temperature);
    info!(
        model = %cli.model,
        mode = cli.conversation_mode.as_str(),
        choices = cli.choices,
        temperature,
        "loaded runtime configuration"
    );

    let batch_inputs = inputs::load(&cli.prompts_file, &cli.guidelines_file).await?;
    let output_path = output::unique_output_path(&cli.output_file);
    let sink = CsvSink::new(output_path.clone());
    sink.initialize().await?;

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;

    let ctx = RunContext {
        client,
        config: cfg,
        params: SamplingParams {
            model: cli.model,
            max_tokens: cli.max_tokens,
            choices: cli.choices,
            stop: cli.stop,
            temperature,
        },
        guideline: batch_inputs.guideline,
        mode: cli.conversation_mode,
        max_workers: cli.max_threads,
        delay_secs: cli.delay,
    };

    let batch = Batch::new(ctx, sink);
    batch.preflight().await?;
    println!("connected to chat API; processing {} prompts", batch_inputs.prompts.len());

    batch.run(batch_inputs.prompts).await?;
    println!("batch complete; output written to '{}'", output_path.display());
    Ok(())
}
