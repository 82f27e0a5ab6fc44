use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::cli::ConversationMode;
use crate::config::Config;
use crate::conversation::{self, Transcript, Turn};
use crate::model::SamplingParams;
use crate::output::{CsvSink, PromptRecord, ReorderBuffer};
use crate::providers::openai;

/// Everything a worker needs to answer one prompt, built once at startup
/// and shared immutably for the whole run.
#[derive(Debug)]
pub struct RunContext {
    pub client: Client,
    pub config: Config,
    pub params: SamplingParams,
    pub guideline: String,
    pub mode: ConversationMode,
    pub max_workers: usize,
    pub delay_secs: u64,
}

impl RunContext {
    /// Issues one request for the given history. A remote failure is logged
    /// and reported as an empty response set; one bad prompt never aborts
    /// the batch.
    async fn request_responses(&self, history: &[Turn]) -> Vec<String> {
        let messages = conversation::build_messages(&self.guideline, history);
        match openai::complete(&self.client, &self.config, &self.params, &messages).await {
            Ok(responses) => responses,
            Err(err) => {
                warn!(error = %err, "prompt failed; no responses recorded");
                Vec::new()
            }
        }
    }
}

pub struct Batch {
    ctx: Arc<RunContext>,
    sink: Arc<CsvSink>,
}

impl Batch {
    pub fn new(ctx: RunContext, sink: CsvSink) -> Self {
        Self {
            ctx: Arc::new(ctx),
            sink: Arc::new(sink),
        }
    }

    /// Burns one tiny request before the batch so credential and endpoint
    /// problems surface before any prompt is consumed.
    pub async fn preflight(&self) -> Result<()> {
        let probe = vec![Turn::pending("Hello!")];
        let messages = conversation::build_messages(&self.ctx.guideline, &probe);
        openai::complete(&self.ctx.client, &self.ctx.config, &self.ctx.params, &messages)
            .await
            .context("Connectivity probe against the chat API failed")?;
        info!("chat API connectivity verified");
        Ok(())
    }

    pub async fn run(&self, prompts: Vec<String>) -> Result<()> {
        match self.ctx.mode {
            ConversationMode::On => self.run_sequential(prompts).await,
            ConversationMode::Off => self.run_concurrent(prompts).await,
        }
    }

    /// Conversation mode "on": one growing transcript, strictly in input
    /// order, each record written as soon as it completes.
    async fn run_sequential(&self, prompts: Vec<String>) -> Result<()> {
        let total = prompts.len();
        let mut transcript = Transcript::new(ConversationMode::On);

        for (position, prompt) in prompts.into_iter().enumerate() {
            let index = position + 1;
            transcript.add_prompt(&prompt);
            let responses = self.ctx.request_responses(&transcript.snapshot()).await;
            for response in &responses {
                transcript.record_response(response);
            }

            let record = PromptRecord {
                index,
                prompt,
                responses,
            };
            self.sink.append(&record).await?;
            info!(index, completed = index, total, "prompt written");
        }

        info!(total, "sequential batch complete");
        Ok(())
    }

    /// Conversation mode "off": one worker per prompt behind a counting
    /// admission limiter, with a writer task draining completions into the
    /// sink in input order.
    async fn run_concurrent(&self, prompts: Vec<String>) -> Result<()> {
        let total = prompts.len();
        let (tx, rx) = mpsc::channel::<PromptRecord>(self.ctx.max_workers.max(1));
        let writer = tokio::spawn(drain_to_sink(rx, Arc::clone(&self.sink), total));

        let limiter = Arc::new(Semaphore::new(self.ctx.max_workers.max(1)));
        let mut workers = Vec::with_capacity(total);
        for (position, prompt) in prompts.into_iter().enumerate() {
            let index = position + 1;
            let ctx = Arc::clone(&self.ctx);
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();

            workers.push(tokio::spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .context("admission limiter closed unexpectedly")?;
                if ctx.delay_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(ctx.delay_secs)).await;
                }

                debug!(index, "worker admitted");
                let record = answer_prompt(&ctx, index, prompt).await;
                tx.send(record)
                    .await
                    .map_err(|_| anyhow!("ordered writer stopped before accepting all records"))?;
                Ok::<(), anyhow::Error>(())
            }));
        }
        // The writer drains until every sender is gone; this handle is the
        // last one outside the workers.
        drop(tx);

        for worker in workers {
            worker.await.context("worker task panicked")??;
        }
        let flushed = writer.await.context("writer task panicked")??;

        info!(flushed, total, "concurrent batch complete");
        Ok(())
    }
}

/// Answers a single prompt through its own ephemeral transcript.
async fn answer_prompt(ctx: &RunContext, index: usize, prompt: String) -> PromptRecord {
    let mut transcript = Transcript::new(ConversationMode::Off);
    transcript.add_prompt(&prompt);
    let responses = ctx.request_responses(&transcript.snapshot()).await;
    for response in &responses {
        transcript.record_response(response);
    }

    PromptRecord {
        index,
        prompt,
        responses,
    }
}

/// Writer loop: buffers out-of-order completions and appends them to the
/// sink strictly in index order. Returns once the channel is closed and
/// fully drained; the flushed count comes back for the completion log.
pub async fn drain_to_sink(
    mut rx: mpsc::Receiver<PromptRecord>,
    sink: Arc<CsvSink>,
    total: usize,
) -> Result<usize> {
    let mut buffer = ReorderBuffer::new();
    let mut flushed = 0;

    while let Some(record) = rx.recv().await {
        for ready in buffer.push(record) {
            let index = ready.index;
            sink.append(&ready).await?;
            flushed += 1;
            info!(index, completed = flushed, total, "prompt written");
        }
    }

    debug!(flushed, held_back = buffer.pending_len(), "writer drained");
    Ok(flushed)
}
