use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_CHOICES: u32 = 1;
pub const DEFAULT_MAX_THREADS: usize = 5;
pub const DEFAULT_DELAY_SECS: u64 = 0;
pub const DEFAULT_OUTPUT_FILE: &str = "output.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConversationMode {
    /// Carry the full dialogue forward across prompts (strictly sequential)
    On,
    /// Answer every prompt independently (bounded concurrent fan-out)
    Off,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    version,
    about = "Batch chat client: fires a file of prompts at a chat-completion API \
             and collects the answers into an ordered CSV"
)]
pub struct Cli {
    /// Name of the chat model to query (example: gpt-4)
    #[arg(long)]
    pub model: String,

    /// File containing prompts, one per line; blank lines are skipped
    #[arg(long)]
    pub prompts_file: PathBuf,

    /// File containing guidelines that shape the assistant's behaviour
    #[arg(long)]
    pub guidelines_file: PathBuf,

    /// Maximum tokens in each generated response
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub max_tokens: u32,

    /// Number of response choices to generate per prompt
    #[arg(short = 'n', long = "choices", default_value_t = DEFAULT_CHOICES,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub choices: u32,

    /// Sequence after which response generation stops
    #[arg(long)]
    pub stop: Option<String>,

    /// Response randomness; out-of-range values fall back to the default
    #[arg(long, default_value_t = crate::config::DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// on: persist conversation history across prompts; off: treat prompts independently
    #[arg(long, value_enum, default_value_t = ConversationMode::Off)]
    pub conversation_mode: ConversationMode,

    /// Maximum concurrent in-flight requests (only applies when --conversation-mode is off)
    #[arg(long, default_value_t = DEFAULT_MAX_THREADS,
          value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    pub max_threads: usize,

    /// Seconds each worker waits after claiming a concurrency slot
    /// (only applies when --conversation-mode is off)
    #[arg(long, default_value_t = DEFAULT_DELAY_SECS)]
    pub delay: u64,

    /// Output CSV file name; uniquified with _1, _2, ... if it already exists
    #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
    pub output_file: PathBuf,
}
