use bookchat_core::{ChatConfig, PayloadFormat};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Terminal client for the Physical AI & Humanoid Robotics book assistant
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The question to send to the assistant
    #[arg(index = 1)] // Positional argument
    pub prompt: Option<String>,

    /// Enter interactive chat mode
    #[arg(short, long, default_value_t = false)]
    pub interactive: bool,

    /// Wait for a single JSON answer instead of reading a stream
    #[arg(long, default_value_t = false)]
    pub no_stream: bool,

    /// Selected text to ground the question in
    #[arg(short, long)]
    pub context: Option<String>,

    /// Base URL of the backend API (e.g. http://127.0.0.1:8000/api/v1)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Seconds to wait for an answer before giving up
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Reuse an existing session id instead of generating one
    #[arg(long)]
    pub session: Option<String>,

    /// Request body shape to send
    #[arg(long, value_enum)]
    pub payload: Option<PayloadArg>,

    /// Path to the config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long, default_value_t = false)]
    pub save_config: bool,

    /// Print the history the backend stored for the session
    #[arg(long, default_value_t = false)]
    pub history: bool,

    /// End the session on the backend
    #[arg(long, default_value_t = false)]
    pub end_session: bool,

    /// Enable verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayloadArg {
    Auto,
    Book,
    Thread,
}

impl From<PayloadArg> for PayloadFormat {
    fn from(arg: PayloadArg) -> Self {
        match arg {
            PayloadArg::Auto => PayloadFormat::Auto,
            PayloadArg::Book => PayloadFormat::Book,
            PayloadArg::Thread => PayloadFormat::Thread,
        }
    }
}

impl Args {
    /// Config values given on the command line
    pub fn to_config(&self) -> ChatConfig {
        ChatConfig {
            api_base_url: self.api_url.clone(),
            timeout_secs: self.timeout,
            streaming: self.no_stream.then_some(false),
            payload_format: self.payload.map(PayloadFormat::from),
            session_id: self.session.clone(),
            log_level: self.verbose.then(|| "debug".to_string()),
        }
    }
}
