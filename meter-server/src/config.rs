//! Server configuration, resolved from CLI flags or environment variables.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "meter-server", about = "Theta-Meter session server")]
pub struct ServerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "METER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8765, env = "METER_PORT")]
    pub port: u16,

    /// Forces the broadcaster to run against the simulator even if hardware
    /// is present, or forces hardware-only with no fallback.
    #[arg(long, env = "METER_MODE")]
    pub meter_mode: Option<MeterMode>,

    /// SQLite database path for the case store.
    #[arg(long, default_value = "meter.db", env = "METER_DB_PATH")]
    pub db_path: PathBuf,

    /// Anthropic API key for the AI auditor collaborator. Absent means the
    /// session falls back to canonical R3R/rudiment prompts.
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// OpenAI API key for Whisper transcription. Absent disables audio input.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MeterMode {
    Auto,
    Simulator,
    Hardware,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
