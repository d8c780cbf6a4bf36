use clap::Parser;
use std::time::Duration;

use crate::chat::ChatConfig;
use crate::server::RelayConfig;
use crate::server::upstream::UpstreamConfig;
use crate::stream::TransportConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat Client Args ---
    /// URL of the streaming chat endpoint (e.g., http://127.0.0.1:4000/chat)
    #[arg(long, env = "CHAT_ENDPOINT", default_value = "http://127.0.0.1:4000/chat")]
    pub endpoint: String,

    /// API key sent to the chat endpoint as bearer token and `apikey` header
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub api_key: String,

    /// Subject tag selecting the tutor persona (maths, physique, francais, ...)
    #[arg(long, env = "CHAT_SUBJECT", default_value = "general")]
    pub subject: String,

    /// Files to attach to the first message (repeatable)
    #[arg(long = "attach", value_name = "PATH")]
    pub attachments: Vec<String>,

    /// Send a single message, print the reply and exit
    #[arg(long)]
    pub prompt: Option<String>,

    /// Seconds to wait for headers or the next chunk before giving up. 0 disables.
    #[arg(long, env = "CHAT_IDLE_TIMEOUT_SECS", default_value = "60")]
    pub idle_timeout_secs: u64,

    /// Seconds a whole reply may take. 0 disables.
    #[arg(long, env = "CHAT_TOTAL_TIMEOUT_SECS", default_value = "300")]
    pub total_timeout_secs: u64,

    // --- Relay Server Args ---
    /// Run the relay server instead of the chat client
    #[arg(long, env = "SERVE", default_value = "false")]
    pub serve: bool,

    /// Host address and port for the relay server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// OpenAI-compatible chat completions URL the relay forwards to
    #[arg(
        long,
        env = "UPSTREAM_URL",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub upstream_url: String,

    /// API key for the upstream gateway
    #[arg(long, env = "UPSTREAM_API_KEY", default_value = "")]
    pub upstream_api_key: String,

    /// Model requested from the upstream gateway
    #[arg(long, env = "UPSTREAM_MODEL", default_value = "gpt-4o-mini")]
    pub upstream_model: String,

    /// Fetch full completions and re-chunk them as SSE instead of streaming upstream
    #[arg(long, env = "SIMULATE_STREAMING", default_value = "false")]
    pub simulate_streaming: bool,

    /// Delay between simulated frames, in milliseconds
    #[arg(long, env = "SIMULATED_FRAME_DELAY_MS", default_value = "20")]
    pub simulated_frame_delay_ms: u64,

    /// Optional JSON file of per-subject system prompts
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

fn optional_secs(secs: u64) -> Option<Duration> {
    if secs == 0 { None } else { Some(Duration::from_secs(secs)) }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}

impl Args {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.endpoint.clone(),
            api_key: non_empty(&self.api_key),
        }
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            subject: self.subject.clone(),
            idle_timeout: optional_secs(self.idle_timeout_secs),
            total_timeout: optional_secs(self.total_timeout_secs),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            addr: self.server_addr.clone(),
            upstream: UpstreamConfig {
                url: self.upstream_url.clone(),
                api_key: non_empty(&self.upstream_api_key),
                model: self.upstream_model.clone(),
            },
            simulate_streaming: self.simulate_streaming,
            simulated_pause: Duration::from_millis(self.simulated_frame_delay_ms),
        }
    }
}
