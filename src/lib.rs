pub mod attachment;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod repl;
pub mod server;
pub mod stream;

use chat::ChatWidget;
use cli::Args;
use config::prompt::load_prompts;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use stream::HttpTransport;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    if args.serve {
        info!("--- Relay Configuration ---");
        info!("Server Address: {}", args.server_addr);
        info!("Upstream URL: {}", args.upstream_url);
        info!("Upstream Model: {}", args.upstream_model);
        info!("Simulated Streaming: {}", args.simulate_streaming);
        info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
        info!("---------------------------");

        let prompts = load_prompts(args.prompts_path.as_deref())?;
        let server = Server::new(args.relay_config(), prompts);
        return server.run().await;
    }

    info!("--- Core Configuration ---");
    info!("Chat Endpoint: {}", args.endpoint);
    info!("Subject: {}", args.subject);
    info!("Idle Timeout: {}s (0 = none)", args.idle_timeout_secs);
    info!("Total Timeout: {}s (0 = none)", args.total_timeout_secs);
    info!("Attachments: {}", args.attachments.len());
    info!("-------------------------");

    let transport = Arc::new(HttpTransport::new(&args.transport_config())?);
    let mut widget = ChatWidget::new(transport, args.chat_config());
    for path in &args.attachments {
        widget.pending_mut().add_file(path).await?;
    }

    match args.prompt.as_deref() {
        Some(prompt) => repl::run_once(&mut widget, prompt).await,
        None => repl::run(&mut widget).await,
    }
}
