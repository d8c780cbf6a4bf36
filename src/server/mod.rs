pub mod api;
pub mod upstream;

use log::{ error, info };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::prompt::SubjectPrompts;
use self::api::{ router, RelayState };
use self::upstream::{ UpstreamClient, UpstreamConfig };

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub addr: String,
    pub upstream: UpstreamConfig,
    pub simulate_streaming: bool,
    pub simulated_pause: Duration,
}

/// HTTP relay between chat clients and the upstream completion gateway.
pub struct Server {
    config: RelayConfig,
    prompts: Arc<SubjectPrompts>,
}

impl Server {
    pub fn new(config: RelayConfig, prompts: Arc<SubjectPrompts>) -> Self {
        Self { config, prompts }
    }

    pub fn state(&self) -> Result<RelayState, Box<dyn Error + Send + Sync>> {
        Ok(RelayState {
            upstream: Arc::new(UpstreamClient::new(&self.config.upstream)?),
            prompts: self.prompts.clone(),
            simulate_streaming: self.config.simulate_streaming,
            simulated_pause: self.config.simulated_pause,
        })
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.config.addr.parse::<SocketAddr>()?;
        let app = router(self.state()?);

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind relay server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Relay listening on http://{}", addr);
        if self.config.simulate_streaming {
            info!("Simulated streaming enabled");
        }

        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}
