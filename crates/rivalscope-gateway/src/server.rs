use rivalscope_common::{Error, Result};
use rivalscope_config::AppConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::bootstrap::build_state;
use crate::router::build_router;

/// HTTP front end for the advisor.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Bind, serve until Ctrl-C, then drain in-flight requests.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let state = build_state(self.config).await;
        let app = build_router(state);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Gateway(format!("failed to bind {addr}: {e}")))?;
        info!("gateway listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down gateway");
            })
            .await?;

        Ok(())
    }
}
