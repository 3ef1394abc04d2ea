//! Standalone development front server.
//!
//! ```text
//!     Browser ──▶ HostServer ──▶ DevProxyMiddleware ─┬─ /_next, /__next, /next ──▶ Next.js dev server
//!                                                    ├─ [pages] prefixes ───────▶ page rendered by Next.js
//!                                                    └─ everything else ────────▶ application (or 404)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use nextjs_bridge::app::{ForwardApp, NotFound};
use nextjs_bridge::config::{load_config, validation::validate_config, BridgeConfig, ConfigError};
use nextjs_bridge::observability::{logging, metrics};
use nextjs_bridge::protocol::Application;
use nextjs_bridge::render::{NextJsPage, PageRoutes};
use nextjs_bridge::{DevProxyMiddleware, HostServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "nextjs-bridge")]
#[command(about = "Development front server bridging to a Next.js dev server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// Next.js development server base URL
    #[arg(long)]
    nextjs_url: Option<String>,

    /// Primary application to forward everything else to
    #[arg(long)]
    app_url: Option<String>,

    /// Path prefix rendered by the Next.js server (repeatable)
    #[arg(long = "page", value_name = "PREFIX")]
    pages: Vec<String>,

    /// Enable the bridge (development mode)
    #[arg(long)]
    dev: bool,
}

impl Cli {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(url) = &self.nextjs_url {
            config.nextjs.server_url = url.clone();
        }
        if let Some(url) = &self.app_url {
            config.application.url = Some(url.clone());
        }
        config.pages.prefixes.extend(self.pages.iter().cloned());
        if self.dev {
            config.nextjs.dev_mode = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nextjs-bridge starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut inner: Arc<dyn Application> = match &config.application.url {
        Some(url) => Arc::new(ForwardApp::new(url)?),
        None => Arc::new(NotFound),
    };
    if !config.pages.prefixes.is_empty() {
        tracing::info!(prefixes = ?config.pages.prefixes, "Rendering pages through the Next.js server");
        let page = NextJsPage::from_config(&config.nextjs.server_url, &config.pages)?;
        inner = Arc::new(PageRoutes::new(config.pages.prefixes.iter().cloned(), page, inner));
    }
    let app = DevProxyMiddleware::new(inner, &config.nextjs)?;
    if !config.nextjs.dev_mode {
        tracing::warn!("Development mode is off; frontend requests go to the application");
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(signal.trigger_on_signal());

    HostServer::new(app).run(listener, shutdown.subscribe()).await?;

    tracing::info!("nextjs-bridge stopped");
    Ok(())
}
