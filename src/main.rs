use std::path::PathBuf;

use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};
use gxproxy::{
    ProxyApp,
    config::{ConfigOverrides, ProxyConfigValidator, load_config},
    tracing_setup,
    utils::GracefulShutdown,
};
use tokio::net::TcpListener;

/// Route HTTP and WebSocket traffic to per-session backends.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Interface to listen on
    #[arg(long)]
    ip: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Name of the session cookie
    #[arg(long)]
    cookie: Option<String>,

    /// Session map: JSON file, or SQLite database when ending in .sqlite
    #[arg(long)]
    sessions: Option<PathBuf>,

    /// Rewrite http://localhost/ redirects to include the listening port
    #[arg(long = "reverseProxy", alias = "reverse-proxy")]
    reverse_proxy: bool,

    /// Log session resolution and routing decisions
    #[arg(long)]
    verbose: bool,

    /// Optional configuration file (toml, json or yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for a backend's response headers
    #[arg(long = "upstream-timeout", value_name = "SECS")]
    upstream_timeout: Option<u64>,

    /// Also reload the session map every SECS seconds
    #[arg(long = "poll-interval", value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Emit JSON log lines
    #[arg(long = "log-json")]
    log_json: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            ip: self.ip.clone(),
            port: self.port,
            cookie: self.cookie.clone(),
            sessions: self.sessions.clone(),
            reverse_proxy: self.reverse_proxy,
            verbose: self.verbose,
            upstream_timeout_secs: self.upstream_timeout,
            poll_interval_secs: self.poll_interval,
            log_json: self.log_json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config = load_config(args.config.as_deref(), &args.overrides())
        .wrap_err("Failed to load configuration")?;
    ProxyConfigValidator::validate(&config).wrap_err("Invalid configuration")?;

    tracing_setup::init_tracing(config.verbose, config.log_json)?;

    tracing::info!(
        listen = %config.listen_addr(),
        cookie = %config.cookie,
        reverse_proxy = config.reverse_proxy,
        "Starting gxproxy"
    );

    let app = ProxyApp::from_config(&config).await?;

    let listener = TcpListener::bind((config.ip.as_str(), config.port))
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", config.listen_addr()))?;

    let graceful_shutdown = GracefulShutdown::new();
    let signal_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_shutdown.run_signal_handler().await;
    });

    app.serve(listener, graceful_shutdown).await
}
