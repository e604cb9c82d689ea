use std::sync::Arc;

use tracing::{info, warn};

mod demo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pacemaker_service=info,pacemaker_orchestrator=info".into()),
        )
        .init();

    // load config: explicit path > PACEMAKER_CONFIG env > ~/.pacemaker/pacemaker.toml
    let config_path = std::env::var("PACEMAKER_CONFIG").ok();
    let resolved_path = pacemaker_core::config::PacemakerConfig::resolve_path(config_path.as_deref());
    let config = if !std::path::Path::new(&resolved_path).exists() {
        // No config file at all yet — a usable starting point, not a validation
        // failure. Fall back to the demo configuration.
        warn!("no config file found at {resolved_path}, falling back to demo configuration");
        demo::demo_config()
    } else {
        match pacemaker_core::config::PacemakerConfig::load(config_path.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                // ConfigInvalid is fatal at initialization — the process refuses
                // to start rather than silently substituting a working config.
                eprintln!("fatal: invalid configuration at {resolved_path}: {e}");
                std::process::exit(1);
            }
        }
    };

    let bus = Arc::new(demo::DemoBus);
    let admin = Arc::new(demo::DemoAdmin::new(config.bot.bot_id.clone()));
    let thought_sink = Arc::new(demo::DemoThoughtSink);
    let backend = Arc::new(demo::DemoLlmBackend);

    let orchestrator = pacemaker_orchestrator::Orchestrator::new(&config, bus, admin, thought_sink, backend)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    orchestrator.initialize(shutdown_rx).await;

    info!("pacemaker running — type a line and press enter to send a demo chat message (admin id: {})", config.bot.bot_id);
    let stdin_task = tokio::spawn(demo::read_stdin_loop(orchestrator.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    stdin_task.abort();
    let _ = shutdown_tx.send(true);
    orchestrator.shutdown().await;

    Ok(())
}
