mod cli;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use pdf_renderer::browser::{EngineLauncher, LifecycleManager, ScriptedLauncher};
use pdf_renderer::config::{EngineKind, LaunchMode};
use pdf_renderer::shutdown::cancel_on_signal;
use pdf_renderer::{serve, AppState, Config, RenderError};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Start-up failed because the browser engine could not be launched.
const EXIT_LAUNCH_FAILURE: u8 = 1;
/// The configuration could not be loaded or is invalid.
const EXIT_CONFIG_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    let config = match settings::resolve_config(&args, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    tracing::debug!("{}", settings::format_effective_config(&config, args.config.as_deref()));

    match config.engine.kind {
        EngineKind::Scripted => run_with(config, ScriptedLauncher::default()).await,
        EngineKind::Chromium => run_chromium(config).await,
    }
}

#[cfg(feature = "chromium")]
async fn run_chromium(config: Config) -> ExitCode {
    use pdf_renderer::browser::ChromiumLauncher;

    let launcher = ChromiumLauncher::new(config.engine.clone(), config.viewport);
    run_with(config, launcher).await
}

#[cfg(not(feature = "chromium"))]
async fn run_chromium(_config: Config) -> ExitCode {
    tracing::error!("engine kind \"chromium\" requires building with the `chromium` feature");
    ExitCode::from(EXIT_CONFIG_ERROR)
}

async fn run_with<L: EngineLauncher>(config: Config, launcher: L) -> ExitCode {
    let manager = Arc::new(LifecycleManager::new(launcher));

    if config.launch == LaunchMode::Eager {
        if let Err(e) = manager.ensure_ready().await {
            tracing::error!(error = %e, "browser engine failed to start");
            return ExitCode::from(EXIT_LAUNCH_FAILURE);
        }
    }

    match serve_until_signal(&config, Arc::clone(&manager)).await {
        Ok(()) => {
            tracing::info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            if let Err(e) = manager.shutdown().await {
                tracing::warn!(error = %e, "browser engine shutdown failed");
            }
            ExitCode::FAILURE
        }
    }
}

async fn serve_until_signal<L: EngineLauncher>(
    config: &Config,
    manager: Arc<LifecycleManager<L>>,
) -> Result<(), RenderError> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    let state = Arc::new(AppState::new(config, manager));

    let token = CancellationToken::new();
    cancel_on_signal(token.clone());

    serve(listener, state, token, config.timeouts.shutdown).await
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
