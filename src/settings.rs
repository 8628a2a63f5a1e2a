use pdf_renderer::config::LaunchMode;
use pdf_renderer::{Config, RenderError};

use crate::cli::Cli;

/// Build the effective config: file (or defaults), then environment, then flags.
pub fn resolve_config<F>(cli: &Cli, env: F) -> Result<Config, RenderError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = Config::load(cli.config.as_deref())?;
    cfg.apply_env(env)?;
    apply_flags(&mut cfg, cli);

    cfg.validate().map_err(|e| match (&cli.config, e) {
        (Some(path), RenderError::Config(msg)) => {
            RenderError::Config(format!("Invalid config ({}): {}", path.display(), msg))
        }
        (_, other) => other,
    })?;
    Ok(cfg)
}

fn apply_flags(cfg: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.host {
        cfg.host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if cli.lazy {
        cfg.launch = LaunchMode::Lazy;
    }
    if let Some(kind) = cli.engine {
        cfg.engine.kind = kind;
    }
    if let Some(viewport) = cli.viewport {
        cfg.viewport = viewport;
    }
    if let Some(path) = &cli.chrome_path {
        cfg.engine.executable = Some(path.clone());
    }
    if cli.no_sandbox {
        cfg.engine.sandbox = false;
    }
}

/// One-line summary of the effective config, logged at start-up.
pub fn format_effective_config(cfg: &Config, source: Option<&std::path::Path>) -> String {
    let source = source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults/built-in".to_string());
    format!(
        "Effective config (source: {}): listen {}, launch {:?}, engine {:?}, viewport {}, timeouts nav {:?} / fonts {:?} / shutdown {:?}, max body {} bytes, schemes [{}]",
        source,
        cfg.bind_address(),
        cfg.launch,
        cfg.engine.kind,
        cfg.viewport,
        cfg.timeouts.navigation,
        cfg.timeouts.fonts,
        cfg.timeouts.shutdown,
        cfg.max_body_bytes,
        cfg.allowed_schemes.join(", "),
    )
}
