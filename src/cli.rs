use clap::Parser;
use pdf_renderer::config::EngineKind;
use pdf_renderer::Viewport;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pdf-renderer")]
#[command(
    version,
    about = "Render web pages to PDF over HTTP using a shared headless browser",
    long_about = "pdf-renderer\n\nServes POST /render-pdf ({\"url\": ..., \"pdfOptions\": {...}}) and GET /health.\nOne headless browser is shared by all requests; each render gets its own isolated browsing context.\n\nSettings are layered: built-in defaults < config file < environment (PORT, CHROME_PATH) < flags."
)]
pub struct Cli {
    #[arg(
        long,
        env = "PDF_RENDERER_CONFIG",
        value_name = "PATH",
        help = "Optional config file (TOML); environment and flags override it"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Interface to listen on")]
    pub host: Option<String>,

    #[arg(long, help = "Port to listen on (overrides PORT)")]
    pub port: Option<u16>,

    #[arg(
        long,
        help = "Start the browser on the first render instead of at start-up"
    )]
    pub lazy: bool,

    #[arg(long, value_enum, help = "Browser engine backing the renderer")]
    pub engine: Option<EngineKind>,

    #[arg(long, help = "Viewport used for every render (WIDTHxHEIGHT)")]
    pub viewport: Option<Viewport>,

    #[arg(long, value_name = "PATH", help = "Chrome/Chromium executable (overrides CHROME_PATH)")]
    pub chrome_path: Option<PathBuf>,

    #[arg(long, help = "Disable the Chrome sandbox (often required in containers)")]
    pub no_sandbox: bool,

    #[arg(long, help = "Enable debug logging")]
    pub verbose: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "pdf-renderer",
            "--port",
            "8080",
            "--lazy",
            "--engine",
            "scripted",
            "--no-sandbox",
            "--viewport",
            "800x600",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(8080));
        assert!(cli.lazy);
        assert_eq!(cli.engine, Some(EngineKind::Scripted));
        assert!(cli.no_sandbox);
        assert_eq!(cli.viewport, Some(Viewport { width: 800, height: 600 }));
        assert!(cli.host.is_none());
    }

    #[test]
    fn rejects_unknown_engine() {
        assert!(Cli::try_parse_from(["pdf-renderer", "--engine", "gecko"]).is_err());
    }
}
