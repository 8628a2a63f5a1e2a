//! PDF Renderer Library
//!
//! Renders web pages to PDF through a single shared headless browser and
//! exposes the result over HTTP.
//!
//! # Module Overview
//!
//! - [`browser`] - Engine traits, the shared-engine lifecycle manager, and the
//!   Chromium and scripted engines
//! - [`render`] - Validation and execution of one render request
//! - [`pdf_options`] - Request-level PDF options and their resolved form
//! - [`server`] - Axum router, handlers, and graceful serving
//! - [`config`] - Configuration file and environment support
//! - [`shutdown`] - Termination signal handling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdf_renderer::browser::{LifecycleManager, ScriptedLauncher};
//! use pdf_renderer::render::{RenderRequest, RenderSettings, Renderer};
//!
//! # async fn example() -> pdf_renderer::Result<()> {
//! let manager = Arc::new(LifecycleManager::new(ScriptedLauncher::default()));
//! let renderer = Renderer::new(Arc::clone(&manager), RenderSettings::default());
//!
//! let pdf = renderer.render(RenderRequest::new("https://example.com")).await?;
//! println!("{} bytes in {:?}", pdf.len(), pdf.elapsed);
//!
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod pdf_options;
pub mod render;
pub mod server;
pub mod shutdown;
pub mod viewport;

pub use browser::{
    BrowsingContext, ContextGuard, Engine, EngineLauncher, EngineStatus, LifecycleManager,
};
pub use config::Config;
pub use error::{ErrorCategory, ErrorPayload, RenderError, Result};
pub use pdf_options::{ExportOptions, PdfOptions};
pub use render::{RenderRequest, RenderSettings, RenderedPdf, Renderer};
pub use server::{router, serve, AppState};
pub use viewport::Viewport;
