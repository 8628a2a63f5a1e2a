//! Headless browser orchestration.
//!
//! The service depends on a browser only through three small traits:
//!
//! - [`EngineLauncher`] starts the browser process,
//! - [`Engine`] is the live, shared browser that hands out isolated contexts,
//! - [`BrowsingContext`] is one private session used by exactly one render.
//!
//! # Module Structure
//!
//! - [`manager`] - [`LifecycleManager`], owner of the single shared engine
//! - [`context`] - [`ContextGuard`], scoped release of browsing contexts
//! - [`chromium`] - Chrome/Chromium over the DevTools protocol (feature `chromium`)
//! - [`scripted`] - deterministic in-process engine for tests and dry runs
//!
//! # Example
//!
//! ```no_run
//! use pdf_renderer::browser::{LifecycleManager, ScriptedLauncher};
//!
//! # async fn example() -> pdf_renderer::Result<()> {
//! let manager = LifecycleManager::new(ScriptedLauncher::default());
//! let engine = manager.ensure_ready().await?;
//! // ... create contexts from `engine`
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use crate::pdf_options::ExportOptions;
use crate::{Result, Viewport};

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod context;
pub mod manager;
pub mod scripted;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumContext, ChromiumEngine, ChromiumLauncher};
pub use context::ContextGuard;
pub use manager::{EngineStatus, LifecycleManager};
pub use scripted::{PageScript, ScriptStats, ScriptedContext, ScriptedEngine, ScriptedLauncher};

/// Starts a browser engine process.
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: Engine;

    /// Launch a new engine. Failures map to [`crate::RenderError::EngineLaunch`].
    fn launch(&self) -> impl Future<Output = Result<Self::Engine>> + Send;
}

/// A live browser shared by every request.
pub trait Engine: Send + Sync + 'static {
    type Context: BrowsingContext;

    /// Open a fresh, isolated browsing context with the given viewport.
    fn new_context(&self, viewport: Viewport) -> impl Future<Output = Result<Self::Context>> + Send;

    /// Terminate the underlying process.
    fn shutdown(&self) -> impl Future<Output = Result<()>> + Send;
}

/// One isolated rendering session.
pub trait BrowsingContext: Send + Sync + 'static {
    /// Load `url` and resolve once network activity has settled to at most a
    /// couple of open connections. Callers bound this with their own timeout.
    fn navigate(&self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Resolve once the page's web fonts have finished loading.
    fn wait_for_fonts(&self) -> impl Future<Output = Result<()>> + Send;

    /// Print the current page to PDF bytes.
    fn export_pdf(&self, options: &ExportOptions) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Destroy the context and everything it owns.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
