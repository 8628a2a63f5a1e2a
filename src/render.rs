//! Render request handling.
//!
//! [`Renderer::render`] turns one [`RenderRequest`] into PDF bytes: it
//! validates the input, borrows the shared engine, drives a fresh browsing
//! context through navigation, font loading and export, and always releases
//! that context before returning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::browser::{BrowsingContext, ContextGuard, Engine, EngineLauncher, LifecycleManager};
use crate::config::Config;
use crate::pdf_options::{ExportOptions, PdfOptions};
use crate::{RenderError, Result, Viewport};

/// Body of `POST /render-pdf`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pdf_options: Option<PdfOptions>,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            pdf_options: None,
        }
    }

    pub fn with_options(mut self, options: PdfOptions) -> Self {
        self.pdf_options = Some(options);
        self
    }
}

/// A successfully rendered document.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub elapsed: Duration,
}

impl RenderedPdf {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Settings the renderer applies to every request.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
    pub font_timeout: Duration,
    pub allowed_schemes: Vec<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RenderSettings {
    fn from(config: &Config) -> Self {
        Self {
            viewport: config.viewport,
            navigation_timeout: config.timeouts.navigation,
            font_timeout: config.timeouts.fonts,
            allowed_schemes: config.allowed_schemes.clone(),
        }
    }
}

/// Validated input of a render: everything checked before the engine is used.
#[derive(Debug)]
struct RenderPlan {
    url: Url,
    options: ExportOptions,
}

pub struct Renderer<L: EngineLauncher> {
    manager: Arc<LifecycleManager<L>>,
    settings: RenderSettings,
    active: Arc<AtomicUsize>,
}

impl<L: EngineLauncher> Renderer<L> {
    pub fn new(manager: Arc<LifecycleManager<L>>, settings: RenderSettings) -> Self {
        Self {
            manager,
            settings,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn manager(&self) -> &Arc<LifecycleManager<L>> {
        &self.manager
    }

    /// Browsing contexts currently alive, including ones still being closed.
    pub fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Render one request. Exactly one outcome is produced; the browsing
    /// context created for it is gone by the time this returns.
    #[instrument(skip_all, fields(url = request.url.as_deref().unwrap_or("")))]
    pub async fn render(&self, request: RenderRequest) -> Result<RenderedPdf> {
        let start = Instant::now();
        let plan = self.plan(&request)?;

        let engine = self
            .manager
            .ensure_ready()
            .await
            .map_err(RenderError::into_unavailable)?;

        let context = engine.new_context(self.settings.viewport).await?;
        let guard = ContextGuard::new(context, plan.url.as_str(), Arc::clone(&self.active));

        let outcome = self.drive(guard.context(), &plan).await;
        guard.release().await;

        match outcome {
            Ok(bytes) => {
                let elapsed = start.elapsed();
                info!(
                    bytes = bytes.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "rendered pdf"
                );
                Ok(RenderedPdf { bytes, elapsed })
            }
            Err(e) => {
                warn!(category = %e.category(), error = %e, "render failed");
                Err(e)
            }
        }
    }

    fn plan(&self, request: &RenderRequest) -> Result<RenderPlan> {
        let raw = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RenderError::validation("missing url parameter"))?;

        let url = Url::parse(raw)
            .map_err(|e| RenderError::validation(format!("invalid url {:?}: {}", raw, e)))?;
        if !self
            .settings
            .allowed_schemes
            .iter()
            .any(|scheme| scheme.eq_ignore_ascii_case(url.scheme()))
        {
            return Err(RenderError::validation(format!(
                "unsupported url scheme {:?}; allowed: {}",
                url.scheme(),
                self.settings.allowed_schemes.join(", ")
            )));
        }

        let options = ExportOptions::resolve(request.pdf_options.as_ref())?;
        Ok(RenderPlan { url, options })
    }

    async fn drive<C: BrowsingContext>(&self, context: &C, plan: &RenderPlan) -> Result<Vec<u8>> {
        let navigation_timeout = self.settings.navigation_timeout;
        timeout(navigation_timeout, context.navigate(plan.url.as_str()))
            .await
            .map_err(|_| RenderError::NavigationTimeout(navigation_timeout))??;
        debug!("navigation settled");

        match timeout(self.settings.font_timeout, context.wait_for_fonts()).await {
            Ok(Ok(())) => debug!("fonts ready"),
            Ok(Err(e)) => warn!(error = %e, "font readiness check failed; exporting anyway"),
            Err(_) => warn!(
                timeout_ms = self.settings.font_timeout.as_millis() as u64,
                "fonts not ready in time; exporting anyway"
            ),
        }

        let bytes = context.export_pdf(&plan.options).await?;
        if bytes.is_empty() {
            return Err(RenderError::export("engine produced an empty document"));
        }
        Ok(bytes)
    }
}
