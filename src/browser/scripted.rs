//! Deterministic in-process engine.
//!
//! `ScriptedEngine` stands in for a real browser: navigation, font loading and
//! export follow a per-URL [`PageScript`], and export produces a single-page
//! PDF whose text is the page URL placed inside the requested margins. It
//! backs the test suite and `engine.kind = "scripted"` smoke runs on machines
//! without Chrome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use printpdf::{BuiltinFont, Mm, PdfDocument, Pt};

use super::{BrowsingContext, Engine, EngineLauncher};
use crate::pdf_options::{ExportOptions, PaperSize};
use crate::{RenderError, Result, Viewport};

const PT_PER_PX: f32 = 0.75;
const FONT_SIZE_PT: f32 = 12.0;

/// How a scripted page behaves when rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PageScript {
    /// Loads immediately and exports normally.
    #[default]
    Load,
    /// Takes this long to reach network idle.
    SlowLoad(Duration),
    /// Never finishes loading.
    Hang,
    /// Navigation fails with this network error.
    FailNavigation(String),
    /// Web fonts take this long to become ready.
    SlowFonts(Duration),
    /// Loads, but printing fails with this message.
    FailExport(String),
}

/// Counters shared by a launcher and every engine and context it creates.
#[derive(Debug, Default)]
pub struct ScriptStats {
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    created_contexts: AtomicUsize,
    closed_contexts: AtomicUsize,
    open_contexts: AtomicUsize,
    viewports: Mutex<Vec<Viewport>>,
}

impl ScriptStats {
    /// Launch attempts, including failed ones.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn created_contexts(&self) -> usize {
        self.created_contexts.load(Ordering::SeqCst)
    }

    pub fn closed_contexts(&self) -> usize {
        self.closed_contexts.load(Ordering::SeqCst)
    }

    /// Contexts created but not yet closed.
    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }

    /// Viewport of every context created so far, in creation order.
    pub fn viewports(&self) -> Vec<Viewport> {
        self.viewports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn context_opened(&self, viewport: Viewport) {
        self.created_contexts.fetch_add(1, Ordering::SeqCst);
        self.open_contexts.fetch_add(1, Ordering::SeqCst);
        self.viewports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(viewport);
    }

    fn context_closed(&self) {
        self.open_contexts.fetch_sub(1, Ordering::SeqCst);
        self.closed_contexts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    launch_delay: Duration,
    context_delay: Duration,
    failing_launches: Arc<AtomicUsize>,
    pages: Arc<HashMap<String, PageScript>>,
    stats: Arc<ScriptStats>,
}

impl ScriptedLauncher {
    /// Delay every launch, widening the window in which callers race.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Delay the preparation of every new context. The context already
    /// exists while this runs, as a browser context does before its page is
    /// ready.
    pub fn with_context_delay(mut self, delay: Duration) -> Self {
        self.context_delay = delay;
        self
    }

    /// Make the next `count` launches fail.
    pub fn with_failed_launches(self, count: usize) -> Self {
        self.failing_launches.store(count, Ordering::SeqCst);
        self
    }

    /// Script the behaviour of one URL. Unlisted URLs use [`PageScript::Load`].
    pub fn with_page(mut self, url: impl Into<String>, script: PageScript) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.into(), script);
        self
    }

    pub fn stats(&self) -> Arc<ScriptStats> {
        Arc::clone(&self.stats)
    }
}

impl EngineLauncher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    async fn launch(&self) -> Result<ScriptedEngine> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        let should_fail = self
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RenderError::EngineLaunch(
                "scripted launch failure".to_string(),
            ));
        }

        Ok(ScriptedEngine {
            pages: Arc::clone(&self.pages),
            stats: Arc::clone(&self.stats),
            context_delay: self.context_delay,
            running: AtomicBool::new(true),
        })
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    pages: Arc<HashMap<String, PageScript>>,
    stats: Arc<ScriptStats>,
    context_delay: Duration,
    running: AtomicBool,
}

impl Engine for ScriptedEngine {
    type Context = ScriptedContext;

    async fn new_context(&self, viewport: Viewport) -> Result<ScriptedContext> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RenderError::ServiceUnavailable(
                "browser engine is not running".to_string(),
            ));
        }
        self.stats.context_opened(viewport);
        let context = ScriptedContext {
            pages: Arc::clone(&self.pages),
            stats: Arc::clone(&self.stats),
            loaded: Mutex::new(None),
            closed: false,
        };
        if !self.context_delay.is_zero() {
            tokio::time::sleep(self.context_delay).await;
        }
        Ok(context)
    }

    async fn shutdown(&self) -> Result<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A scripted browsing context. Dropping it without [`BrowsingContext::close`]
/// still counts it as closed, matching engines that dispose on drop.
#[derive(Debug)]
pub struct ScriptedContext {
    pages: Arc<HashMap<String, PageScript>>,
    stats: Arc<ScriptStats>,
    loaded: Mutex<Option<String>>,
    closed: bool,
}

impl ScriptedContext {
    fn script_for(&self, url: &str) -> PageScript {
        self.pages.get(url).cloned().unwrap_or_default()
    }

    fn loaded_url(&self) -> Option<String> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl BrowsingContext for ScriptedContext {
    async fn navigate(&self, url: &str) -> Result<()> {
        match self.script_for(url) {
            PageScript::Hang => futures::future::pending::<()>().await,
            PageScript::FailNavigation(message) => return Err(RenderError::navigation(message)),
            PageScript::SlowLoad(delay) => tokio::time::sleep(delay).await,
            _ => {}
        }
        *self
            .loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_fonts(&self) -> Result<()> {
        if let Some(url) = self.loaded_url() {
            if let PageScript::SlowFonts(delay) = self.script_for(&url) {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn export_pdf(&self, options: &ExportOptions) -> Result<Vec<u8>> {
        let url = self
            .loaded_url()
            .ok_or_else(|| RenderError::export("no page has been loaded"))?;
        if let PageScript::FailExport(message) = self.script_for(&url) {
            return Err(RenderError::export(message));
        }
        single_page_pdf(&url, options)
    }

    async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.stats.context_closed();
        Ok(())
    }
}

impl Drop for ScriptedContext {
    fn drop(&mut self) {
        if !self.closed {
            self.stats.context_closed();
        }
    }
}

/// Page size and text origin in points for one export.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PageLayout {
    width: Pt,
    height: Pt,
    origin_x: Pt,
    origin_y: Pt,
}

impl PageLayout {
    /// Letter unless `options.paper` says otherwise; the text baseline sits one
    /// font size below the top margin.
    fn for_options(options: &ExportOptions) -> Self {
        let paper = options.paper.unwrap_or(PaperSize {
            width: 816.0,
            height: 1056.0,
        });
        let (mut width, mut height) = (paper.width as f32 * PT_PER_PX, paper.height as f32 * PT_PER_PX);
        if options.landscape {
            std::mem::swap(&mut width, &mut height);
        }
        Self {
            width: Pt(width),
            height: Pt(height),
            origin_x: Pt(options.margin.left as f32 * PT_PER_PX),
            origin_y: Pt(height - options.margin.top as f32 * PT_PER_PX - FONT_SIZE_PT),
        }
    }
}

/// Build a one-page PDF with `text` at the top-left corner of the printable
/// area.
pub(crate) fn single_page_pdf(text: &str, options: &ExportOptions) -> Result<Vec<u8>> {
    let layout = PageLayout::for_options(options);
    let (doc, page, layer) = PdfDocument::new(
        text,
        Mm::from(layout.width),
        Mm::from(layout.height),
        "content",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::export(format!("load builtin font: {:?}", e)))?;
    doc.get_page(page).get_layer(layer).use_text(
        text,
        FONT_SIZE_PT,
        Mm::from(layout.origin_x),
        Mm::from(layout.origin_y),
        &font,
    );
    doc.save_to_bytes()
        .map_err(|e| RenderError::export(format!("serialize pdf: {:?}", e)))
}
