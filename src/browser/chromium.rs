//! Chrome/Chromium engine over the DevTools protocol.
//!
//! One browser process is launched per [`ChromiumEngine`]. Every browsing
//! context is a separate CDP browser context (an incognito-like profile) with a
//! single page in it, so cookies, storage and cache never leak between renders.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::LoaderId;
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, FrameId, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{Stream, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowsingContext, Engine, EngineLauncher};
use crate::config::EngineConfig;
use crate::pdf_options::ExportOptions;
use crate::{RenderError, Result, Viewport};

/// Chrome fires this lifecycle event once no more than two network
/// connections have been open for 500 ms.
const NETWORK_ALMOST_IDLE: &str = "networkAlmostIdle";
const NAVIGATION_START: &str = "init";
const FONTS_READY_SCRIPT: &str = "document.fonts.ready.then(() => document.fonts.status)";
const PX_PER_INCH: f64 = 96.0;
/// Upper bound for a single CDP command; navigation has its own, shorter bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    options: EngineConfig,
    viewport: Viewport,
}

impl ChromiumLauncher {
    pub fn new(options: EngineConfig, viewport: Viewport) -> Self {
        Self { options, viewport }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.viewport.width, self.viewport.height)
            .request_timeout(REQUEST_TIMEOUT)
            .launch_timeout(LAUNCH_TIMEOUT)
            .arg("--disable-dev-shm-usage")
            .arg("--font-render-hinting=none");

        if let Some(path) = &self.options.executable {
            builder = builder.chrome_executable(path);
        }
        if !self.options.headless {
            builder = builder.with_head();
        }
        if !self.options.sandbox {
            builder = builder.no_sandbox();
        }
        for arg in &self.options.args {
            builder = builder.arg(arg.as_str());
        }

        builder
            .build()
            .map_err(|e| RenderError::EngineLaunch(with_install_hint(&e)))
    }
}

impl EngineLauncher for ChromiumLauncher {
    type Engine = ChromiumEngine;

    async fn launch(&self) -> Result<ChromiumEngine> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::EngineLaunch(with_install_hint(&e.to_string())))?;

        // The handler drives the websocket connection; the browser is unusable
        // once it stops.
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser connection handler stopped");
                    break;
                }
            }
        });

        Ok(ChromiumEngine {
            browser: Arc::new(RwLock::new(browser)),
            events: Mutex::new(Some(events)),
        })
    }
}

fn with_install_hint(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("could not auto detect") || lower.contains("no such file") {
        format!(
            "{}. Hint: install Chrome/Chromium or set CHROME_PATH / engine.executable",
            message
        )
    } else {
        message.to_string()
    }
}

pub struct ChromiumEngine {
    browser: Arc<RwLock<Browser>>,
    events: Mutex<Option<JoinHandle<()>>>,
}

impl Engine for ChromiumEngine {
    type Context = ChromiumContext;

    async fn new_context(&self, viewport: Viewport) -> Result<ChromiumContext> {
        let context_id = self
            .browser
            .read()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| RenderError::ServiceUnavailable(format!("create browser context: {}", e)))?
            .result
            .browser_context_id;

        // From here on the context disposes itself if this future is dropped.
        let mut context = ChromiumContext {
            page: None,
            context_id,
            browser: Arc::clone(&self.browser),
            disposed: false,
        };
        if let Err(e) = context.open_page(viewport).await {
            if let Err(close_err) = context.close().await {
                warn!(error = %close_err, "failed to close half-open browsing context");
            }
            return Err(e);
        }
        Ok(context)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.write().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "graceful browser close failed; killing process");
            if let Some(Err(e)) = browser.kill().await {
                return Err(RenderError::Io(e));
            }
        }
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "waiting for browser process exit failed");
        }

        let events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(events) = events {
            events.abort();
        }
        Ok(())
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        warn!(error = %e, "failed to dispose browser context");
    }
}

pub struct ChromiumContext {
    page: Option<Page>,
    context_id: BrowserContextId,
    browser: Arc<RwLock<Browser>>,
    disposed: bool,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::export("browsing context already closed"))
    }

    async fn open_page(&mut self, viewport: Viewport) -> Result<()> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(RenderError::ServiceUnavailable)?;

        let page = {
            let browser = self.browser.read().await;
            browser.new_page(target).await
        }
        .map_err(|e| RenderError::ServiceUnavailable(format!("open page: {}", e)))?;
        let page = self.page.insert(page);

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| RenderError::ServiceUnavailable(format!("set viewport: {}", e)))?;
        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .map_err(|e| RenderError::ServiceUnavailable(format!("enable lifecycle events: {}", e)))?;
        Ok(())
    }
}

/// Disposing the browser context also closes every page inside it.
impl Drop for ChromiumContext {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("browser context dropped outside a runtime; it stays open until shutdown");
            return;
        };
        let browser = Arc::clone(&self.browser);
        let context_id = self.context_id.clone();
        runtime.spawn(async move {
            let browser = browser.read().await;
            dispose_context(&browser, context_id).await;
        });
    }
}

/// Resolve once the main frame reports `networkAlmostIdle` for the navigation
/// whose `init` event appears in `events`. Idle events for any earlier
/// document are ignored.
async fn wait_for_network_idle<S>(main_frame: Option<&FrameId>, mut events: S) -> Result<()>
where
    S: Stream<Item = Arc<EventLifecycleEvent>> + Unpin,
{
    let mut loader: Option<LoaderId> = None;

    while let Some(event) = events.next().await {
        if main_frame.is_some_and(|frame| *frame != event.frame_id) {
            continue;
        }
        match event.name.as_str() {
            NAVIGATION_START => loader = Some(event.loader_id.clone()),
            NETWORK_ALMOST_IDLE if loader.as_ref() == Some(&event.loader_id) => return Ok(()),
            _ => {}
        }
    }
    Err(RenderError::navigation(
        "page closed before the network became idle",
    ))
}

impl BrowsingContext for ChromiumContext {
    async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page()?;
        let events = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| RenderError::navigation(e.to_string()))?;

        page.goto(url).await.map_err(|e| match e {
            CdpError::Timeout => RenderError::navigation(format!("timed out loading {}", url)),
            other => RenderError::navigation(other.to_string()),
        })?;

        let main_frame = page
            .mainframe()
            .await
            .map_err(|e| RenderError::navigation(e.to_string()))?;
        wait_for_network_idle(main_frame.as_ref(), events).await
    }

    async fn wait_for_fonts(&self) -> Result<()> {
        let page = self.page()?;
        let params = EvaluateParams::builder()
            .expression(FONTS_READY_SCRIPT)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(RenderError::export)?;
        let status = page
            .evaluate_expression(params)
            .await
            .map_err(|e| RenderError::export(format!("waiting for fonts: {}", e)))?;
        debug!(status = ?status.value(), "document fonts settled");
        Ok(())
    }

    async fn export_pdf(&self, options: &ExportOptions) -> Result<Vec<u8>> {
        let page = self.page()?;
        page.pdf(print_params(options))
            .await
            .map_err(|e| RenderError::export(e.to_string()))
    }

    async fn close(mut self) -> Result<()> {
        let mut outcome = Ok(());
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                outcome = Err(RenderError::export(format!("close page: {}", e)));
            }
        }
        let browser = self.browser.read().await;
        dispose_context(&browser, self.context_id.clone()).await;
        self.disposed = true;
        outcome
    }
}

/// Translate resolved options into CDP `Page.printToPDF` parameters.
/// CDP takes lengths in inches.
fn print_params(options: &ExportOptions) -> PrintToPdfParams {
    let inches = |px: f64| px / PX_PER_INCH;
    PrintToPdfParams {
        landscape: Some(options.landscape),
        print_background: Some(options.print_background),
        scale: Some(options.scale),
        paper_width: options.paper.map(|p| p.width_inches()),
        paper_height: options.paper.map(|p| p.height_inches()),
        margin_top: Some(inches(options.margin.top)),
        margin_bottom: Some(inches(options.margin.bottom)),
        margin_left: Some(inches(options.margin.left)),
        margin_right: Some(inches(options.margin.right)),
        page_ranges: options.page_ranges.clone(),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        ..PrintToPdfParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_options::{Margin, PaperSize};
    use chromiumoxide::cdp::browser_protocol::network::MonotonicTime;

    fn lifecycle(frame: &str, loader: &str, name: &str) -> Arc<EventLifecycleEvent> {
        Arc::new(EventLifecycleEvent {
            frame_id: FrameId::new(frame),
            loader_id: LoaderId::new(loader),
            name: name.to_string(),
            timestamp: MonotonicTime::new(0.0),
        })
    }

    async fn idle_after(events: Vec<Arc<EventLifecycleEvent>>) -> Result<()> {
        let main = FrameId::new("main");
        wait_for_network_idle(Some(&main), futures::stream::iter(events)).await
    }

    #[tokio::test]
    async fn idle_from_the_blank_page_does_not_count() {
        let err = idle_after(vec![lifecycle("main", "blank", NETWORK_ALMOST_IDLE)])
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Navigation(_)), "{err}");
    }

    #[tokio::test]
    async fn idle_waits_for_the_new_document() {
        let events = vec![
            lifecycle("main", "blank", NETWORK_ALMOST_IDLE),
            lifecycle("main", "doc", NAVIGATION_START),
            lifecycle("main", "blank", NETWORK_ALMOST_IDLE),
            lifecycle("main", "doc", NETWORK_ALMOST_IDLE),
        ];
        assert!(idle_after(events).await.is_ok());

        let unfinished = vec![
            lifecycle("main", "doc", NAVIGATION_START),
            lifecycle("main", "blank", NETWORK_ALMOST_IDLE),
        ];
        assert!(idle_after(unfinished).await.is_err());
    }

    #[tokio::test]
    async fn idle_ignores_child_frames() {
        let events = vec![
            lifecycle("main", "doc", NAVIGATION_START),
            lifecycle("ad-frame", "doc", NETWORK_ALMOST_IDLE),
        ];
        assert!(idle_after(events).await.is_err());

        let events = vec![
            lifecycle("ad-frame", "ad", NAVIGATION_START),
            lifecycle("main", "doc", NAVIGATION_START),
            lifecycle("ad-frame", "ad", NETWORK_ALMOST_IDLE),
            lifecycle("main", "doc", NETWORK_ALMOST_IDLE),
        ];
        assert!(idle_after(events).await.is_ok());
    }

    #[test]
    fn print_params_convert_pixels_to_inches() {
        let options = ExportOptions {
            margin: Margin {
                top: 96.0,
                right: 48.0,
                bottom: 0.0,
                left: 9.6,
            },
            paper: PaperSize::from_format("a4"),
            ..ExportOptions::default()
        };
        let params = print_params(&options);

        assert_eq!(params.margin_top, Some(1.0));
        assert_eq!(params.margin_right, Some(0.5));
        assert_eq!(params.margin_bottom, Some(0.0));
        assert!((params.margin_left.unwrap() - 0.1).abs() < 1e-9);
        assert!((params.paper_width.unwrap() - 8.27).abs() < 1e-9);
        assert_eq!(params.print_background, Some(true));
        assert_eq!(params.prefer_css_page_size, Some(true));
        assert_eq!(params.scale, Some(1.0));
    }

    #[test]
    fn default_paper_is_left_to_the_browser() {
        let params = print_params(&ExportOptions::default());
        assert!(params.paper_width.is_none());
        assert!(params.paper_height.is_none());
        assert!(params.page_ranges.is_none());
    }

    #[test]
    fn launch_errors_hint_at_chrome_path() {
        let message = with_install_hint("Could not auto detect a chrome executable");
        assert!(message.contains("CHROME_PATH"), "{message}");
        assert_eq!(with_install_hint("port in use"), "port in use");
    }

    #[test]
    fn builder_accepts_engine_options() {
        let launcher = ChromiumLauncher::new(
            EngineConfig {
                executable: Some("/usr/bin/chromium".into()),
                sandbox: false,
                args: vec!["--disable-gpu".to_string()],
                ..EngineConfig::default()
            },
            Viewport::default(),
        );
        assert!(launcher.browser_config().is_ok());
    }
}
