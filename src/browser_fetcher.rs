//! Headless rendering for pages whose content is populated client-side.
//!
//! The social post extractor only talks to the [`Renderer`] and
//! [`RenderSession`] traits; [`ChromeRenderer`] backs them with a headless
//! Chromium driven over CDP.

use crate::PreviewError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Browser rendering configuration, read-only once the service is built.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Upper bound on navigation, including waiting for it to settle
    pub navigation_timeout: Duration,
    /// Upper bound on waiting for the post root element to appear
    pub selector_timeout: Duration,
    /// Maximum number of browser sessions alive at once
    pub max_sessions: usize,
    /// Chromium binary; autodetected when `None`
    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub extra_args: Vec<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(20),
            selector_timeout: Duration::from_secs(15),
            max_sessions: 4,
            chrome_executable: None,
            no_sandbox: false,
            extra_args: Vec::new(),
        }
    }
}

/// Launches isolated rendering sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, PreviewError>;
}

/// One isolated browser session. Owned by a single extraction and closed by it.
#[async_trait]
pub trait RenderSession: Send {
    /// Navigates and waits for the page to settle.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PreviewError>;

    /// Blocks until an element matching `selector` exists or `timeout` elapses,
    /// in which case `RenderTimeout` is returned.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), PreviewError>;

    /// Serialized rendered DOM.
    async fn content(&mut self) -> Result<String, PreviewError>;

    /// Releases the session. Later calls on the session fail.
    async fn close(&mut self) -> Result<(), PreviewError>;
}

/// The renderer used when none is injected.
pub(crate) fn default_renderer(settings: &RenderSettings) -> Arc<dyn Renderer> {
    #[cfg(feature = "browser")]
    {
        Arc::new(ChromeRenderer::new(settings.clone()))
    }
    #[cfg(not(feature = "browser"))]
    {
        let _ = settings;
        Arc::new(UnavailableRenderer)
    }
}

#[cfg(not(feature = "browser"))]
struct UnavailableRenderer;

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Renderer for UnavailableRenderer {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, PreviewError> {
        Err(PreviewError::InternalError(
            "built without the `browser` feature; no renderer available".to_string(),
        ))
    }
}

#[cfg(feature = "browser")]
pub use chrome::ChromeRenderer;

#[cfg(feature = "browser")]
mod chrome {
    use super::{RenderSession, RenderSettings, Renderer};
    use crate::PreviewError;
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::Page;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tracing::{debug, instrument, warn};

    const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

    const DEFAULT_ARGS: &[&str] = &[
        "--disable-gpu",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-background-networking",
        "--disable-sync",
        "--no-first-run",
        "--window-size=1280,2000",
    ];

    /// One headless Chromium process per session.
    pub struct ChromeRenderer {
        settings: RenderSettings,
    }

    impl ChromeRenderer {
        pub fn new(settings: RenderSettings) -> Self {
            Self { settings }
        }

        fn browser_config(&self) -> Result<BrowserConfig, PreviewError> {
            let args = DEFAULT_ARGS
                .iter()
                .map(|arg| arg.to_string())
                .chain(self.settings.extra_args.iter().cloned());

            let mut builder = BrowserConfig::builder()
                .args(args)
                .request_timeout(self.settings.navigation_timeout);
            if self.settings.no_sandbox {
                builder = builder.no_sandbox();
            }
            if let Some(path) = &self.settings.chrome_executable {
                builder = builder.chrome_executable(path);
            }

            builder
                .build()
                .map_err(|e| PreviewError::InternalError(format!("invalid browser config: {e}")))
        }
    }

    #[async_trait]
    impl Renderer for ChromeRenderer {
        #[instrument(level = "debug", skip(self))]
        async fn launch(&self) -> Result<Box<dyn RenderSession>, PreviewError> {
            let config = self.browser_config()?;
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| {
                    PreviewError::InternalError(format!("failed to launch browser: {e}"))
                })?;

            let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

            let page = browser.new_page("about:blank").await;
            let mut session = ChromeSession {
                browser: Some(browser),
                page: None,
                handler,
            };
            match page {
                Ok(page) => {
                    session.page = Some(page);
                    debug!("Browser session launched");
                    Ok(Box::new(session))
                }
                Err(e) => {
                    if let Err(close_err) = session.close().await {
                        warn!(
                            error = %close_err,
                            "Failed to close browser after page creation error"
                        );
                    }
                    Err(PreviewError::InternalError(format!(
                        "failed to open browser page: {e}"
                    )))
                }
            }
        }
    }

    struct ChromeSession {
        browser: Option<Browser>,
        page: Option<Page>,
        handler: JoinHandle<()>,
    }

    impl ChromeSession {
        fn page(&self) -> Result<&Page, PreviewError> {
            self.page
                .as_ref()
                .ok_or_else(|| PreviewError::InternalError("render session is closed".to_string()))
        }
    }

    #[async_trait]
    impl RenderSession for ChromeSession {
        async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PreviewError> {
            let page = self.page()?;
            let navigation = async {
                match page.goto(url).await {
                    Ok(page) => page.wait_for_navigation().await.map(|_| ()),
                    Err(e) => Err(e),
                }
            };

            match tokio::time::timeout(timeout, navigation).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(PreviewError::InternalError(format!(
                    "navigation to {url} failed: {e}"
                ))),
                Err(_) => Err(PreviewError::RenderTimeout(format!(
                    "navigation to {url} exceeded {timeout:?}"
                ))),
            }
        }

        async fn wait_for_selector(
            &mut self,
            selector: &str,
            timeout: Duration,
        ) -> Result<(), PreviewError> {
            let page = self.page()?;
            let poll = async {
                loop {
                    if page.find_element(selector).await.is_ok() {
                        return;
                    }
                    tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
                }
            };

            tokio::time::timeout(timeout, poll).await.map_err(|_| {
                PreviewError::RenderTimeout(format!(
                    "`{selector}` did not appear within {timeout:?}"
                ))
            })
        }

        async fn content(&mut self) -> Result<String, PreviewError> {
            self.page()?
                .content()
                .await
                .map_err(|e| {
                    PreviewError::InternalError(format!("failed to read page content: {e}"))
                })
        }

        async fn close(&mut self) -> Result<(), PreviewError> {
            self.page.take();
            let result = match self.browser.take() {
                Some(mut browser) => {
                    let closed = browser.close().await.map(|_| ());
                    if let Err(e) = browser.wait().await {
                        warn!(error = %e, "Failed waiting for browser process to exit");
                    }
                    closed.map_err(|e| {
                        PreviewError::InternalError(format!("failed to close browser: {e}"))
                    })
                }
                None => Ok(()),
            };
            self.handler.abort();
            debug!("Browser session closed");
            result
        }
    }

    impl Drop for ChromeSession {
        fn drop(&mut self) {
            // Reached without close() only when the owning request was cancelled;
            // dropping the Browser kills its child process.
            if self.browser.is_some() {
                warn!("Browser session dropped without close");
            }
            self.handler.abort();
        }
    }
}
