#![allow(dead_code)]

use async_trait::async_trait;
use link_card::{
    PreviewError, PreviewService, PreviewServiceConfig, RenderSession, RenderSettings, Renderer,
    UrlValidationConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TWEET_HTML: &str = r#"
<html><body>
<article>
  <a href="/someuser"><img src="https://pbs.twimg.com/profile_images/1/me.jpg"></a>
  <div data-testid="User-Name">Some User<span>@someuser</span></div>
  <div lang="en">Shipping the new release today</div>
  <time datetime="2024-05-01T12:30:00.000Z">May 1</time>
  <img src="https://pbs.twimg.com/media/a.jpg"><img src="https://pbs.twimg.com/media/b.jpg">
  <a href="https://t.co/abc">t.co/abc</a>
</article>
</body></html>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Render the configured HTML.
    Render,
    /// Navigation exceeds its timeout.
    NavigationTimeout,
    /// Post root never appears.
    SelectorTimeout,
    /// Reading content fails unexpectedly.
    ContentError,
}

/// Renderer double that counts session launches and closes.
#[derive(Clone)]
pub struct FakeRenderer {
    pub html: String,
    pub behavior: FakeBehavior,
    /// Held inside every session until it is closed.
    pub render_delay: Duration,
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub drops: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub peak_live: Arc<AtomicUsize>,
}

impl FakeRenderer {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            behavior: FakeBehavior::Render,
            render_delay: Duration::ZERO,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            drops: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            peak_live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_behavior(mut self, behavior: FakeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, PreviewError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            renderer: self.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    renderer: FakeRenderer,
    closed: bool,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PreviewError> {
        tokio::time::sleep(self.renderer.render_delay).await;
        match self.renderer.behavior {
            FakeBehavior::NavigationTimeout => Err(PreviewError::RenderTimeout(format!(
                "navigation to {url} exceeded {timeout:?}"
            ))),
            _ => Ok(()),
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), PreviewError> {
        match self.renderer.behavior {
            FakeBehavior::SelectorTimeout => Err(PreviewError::RenderTimeout(format!(
                "`{selector}` did not appear within {timeout:?}"
            ))),
            _ => Ok(()),
        }
    }

    async fn content(&mut self) -> Result<String, PreviewError> {
        match self.renderer.behavior {
            FakeBehavior::ContentError => Err(PreviewError::InternalError("target crashed".into())),
            _ => Ok(self.renderer.html.clone()),
        }
    }

    async fn close(&mut self) -> Result<(), PreviewError> {
        if !self.closed {
            self.closed = true;
            self.renderer.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.renderer.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        // A cancelled request drops its session without closing it.
        if !self.closed {
            self.closed = true;
            self.renderer.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.renderer.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Service that admits loopback hosts (for wiremock) and renders with `renderer`.
pub fn service_with(renderer: &FakeRenderer, settings: RenderSettings) -> PreviewService {
    let config = PreviewServiceConfig::new()
        .with_url_validation(UrlValidationConfig::permissive())
        .with_render_settings(settings)
        .with_renderer(Arc::new(renderer.clone()));
    PreviewService::new_with_config(config).unwrap()
}

pub fn test_service(renderer: &FakeRenderer) -> PreviewService {
    service_with(renderer, RenderSettings::default())
}
