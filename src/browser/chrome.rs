//! Chrome sessions over the DevTools protocol
//!
//! Each session launches its own browser process so that download
//! directories never overlap between workers.

use crate::browser::session::{BrowserSession, SessionError, SessionFactory, SessionResult};
use crate::config::BrowserConfig as HarvestBrowserConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::Path;
use tokio::task::JoinHandle;

const SCROLL_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight); document.body.scrollHeight";

/// Launches a fresh Chrome instance per session
#[derive(Debug, Clone)]
pub struct ChromeSessionFactory {
    config: HarvestBrowserConfig,
}

impl ChromeSessionFactory {
    pub fn new(config: HarvestBrowserConfig) -> Self {
        Self { config }
    }

    fn launch_config(&self) -> SessionResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(SessionError::Launch)
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self, download_dir: Option<&Path>) -> SessionResult<Box<dyn BrowserSession>> {
        let (browser, mut handler) = Browser::launch(self.launch_config()?).await?;

        // The handler drives the websocket connection and must be polled
        // for as long as the browser is in use.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut session = ChromeSession {
            browser,
            page: None,
            handler_task: Some(handler_task),
        };

        if let Err(e) = session.prepare(download_dir).await {
            // Shut the browser down when setup fails
            let _ = session.close().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

/// A Chrome instance with a single page
pub struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromeSession {
    async fn prepare(&mut self, download_dir: Option<&Path>) -> SessionResult<()> {
        if let Some(dir) = download_dir {
            let dir = std::path::absolute(dir)
                .map_err(|e| SessionError::Launch(format!("{}: {}", dir.display(), e)))?;
            let params = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(dir.to_string_lossy().into_owned())
                .build()
                .map_err(SessionError::Launch)?;
            self.browser.execute(params).await?;
        }

        self.page = Some(self.browser.new_page("about:blank").await?);
        Ok(())
    }

    fn page(&self) -> SessionResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Launch("session has no open page".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        self.page()?.goto(url).await?;
        Ok(())
    }

    async fn rendered_html(&self) -> SessionResult<String> {
        Ok(self.page()?.content().await?)
    }

    async fn click_first(&self, selector: &str) -> SessionResult<bool> {
        let elements = self.page()?.find_elements(selector).await?;
        match elements.first() {
            Some(element) => {
                element.click().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scroll_to_end(&self) -> SessionResult<u64> {
        let result = self.page()?.evaluate(SCROLL_SCRIPT).await?;
        result
            .into_value::<u64>()
            .map_err(|e| SessionError::Decode(e.to_string()))
    }

    async fn close(&mut self) -> SessionResult<()> {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }

        let closed = self.browser.close().await.map(|_| ());
        let _ = self.browser.wait().await;

        if let Some(task) = self.handler_task.take() {
            let _ = task.await;
        }

        Ok(closed?)
    }
}
