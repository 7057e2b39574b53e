//! Chromium-driven DOM observer source.

use super::api::normalize_video_id;
use super::{EventSource, js_scripts};
use crate::event::ChatEvent;
use crate::{Error, Result};
use chromiumoxide::{Browser, BrowserConfig, Page, handler::viewport::Viewport};
use chrono::{DateTime, Local};
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

const LIVE_CHAT_PREFIX: &str = "https://www.youtube.com/live_chat";

#[derive(Debug, Clone)]
pub struct BrowserSourceConfig {
    /// Watch page or `live_chat` page to open.
    pub url: String,
    /// Show the browser window instead of running headless.
    pub headed: bool,
}

impl BrowserSourceConfig {
    pub fn for_video(video: &str, headed: bool) -> Self {
        Self {
            url: format!(
                "https://www.youtube.com/watch?v={}",
                normalize_video_id(video)
            ),
            headed,
        }
    }
}

pub struct BrowserSource {
    config: BrowserSourceConfig,
    browser: Browser,
    handler: JoinHandle<()>,
    chat_page: Page,
    observer_installed: bool,
}

impl BrowserSource {
    /// Launch Chromium, open the chat page and install the observer.
    pub async fn launch(config: BrowserSourceConfig) -> Result<Self> {
        let (browser, mut handler) = Browser::launch(config_browser(config.headed)?).await?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let chat_page = open_chat_page(&browser, &config.url).await?;
        let mut source = Self {
            config,
            browser,
            handler,
            chat_page,
            observer_installed: false,
        };
        if !source.install_observer().await? {
            info!("Chat container not rendered yet; the observer will be installed on the next poll");
        }
        Ok(source)
    }

    /// Close the pages and the browser process.
    pub async fn close(mut self) {
        self.chat_page.close().await.ok();
        self.browser.close().await.ok();
        if let Some(Err(err)) = self.browser.kill().await {
            debug!("Browser already gone: {}", err);
        }
        self.handler.abort();
    }

    async fn install_observer(&mut self) -> Result<bool> {
        let installed: bool = self
            .chat_page
            .evaluate(js_scripts::OBSERVER_SETUP)
            .await?
            .into_value()
            .unwrap_or(false);
        if installed && !self.observer_installed {
            info!("✅ Chat observer installed");
        }
        self.observer_installed = installed;
        Ok(installed)
    }

    async fn observer_alive(&self) -> bool {
        match self.chat_page.evaluate(js_scripts::OBSERVER_ALIVE).await {
            Ok(result) => result.into_value().unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl EventSource for BrowserSource {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&mut self) -> Result<Vec<ChatEvent>> {
        if !self.observer_installed && !self.install_observer().await? {
            debug!("Chat observer not installed yet");
            return Ok(Vec::new());
        }

        let drained = match self.chat_page.evaluate(js_scripts::DRAIN_QUEUE).await {
            Ok(result) => result.into_value::<Vec<DomEvent>>()?,
            Err(err) => {
                self.observer_installed = false;
                return Err(err.into());
            }
        };

        // navigation or a re-rendered #items container leaves the observer watching a dead node
        if !self.observer_alive().await {
            warn!("Chat observer lost, reinstalling on the next poll");
            self.observer_installed = false;
        }

        Ok(drained.into_iter().map(DomEvent::into_event).collect())
    }

    async fn reset(&mut self) -> bool {
        self.observer_installed = false;

        let url = self
            .chat_page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        if !url.starts_with(LIVE_CHAT_PREFIX) {
            warn!("❌ Live chat page changed ({}), reopening {}", url, self.config.url);
            match open_chat_page(&self.browser, &self.config.url).await {
                Ok(page) => {
                    let old = std::mem::replace(&mut self.chat_page, page);
                    old.close().await.ok();
                }
                Err(err) => {
                    warn!("Could not reopen the chat page: {}", err);
                    return false;
                }
            }
        }

        match self.install_observer().await {
            Ok(_) => true,
            Err(err) => {
                warn!("Could not reinstall the chat observer: {}", err);
                false
            }
        }
    }
}

async fn open_chat_page(browser: &Browser, url: &str) -> Result<Page> {
    if url.starts_with(LIVE_CHAT_PREFIX) {
        let page = browser.new_page(url).await?;
        page.wait_for_navigation_response().await?;
        return Ok(page);
    }

    let page = browser.new_page(url).await?;
    page.wait_for_navigation_response().await?;

    wait_for_selector(&page, "iframe#chatframe").await?;
    let iframe_url = get_iframe_url(&page).await?;

    let video_title: String = page
        .evaluate(js_scripts::VIDEO_TITLE)
        .await?
        .into_value()
        .unwrap_or_default();
    let channel_name: String = page
        .evaluate(js_scripts::CHANNEL_NAME)
        .await?
        .into_value()
        .unwrap_or_default();
    info!("Capturing chat of \"{}\" by {}", video_title, channel_name);

    page.close().await?;
    let chat_page = browser.new_page(&iframe_url).await?;
    chat_page.wait_for_navigation_response().await?;
    Ok(chat_page)
}

fn config_browser(headed: bool) -> Result<BrowserConfig> {
    let builder = BrowserConfig::builder().no_sandbox();
    let builder = if headed {
        builder.with_head()
    } else {
        builder.headless_mode(chromiumoxide::browser::HeadlessMode::True)
    };
    builder
        .args([
            "--no-startup-window",
            "--remote-debugging-port=0",
            "--disable-popup-blocking",
            "--disable-crash-reporter",
            "--disable-sync-preferences",
            "--disable-background-timer-throttling",
            "--disable-renderer-backgrounding",
            "--disable-extensions",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--disable-default-apps",
            "--disable-sync",
            "--disable-translate",
            "--mute-audio",
            "--no-first-run",
            "--disable-backgrounding-occluded-windows",
            "--disable-blink-features=AutomationControlled", // Hides automation
            "--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
              AppleWebKit/537.36 (KHTML, like Gecko) \
              Chrome/133.0.0.0 Safari/537.36",
        ])
        .viewport(Some(Viewport {
            width: 1280,
            height: 720,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        }))
        .build()
        .map_err(Error::Config)
}

async fn wait_for_selector(page: &Page, selector: &str) -> Result<()> {
    for _ in 0..10 {
        if page.find_element(selector).await.is_ok() {
            return Ok(());
        }
        sleep(Duration::from_secs(2)).await;
    }
    Err(Error::Script(format!("selector `{selector}` not found")))
}

async fn get_iframe_url(page: &Page) -> Result<String> {
    page.find_element("iframe#chatframe")
        .await?
        .description()
        .await?
        .content_document
        .and_then(|doc| doc.document_url)
        .ok_or_else(|| Error::Script("chat iframe URL not found".into()))
}

/// One entry of the page-level observer queue.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DomEvent {
    id: String,
    kind: String,
    name: String,
    message: String,
    time: String,
    status: String,
}

impl DomEvent {
    fn into_event(self) -> ChatEvent {
        let observed_at = parse_observed_at(&self.time);
        let event = match self.kind.as_str() {
            "deletion" => ChatEvent::deletion(self.id, deletion_status(&self.status))
                .with_author(self.name)
                .with_text(self.message),
            "moderation" => {
                let (status, actor) = classify_notice(&self.message);
                ChatEvent::moderation(self.id, status, actor).with_author(self.name)
            }
            _ => ChatEvent::message(self.id, self.name, self.message),
        };
        event.observed_at(observed_at)
    }
}

/// ISO capture time from the page, in local time. Unparsable ⇒ now.
fn parse_observed_at(iso: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| Local::now())
}

/// Map the renderer's `#deleted-state` text onto a status label.
fn deletion_status(state: &str) -> String {
    let lower = state.to_lowercase();
    if lower.contains("retracted") {
        "Deleted by user".to_string()
    } else if lower.contains("deleted") || lower.contains("removed") {
        "Deleted by mod".to_string()
    } else {
        String::new()
    }
}

/// Split a moderation notice into a status label and the acting moderator.
fn classify_notice(text: &str) -> (String, String) {
    let lower = text.to_lowercase();
    let status = if lower.contains("timed out") || lower.contains("timeout") {
        "Timeout".to_string()
    } else if lower.contains("banned") || lower.contains("hidden") || lower.contains("removed") {
        "Banned".to_string()
    } else {
        text.trim().to_string()
    };
    let actor = text
        .rfind(" by ")
        .map(|i| text[i + 4..].trim().trim_end_matches('.').to_string())
        .unwrap_or_default();
    (status, actor)
}
