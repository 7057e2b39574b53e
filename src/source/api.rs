//! YouTube Data API v3 live chat poller.

use super::EventSource;
use crate::event::ChatEvent;
use crate::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:v=|youtu\.be/|/live/|/shorts/)([A-Za-z0-9_-]{11})").expect("valid regex")
});

/// Strip a full YouTube link down to its 11-character video id. Anything
/// that does not look like a link is returned trimmed.
pub fn normalize_video_id(input: &str) -> String {
    let input = input.trim();
    VIDEO_ID
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| input.to_string())
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub video_id: Option<String>,
    pub live_chat_id: Option<String>,
    pub cache_file: Option<PathBuf>,
    pub base_url: String,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            video_id: None,
            live_chat_id: None,
            cache_file: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct ApiSource {
    client: Client,
    config: ApiConfig,
    live_chat_id: String,
    page_token: Option<String>,
}

impl ApiSource {
    /// Resolve the live chat id (explicit id, then cache file, then a
    /// `videos.list` lookup) and return a ready poller.
    pub async fn connect(config: ApiConfig) -> Result<Self> {
        let client = Client::new();
        let live_chat_id = match config.live_chat_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let video = config
                    .video_id
                    .as_deref()
                    .map(normalize_video_id)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        Error::Config("either a live chat id or a video id is required".into())
                    })?;
                resolve_live_chat_id(&client, &config, &video).await?
            }
        };
        info!("Live chat id: {}", live_chat_id);

        Ok(Self {
            client,
            config,
            live_chat_id,
            page_token: None,
        })
    }

    pub fn live_chat_id(&self) -> &str {
        &self.live_chat_id
    }
}

async fn resolve_live_chat_id(client: &Client, config: &ApiConfig, video: &str) -> Result<String> {
    if let Some(cached) = config
        .cache_file
        .as_deref()
        .and_then(|path| read_cache(path, video))
    {
        debug!("Live chat id for {} read from cache", video);
        return Ok(cached);
    }

    let url = format!("{}/videos", config.base_url);
    let response = client
        .get(&url)
        .query(&[
            ("part", "liveStreamingDetails"),
            ("id", video),
            ("key", config.api_key.as_str()),
        ])
        .send()
        .await?;
    let videos: VideoList = decode(response).await?;
    let live_chat_id = active_live_chat_id(videos).ok_or_else(|| Error::NoLiveChat(video.into()))?;

    if let Some(cache) = config.cache_file.as_deref() {
        if let Err(err) = write_cache(cache, video, &live_chat_id) {
            warn!("Could not write live chat id cache {}: {}", cache.display(), err);
        }
    }
    Ok(live_chat_id)
}

/// Live chat id remembered for one video.
#[derive(Debug, Serialize, Deserialize)]
struct ChatIdCache {
    video_id: String,
    live_chat_id: String,
}

/// Cached live chat id for `video`. Entries for another video, empty ids
/// and files in any other format are ignored.
fn read_cache(path: &Path, video: &str) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let cached: ChatIdCache = serde_json::from_str(&raw).ok()?;
    if cached.video_id != video {
        debug!("Ignoring cached live chat id of video {}", cached.video_id);
        return None;
    }
    let id = cached.live_chat_id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn write_cache(path: &Path, video: &str, live_chat_id: &str) -> Result<()> {
    let entry = ChatIdCache {
        video_id: video.to_string(),
        live_chat_id: live_chat_id.to_string(),
    };
    std::fs::write(path, serde_json::to_string(&entry)?)?;
    Ok(())
}

fn active_live_chat_id(videos: VideoList) -> Option<String> {
    videos
        .items
        .into_iter()
        .next()?
        .live_streaming_details?
        .active_live_chat_id
        .filter(|id| !id.is_empty())
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

impl EventSource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&mut self) -> Result<Vec<ChatEvent>> {
        let url = format!("{}/liveChat/messages", self.config.base_url);
        let mut request = self.client.get(&url).query(&[
            ("liveChatId", self.live_chat_id.as_str()),
            ("part", "snippet,authorDetails"),
            ("key", self.config.api_key.as_str()),
        ]);
        if let Some(token) = &self.page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let page: MessageList = decode(request.send().await?).await?;
        if let Some(ms) = page.polling_interval_millis {
            debug!("API suggests polling every {} ms", ms);
        }
        if page.next_page_token.is_some() {
            self.page_token = page.next_page_token;
        }
        Ok(page.items.into_iter().map(to_event).collect())
    }
}

/// Map one `liveChatMessage` resource onto a chat event.
///
/// For moderation items `authorDetails` is the moderator who acted.
fn to_event(item: Item) -> ChatEvent {
    let Item {
        id,
        snippet,
        author_details,
    } = item;
    let author = author_details.display_name;

    match snippet.kind.as_str() {
        "messageDeletedEvent" => {
            let target = snippet
                .message_deleted_details
                .map(|d| d.deleted_message_id)
                .unwrap_or_default();
            ChatEvent::deletion(target, "Deleted by mod").with_actor(author)
        }
        "userBannedEvent" => {
            let details = snippet.user_banned_details.unwrap_or_default();
            ChatEvent::moderation(id, ban_status(&details), author)
                .with_author(details.banned_user_details.display_name)
        }
        // text, super chat, sticker and milestone messages all carry displayMessage
        _ => ChatEvent::message(id, author, snippet.display_message),
    }
}

fn ban_status(details: &BannedDetails) -> String {
    let seconds = details.ban_duration_seconds.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });
    match (details.ban_type.as_str(), seconds) {
        ("temporary", Some(secs)) => format!("Timeout – {} min", secs.div_ceil(60)),
        ("temporary", None) => "Timeout".to_string(),
        _ => "Banned".to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoList {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    active_live_chat_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    items: Vec<Item>,
    next_page_token: Option<String>,
    polling_interval_millis: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Item {
    id: String,
    snippet: Snippet,
    author_details: Profile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snippet {
    #[serde(rename = "type")]
    kind: String,
    display_message: String,
    message_deleted_details: Option<DeletedDetails>,
    user_banned_details: Option<BannedDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeletedDetails {
    deleted_message_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BannedDetails {
    banned_user_details: Profile,
    ban_type: String,
    ban_duration_seconds: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Profile {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
