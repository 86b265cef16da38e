//! In-process headless Chromium capture
//!
//! Loads the profile page with the stored session cookies, records every
//! `user_posted` note-list response the page requests, then snapshots the
//! rendered note anchors and the author name.

use super::browser::{BrowserCapture, BrowserError, CapturedPage, DomNote};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventResponseReceived, GetResponseBodyParams, RequestId, SetCookiesParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_COOKIE_DOMAIN: &str = ".xiaohongshu.com";
const NOTE_WAIT: Duration = Duration::from_secs(8);
const NOTE_POLL: Duration = Duration::from_millis(500);
const SETTLE: Duration = Duration::from_millis(1500);

const AUTHOR_JS: &str = r#"(() => {
  const el = document.querySelector('.user-name, .info .username, .user-nickname');
  return el ? el.innerText.trim() : null;
})()"#;

const DOM_NOTES_JS: &str = r#"(() => {
  let sections = document.querySelectorAll('section.note-item');
  if (sections.length === 0) sections = document.querySelectorAll('.note-item');
  const notes = [];
  for (const section of sections) {
    const cover = section.querySelector('a.cover');
    if (!cover) continue;
    notes.push({ href: cover.getAttribute('href') || '', text: section.innerText || '' });
  }
  return notes;
})()"#;

/// Cookie as exported by Playwright-style session stores
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: Option<bool>,
    #[serde(default)]
    http_only: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<StoredCookie>),
    State { cookies: Vec<StoredCookie> },
}

fn parse_cookies(json: &str) -> Result<Vec<StoredCookie>, serde_json::Error> {
    let cookies = match serde_json::from_str(json)? {
        CookieFile::List(cookies) | CookieFile::State { cookies } => cookies,
    };
    Ok(cookies
        .into_iter()
        .filter(|c| !c.name.is_empty())
        .collect())
}

impl StoredCookie {
    fn into_param(self) -> CookieParam {
        let mut param = CookieParam::new(self.name, self.value);
        param.domain = Some(
            self.domain
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_COOKIE_DOMAIN.to_string()),
        );
        param.path = Some(self.path.unwrap_or_else(|| "/".to_string()));
        param.secure = self.secure;
        param.http_only = self.http_only;
        param
    }
}

/// Note list from a captured `user_posted` response body
fn notes_from_response(body: &str) -> Vec<Value> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/data/notes").and_then(Value::as_array).cloned())
        .unwrap_or_default()
}

fn is_note_list(url: &str) -> bool {
    url.contains("user_posted") || url.contains("user/posted")
}

/// Drives a local Chromium through the DevTools protocol
pub struct ChromiumBrowser {
    executable: Option<PathBuf>,
    timeout: Duration,
}

impl ChromiumBrowser {
    /// `executable` overrides the Chrome/Chromium binary found on PATH
    pub fn new(executable: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable,
            timeout,
        }
    }

    fn launch_config(&self) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder().window_size(1280, 800);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(|message| BrowserError::Spawn {
            command: self.command_name(),
            message,
        })
    }

    fn command_name(&self) -> String {
        self.executable
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "chromium".to_string())
    }

    async fn run(
        &self,
        url: &str,
        cookies: Vec<CookieParam>,
    ) -> Result<CapturedPage, BrowserError> {
        let (mut browser, mut handler) = Browser::launch(self.launch_config()?)
            .await
            .map_err(|e| BrowserError::Spawn {
                command: self.command_name(),
                message: e.to_string(),
            })?;
        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = capture_page(&browser, url, cookies).await;

        if let Err(e) = browser.close().await {
            tracing::debug!(error = %e, "Failed to close browser");
        }
        let _ = browser.wait().await;
        driver.abort();

        result
    }
}

async fn capture_page(
    browser: &Browser,
    url: &str,
    cookies: Vec<CookieParam>,
) -> Result<CapturedPage, BrowserError> {
    let page = browser.new_page("about:blank").await.map_err(failed)?;
    page.execute(SetCookiesParams::new(cookies))
        .await
        .map_err(failed)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<RequestId>();
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(failed)?;
    let listener = tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            if is_note_list(&event.response.url) && tx.send(event.request_id.clone()).is_err() {
                break;
            }
        }
    });

    page.goto(url).await.map_err(failed)?;
    let final_url = page.url().await.map_err(failed)?.unwrap_or_default();

    let mut captured = CapturedPage {
        final_url,
        ..Default::default()
    };
    if captured.final_url.contains("captcha") || captured.final_url.contains("login") {
        listener.abort();
        return Ok(captured);
    }

    wait_for_notes(&page).await;
    tokio::time::sleep(SETTLE).await;
    listener.abort();

    while let Ok(request_id) = rx.try_recv() {
        match page.execute(GetResponseBodyParams::new(request_id)).await {
            Ok(response) if !response.result.base64_encoded => {
                captured
                    .api_notes
                    .extend(notes_from_response(&response.result.body));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Note list body unavailable"),
        }
    }

    captured.author = page
        .evaluate(AUTHOR_JS)
        .await
        .ok()
        .and_then(|r| r.into_value::<Option<String>>().ok())
        .flatten()
        .filter(|a| !a.is_empty());
    captured.dom_notes = match page.evaluate(DOM_NOTES_JS).await {
        Ok(result) => result.into_value::<Vec<DomNote>>().unwrap_or_default(),
        Err(e) => {
            tracing::debug!(error = %e, "DOM note snapshot failed");
            Vec::new()
        }
    };

    Ok(captured)
}

/// Poll until a note card renders or the wait runs out
async fn wait_for_notes(page: &Page) {
    let deadline = tokio::time::Instant::now() + NOTE_WAIT;
    while tokio::time::Instant::now() < deadline {
        if page.find_element(".note-item, .feeds-container").await.is_ok() {
            return;
        }
        tokio::time::sleep(NOTE_POLL).await;
    }
}

fn failed(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Failed(e.to_string())
}

#[async_trait]
impl BrowserCapture for ChromiumBrowser {
    async fn capture(&self, url: &str, cookies: &Path) -> Result<CapturedPage, BrowserError> {
        let json = tokio::fs::read_to_string(cookies)
            .await
            .map_err(|e| BrowserError::Cookies {
                path: cookies.to_path_buf(),
                message: e.to_string(),
            })?;
        let params: Vec<CookieParam> = parse_cookies(&json)
            .map_err(|e| BrowserError::Cookies {
                path: cookies.to_path_buf(),
                message: e.to_string(),
            })?
            .into_iter()
            .map(StoredCookie::into_param)
            .collect();

        tokio::time::timeout(self.timeout, self.run(url, params))
            .await
            .map_err(|_| BrowserError::Timeout(self.timeout))?
    }
}
