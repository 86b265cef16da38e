//! Headless-browser capture
//!
//! `ChromiumBrowser` drives Chromium in-process. `CommandBrowser` delegates
//! to an external helper instead, which loads the page with the session
//! cookies, records the site's internal note-list response and a DOM
//! snapshot, then prints one JSON object on stdout:
//!
//! ```json
//! {"final_url": "...", "author": "...", "api_notes": [...], "dom_notes": [{"href": "...", "text": "..."}]}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapturedPage {
    /// URL the page ended on after redirects
    #[serde(default)]
    pub final_url: String,
    pub author: Option<String>,
    /// Raw notes from the intercepted `user_posted` response
    #[serde(default)]
    pub api_notes: Vec<Value>,
    #[serde(default)]
    pub dom_notes: Vec<DomNote>,
}

/// Anchor scraped from the rendered profile page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomNote {
    pub href: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to spawn browser helper {command}: {message}")]
    Spawn { command: String, message: String },
    #[error("Browser helper timed out after {0:?}")]
    Timeout(Duration),
    #[error("Browser helper failed: {0}")]
    Failed(String),
    #[error("Invalid browser helper output: {0}")]
    InvalidOutput(String),
    #[error("Unreadable cookie file {path}: {message}")]
    Cookies { path: PathBuf, message: String },
}

#[async_trait]
pub trait BrowserCapture: Send + Sync {
    async fn capture(&self, url: &str, cookies: &Path) -> Result<CapturedPage, BrowserError>;
}

/// Runs an external helper, substituting `{url}` and `{cookies}` in its args
pub struct CommandBrowser {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandBrowser {
    pub fn new(command: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl BrowserCapture for CommandBrowser {
    async fn capture(&self, url: &str, cookies: &Path) -> Result<CapturedPage, BrowserError> {
        let cookies = cookies.display().to_string();
        let args = expand_args(&self.args, url, &cookies);

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| BrowserError::Spawn {
            command: self.command.clone(),
            message: e.to_string(),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BrowserError::Timeout(self.timeout))?
            .map_err(|e| BrowserError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BrowserError::Failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| BrowserError::InvalidOutput(e.to_string()))
    }
}

fn expand_args(args: &[String], url: &str, cookies: &str) -> Vec<String> {
    args.iter()
        .map(|arg| arg.replace("{url}", url).replace("{cookies}", cookies))
        .collect()
}
