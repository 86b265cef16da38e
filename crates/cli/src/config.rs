//! Configuration loading and management

use anyhow::{Context, Result};
use feedloom_adapters::classify::{ClassifierConfig, KeywordRule, keyword::default_rules};
use feedloom_adapters::http::HttpConfig;
use feedloom_adapters::sources::{SourceConfig, XiaohongshuConfig, YoutubeConfig};
use feedloom_domain::usecases::{ReportConfig, UpdateConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "./feedloom.toml";
const DATABASE_FILE: &str = "feedloom.db";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub http: HttpSection,

    #[serde(default)]
    pub rsshub: RsshubSection,

    #[serde(default)]
    pub youtube: YoutubeSection,

    #[serde(default)]
    pub xiaohongshu: XiaohongshuSection,

    #[serde(default)]
    pub classifier: ClassifierSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    #[serde(default = "default_classify_timeout")]
    pub classify_timeout_secs: u64,

    #[serde(default = "default_category")]
    pub default_category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_http_retries")]
    pub retries: u32,

    #[serde(default = "default_backoff")]
    pub backoff_secs: f64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsshubSection {
    #[serde(default = "default_rsshub_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeSection {
    #[serde(default = "default_ytdlp_command")]
    pub ytdlp_command: String,

    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default = "default_youtube_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_playlist_items")]
    pub playlist_items: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XiaohongshuSection {
    #[serde(default = "default_xiaohongshu_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub browser_command: Option<String>,

    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,

    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// keyword, openai_compat, command, none
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Keyword table; empty means the built-in rules
    #[serde(default)]
    pub rules: Vec<KeywordRule>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_classifier_retries")]
    pub retries: u32,

    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_workers() -> usize {
    5
}

fn default_task_timeout() -> u64 {
    180
}

fn default_classify_timeout() -> u64 {
    30
}

fn default_category() -> String {
    "Other".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_http_retries() -> u32 {
    2
}

fn default_backoff() -> f64 {
    0.8
}

fn default_rsshub_base_url() -> String {
    "http://localhost:1200".to_string()
}

fn default_ytdlp_command() -> String {
    "yt-dlp".to_string()
}

fn default_youtube_timeout() -> u64 {
    20
}

fn default_playlist_items() -> u32 {
    15
}

fn default_xiaohongshu_timeout() -> u64 {
    15
}

fn default_browser_args() -> Vec<String> {
    vec!["{url}".to_string(), "{cookies}".to_string()]
}

fn default_provider() -> String {
    "keyword".to_string()
}

fn default_categories() -> Vec<String> {
    feedloom_adapters::classify::default_categories()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_output_tokens() -> u32 {
    16
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_classifier_timeout() -> u64 {
    30
}

fn default_classifier_retries() -> u32 {
    1
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            max_workers: default_max_workers(),
            task_timeout_secs: default_task_timeout(),
            classify_timeout_secs: default_classify_timeout(),
            default_category: default_category(),
        }
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            retries: default_http_retries(),
            backoff_secs: default_backoff(),
            user_agent: None,
        }
    }
}

impl Default for RsshubSection {
    fn default() -> Self {
        Self {
            base_url: default_rsshub_base_url(),
        }
    }
}

impl Default for YoutubeSection {
    fn default() -> Self {
        Self {
            ytdlp_command: default_ytdlp_command(),
            extra_args: vec![],
            timeout_secs: default_youtube_timeout(),
            playlist_items: default_playlist_items(),
        }
    }
}

impl Default for XiaohongshuSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_xiaohongshu_timeout(),
            browser_command: None,
            browser_args: default_browser_args(),
            chrome_executable: None,
            cookies_path: None,
        }
    }
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            categories: default_categories(),
            rules: vec![],
            model: default_model(),
            temperature: 0.0,
            max_output_tokens: default_max_output_tokens(),
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_classifier_timeout(),
            retries: default_classifier_retries(),
            command: String::new(),
            args: vec![],
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("FEEDLOOM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Apply the `--data-dir` override
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.general.data_dir = dir;
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.general.data_dir.join(DATABASE_FILE)
    }

    pub fn update_config(&self) -> UpdateConfig {
        UpdateConfig {
            max_workers: self.general.max_workers.max(1),
            task_timeout: Duration::from_secs(self.general.task_timeout_secs),
            classify_timeout: Duration::from_secs(self.general.classify_timeout_secs),
            default_category: self.general.default_category.clone(),
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            timeout: Duration::from_secs(self.http.timeout_secs),
            retries: self.http.retries.max(1),
            backoff: Duration::try_from_secs_f64(self.http.backoff_secs)
                .unwrap_or(defaults.backoff),
            user_agent: self
                .http
                .user_agent
                .clone()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            rsshub_base_url: self.rsshub.base_url.clone(),
            endpoints: Default::default(),
            youtube: YoutubeConfig {
                ytdlp_command: self.youtube.ytdlp_command.clone(),
                extra_args: self.youtube.extra_args.clone(),
                timeout: Duration::from_secs(self.youtube.timeout_secs),
                playlist_items: self.youtube.playlist_items.max(1),
            },
            xiaohongshu: XiaohongshuConfig {
                timeout: Duration::from_secs(self.xiaohongshu.timeout_secs),
                browser_command: self
                    .xiaohongshu
                    .browser_command
                    .clone()
                    .filter(|c| !c.trim().is_empty()),
                browser_args: self.xiaohongshu.browser_args.clone(),
                chrome_executable: self.xiaohongshu.chrome_executable.clone(),
                cookies_path: self.xiaohongshu.cookies_path.clone(),
            },
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            categories: self.classifier.categories.clone(),
            model: self.classifier.model.clone(),
            temperature: self.classifier.temperature,
            max_output_tokens: self.classifier.max_output_tokens,
            timeout_secs: self.classifier.timeout_secs,
            retries: self.classifier.retries,
        }
    }

    pub fn keyword_rules(&self) -> Vec<KeywordRule> {
        if self.classifier.rules.is_empty() {
            default_rules()
        } else {
            self.classifier.rules.clone()
        }
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            categories: self.classifier.categories.clone(),
            ..Default::default()
        }
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# feedloom configuration

[general]
data_dir = "./data"
log_level = "info"
max_workers = 5
task_timeout_secs = 180
classify_timeout_secs = 30
default_category = "Other"

[http]
timeout_secs = 10
retries = 2
backoff_secs = 0.8
# user_agent = "Mozilla/5.0 ..."

[rsshub]
base_url = "http://localhost:1200"

[youtube]
ytdlp_command = "yt-dlp"
extra_args = []  # e.g. ["--cookies", "/path/to/cookies.txt"]
timeout_secs = 20
playlist_items = 15

[xiaohongshu]
timeout_secs = 15
# Session cookies (JSON list or storage state); enables headless Chromium capture
# cookies_path = "./data/xiaohongshu_cookies.json"
# chrome_executable = "/usr/bin/chromium"
# External helper used instead of Chromium, prints captured notes as JSON
# browser_command = "xhs-capture"
browser_args = ["{url}", "{cookies}"]

[classifier]
provider = "keyword"  # keyword, openai_compat, command, none
categories = ["Tech", "Culture", "Design", "Entertainment", "Other"]
model = "gpt-4o-mini"
timeout_secs = 30
retries = 1

# openai_compat
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"

# command (prompt on stdin, label on stdout)
# command = "ollama"
# args = ["run", "{model}"]

# Keyword table for the keyword provider; omit to use the built-in rules
# [[classifier.rules]]
# category = "Tech"
# keywords = ["rust", "gpu", "科技"]
"#
        .to_string()
    }
}
