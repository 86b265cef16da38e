//! Doctor command - validate configuration and show status

use anyhow::Result;
use feedloom_adapters::http::{HttpClient, HttpError, RequestOptions};
use feedloom_adapters::lock::FileRunLock;
use feedloom_adapters::store::SqliteItemStore;
use feedloom_domain::{ItemStore, LockError, RunLock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::args::OutputArgs;
use crate::config::AppConfig;
use crate::context::build_classifier;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    data_dir: CheckResult,
    store: CheckResult,
    run_lock: CheckResult,
    rsshub: CheckResult,
    youtube: CheckResult,
    xiaohongshu: CheckResult,
    classifier: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(
    args: OutputArgs,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        data_dir: CheckResult::error("Not checked"),
        store: CheckResult::error("Not checked"),
        run_lock: CheckResult::error("Not checked"),
        rsshub: CheckResult::error("Not checked"),
        youtube: CheckResult::error("Not checked"),
        xiaohongshu: CheckResult::error("Not checked"),
        classifier: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    // Check config
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c.with_data_dir(data_dir))
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.data_dir = check_data_dir(&config.general.data_dir);
        if !report.data_dir.is_error() {
            report.store = check_store(&config.database_path()).await;
            report.run_lock = check_run_lock(&config.general.data_dir);
        }
        report.rsshub = check_rsshub(config).await;
        report.youtube = check_youtube(config);
        report.xiaohongshu = check_xiaohongshu(config);
        report.classifier = check_classifier(config);
    }

    // Determine overall status
    let checks = [
        &report.config,
        &report.data_dir,
        &report.store,
        &report.run_lock,
        &report.rsshub,
        &report.youtube,
        &report.xiaohongshu,
        &report.classifier,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    // Output report
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_data_dir(dir: &Path) -> CheckResult {
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult::error(format!(
            "Cannot create data directory {}: {}",
            dir.display(),
            e
        ));
    }

    let marker = dir.join(".doctor-write-check");
    match std::fs::write(&marker, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            CheckResult::ok(format!("Writable: {}", dir.display()))
        }
        Err(e) => CheckResult::error(format!(
            "Data directory not writable {}: {}",
            dir.display(),
            e
        )),
    }
}

async fn check_store(db_path: &Path) -> CheckResult {
    let store = match SqliteItemStore::new(db_path).await {
        Ok(store) => store,
        Err(e) => return CheckResult::error(format!("Failed to open item store: {}", e)),
    };

    match store.stats().await {
        Ok(stats) => CheckResult::ok(format!(
            "{} subscriptions ({} active), {} items",
            stats.subscriptions, stats.active_subscriptions, stats.items
        ))
        .with_details(serde_json::json!({
            "path": db_path.display().to_string(),
            "subscriptions": stats.subscriptions,
            "items": stats.items,
        })),
        Err(e) => CheckResult::error(format!("Failed to read item store: {}", e)),
    }
}

fn check_run_lock(data_dir: &Path) -> CheckResult {
    match FileRunLock::new(data_dir).try_acquire() {
        Ok(_) => CheckResult::ok("No update running"),
        Err(LockError::AlreadyRunning { holder }) => {
            let message = match holder {
                Some(h) => format!("Update in progress (pid {}, since {})", h.pid, h.started_at),
                None => "Update in progress".to_string(),
            };
            CheckResult::warn(message)
        }
        Err(e) => CheckResult::error(format!("Run lock unusable: {}", e)),
    }
}

async fn check_rsshub(config: &AppConfig) -> CheckResult {
    let base_url = config.rsshub.base_url.trim();
    if base_url.is_empty() {
        return CheckResult::error("rsshub.base_url is empty");
    }

    let http = match HttpClient::new(config.http_config()) {
        Ok(http) => http,
        Err(e) => return CheckResult::error(e.to_string()),
    };

    let options = RequestOptions::default()
        .timeout(Duration::from_secs(3))
        .retries(1);

    match http.get_with(base_url, &options).await {
        // Any HTTP answer means the service is up
        Ok(_) | Err(HttpError::Status { .. }) => {
            CheckResult::ok(format!("Reachable: {}", base_url))
        }
        Err(e) => CheckResult::warn(format!(
            "Not reachable: {} ({}). Bilibili, Weibo and Douyin need it",
            base_url, e
        )),
    }
}

fn check_youtube(config: &AppConfig) -> CheckResult {
    let command = &config.youtube.ytdlp_command;
    if command.trim().is_empty() {
        return CheckResult::error("youtube.ytdlp_command is empty");
    }

    if command_exists(command) {
        CheckResult::ok(format!("Extractor: {}", command))
    } else {
        CheckResult::warn(format!(
            "Extractor not found on PATH: {} (channel feeds will be used)",
            command
        ))
    }
}

fn check_xiaohongshu(config: &AppConfig) -> CheckResult {
    let section = &config.xiaohongshu;
    let helper = section
        .browser_command
        .as_deref()
        .filter(|c| !c.trim().is_empty());

    let capture = match (helper, &section.chrome_executable) {
        (Some(command), _) if !command_exists(command) => {
            return CheckResult::warn(format!("Browser helper not found on PATH: {}", command));
        }
        (Some(command), _) => format!("Browser helper: {}", command),
        (None, Some(path)) if !path.is_file() => {
            return CheckResult::warn(format!("Chromium binary missing: {}", path.display()));
        }
        (None, Some(path)) => format!("Chromium: {}", path.display()),
        (None, None) => "Chromium from PATH".to_string(),
    };

    match &section.cookies_path {
        Some(path) if path.is_file() => {
            CheckResult::ok(format!("{}, cookies: {}", capture, path.display()))
        }
        Some(path) => CheckResult::warn(format!(
            "Cookie file missing: {} (log in again to refresh it)",
            path.display()
        )),
        None if helper.is_some() => {
            CheckResult::warn("Browser helper configured without xiaohongshu.cookies_path")
        }
        None => CheckResult::ok("No cookie file configured (proxied feed only)"),
    }
}

fn check_classifier(config: &AppConfig) -> CheckResult {
    let section = &config.classifier;
    if section.categories.is_empty() {
        return CheckResult::error("classifier.categories is empty");
    }

    match build_classifier(config) {
        Ok((_, true)) => CheckResult::ok(format!(
            "Provider: {}, Categories: {}",
            section.provider,
            section.categories.join(", ")
        )),
        Ok((_, false)) => CheckResult::ok("Classification disabled"),
        Err(e) => match section.provider.as_str() {
            // A missing key only matters once an update runs
            "openai_compat" => CheckResult::warn(format!("{:#}", e)),
            _ => CheckResult::error(format!("{:#}", e)),
        },
    }
}

fn command_exists(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file();
    }

    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };

    for dir in std::env::split_paths(&paths) {
        if dir.join(command).is_file() {
            return true;
        }
    }

    false
}

fn print_report(report: &DoctorReport) {
    println!("feedloom Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Data dir", &report.data_dir);
    print_check("Item store", &report.store);
    print_check("Run lock", &report.run_lock);
    print_check("RSSHub", &report.rsshub);
    print_check("YouTube", &report.youtube);
    print_check("Xiaohongshu", &report.xiaohongshu);
    print_check("Classifier", &report.classifier);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall != "error" {
        println!();
        println!("Ready to run! Try: feedloom update");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
