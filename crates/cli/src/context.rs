//! Dependency wiring shared by the commands

use anyhow::{Context, Result, bail};
use feedloom_adapters::{
    classify::{CommandClassifier, KeywordClassifier, OpenAiCompatClassifier},
    http::HttpClient,
    lock::FileRunLock,
    reports::ReportFiles,
    sources::PlatformRegistry,
    store::SqliteItemStore,
};
use feedloom_domain::{
    Classifier, SystemClock,
    usecases::{SubscriptionManager, UpdateOrchestrator},
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;

pub type Orchestrator =
    UpdateOrchestrator<SqliteItemStore, PlatformRegistry, dyn Classifier, FileRunLock, SystemClock>;

pub type Manager = SubscriptionManager<SqliteItemStore, PlatformRegistry>;

/// Everything a command needs, built once from the configuration
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<SqliteItemStore>,
    pub registry: Arc<PlatformRegistry>,
    pub reports: ReportFiles,
}

impl AppContext {
    pub async fn load(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config = AppConfig::load(config_path.as_deref())?.with_data_dir(data_dir);
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let db_path = config.database_path();
        let store = Arc::new(
            SqliteItemStore::new(&db_path)
                .await
                .with_context(|| format!("Failed to open item store: {}", db_path.display()))?,
        );

        let http = HttpClient::new(config.http_config()).context("Failed to build HTTP client")?;
        let registry = Arc::new(PlatformRegistry::new(http, &config.source_config()));
        let reports = ReportFiles::new(&config.general.data_dir);

        Ok(Self {
            config,
            store,
            registry,
            reports,
        })
    }

    pub fn manager(&self) -> Manager {
        SubscriptionManager::new(Arc::clone(&self.store), Arc::clone(&self.registry))
    }

    /// Orchestrator plus whether classification is enabled at all
    pub fn orchestrator(&self) -> Result<(Orchestrator, bool)> {
        let (classifier, enabled) = build_classifier(&self.config)?;
        let orchestrator = UpdateOrchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            classifier,
            Arc::new(FileRunLock::new(&self.config.general.data_dir)),
            Arc::new(SystemClock),
            self.config.update_config(),
        );
        Ok((orchestrator, enabled))
    }
}

pub(crate) fn build_classifier(config: &AppConfig) -> Result<(Arc<dyn Classifier>, bool)> {
    let default_category = config.general.default_category.clone();
    let section = &config.classifier;

    match section.provider.as_str() {
        "keyword" => Ok((
            Arc::new(KeywordClassifier::new(config.keyword_rules(), default_category)),
            true,
        )),
        "openai_compat" => {
            let base_url = section.base_url.trim();
            if base_url.is_empty() {
                bail!("OpenAI-compatible base_url is required");
            }
            let api_key = load_api_key(&section.api_key_env, "openai_compat")?;
            let classifier = OpenAiCompatClassifier::new(
                api_key,
                base_url.to_string(),
                config.classifier_config(),
            )
            .context("Failed to configure OpenAI-compatible classifier")?;
            Ok((Arc::new(classifier), true))
        }
        "command" => {
            if section.command.trim().is_empty() {
                bail!("Command classifier requires classifier.command");
            }
            Ok((
                Arc::new(CommandClassifier::new(
                    section.command.clone(),
                    section.args.clone(),
                    config.classifier_config(),
                )),
                true,
            ))
        }
        "none" => Ok((
            Arc::new(KeywordClassifier::new(vec![], default_category)),
            false,
        )),
        other => bail!("Unknown classifier provider: {}", other),
    }
}

pub(crate) fn load_api_key(env_var: &str, provider: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No API key env var configured for provider {}", provider);
    }

    let key = std::env::var(env_var).with_context(|| {
        format!(
            "Missing API key env var {} for provider {}",
            env_var, provider
        )
    })?;

    if key.trim().is_empty() {
        bail!(
            "API key env var {} is empty for provider {}",
            env_var,
            provider
        );
    }

    Ok(SecretString::new(key.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_provider_disables_classification() {
        let mut config = AppConfig::default();
        config.classifier.provider = "none".to_string();

        let (classifier, enabled) = build_classifier(&config).unwrap();
        assert!(!enabled);
        assert_eq!(
            classifier.classify("Rust 2024", "").await.unwrap(),
            "Other"
        );
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = AppConfig::default();
        config.classifier.provider = "magic".to_string();
        assert!(build_classifier(&config).is_err());

        config.classifier.provider = "command".to_string();
        assert!(build_classifier(&config).is_err());
    }
}
