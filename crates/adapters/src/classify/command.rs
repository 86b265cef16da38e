//! Local command classifier

use async_trait::async_trait;
use feedloom_domain::{Classifier, ClassifyError};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ClassifierConfig, build_classification_prompt, match_category};

/// Classifier that shells out to a local CLI command.
///
/// The prompt goes to stdin unless an argument contains `{prompt}`; the
/// label is read from stdout.
pub struct CommandClassifier {
    command: String,
    args: Vec<String>,
    config: ClassifierConfig,
}

impl CommandClassifier {
    pub fn new(command: String, args: Vec<String>, config: ClassifierConfig) -> Self {
        Self {
            command,
            args,
            config,
        }
    }

    async fn run_command(&self, prompt: &str) -> Result<String, ClassifyError> {
        let (expanded_args, used_prompt_arg) = expand_args(&self.args, prompt, &self.config.model);

        let mut command = Command::new(&self.command);
        command
            .args(&expanded_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if used_prompt_arg {
            command.stdin(Stdio::null());
        } else {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|e| {
            ClassifyError::Api(format!("Failed to spawn command {}: {}", self.command, e))
        })?;

        if !used_prompt_arg {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(prompt.as_bytes()).await.map_err(|e| {
                    ClassifyError::Api(format!("Failed to write to stdin: {}", e))
                })?;
            }
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ClassifyError::Timeout)?
        .map_err(|e| ClassifyError::Api(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassifyError::Api(format!(
                "Command exited with {}: {}",
                output.status, stderr
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ClassifyError::InvalidFormat(e.to_string()))?;
        if stdout.trim().is_empty() {
            return Err(ClassifyError::InvalidFormat("Empty response".to_string()));
        }

        Ok(stdout)
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn classify(&self, title: &str, description: &str) -> Result<String, ClassifyError> {
        let prompt = build_classification_prompt(title, description, &self.config.categories);

        let mut last_error = None;
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                tracing::warn!(attempt = attempt, "Retrying classification");
                tokio::time::sleep(Duration::from_millis(500 * 2_u64.pow(attempt))).await;
            }

            match self.run_command(&prompt).await {
                Ok(reply) => match match_category(&reply, &self.config.categories) {
                    Some(label) => return Ok(label),
                    None => {
                        tracing::warn!(reply = %reply.trim(), "Reply is not a known category");
                        last_error = Some(ClassifyError::InvalidFormat(reply.trim().to_string()));
                    }
                },
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ClassifyError::Api("Unknown error".to_string())))
    }
}

fn expand_args(args: &[String], prompt: &str, model: &str) -> (Vec<String>, bool) {
    let mut used_prompt_arg = false;
    let expanded = args
        .iter()
        .map(|arg| {
            if arg.contains("{prompt}") {
                used_prompt_arg = true;
            }
            arg.replace("{prompt}", prompt).replace("{model}", model)
        })
        .collect();

    (expanded, used_prompt_arg)
}
