//! External-command target processor.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ProcessorConfig;
use crate::error::{FleetError, ProcessError, Result};
use crate::traits::{ItemOutcome, TargetProcessor};
use crate::types::Target;

/// Runs one external command per target.
///
/// Exit code 0 is success. If stdout is a JSON object with `inserted` /
/// `updated` counts those are recorded, otherwise the target counts as
/// processed with no changes.
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| FleetError::Config("processor.command is empty".into()))?;

        let mut processor = Self::new(program.clone()).args(args.iter().cloned());
        if let Some(secs) = config.timeout_secs {
            processor = processor.timeout(Duration::from_secs(secs));
        }
        Ok(processor)
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn render_args(&self, target: &Target) -> Vec<String> {
        let url = target.url.as_deref().unwrap_or(&target.key);
        self.args
            .iter()
            .map(|arg| arg.replace("{key}", &target.key).replace("{url}", url))
            .collect()
    }

    fn build_command(&self, target: &Target) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(target))
            .env("CRAWL_TARGET_KEY", &target.key)
            // Explicitly set stdin to null to prevent hanging on interactive prompts
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(url) = &target.url {
            cmd.env("CRAWL_TARGET_URL", url);
        }
        cmd
    }
}

fn parse_outcome(stdout: &[u8]) -> ItemOutcome {
    let text = String::from_utf8_lossy(stdout);
    let last_line = text.lines().rev().find(|l| !l.trim().is_empty());
    last_line
        .and_then(|line| serde_json::from_str::<ItemOutcome>(line.trim()).ok())
        .unwrap_or_default()
}

#[async_trait]
impl TargetProcessor for CommandProcessor {
    async fn process(&self, target: &Target) -> std::result::Result<ItemOutcome, ProcessError> {
        let child = self
            .build_command(target)
            .spawn()
            .map_err(ProcessError::Unavailable)?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(ProcessError::Timeout {
                        key: target.key.clone(),
                        secs: limit.as_secs(),
                    })
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ProcessError::Failed {
            key: target.key.clone(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::Failed {
                key: target.key.clone(),
                reason: format!(
                    "{} exited with code {:?}: {}",
                    self.program,
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        Ok(parse_outcome(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_substituted() {
        let processor = CommandProcessor::new("crawl").args(["--key", "{key}", "--url={url}"]);

        let plain = Target::new("alpha");
        assert_eq!(
            processor.render_args(&plain),
            vec!["--key", "alpha", "--url=alpha"]
        );

        let with_url = Target::new("bravo").with_url("https://bravo.example");
        assert_eq!(
            processor.render_args(&with_url),
            vec!["--key", "bravo", "--url=https://bravo.example"]
        );
    }

    #[test]
    fn test_outcome_from_last_json_line() {
        let outcome = parse_outcome(b"fetched 3 pages\n{\"inserted\": 2, \"updated\": 1}\n");
        assert_eq!(
            outcome,
            ItemOutcome {
                inserted: 2,
                updated: 1
            }
        );
        assert_eq!(parse_outcome(b"ok\n"), ItemOutcome::default());
        assert_eq!(parse_outcome(b""), ItemOutcome::default());
    }

    #[test]
    fn test_empty_command_is_a_config_error() {
        let config = ProcessorConfig::default();
        assert!(matches!(
            CommandProcessor::from_config(&config),
            Err(FleetError::Config(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_maps_to_result() {
        let ok = CommandProcessor::new("sh").args(["-c", "echo '{\"inserted\": 1}'"]);
        assert_eq!(
            ok.process(&Target::new("a")).await.unwrap(),
            ItemOutcome::inserted(1)
        );

        let failing = CommandProcessor::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = failing.process(&Target::new("b")).await.unwrap_err();
        assert!(matches!(err, ProcessError::Failed { ref key, .. } if key == "b"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_reported() {
        let slow = CommandProcessor::new("sleep")
            .args(["5"])
            .timeout(Duration::from_millis(100));
        let err = slow.process(&Target::new("slow")).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }
}
