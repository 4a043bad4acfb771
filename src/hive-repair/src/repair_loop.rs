//! Execute, diagnose, repair, retry.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hive_common::config::RepairSection;
use hive_common::timeout::DEFAULT_MAX_RETRIES;
use hive_sandbox::{SandboxError, SandboxResult, SandboxRunner};

use crate::agent::RepairAgent;
use crate::diagnose::{Diagnosis, ErrorKind, diagnose};
use crate::fence::extract_code;
use crate::prompt::build_prompt;
use crate::{RepairError, RepairResult};

/// Repair loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairConfig {
    /// Maximum number of executions, counting the first one.
    pub max_retries: u32,
    /// Stop when the agent hands back the code that just failed.
    pub stop_on_unchanged: bool,
    /// Language named in prompts and preferred when extracting fenced code.
    pub language: String,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            stop_on_unchanged: false,
            language: "python".to_string(),
        }
    }
}

impl RepairConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_stop_on_unchanged(mut self, stop: bool) -> Self {
        self.stop_on_unchanged = stop;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl From<&RepairSection> for RepairConfig {
    fn from(section: &RepairSection) -> Self {
        Self {
            max_retries: section.max_retries,
            stop_on_unchanged: section.stop_on_unchanged,
            language: section.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Success,
    Failed,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    Succeeded,
    /// The last allowed attempt failed.
    RetriesExhausted,
    /// The agent returned the code that had just failed.
    UnchangedCode,
    /// The agent errored or returned no code.
    AgentFailed(String),
}

/// One execution inside a repair run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairAttempt {
    /// 1-based.
    pub attempt: u32,
    pub code: String,
    pub result: SandboxResult,
    /// Set for failed attempts.
    pub diagnosis: Option<Diagnosis>,
}

/// Final state of a repair run.
///
/// `final_code` is the last code that was executed and `result` is its
/// outcome; the agent is never asked for a fix that would not be run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub final_code: String,
    pub result: SandboxResult,
    pub attempts: u32,
    pub status: RepairStatus,
    pub stop_reason: StopReason,
    pub history: Vec<RepairAttempt>,
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RepairStatus::Success
    }
}

/// Drives a code unit through repeated execution and repair.
#[derive(Debug, Clone, Default)]
pub struct RepairLoop {
    runner: SandboxRunner,
    config: RepairConfig,
}

impl RepairLoop {
    pub fn new(runner: SandboxRunner, config: RepairConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    pub fn runner(&self) -> &SandboxRunner {
        &self.runner
    }

    /// Run `initial_code`, asking `agent` for a fix after each failure.
    pub async fn repair<A>(&self, initial_code: &str, agent: &A) -> RepairResult<RepairOutcome>
    where
        A: RepairAgent + ?Sized,
    {
        self.repair_with_cancel(initial_code, agent, &CancellationToken::new())
            .await
    }

    /// Like [`repair`](Self::repair), aborting with [`RepairError::Cancelled`]
    /// when `cancel` fires during an execution or an agent call.
    pub async fn repair_with_cancel<A>(
        &self,
        initial_code: &str,
        agent: &A,
        cancel: &CancellationToken,
    ) -> RepairResult<RepairOutcome>
    where
        A: RepairAgent + ?Sized,
    {
        let max_retries = self.config.max_retries;
        if max_retries == 0 {
            return Err(RepairError::InvalidMaxRetries);
        }

        let mut code = initial_code.to_string();
        let mut history: Vec<RepairAttempt> = Vec::new();
        let mut attempt = 1;

        loop {
            info!(attempt, max_retries, "Executing code");

            let result = match self.runner.run_with_cancel(&code, cancel).await {
                Ok(result) => result,
                Err(SandboxError::Cancelled) => return Err(RepairError::Cancelled),
            };

            if result.success {
                info!(attempt, "Execution succeeded");
                history.push(RepairAttempt {
                    attempt,
                    code: code.clone(),
                    result: result.clone(),
                    diagnosis: None,
                });
                return Ok(finish(code, result, history, StopReason::Succeeded));
            }

            let diagnosis = diagnose(&result);
            warn!(
                attempt,
                exit_code = result.exit_code,
                kind = %diagnosis.kind,
                "Execution failed"
            );
            history.push(RepairAttempt {
                attempt,
                code: code.clone(),
                result: result.clone(),
                diagnosis: Some(diagnosis.clone()),
            });

            if attempt >= max_retries {
                error!(attempts = attempt, "Max retries reached, repair failed");
                return Ok(finish(code, result, history, StopReason::RetriesExhausted));
            }

            let hint = (diagnosis.kind != ErrorKind::Unknown || diagnosis.exception.is_some())
                .then_some(&diagnosis);
            let prompt = build_prompt(&self.config.language, &code, &result, hint);

            debug!(attempt, "Requesting repair from agent");
            let response = tokio::select! {
                response = agent.repair(prompt) => response,
                _ = cancel.cancelled() => return Err(RepairError::Cancelled),
            };

            let fixed = match response {
                Ok(text) => extract_code(&text, Some(&self.config.language)),
                Err(e) => {
                    warn!(attempt, error = %e, "Repair agent failed");
                    return Ok(finish(
                        code,
                        result,
                        history,
                        StopReason::AgentFailed(e.to_string()),
                    ));
                }
            };

            if fixed.trim().is_empty() {
                warn!(attempt, "Repair agent returned no code");
                return Ok(finish(
                    code,
                    result,
                    history,
                    StopReason::AgentFailed("Repair agent returned no code".to_string()),
                ));
            }

            if self.config.stop_on_unchanged && fixed.trim() == code.trim() {
                warn!(attempt, "Repair agent returned unchanged code");
                return Ok(finish(code, result, history, StopReason::UnchangedCode));
            }

            code = fixed;
            attempt += 1;
        }
    }
}

/// Run the repair loop once with default settings and `max_retries` attempts.
pub async fn repair<A>(
    runner: &SandboxRunner,
    initial_code: &str,
    agent: &A,
    max_retries: u32,
) -> RepairResult<RepairOutcome>
where
    A: RepairAgent + ?Sized,
{
    RepairLoop::new(
        runner.clone(),
        RepairConfig::default().with_max_retries(max_retries),
    )
    .repair(initial_code, agent)
    .await
}

fn finish(
    final_code: String,
    result: SandboxResult,
    history: Vec<RepairAttempt>,
    stop_reason: StopReason,
) -> RepairOutcome {
    let status = if stop_reason == StopReason::Succeeded {
        RepairStatus::Success
    } else {
        RepairStatus::Failed
    };

    RepairOutcome {
        final_code,
        result,
        attempts: history.len() as u32,
        status,
        stop_reason,
        history,
    }
}
