//! Tests for the repair loop.
//!
//! The loop runs real `sh` scripts, so these are Unix-only. Agents are plain
//! closures that count their calls and record the prompts they receive.

#![cfg(unix)]

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hive_sandbox::{Interpreter, SandboxConfig, SandboxRunner};
use tokio_util::sync::CancellationToken;

fn shell_loop(config: RepairConfig) -> RepairLoop {
    let runner = SandboxRunner::new(SandboxConfig::new(Interpreter::shell()));
    RepairLoop::new(runner, config.with_language("sh"))
}

/// An agent that always answers with `reply` and counts its calls.
fn fixed_agent(
    reply: &'static str,
    calls: Arc<AtomicUsize>,
) -> impl Fn(String) -> std::future::Ready<Result<String, AgentError>> + Send + Sync {
    move |_prompt: String| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(reply.to_string()))
    }
}

mod success_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_success_on_first_attempt_never_calls_agent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 1", calls.clone());

        let outcome = shell_loop(RepairConfig::default())
            .repair("echo fine", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.status, RepairStatus::Success);
        assert_eq!(outcome.stop_reason, StopReason::Succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.final_code, "echo fine");
        assert_eq!(outcome.result.stdout, "fine\n");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_agent_fixes_on_first_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("Here you go:\n```sh\necho fixed\n```\n", calls.clone());

        let outcome = shell_loop(RepairConfig::default())
            .repair("exit 1", &agent)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.final_code, "echo fixed");
        assert_eq!(outcome.result.stdout, "fixed\n");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[0].code, "exit 1");
        assert!(outcome.history[0].diagnosis.is_some());
        assert!(outcome.history[1].diagnosis.is_none());
    }
}

mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_never_fixing_agent_exhausts_three_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 1", calls.clone());

        let outcome = shell_loop(RepairConfig::default())
            .repair("exit 1", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.status, RepairStatus::Failed);
        assert_eq!(outcome.stop_reason, StopReason::RetriesExhausted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.final_code, "exit 1");
        // No repair is requested after the final failed execution.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_final_code_is_last_executed_code() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let agent = move |_prompt: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 2;
            async move { Ok::<_, AgentError>(format!("```sh\nexit {n}\n```")) }
        };

        let outcome = shell_loop(RepairConfig::default())
            .repair("exit 1", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::RetriesExhausted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.final_code, "exit 3");
        assert_eq!(outcome.result.exit_code, 3);
        let codes: Vec<&str> = outcome.history.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["exit 1", "exit 2", "exit 3"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unchanged_code_stops_early() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("```sh\nexit 1\n```", calls.clone());

        let outcome = shell_loop(RepairConfig::default().with_stop_on_unchanged(true))
            .repair("exit 1\n", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.status, RepairStatus::Failed);
        assert_eq!(outcome.stop_reason, StopReason::UnchangedCode);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_fix_stops_after_it_fails_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 2", calls.clone());

        let outcome = shell_loop(RepairConfig::default().with_stop_on_unchanged(true))
            .repair("exit 1", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::UnchangedCode);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.final_code, "exit 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_agent_error_stops_loop() {
        let agent = |_prompt: String| async { Err::<String, _>(AgentError::from("rate limited")) };

        let outcome = shell_loop(RepairConfig::default())
            .repair("exit 4", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.status, RepairStatus::Failed);
        assert_eq!(
            outcome.stop_reason,
            StopReason::AgentFailed("rate limited".to_string())
        );
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.exit_code, 4);
    }

    #[tokio::test]
    async fn test_empty_reply_is_agent_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("```sh\n```", calls);

        let outcome = shell_loop(RepairConfig::default())
            .repair("exit 1", &agent)
            .await
            .unwrap();

        assert!(matches!(outcome.stop_reason, StopReason::AgentFailed(_)));
        assert_eq!(outcome.final_code, "exit 1");
    }

    #[tokio::test]
    async fn test_zero_retries_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 0", calls);

        let err = shell_loop(RepairConfig::default().with_max_retries(0))
            .repair("exit 0", &agent)
            .await
            .unwrap_err();

        assert_eq!(err, RepairError::InvalidMaxRetries);
    }

    #[tokio::test]
    async fn test_single_attempt_never_calls_agent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 0", calls.clone());

        let outcome = shell_loop(RepairConfig::default().with_max_retries(1))
            .repair("exit 1", &agent)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::RetriesExhausted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

mod prompt_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_agent_sees_code_and_stderr() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = prompts.clone();
        let agent = move |prompt: String| {
            seen.lock().unwrap().push(prompt);
            async { Ok::<_, AgentError>("echo ok".to_string()) }
        };

        let code = "echo 'boom' >&2\nexit 2";
        let outcome = shell_loop(RepairConfig::default())
            .repair(code, &agent)
            .await
            .unwrap();
        assert!(outcome.is_success());

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("The following sh code failed with an error.\nCODE:\n"));
        assert!(prompts[0].contains(code));
        assert!(prompts[0].contains("ERROR (STDERR):\nboom\n"));
        assert!(prompts[0].ends_with("provide the FULL FIXED sh code."));
    }
}

mod cancellation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cancel_during_agent_call() {
        let agent = |_prompt: String| std::future::pending::<Result<String, AgentError>>();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = shell_loop(RepairConfig::default())
            .repair_with_cancel("exit 1", &agent, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, RepairError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 0", calls);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = shell_loop(RepairConfig::default())
            .repair_with_cancel("exit 0", &agent, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, RepairError::Cancelled);
    }
}

mod convenience_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_free_function_uses_given_retries() {
        let runner = SandboxRunner::new(SandboxConfig::new(Interpreter::shell()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let agent = move |_prompt: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 2;
            std::future::ready(Ok::<_, AgentError>(format!("exit {n}")))
        };

        let outcome = repair(&runner, "exit 1", &agent, 5).await.unwrap();

        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.final_code, "exit 5");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_free_function_retries_identical_broken_code() {
        let runner = SandboxRunner::new(SandboxConfig::new(Interpreter::shell()));
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 2", calls.clone());

        let outcome = repair(&runner, "exit 1", &agent, 3).await.unwrap();

        assert_eq!(outcome.status, RepairStatus::Failed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.final_code, "exit 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_outcome_serializes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = fixed_agent("exit 0", calls);

        let outcome = shell_loop(RepairConfig::default())
            .repair("exit 1", &agent)
            .await
            .unwrap();
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["attempts"], 2);
        assert_eq!(json["stop_reason"]["reason"], "succeeded");
    }
}
