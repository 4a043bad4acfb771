//! The repair agent seam.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

/// Error reported by a repair agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AgentError(pub String);

impl From<String> for AgentError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for AgentError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Proposes a fix for failing code.
///
/// The agent receives a prompt holding the failing code and its error output
/// and answers with free-form text containing the full corrected code.
/// Implementations are usually backed by a language model.
#[async_trait]
pub trait RepairAgent: Send + Sync {
    async fn repair(&self, prompt: String) -> Result<String, AgentError>;
}

#[async_trait]
impl<F, Fut> RepairAgent for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, AgentError>> + Send + 'static,
{
    async fn repair(&self, prompt: String) -> Result<String, AgentError> {
        (self)(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl RepairAgent for Echo {
        async fn repair(&self, prompt: String) -> Result<String, AgentError> {
            Ok(prompt)
        }
    }

    #[tokio::test]
    async fn test_struct_agent() {
        let agent: &dyn RepairAgent = &Echo;
        assert_eq!(agent.repair("x".to_string()).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_closure_agent() {
        let agent = |prompt: String| async move {
            if prompt.is_empty() {
                Err(AgentError::from("empty prompt"))
            } else {
                Ok(prompt.to_uppercase())
            }
        };

        assert_eq!(agent.repair("abc".to_string()).await.unwrap(), "ABC");
        assert_eq!(
            agent.repair(String::new()).await.unwrap_err().to_string(),
            "empty prompt"
        );
    }
}
