//! Ordered provider fallback.

use super::{LlmError, LlmProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One failed attempt in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

/// A successful result and the provider that produced it.
#[derive(Debug, Clone)]
pub struct Served<T> {
    pub value: T,
    pub provider: &'static str,
    /// Failures of providers tried before `provider`.
    pub failures: Vec<ProviderFailure>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("No LLM providers configured for {0}")]
    NoProviders(String),

    #[error("All {} LLM provider(s) failed for {operation}; last error: {}", .failures.len(), last_failure(.failures))]
    Exhausted {
        operation: String,
        failures: Vec<ProviderFailure>,
    },
}

fn last_failure(failures: &[ProviderFailure]) -> String {
    failures.last().map(ToString::to_string).unwrap_or_default()
}

impl GatewayError {
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            GatewayError::NoProviders(_) => &[],
            GatewayError::Exhausted { failures, .. } => failures,
        }
    }
}

/// Run `attempt` against each provider in order until one succeeds.
///
/// Every attempt is bounded by `timeout`. A failed provider is never retried.
pub async fn attempt_in_order<T, F, Fut>(
    providers: &[Arc<dyn LlmProvider>],
    timeout: Duration,
    operation: &str,
    mut attempt: F,
) -> Result<Served<T>, GatewayError>
where
    F: FnMut(Arc<dyn LlmProvider>) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    if providers.is_empty() {
        return Err(GatewayError::NoProviders(operation.to_string()));
    }

    let mut failures = Vec::new();

    for provider in providers {
        let name = provider.name();
        let result = match tokio::time::timeout(timeout, attempt(Arc::clone(provider))).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(timeout)),
        };

        match result {
            Ok(value) => {
                if failures.is_empty() {
                    log::info!("{} served by {}", operation, name);
                } else {
                    log::info!(
                        "{} served by {} after {} failed attempt(s)",
                        operation,
                        name,
                        failures.len()
                    );
                }
                return Ok(Served {
                    value,
                    provider: name,
                    failures,
                });
            }
            Err(e) => {
                log::warn!("{} failed on {}: {}", operation, name, e);
                failures.push(ProviderFailure {
                    provider: name.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Err(GatewayError::Exhausted {
        operation: operation.to_string(),
        failures,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;

    fn chain(providers: Vec<FakeProvider>) -> Vec<Arc<dyn LlmProvider>> {
        providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
            .collect()
    }

    async fn run(providers: &[Arc<dyn LlmProvider>]) -> Result<Served<String>, GatewayError> {
        attempt_in_order(providers, Duration::from_secs(8), "test", |p| async move {
            p.complete("s", "u").await
        })
        .await
    }

    #[tokio::test]
    async fn test_third_provider_serves() {
        let providers = chain(vec![
            FakeProvider::failing("a"),
            FakeProvider::failing("b"),
            FakeProvider::replying("c", "ok"),
        ]);
        let served = run(&providers).await.unwrap();
        assert_eq!(served.value, "ok");
        assert_eq!(served.provider, "c");
        assert_eq!(
            served.failures.iter().map(|f| f.provider.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn test_first_success_stops_chain() {
        let second = Arc::new(FakeProvider::replying("b", "late"));
        let providers: Vec<Arc<dyn LlmProvider>> = vec![
            Arc::new(FakeProvider::replying("a", "first")) as Arc<dyn LlmProvider>,
            second.clone() as Arc<dyn LlmProvider>,
        ];
        let served = run(&providers).await.unwrap();
        assert_eq!(served.provider, "a");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_fail_is_aggregate_error() {
        let providers = chain(vec![FakeProvider::failing("a"), FakeProvider::failing("b")]);
        let err = run(&providers).await.unwrap_err();
        assert_eq!(err.failures().len(), 2);
        assert!(err.to_string().contains("b: API error: b is down"));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        assert!(matches!(run(&[]).await, Err(GatewayError::NoProviders(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_advances_chain() {
        let providers = chain(vec![FakeProvider::hanging("slow"), FakeProvider::replying("fast", "ok")]);
        let served = run(&providers).await.unwrap();
        assert_eq!(served.provider, "fast");
        assert!(served.failures[0].message.contains("timed out"));
    }
}
