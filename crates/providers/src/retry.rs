//! Retry wrapper: bounded re-attempts with a per-attempt timeout.
//!
//! Wraps any provider. Only transient failures (rate limits, timeouts,
//! network errors) are retried; everything else is returned immediately.
//! No backoff schedule is imposed: a rate-limited attempt waits the
//! `retry_after_secs` the service asked for, other transient failures retry
//! at once.

use async_trait::async_trait;
use groundchat_config::RetryConfig;
use groundchat_core::error::ProviderError;
use groundchat_core::provider::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that re-attempts transient failures of an inner provider.
pub struct RetryProvider {
    inner: Arc<dyn groundchat_core::Provider>,
    max_attempts: u32,
    timeout: Duration,
}

impl RetryProvider {
    /// Wrap a provider. `max_attempts` is clamped to at least one.
    pub fn new(inner: Arc<dyn groundchat_core::Provider>, max_attempts: u32, timeout: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            timeout,
        }
    }

    /// Wrap a provider using the `[retry]` configuration section.
    pub fn from_config(inner: Arc<dyn groundchat_core::Provider>, config: &RetryConfig) -> Self {
        Self::new(inner, config.max_attempts, Duration::from_secs(config.timeout_secs))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn attempt<T, F, Fut>(&self, operation: &str, mut call: F) -> std::result::Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let provider_name = self.inner.name().to_string();
        let mut attempt = 1;

        loop {
            let error = match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "Provider '{}' {} timed out after {}s",
                    provider_name,
                    operation,
                    self.timeout.as_secs()
                )),
            };

            if attempt >= self.max_attempts || !error.is_transient() {
                return Err(error);
            }

            warn!(
                provider = %provider_name,
                operation,
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Retry: transient failure, trying again"
            );

            if let ProviderError::RateLimited { retry_after_secs } = error {
                info!(provider = %provider_name, retry_after_secs, "Retry: honouring rate limit");
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
            }

            attempt += 1;
        }
    }
}

#[async_trait]
impl groundchat_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.attempt("completion", || self.inner.complete(request.clone())).await
    }

    /// Only establishing the stream is retried; a stream that fails midway
    /// surfaces the error to the consumer.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        self.attempt("stream", || self.inner.stream(request.clone())).await
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        self.attempt("embedding", || self.inner.embed(request.clone())).await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundchat_core::message::Message;
    use groundchat_core::Provider;
    use std::sync::Mutex;

    /// Fails with the scripted errors in order, then succeeds.
    struct FlakyProvider {
        failures: Mutex<Vec<ProviderError>>,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl groundchat_core::Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(ProviderResponse {
                    message: Message::assistant("success"),
                    usage: None,
                    model: "test-model".into(),
                })
            } else {
                Err(failures.remove(0))
            }
        }

        async fn embed(
            &self,
            _request: EmbeddingRequest,
        ) -> std::result::Result<EmbeddingResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(ProviderError::Network("down".into()))
        }
    }

    /// Hangs forever (for timeout testing).
    struct HangingProvider;

    #[async_trait]
    impl groundchat_core::Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Timeout("unreachable".into()))
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest {
            model: "test".into(),
            messages: vec![Message::user("hello")],
            temperature: 0.3,
            max_tokens: None,
            tools: vec![],
            stream: false,
            stop: vec![],
        }
    }

    #[tokio::test]
    async fn single_attempt_does_not_retry() {
        let inner = Arc::new(FlakyProvider::new(vec![ProviderError::Network("reset".into())]));
        let retry = RetryProvider::new(inner.clone(), 1, Duration::from_secs(5));

        let result = retry.complete(test_request()).await;
        assert!(matches!(result, Err(ProviderError::Network(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::Network("reset".into()),
            ProviderError::Timeout("slow".into()),
        ]));
        let retry = RetryProvider::new(inner.clone(), 3, Duration::from_secs(5));

        let result = retry.complete(test_request()).await.unwrap();
        assert_eq!(result.message.content, "success");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let inner = Arc::new(FlakyProvider::new(vec![ProviderError::AuthenticationFailed(
            "bad key".into(),
        )]));
        let retry = RetryProvider::new(inner.clone(), 5, Duration::from_secs(5));

        let result = retry.complete(test_request()).await;
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let inner = Arc::new(FlakyProvider::new(vec![ProviderError::Network("x".into()); 10]));
        let retry = RetryProvider::new(inner.clone(), 2, Duration::from_secs(5));

        assert!(retry.complete(test_request()).await.is_err());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_then_retries() {
        let inner = Arc::new(FlakyProvider::new(vec![ProviderError::RateLimited {
            retry_after_secs: 30,
        }]));
        let retry = RetryProvider::new(inner.clone(), 2, Duration::from_secs(120));

        let result = retry.complete(test_request()).await;
        assert!(result.is_ok());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_becomes_timeout_error() {
        let retry = RetryProvider::new(Arc::new(HangingProvider), 1, Duration::from_millis(50));
        match retry.complete(test_request()).await {
            Err(ProviderError::Timeout(msg)) => assert!(msg.contains("hanging")),
            other => panic!("Expected Timeout, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn embeddings_are_retried_too() {
        let inner = Arc::new(FlakyProvider::new(vec![]));
        let retry = RetryProvider::new(inner.clone(), 3, Duration::from_secs(5));
        let result = retry
            .embed(EmbeddingRequest { model: "e".into(), inputs: vec!["q".into()] })
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls(), 3);
    }

    #[test]
    fn zero_attempts_clamped() {
        let retry = RetryProvider::new(Arc::new(HangingProvider), 0, Duration::from_secs(1));
        assert_eq!(retry.max_attempts(), 1);
    }

    #[test]
    fn from_config_reads_section() {
        let config = RetryConfig { max_attempts: 4, timeout_secs: 9 };
        let retry = RetryProvider::from_config(Arc::new(HangingProvider), &config);
        assert_eq!(retry.max_attempts(), 4);
        assert_eq!(retry.timeout, Duration::from_secs(9));
    }
}
