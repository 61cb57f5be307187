//! Provider registry and call routing.
//!
//! Every model call flows through [`LlmManager::complete`]: it resolves the
//! provider/model route for the pipeline stage, applies privacy routing,
//! enforces the per-call timeout and bounded retry budget, and records a
//! cost entry per attempt whether or not the call succeeded.

use crate::error::LlmError;
use crate::pricing::estimate_cost;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use trellis_core::config::{LlmConfig, PrivacyConfig, StageRoute};
use trellis_core::error::{KnowledgeError, KnowledgeResult};
use trellis_core::traits::{
    CompletionProvider, CompletionRequest, CompletionResponse, CostSink, LlmPurpose,
};
use trellis_core::types::CostRecord;
use uuid::Uuid;

/// Routes completion requests to registered providers
pub struct LlmManager {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    llm: LlmConfig,
    privacy: PrivacyConfig,
    cost_sink: Arc<dyn CostSink>,
}

impl LlmManager {
    pub fn new(llm: LlmConfig, privacy: PrivacyConfig, cost_sink: Arc<dyn CostSink>) -> Self {
        Self {
            providers: HashMap::new(),
            llm,
            privacy,
            cost_sink,
        }
    }

    /// Register a provider under its own name
    pub fn register(&mut self, provider: Arc<dyn CompletionProvider>) -> &mut Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Resolve the route for a stage, applying privacy routing.
    ///
    /// Evaluated on every call: the sensitive-tag check always reflects the
    /// tags passed in, so content tagged sensitive after creation is routed
    /// locally from that point on.
    fn resolve_route(&self, purpose: LlmPurpose, content_tags: &[String]) -> (StageRoute, bool) {
        if self.privacy.requires_local(content_tags) {
            return (self.llm.local_route.clone(), true);
        }
        (self.llm.route_for(purpose).clone(), false)
    }

    /// Issue a completion for a pipeline stage.
    ///
    /// The route's model replaces whatever model the request names. Each
    /// attempt (including failures and timeouts) produces one cost record.
    pub async fn complete(
        &self,
        purpose: LlmPurpose,
        content_tags: &[String],
        mut request: CompletionRequest,
    ) -> KnowledgeResult<CompletionResponse> {
        let (route, forced_local) = self.resolve_route(purpose, content_tags);
        let provider = self.providers.get(&route.provider).ok_or_else(|| {
            KnowledgeError::from(LlmError::UnknownProvider(route.provider.clone()))
        })?;

        // Privacy routing must never fall through to a remote provider
        if forced_local && !provider.is_local() {
            return Err(KnowledgeError::Provider(format!(
                "privacy routing selected '{}', which is not a local provider",
                route.provider
            )));
        }

        request.model = route.model.clone();
        debug!(
            purpose = purpose.as_str(),
            provider = %route.provider,
            model = %route.model,
            forced_local,
            "Routing completion"
        );

        let timeout = Duration::from_secs(self.llm.timeout_secs);
        let mut last_error = None;
        for attempt in 0..=self.llm.max_retries {
            let started = Instant::now();
            let outcome = tokio::time::timeout(timeout, provider.complete(request.clone())).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(response)) => {
                    let cost = estimate_cost(&response.model, &response.usage, provider.is_local());
                    self.record(CostRecord {
                        request_id: Uuid::new_v4().to_string(),
                        provider: route.provider.clone(),
                        model: response.model.clone(),
                        purpose: purpose.as_str().to_string(),
                        prompt_tokens: response.usage.prompt_tokens,
                        completion_tokens: response.usage.completion_tokens,
                        total_tokens: response.usage.total_tokens,
                        cost,
                        latency_ms,
                        success: true,
                        error: None,
                        created_at: Utc::now(),
                    })
                    .await;
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    warn!(
                        purpose = purpose.as_str(),
                        provider = %route.provider,
                        attempt,
                        error = %e,
                        "Completion attempt failed"
                    );
                    self.record(CostRecord::failure(
                        route.provider.clone(),
                        route.model.clone(),
                        purpose.as_str(),
                        latency_ms,
                        e.to_string(),
                    ))
                    .await;
                    last_error = Some(e);
                }
                Err(_) => {
                    let e = KnowledgeError::from(LlmError::Timeout(self.llm.timeout_secs));
                    warn!(
                        purpose = purpose.as_str(),
                        provider = %route.provider,
                        attempt,
                        "Completion attempt timed out"
                    );
                    self.record(CostRecord::failure(
                        route.provider.clone(),
                        route.model.clone(),
                        purpose.as_str(),
                        latency_ms,
                        e.to_string(),
                    ))
                    .await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| KnowledgeError::Provider("no completion attempts made".into())))
    }

    async fn record(&self, record: CostRecord) {
        // Accounting must never fail the call it accounts for
        if let Err(e) = self.cost_sink.record(record).await {
            warn!(error = %e, "Failed to record model call cost");
        }
    }
}
