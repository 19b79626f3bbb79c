//! Retry and fallback across model tiers and provider families.
//!
//! Targets are walked strictly forward: primary model, then the primary
//! family's fallback model, then the secondary family. `CascadeState` is the
//! whole state machine; `ProviderCascade::run` only performs calls and waits.

use analysis_core::{ProviderFamily, ProviderTarget};
use llm_client::{CompletionProvider, CompletionRequest, ProviderError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::retry::{FailureKind, RetryPolicy, Sleeper, TokioSleeper};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    #[error("no AI backend configured")]
    NoProviders,

    #[error("all providers failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ProviderError },
}

/// Successful completion and the target that produced it
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub text: String,
    pub target: ProviderTarget,
    pub attempts: u32,
}

/// What the control loop does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Wait, then call the same target again
    Retry { delay: Duration },
    /// Hand over to the same family's fallback tier
    Promote { to: usize },
    /// Current target's budget is spent; continue with the next one
    Advance { to: usize },
    /// Family unusable; jump to the first target of the next family
    SkipFamily { to: usize },
    Exhausted,
}

/// Per-call cascade bookkeeping. Never shared between analyses.
#[derive(Debug, Clone, Default)]
pub struct CascadeState {
    pub current_target_index: usize,
    pub attempts_on_current_target: u32,
    pub total_attempts: u32,
    last_error: Option<ProviderError>,
    last_rate_limited: Option<ProviderError>,
}

impl CascadeState {
    pub fn begin_attempt(&mut self) {
        self.total_attempts += 1;
    }

    /// Record a failure on the current target and decide the next step
    pub fn record_failure(
        &mut self,
        targets: &[ProviderTarget],
        policy: &RetryPolicy,
        error: ProviderError,
    ) -> Transition {
        let kind = RetryPolicy::classify(&error);
        self.attempts_on_current_target += 1;
        if kind == FailureKind::RateLimited {
            self.last_rate_limited = Some(error.clone());
        }
        self.last_error = Some(error);

        let idx = self.current_target_index;
        let family = targets[idx].family;

        if kind == FailureKind::Unavailable {
            let next_family = targets
                .iter()
                .enumerate()
                .skip(idx + 1)
                .find(|(_, t)| t.family != family)
                .map(|(i, _)| i);
            return match next_family {
                Some(to) => {
                    self.move_to(to);
                    Transition::SkipFamily { to }
                }
                None => Transition::Exhausted,
            };
        }

        let has_same_family_successor = targets
            .get(idx + 1)
            .map(|t| t.family == family)
            .unwrap_or(false);
        if has_same_family_successor && policy.should_promote(kind, self.attempts_on_current_target) {
            self.move_to(idx + 1);
            return Transition::Promote { to: idx + 1 };
        }

        if self.attempts_on_current_target < policy.attempts_per_target() {
            return Transition::Retry {
                delay: policy.backoff(self.attempts_on_current_target),
            };
        }

        if idx + 1 < targets.len() {
            self.move_to(idx + 1);
            Transition::Advance { to: idx + 1 }
        } else {
            Transition::Exhausted
        }
    }

    fn move_to(&mut self, index: usize) {
        self.current_target_index = index;
        self.attempts_on_current_target = 0;
    }

    /// Error to report once everything failed; rate limits win over the last error
    pub fn terminal_error(&self) -> Option<&ProviderError> {
        self.last_rate_limited.as_ref().or(self.last_error.as_ref())
    }

    fn into_error(self) -> CascadeError {
        let attempts = self.total_attempts;
        match self.last_rate_limited.or(self.last_error) {
            Some(last) => CascadeError::Exhausted { attempts, last },
            None => CascadeError::NoProviders,
        }
    }
}

/// Ordered provider targets plus the clients that serve them
pub struct ProviderCascade {
    targets: Vec<ProviderTarget>,
    clients: HashMap<ProviderFamily, Arc<dyn CompletionProvider>>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ProviderCascade {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            targets: Vec::new(),
            clients: HashMap::new(),
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Primary family: main model plus an optional fallback tier.
    ///
    /// Primary targets always precede secondary ones.
    pub fn with_primary(
        mut self,
        client: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
        fallback_model: Option<String>,
    ) -> Self {
        debug_assert_eq!(client.family(), ProviderFamily::Primary, "{} is not a primary backend", client.backend_name());
        let model = model.into();
        let mut primary = vec![ProviderTarget::new(ProviderFamily::Primary, model.clone())];
        if let Some(fallback) = fallback_model.filter(|m| !m.trim().is_empty() && *m != model) {
            primary.push(ProviderTarget::fallback(ProviderFamily::Primary, fallback));
        }
        primary.extend(
            self.targets
                .drain(..)
                .filter(|t| t.family != ProviderFamily::Primary),
        );
        self.targets = primary;
        self.clients.insert(ProviderFamily::Primary, client);
        self
    }

    pub fn with_secondary(mut self, client: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        debug_assert_eq!(client.family(), ProviderFamily::Secondary, "{} is not a secondary backend", client.backend_name());
        self.targets.retain(|t| t.family != ProviderFamily::Secondary);
        self.targets
            .push(ProviderTarget::new(ProviderFamily::Secondary, model.into()));
        self.clients.insert(ProviderFamily::Secondary, client);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn targets(&self) -> &[ProviderTarget] {
        &self.targets
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_available(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Drive the request through every target until one answers
    pub async fn run(&self, request: &CompletionRequest) -> Result<CascadeOutcome, CascadeError> {
        if self.targets.is_empty() {
            return Err(CascadeError::NoProviders);
        }

        let mut state = CascadeState::default();
        loop {
            let target = &self.targets[state.current_target_index];
            state.begin_attempt();

            let result = match self.clients.get(&target.family) {
                Some(client) => self.call_once(client.as_ref(), target, request).await,
                None => Err(ProviderError::Unavailable(format!(
                    "no client registered for {}",
                    target.family.label()
                ))),
            };

            let error = match result {
                Ok(text) => {
                    return Ok(CascadeOutcome {
                        text,
                        target: target.clone(),
                        attempts: state.total_attempts,
                    })
                }
                Err(e) => e,
            };

            let short: String = error.to_string().chars().take(100).collect();
            tracing::warn!(
                "[{}] attempt {}/{} failed: {}",
                target,
                state.attempts_on_current_target + 1,
                self.policy.attempts_per_target(),
                short
            );

            match state.record_failure(&self.targets, &self.policy, error) {
                Transition::Retry { delay } => {
                    tracing::info!("[{}] retrying in {:.1}s", target, delay.as_secs_f64());
                    self.sleeper.sleep(delay).await;
                }
                Transition::Promote { to } => {
                    tracing::warn!("[{}] rate limited, switching to fallback model {}", target, self.targets[to]);
                }
                Transition::Advance { to } => {
                    tracing::warn!("[{}] retries exhausted, moving on to {}", target, self.targets[to]);
                }
                Transition::SkipFamily { to } => {
                    tracing::warn!("[{}] provider unavailable, switching to {}", target, self.targets[to]);
                }
                Transition::Exhausted => {
                    tracing::error!("All AI providers failed after {} attempts", state.total_attempts);
                    return Err(state.into_error());
                }
            }
        }
    }

    async fn call_once(
        &self,
        client: &dyn CompletionProvider,
        target: &ProviderTarget,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let timeout = self.policy.call_timeout;
        match tokio::time::timeout(timeout, client.complete(&target.model_name, request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }
}
