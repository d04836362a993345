//! Fallback orchestration across providers, credentials and models

use std::fmt;
use std::sync::Arc;
use log::{debug, info, trace, warn};

use crate::config::{AllmConfig, FailoverConfig, ProviderConfig};
use crate::credentials::{mask_credential, CredentialPool};
use crate::error::{Error, Result};
use crate::ladder::ModelLadder;
use crate::providers::{ChatCompletionsAdapter, ProviderAdapter};
use crate::request::{
  AttemptRecord, AttemptResult, GenerationRequest, GenerationResponse
};
use crate::{ChatMessage, ResponseFormat};

/// Where a single generate run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState
{   NotStarted
  , TryingProvider(usize)
  , TryingCredential(usize, usize)
  , TryingModel(usize, usize, usize)
  , Succeeded
  , AllExhausted
}

impl fmt::Display for FailoverState
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self
        {   FailoverState::NotStarted => write!(f, "not-started")
          , FailoverState::TryingProvider(i) => {
              write!(f, "provider[{}]", i)
            }
          , FailoverState::TryingCredential(i, j) => {
              write!(f, "provider[{}]/key[{}]", i, j)
            }
          , FailoverState::TryingModel(i, j, k) => {
              write!(f, "provider[{}]/key[{}]/model[{}]", i, j, k)
            }
          , FailoverState::Succeeded => write!(f, "succeeded")
          , FailoverState::AllExhausted => write!(f, "all-exhausted")
        }
    }
}

/// A configured provider paired with the adapter that speaks to it.
pub struct ProviderEntry
{   pub config: ProviderConfig
  , pub adapter: Arc<dyn ProviderAdapter>
}

/// Result of one orchestrator run together with its attempt trace.
#[derive(Debug, Clone)]
pub struct FailoverOutcome
{   pub result: Result<GenerationResponse>
  , pub trace: Vec<AttemptRecord>
}

/// Walks providers, then credentials, then models, in configured order,
/// and returns the first non-empty completion.
///
/// The orchestrator holds only immutable configuration. Every run keeps
/// its own cursors, so one instance can serve concurrent requests.
/// There is a single pass per request: no backoff, no second lap.
pub struct Orchestrator
{   providers: Vec<ProviderEntry>
  , failover: FailoverConfig
}

impl Orchestrator
{   pub fn new(failover: FailoverConfig) -> Self
    {   Orchestrator
        {   providers: vec![]
          , failover
        }
    }

    /// Append a provider at the lowest priority.
    pub fn with_provider(
      mut self
    , config: ProviderConfig
    , adapter: Arc<dyn ProviderAdapter>
    ) -> Self
    {   debug!("Registering provider {} at priority {}",
          adapter.name(), self.providers.len());
        self.providers.push(ProviderEntry { config, adapter });
        self
    }

    /// One chat-completions adapter per configured provider, all
    /// sharing `http_client`.
    pub fn from_config(
      config: &AllmConfig
    , http_client: reqwest::Client
    ) -> Self
    {   config.providers.iter().fold(
          Orchestrator::new(config.failover.clone()),
          |orchestrator, provider| {
            let adapter = ChatCompletionsAdapter::from_config(
              provider, http_client.clone()
            );
            orchestrator.with_provider(provider.clone(), Arc::new(adapter))
          }
        )
    }

    pub fn providers(&self) -> &[ProviderEntry]
    {   &self.providers
    }

    /// Providers with at least one credential and one model.
    pub fn available_providers(&self) -> usize
    {   self.providers.iter().filter(|p| p.config.is_available()).count()
    }

    /// `generate(messages, jsonMode) -> text`
    pub async fn generate_text(
      &self
    , messages: Vec<ChatMessage>
    , json_mode: bool
    ) -> Result<String>
    {   let request = GenerationRequest::new(messages)
          .with_format(ResponseFormat::from_json_mode(json_mode));
        self.generate(&request).await.map(|r| r.content)
    }

    pub async fn generate(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResponse>
    {   self.generate_traced(request).await.result
    }

    /// Run the ladder and keep the trace of every attempt made.
    pub async fn generate_traced(
      &self
    , request: &GenerationRequest
    ) -> FailoverOutcome
    {   let mut trace = Vec::new();

        if let Err(e) = request.validate()
        {   warn!("Rejecting request before any provider call: {}", e);
            return FailoverOutcome { result: Err(e), trace };
        }

        let mut state = FailoverState::NotStarted;
        trace!("Failover state: {}", state);
        let hint = request.model_hint.as_deref();

        for (i, entry) in self.providers.iter().enumerate()
        {   let provider = &entry.config;
            let name = entry.adapter.name();
            if !provider.is_available()
            {   debug!("Skipping {}: no credentials configured", name);
                continue;
            }
            state = FailoverState::TryingProvider(i);
            trace!("Failover state: {}", state);

            let ladder = ModelLadder::with_hint(&provider.models, hint);

            'credentials: for (j, credential)
              in CredentialPool::new(&provider.credentials)
            {   state = FailoverState::TryingCredential(i, j);
                trace!("Failover state: {}", state);

                for (k, model) in ladder.iter().enumerate()
                {   state = FailoverState::TryingModel(i, j, k);
                    trace!("Failover state: {}", state);

                    let result = entry.adapter
                      .attempt(request, model, credential)
                      .await;

                    let status = match &result
                    {   AttemptResult::Success(_) => None
                      , AttemptResult::RecoverableFailure(reason)
                      | AttemptResult::FatalFailure(reason) => reason.status
                    };
                    trace.push(AttemptRecord
                    {   provider: name.to_string()
                      , model: model.to_string()
                      , credential: mask_credential(credential)
                      , outcome: result.kind()
                      , status
                    });

                    match result
                    {   AttemptResult::Success(content) => {
                          state = FailoverState::Succeeded;
                          info!(
                            "{} answered with {} after {} attempts ({})",
                            name, model, trace.len(), state
                          );
                          return FailoverOutcome
                          {   result: Ok(GenerationResponse
                              {   content
                                , provider: name.to_string()
                                , model: model.to_string()
                                , attempts: trace.len()
                              })
                            , trace
                          };
                        }
                      , AttemptResult::RecoverableFailure(reason) => {
                          warn!(
                            "{} / {} / key {} failed (recoverable): {}",
                            name, model,
                            mask_credential(credential), reason
                          );
                        }
                      , AttemptResult::FatalFailure(reason) => {
                          warn!(
                            "{} / {} / key {} failed (fatal): {}",
                            name, model,
                            mask_credential(credential), reason
                          );
                          if self.failover.skip_provider_on_fatal
                          {   debug!("Leaving {} after fatal failure",
                                name);
                            break 'credentials;
                          }
                        }
                    }
                }
            }
        }

        state = FailoverState::AllExhausted;
        warn!("Failover {} after {} attempts", state, trace.len());
        FailoverOutcome
        {   result: Err(Error::AllProvidersExhausted
            {   attempts: trace.len()
            })
          , trace
        }
    }
}
