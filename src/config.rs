//! Configuration for providers, search and failover behavior
//!
//! Built once at startup, then shared read-only. `from_env` reads the
//! process environment; `from_lookup` takes any key lookup so tests can
//! build synthetic configurations.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

pub const GROQ_ENDPOINT: &str
  = "https://api.groq.com/openai/v1/chat/completions";
pub const OPENROUTER_ENDPOINT: &str
  = "https://openrouter.ai/api/v1/chat/completions";
pub const MISTRAL_ENDPOINT: &str
  = "https://api.mistral.ai/v1/chat/completions";
pub const SERPER_ENDPOINT: &str
  = "https://google.serper.dev/search";

pub const GROQ_MODELS: &[&str]
  = &["gemma2-9b-it", "llama3-70b-8192", "mixtral-8x7b-32768"];
pub const OPENROUTER_MODELS: &[&str] = &["openai/gpt-4o"];
pub const MISTRAL_MODELS: &[&str] = &["mistral-small-latest"];

pub const DEFAULT_PROVIDER_ORDER: &[&str]
  = &["groq", "openrouter", "mistral"];
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 1024;

/// Region code meaning "no region restriction".
pub const GLOBAL_REGION: &str = "global";

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig
{   /// Provider name, used in logs and traces
    pub name: String
  , /// API keys, tried first to last
    pub credentials: Vec<String>
  , /// Model ladder, most preferred first
    pub models: Vec<String>
  , /// Chat-completions URL
    pub endpoint: String
  , /// Extra headers sent with every call
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>
  , /// Sampling temperature
    pub temperature: Option<f32>
  , /// Max tokens to generate
    pub max_tokens: Option<usize>
}

impl ProviderConfig
{   pub fn new(
      name: impl Into<String>
    , endpoint: impl Into<String>
    , credentials: Vec<String>
    , models: Vec<String>
    ) -> Self
    {   ProviderConfig
        {   name: name.into()
          , credentials
          , models
          , endpoint: endpoint.into()
          , extra_headers: vec![]
          , temperature: Some(DEFAULT_TEMPERATURE)
          , max_tokens: Some(DEFAULT_MAX_TOKENS)
        }
    }

    pub fn with_header(
      mut self
    , name: impl Into<String>
    , value: impl Into<String>
    ) -> Self
    {   self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// A provider without keys is treated as not configured at all.
    pub fn is_available(&self) -> bool
    {   !self.credentials.is_empty() && !self.models.is_empty()
    }

    pub fn validate(&self) -> Result<()>
    {   if self.name.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "provider name is empty".to_string()
            ));
        }
        if !self.credentials.is_empty() && self.models.is_empty()
        {   return Err(Error::InvalidConfiguration(format!(
              "provider {} has credentials but no models", self.name
            )));
        }
        if self.endpoint.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(format!(
              "provider {} has no endpoint", self.name
            )));
        }
        Ok(())
    }
}

/// Web search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig
{   /// Search API keys, tried first to last
    pub credentials: Vec<String>
  , pub endpoint: String
  , /// One upstream query per entry, run concurrently.
    /// `None` queries without a region.
    pub regions: Vec<Option<String>>
}

impl SearchConfig
{   pub fn new(credentials: Vec<String>) -> Self
    {   SearchConfig
        {   credentials
          , endpoint: SERPER_ENDPOINT.to_string()
          , regions: vec![Some("us".to_string())]
        }
    }
}

impl Default for SearchConfig
{   fn default() -> Self
    {   SearchConfig::new(vec![])
    }
}

/// Failover configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverConfig
{   /// On a fatal failure, jump to the next provider instead of the
    /// next model of the same provider
    pub skip_provider_on_fatal: bool
}

/// ALLM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllmConfig
{   /// Providers in priority order
    pub providers: Vec<ProviderConfig>
  , pub search: SearchConfig
  , pub failover: FailoverConfig
  , /// Per-call timeout in seconds
    pub request_timeout_secs: u64
}

impl Default for AllmConfig
{   fn default() -> Self
    {   AllmConfig
        {   providers: vec![]
          , search: SearchConfig::default()
          , failover: FailoverConfig::default()
          , request_timeout_secs: DEFAULT_TIMEOUT_SECS
        }
    }
}

impl AllmConfig
{   /// Load from the process environment.
    pub fn from_env() -> Result<Self>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
      F: Fn(&str) -> Option<String>
    {   let order = match lookup("ALLM_PROVIDER_ORDER")
        {   Some(raw) => parse_list(&raw.to_ascii_lowercase())
          , None => DEFAULT_PROVIDER_ORDER.iter()
              .map(|s| s.to_string())
              .collect()
        };

        let mut providers = Vec::with_capacity(order.len());
        for name in &order
        {   let provider = preset_from_lookup(name, &lookup)?;
            if provider.credentials.is_empty()
            {   info!("Provider {} has no credentials, disabled", name);
            } else
            {   debug!(
                  "Provider {} loaded with {} keys, {} models",
                  provider.name,
                  provider.credentials.len(),
                  provider.models.len()
                );
            }
            providers.push(provider);
        }

        let mut search = SearchConfig::new(
          lookup("SERPER_API_KEYS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default()
        );
        if let Some(raw) = lookup("SEARCH_REGIONS")
        {   let regions = parse_regions(&raw);
            if !regions.is_empty()
            {   search.regions = regions;
            }
        }
        if search.credentials.is_empty()
        {   warn!("SERPER_API_KEYS not set, web search disabled");
        }

        let request_timeout_secs = match lookup("ALLM_REQUEST_TIMEOUT_SECS")
        {   Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
              Error::InvalidConfiguration(format!(
                "ALLM_REQUEST_TIMEOUT_SECS is not a number: {}", raw
              ))
            })?
          , None => DEFAULT_TIMEOUT_SECS
        };

        let failover = FailoverConfig
        {   skip_provider_on_fatal: lookup("ALLM_SKIP_PROVIDER_ON_FATAL")
              .map(|raw| parse_flag(&raw))
              .unwrap_or(false)
        };

        let config = AllmConfig
        {   providers
          , search
          , failover
          , request_timeout_secs
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()>
    {   if self.request_timeout_secs == 0
        {   return Err(Error::InvalidConfiguration(
              "request timeout must be positive".to_string()
            ));
        }
        for provider in &self.providers
        {   provider.validate()?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration
    {   Duration::from_secs(self.request_timeout_secs)
    }

    /// Shared HTTP client honoring the request timeout.
    pub fn http_client(&self) -> Result<reqwest::Client>
    {   reqwest::Client::builder()
          .timeout(self.request_timeout())
          .build()
          .map_err(Error::from)
    }
}

fn preset_from_lookup<F>(name: &str, lookup: &F) -> Result<ProviderConfig>
where
  F: Fn(&str) -> Option<String>
{   let (endpoint, default_models) = match name
    {   "groq" => (GROQ_ENDPOINT, GROQ_MODELS)
      , "openrouter" => (OPENROUTER_ENDPOINT, OPENROUTER_MODELS)
      , "mistral" => (MISTRAL_ENDPOINT, MISTRAL_MODELS)
      , other => {
          return Err(Error::InvalidConfiguration(format!(
            "unknown provider in ALLM_PROVIDER_ORDER: {}", other
          )));
        }
    };

    let prefix = name.to_ascii_uppercase();
    let mut credentials = lookup(&format!("{}_API_KEYS", prefix))
      .map(|raw| parse_list(&raw))
      .unwrap_or_default();
    if let Some(single) = lookup(&format!("{}_API_KEY", prefix))
    {   credentials.extend(parse_list(&single));
        credentials = dedup(credentials);
    }

    let models = lookup(&format!("{}_MODELS", prefix))
      .map(|raw| parse_list(&raw))
      .filter(|models| !models.is_empty())
      .unwrap_or_else(|| {
        default_models.iter().map(|m| m.to_string()).collect()
      });

    let mut provider = ProviderConfig::new(
      name, endpoint, credentials, models
    );
    if name == "openrouter"
    {   provider = provider
          .with_header(
            "HTTP-Referer",
            lookup("YOUR_SITE_URL")
              .unwrap_or_else(|| "http://localhost:9002".to_string())
          )
          .with_header(
            "X-Title",
            lookup("YOUR_SITE_NAME")
              .unwrap_or_else(|| "KWS Ai".to_string())
          );
    }
    Ok(provider)
}

/// Split a comma-separated list: trimmed, empties dropped, first
/// occurrence of a duplicate kept.
pub fn parse_list(raw: &str) -> Vec<String>
{   dedup(
      raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
    )
}

fn dedup(items: Vec<String>) -> Vec<String>
{   let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items
    {   if !out.contains(&item)
        {   out.push(item);
        }
    }
    out
}

fn parse_regions(raw: &str) -> Vec<Option<String>>
{   parse_list(raw)
      .into_iter()
      .map(|r| {
        if r.eq_ignore_ascii_case(GLOBAL_REGION)
        {   None
        } else
        {   Some(r.to_ascii_lowercase())
        }
      })
      .collect()
}

fn parse_flag(raw: &str) -> bool
{   matches!(
      raw.trim().to_ascii_lowercase().as_str(),
      "1" | "true" | "yes" | "on"
    )
}
