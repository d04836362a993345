//! Primary generation contract and the backstop service around it

use std::sync::Arc;
use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::error::Result;
use crate::failover::Orchestrator;
use crate::request::GenerationRequest;

/// Shown to the end user when every path failed. Provider details
/// never reach the user.
pub const APOLOGY: &str
  = "Oops! Your KWS Ai is taking a quick break. Please try again in a little while!";

/// The first-choice generation path (tool-augmented, schema-aware).
///
/// It sees the same normalized request the orchestrator sees and knows
/// nothing about it.
#[async_trait]
pub trait PrimaryGenerator: Send + Sync
{   fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Which path produced a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource
{   Primary(String)
  , Fallback { provider: String, model: String }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply
{   pub content: String
  , pub source: ReplySource
}

/// Runs the primary call and, on error or empty output, the fallback
/// orchestrator with the same request.
#[derive(Clone)]
pub struct ChatService
{   primary: Option<Arc<dyn PrimaryGenerator>>
  , fallback: Arc<Orchestrator>
}

impl ChatService
{   pub fn new(fallback: Arc<Orchestrator>) -> Self
    {   ChatService
        {   primary: None
          , fallback
        }
    }

    pub fn with_primary(mut self, primary: Arc<dyn PrimaryGenerator>) -> Self
    {   self.primary = Some(primary);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator
    {   &self.fallback
    }

    /// Primary first, then the fallback ladder. Errors only on input
    /// errors and total exhaustion.
    pub async fn complete(&self, request: &GenerationRequest) -> Result<Reply>
    {   request.validate()?;

        if let Some(primary) = &self.primary
        {   match primary.generate(request).await
            {   Ok(content) if !content.trim().is_empty() => {
                  debug!("Primary {} answered", primary.name());
                  return Ok(Reply
                  {   content
                    , source: ReplySource::Primary(primary.name().to_string())
                  });
                }
              , Ok(_) => {
                  warn!("Primary {} returned empty output, falling back",
                    primary.name());
                }
              , Err(e) => {
                  warn!("Primary {} failed, falling back: {}",
                    primary.name(), e);
                }
            }
        }

        let response = self.fallback.generate(request).await?;
        info!("Fallback {} / {} answered", response.provider, response.model);
        Ok(Reply
        {   content: response.content
          , source: ReplySource::Fallback
            {   provider: response.provider
              , model: response.model
            }
        })
    }

    /// Never fails: total failure becomes the apology text.
    pub async fn reply(&self, request: &GenerationRequest) -> String
    {   match self.complete(request).await
        {   Ok(reply) => reply.content
          , Err(e) => {
              error!("Chat reply failed: {}", e);
              APOLOGY.to_string()
            }
        }
    }
}
