//! Unified request, response and attempt types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChatMessage, ResponseFormat};

/// Unified generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest
{   /// Conversation transcript, oldest first. Must not be empty.
    pub messages: Vec<ChatMessage>
  , /// Free text or JSON object
    #[serde(default)]
    pub response_format: ResponseFormat
  , /// Model to try first wherever a ladder contains it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>
}

impl GenerationRequest
{   pub fn new(messages: Vec<ChatMessage>) -> Self
    {   GenerationRequest
        {   messages
          , response_format: ResponseFormat::FreeText
          , model_hint: None
        }
    }

    pub fn json(mut self) -> Self
    {   self.response_format = ResponseFormat::StructuredJson;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self
    {   self.response_format = format;
        self
    }

    pub fn with_model_hint(mut self, model: impl Into<String>) -> Self
    {   self.model_hint = Some(model.into());
        self
    }

    /// Fail fast on caller errors before any network call.
    pub fn validate(&self) -> crate::error::Result<()>
    {   if self.messages.is_empty()
        {   return Err(crate::error::Error::EmptyMessages);
        }
        Ok(())
    }
}

/// Unified generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse
{   /// Generated text, never empty
    pub content: String
  , /// Provider that generated it
    pub provider: String
  , /// Model that generated it
    pub model: String
  , /// Attempts made for this request, the winning one included
    pub attempts: usize
}

/// Why an attempt did not produce content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason
{   /// HTTP status, when the vendor answered at all
    pub status: Option<u16>
  , pub message: String
}

impl FailureReason
{   pub fn new(status: Option<u16>, message: impl Into<String>) -> Self
    {   FailureReason
        {   status
          , message: message.into()
        }
    }
}

impl fmt::Display for FailureReason
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self.status
        {   Some(status) => write!(f, "[{}] {}", status, self.message)
          , None => write!(f, "{}", self.message)
        }
    }
}

/// Outcome of one (provider, credential, model) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult
{   Success(String)
  , /// Auth, quota, rate limit, empty or unparseable completion
    RecoverableFailure(FailureReason)
  , /// Network error, 5xx, rejected request
    FatalFailure(FailureReason)
}

impl AttemptResult
{   /// Empty content is never a success.
    pub fn from_content(content: Option<String>) -> Self
    {   match content
        {   Some(text) if !text.trim().is_empty() => {
              AttemptResult::Success(text)
            }
          , Some(_) => AttemptResult::RecoverableFailure(
              FailureReason::new(None, "empty completion")
            )
          , None => AttemptResult::RecoverableFailure(
              FailureReason::new(None, "completion carried no content")
            )
        }
    }

    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self
    {   let reason = FailureReason::new(Some(status), body);
        if is_rotating_status(status)
        {   AttemptResult::RecoverableFailure(reason)
        } else
        {   AttemptResult::FatalFailure(reason)
        }
    }

    pub fn is_success(&self) -> bool
    {   matches!(self, AttemptResult::Success(_))
    }

    pub fn kind(&self) -> AttemptKind
    {   match self
        {   AttemptResult::Success(_) => AttemptKind::Success
          , AttemptResult::RecoverableFailure(_) => AttemptKind::Recoverable
          , AttemptResult::FatalFailure(_) => AttemptKind::Fatal
        }
    }
}

/// 401, 403 and 429 rotate to the next credential.
pub fn is_rotating_status(status: u16) -> bool
{   matches!(status, 401 | 403 | 429)
}

/// Content-free view of an attempt outcome, kept in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptKind
{   Success
  , Recoverable
  , Fatal
}

/// One line of the attempt trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord
{   pub provider: String
  , pub model: String
  , /// Masked, e.g. `...abcd`
    pub credential: String
  , pub outcome: AttemptKind
  , pub status: Option<u16>
}
