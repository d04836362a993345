use async_trait::async_trait;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::credentials::mask_credential;
use crate::providers::ProviderAdapter;
use crate::request::{AttemptResult, FailureReason, GenerationRequest};
use crate::{ChatMessage, ResponseFormat};

// ===== Message Types =====

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a>
{   pub model: &'a str
  , pub messages: &'a [ChatMessage]
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
  , pub stream: bool
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormatHint>
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseFormatHint
{   #[serde(rename = "type")]
    pub kind: String
}

impl ResponseFormatHint
{   pub fn for_format(format: ResponseFormat) -> Option<Self>
    {   match format
        {   ResponseFormat::FreeText => None
          , ResponseFormat::StructuredJson => Some(ResponseFormatHint
            {   kind: "json_object".to_string()
            })
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse
{   pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ResponseMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage
{   #[serde(default)]
    pub role: Option<String>
  , #[serde(default)]
    pub content: Option<String>
}

impl ChatCompletionResponse
{   /// `choices[0].message.content`, if any.
    pub fn first_content(self) -> Option<String>
    {   self.choices.into_iter().next()?.message.content
    }
}

// ===== Adapter =====

/// Adapter for any vendor speaking the chat-completions wire format
/// (Groq, OpenRouter, Mistral).
#[derive(Debug, Clone)]
pub struct ChatCompletionsAdapter
{   name: String
  , endpoint: String
  , extra_headers: Vec<(String, String)>
  , temperature: Option<f32>
  , max_tokens: Option<usize>
  , http_client: reqwest::Client
}

impl ChatCompletionsAdapter
{   pub fn from_config(
      config: &ProviderConfig
    , http_client: reqwest::Client
    ) -> Self
    {   debug!("Creating chat-completions adapter for {}", config.name);
        ChatCompletionsAdapter
        {   name: config.name.clone()
          , endpoint: config.endpoint.clone()
          , extra_headers: config.extra_headers.clone()
          , temperature: config.temperature
          , max_tokens: config.max_tokens
          , http_client
        }
    }

    pub fn endpoint(&self) -> &str
    {   &self.endpoint
    }
}

#[async_trait]
impl ProviderAdapter for ChatCompletionsAdapter
{   fn name(&self) -> &str
    {   &self.name
    }

    async fn attempt(
      &self
    , request: &GenerationRequest
    , model: &str
    , credential: &str
    ) -> AttemptResult
    {   debug!(
          "{}: attempting {} with key {}",
          self.name, model, mask_credential(credential)
        );

        let body = ChatCompletionRequest
        {   model
          , messages: &request.messages
          , max_tokens: self.max_tokens
          , temperature: self.temperature
          , stream: false
          , response_format: ResponseFormatHint::for_format(
              request.response_format
            )
        };

        trace!("{} request: {:?}", self.name, body);

        let mut builder = self.http_client
          .post(&self.endpoint)
          .header("Authorization", format!("Bearer {}", credential))
          .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers
        {   builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match builder.json(&body).send().await
        {   Ok(response) => response
          , Err(e) => {
              warn!("{}: transport error: {}", self.name, e);
              return AttemptResult::FatalFailure(
                FailureReason::new(None, e.to_string())
              );
            }
        };

        let status = response.status();
        trace!("{} response status: {}", self.name, status);

        let text = match response.text().await
        {   Ok(text) => text
          , Err(e) => {
              warn!("{}: failed to read body: {}", self.name, e);
              return AttemptResult::FatalFailure(
                FailureReason::new(Some(status.as_u16()), e.to_string())
              );
            }
        };

        if !status.is_success()
        {   return AttemptResult::from_status(status.as_u16(), &text);
        }

        match serde_json::from_str::<ChatCompletionResponse>(&text)
        {   Ok(parsed) => AttemptResult::from_content(parsed.first_content())
          , Err(e) => AttemptResult::RecoverableFailure(
              FailureReason::new(
                Some(status.as_u16()),
                format!("unparseable completion: {}", e)
              )
            )
        }
    }
}
