//! Structured-output callers
//!
//! These ask for JSON or a short title and never hand a parse error to
//! the UI: anything unusable becomes a hardcoded default.

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::primary::{ChatService, APOLOGY};
use crate::request::GenerationRequest;
use crate::{ChatMessage, Role};

pub const DEFAULT_TITLE: &str = "Chat";

/// Encouragement plus a few small actions the user could pledge to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeEncouragement
{   pub encouragement: String
  , #[serde(rename = "pledgeIdeas")]
    pub pledge_ideas: Vec<String>
}

impl Default for PledgeEncouragement
{   fn default() -> Self
    {   PledgeEncouragement
        {   encouragement: "Let's make a small promise to our planet! What's one \
            simple action you'd like to take for a better world?".to_string()
          , pledge_ideas: vec![
              "Use a reusable water bottle.".to_string()
            , "Spend 5 minutes learning about a new culture.".to_string()
            , "Share a positive comment online.".to_string()
            ]
        }
    }
}

impl PledgeEncouragement
{   /// What the user sees when no provider answered at all.
    pub fn unavailable() -> Self
    {   PledgeEncouragement
        {   encouragement: APOLOGY.to_string()
          , pledge_ideas: vec![]
        }
    }

    /// Parse model output, falling back to the default on any problem.
    pub fn parse_or_default(raw: &str) -> Self
    {   match serde_json::from_str::<PledgeEncouragement>(strip_code_fence(raw))
        {   Ok(parsed) if !parsed.encouragement.trim().is_empty() => parsed
          , Ok(_) => {
              warn!("Pledge output had no encouragement, using default");
              Self::default()
            }
          , Err(e) => {
              warn!("Failed to parse pledge output, using default: {}", e);
              Self::default()
            }
        }
    }
}

/// Ask for pledge ideas based on the conversation so far.
pub async fn encourage_pledge(
  service: &ChatService
, history: &[ChatMessage]
) -> PledgeEncouragement
{   let transcript = render_transcript(history);
    let request = GenerationRequest::new(vec![
      ChatMessage::user(format!(
        "Based on the conversation history ({}), suggest a few pledge ideas \
         and provide an encouraging message. Output a JSON object with \
         'encouragement' and 'pledgeIdeas' keys.",
        transcript
      ))
    ]).json();

    match service.complete(&request).await
    {   Ok(reply) => PledgeEncouragement::parse_or_default(&reply.content)
      , Err(e) => {
          error!("Pledge encouragement failed: {}", e);
          PledgeEncouragement::unavailable()
        }
    }
}

/// Short title for a conversation, `"Chat"` when none can be made.
pub async fn summarize_title(
  service: &ChatService
, messages: &[ChatMessage]
) -> String
{   let history: Vec<&ChatMessage> = messages
      .iter()
      .filter(|m| m.role != Role::System)
      .collect();
    if history.is_empty()
    {   debug!("Nothing to summarize");
        return DEFAULT_TITLE.to_string();
    }

    let transcript = render_transcript(history);
    let request = GenerationRequest::new(vec![
      ChatMessage::user(format!(
        "Based on the following conversation, create a very short, concise \
         title (5 words maximum). Generate only the title.\n\n{}",
        transcript
      ))
    ]);

    match service.complete(&request).await
    {   Ok(reply) => clean_title(&reply.content)
      , Err(e) => {
          error!("Title summarization failed: {}", e);
          DEFAULT_TITLE.to_string()
        }
    }
}

fn clean_title(raw: &str) -> String
{   let title = raw.replace('"', "");
    let title = title.trim();
    if title.is_empty()
    {   DEFAULT_TITLE.to_string()
    } else
    {   title.to_string()
    }
}

fn render_transcript<'a>(
  history: impl IntoIterator<Item = &'a ChatMessage>
) -> String
{   history
      .into_iter()
      .map(|m| format!("{}: {}", m.role.as_str(), m.content))
      .collect::<Vec<_>>()
      .join("\n")
}

/// Models like to wrap JSON in a ```json fence.
fn strip_code_fence(raw: &str) -> &str
{   let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```")
    else
    {   return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
