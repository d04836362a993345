pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod credentials;
pub mod ladder;
pub mod failover;
pub mod search;
pub mod primary;
pub mod flows;
pub mod client;
use serde::{Deserialize, Serialize};

pub use client::AllmBackend;
pub use config::AllmConfig;
pub use error::{Error, Result};
pub use failover::Orchestrator;
pub use primary::{ChatService, PrimaryGenerator, Reply};
pub use request::{GenerationRequest, GenerationResponse};
pub use search::{SearchResult, WebSearch};

/*

allm-relay: async-only chat relay in front of several hosted LLM
providers. A single logical "generate a reply" request walks an
ordered ladder of providers, keys and models until one of them
answers with real content.

allm-relay/
├── src/
│   ├── lib.rs             # Domain types and channel interface
│   ├── error.rs           # Crate-wide error type
│   ├── config.rs          # Immutable configuration, loaded from env
│   ├── request.rs         # Generation request/response, attempt outcomes
│   ├── credentials.rs     # Per-request credential iteration
│   ├── ladder.rs          # Per-provider model ladder
│   ├── providers/         # Provider adapters (chat-completions wire)
│   ├── failover.rs        # Fallback orchestrator
│   ├── search.rs          # Web search tool with key rotation
│   ├── primary.rs         # Primary call contract + backstop service
│   ├── flows.rs           # Structured-output callers with defaults
│   └── client.rs          # Backend actor owning the task
└── tests/

*/

/// Install env_logger once. `RUST_LOG` controls the level.
pub fn init_logging()
{   let _ = env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).try_init();
}

/// ALLM API INTERFACE:

// ===== Generate =====

pub type GenerateReply = Result<primary::Reply>;
pub type GenerateReplySender
  = tokio::sync::mpsc::UnboundedSender<GenerateReply>;

pub struct GenerateArgs
{   pub request: GenerationRequest
  , pub reply: GenerateReplySender
}

// ===== Search =====

pub type SearchReply = Vec<SearchResult>;
pub type SearchReplySender
  = tokio::sync::mpsc::UnboundedSender<SearchReply>;

pub struct SearchArgs
{   pub query: String
  , pub reply: SearchReplySender
}

// ===== KillProcess =====

pub type KillProcessReply = Result<()>;
pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<KillProcessReply>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

// ===== AllmHand (sender side) =====

pub struct AllmHand
{   pub generate_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateArgs>
  , pub search_tx
      : tokio::sync::mpsc::UnboundedSender<SearchArgs>
  , pub kill_process_tx
      : tokio::sync::mpsc::UnboundedSender<KillProcessArgs>
}

// ===== AllmFoot (receiver side) =====

pub struct AllmFoot
{   pub generate_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateArgs>
  , pub search_rx
      : tokio::sync::mpsc::UnboundedReceiver<SearchArgs>
  , pub kill_process_rx
      : tokio::sync::mpsc::UnboundedReceiver<KillProcessArgs>
}

/// ALLM STRUCTURES:

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   System
  , User
  , Assistant
}

impl Role
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   Role::System => "system"
          , Role::User => "user"
          , Role::Assistant => "assistant"
        }
    }
}

/// One entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage
{   pub role: Role
  , pub content: String
}

impl ChatMessage
{   pub fn new(role: Role, content: impl Into<String>) -> Self
    {   ChatMessage
        {   role
          , content: content.into()
        }
    }

    pub fn system(content: impl Into<String>) -> Self
    {   Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self
    {   Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self
    {   Self::new(Role::Assistant, content)
    }
}

/// Shape the caller expects the reply in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ResponseFormat
{   /// Plain conversational text
    #[default]
    FreeText
  , /// A JSON object; adapters pass the vendor's JSON-mode flag
    StructuredJson
}

impl ResponseFormat
{   pub fn from_json_mode(json_mode: bool) -> Self
    {   if json_mode
        {   ResponseFormat::StructuredJson
        } else
        {   ResponseFormat::FreeText
        }
    }
}
