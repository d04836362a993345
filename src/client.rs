use std::sync::Arc;
use tokio::sync::mpsc;
use log::{debug, error, info};

use crate::config::AllmConfig;
use crate::error::{Error, Result};
use crate::failover::Orchestrator;
use crate::primary::ChatService;
use crate::request::GenerationRequest;
use crate::search::WebSearch;
use crate::AllmFoot;

/// Shared, read-only state every request task sees
#[derive(Clone)]
pub struct AllmBackendState
{   pub service: ChatService
  , pub search: Arc<WebSearch>
}

impl AllmBackendState
{   /// Build orchestrator and search tool from configuration.
    pub fn from_config(config: &AllmConfig) -> Result<Self>
    {   debug!("Initializing AllmBackendState");
        config.validate()?;
        let http_client = config.http_client()?;
        let orchestrator = Orchestrator::from_config(
          config, http_client.clone()
        );
        if orchestrator.available_providers() == 0
        {   error!("No provider has credentials; every generate will fail");
        }
        Ok(AllmBackendState
        {   service: ChatService::new(Arc::new(orchestrator))
          , search: Arc::new(WebSearch::new(
              config.search.clone(), http_client
            ))
        })
    }
}

/// Public API for ALLM backend - owns the task
pub struct AllmBackend
{   hand: crate::AllmHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl AllmBackend
{   /// Create and spawn a new ALLM backend
    /// Returns immediately - spawns background task
    pub fn new(state: AllmBackendState) -> Self
    {   debug!("Creating AllmBackend with task ownership");

        let (generate_tx, generate_rx)
          = mpsc::unbounded_channel();
        let (search_tx, search_rx)
          = mpsc::unbounded_channel();
        let (kill_process_tx, kill_process_rx)
          = mpsc::unbounded_channel();

        let hand = crate::AllmHand
        {   generate_tx
          , search_tx
          , kill_process_tx
        };

        let foot = crate::AllmFoot
        {   generate_rx
          , search_rx
          , kill_process_rx
        };

        let _task_handle = tokio::spawn(async move {
          run_backend_loop(foot, state).await
        });

        AllmBackend
        {   hand
          , _task_handle
        }
    }

    /// Load configuration from the environment and spawn.
    pub fn from_env() -> Result<Self>
    {   let config = AllmConfig::from_env()?;
        Ok(Self::new(AllmBackendState::from_config(&config)?))
    }

    /// Queue a generate request - returns almost immediately
    pub async fn generate(
      &self
    , request: GenerationRequest
    ) -> Result<mpsc::UnboundedReceiver<crate::GenerateReply>>
    {   debug!("generate queuing {} messages", request.messages.len());
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GenerateArgs
        {   request
          , reply: reply_tx
        };

        self.hand.generate_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            Error::BackendDisconnected
          })?;

        Ok(reply_rx)
    }

    /// Queue a web search - returns almost immediately
    pub async fn search(
      &self
    , query: String
    ) -> Result<mpsc::UnboundedReceiver<crate::SearchReply>>
    {   debug!("search queuing query");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::SearchArgs
        {   query
          , reply: reply_tx
        };

        self.hand.search_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            Error::BackendDisconnected
          })?;

        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend
    pub async fn shutdown(self) -> Result<()>
    {   debug!("Shutting down AllmBackend");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::KillProcessArgs
        {   reply: reply_tx
        };

        self.hand.kill_process_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel already closed");
            Error::BackendDisconnected
          })?;

        shutdown_confirmation(reply_rx.recv().await)
    }
}

/// A reply channel dropped without an answer means the loop is gone.
fn shutdown_confirmation(reply: Option<crate::KillProcessReply>) -> Result<()>
{   match reply
    {   Some(result) => {
          debug!("Backend shutdown confirmed");
          result
        }
      , None => {
          error!("Backend dropped the shutdown reply channel");
          Err(Error::BackendDisconnected)
        }
    }
}

/// Main backend event loop
///
/// tokio::select! only dispatches: every request runs in its own task
/// so one user's slow ladder never holds up another's.
async fn run_backend_loop(
  foot: crate::AllmFoot
, state: AllmBackendState
)
{   debug!("Starting AllmBackend event loop");
    let AllmFoot
    {   mut generate_rx
      , mut search_rx
      , mut kill_process_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = generate_rx.recv() => {
          debug!("Received Generate");
          let service = state.service.clone();
          tokio::spawn(async move {
            let result = service.complete(&cmd.request).await;
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = search_rx.recv() => {
          debug!("Received Search");
          let search = state.search.clone();
          tokio::spawn(async move {
            let results = search.search(&cmd.query).await;
            let _ = cmd.reply.send(results);
          });
        }
      , Some(cmd) = kill_process_rx.recv() => {
          debug!("Received KillProcess");
          let _ = cmd.reply.send(Ok(()));
          info!("AllmBackend shutting down");
          break;
        }
      , else => {
          debug!("All command channels closed");
          break;
        }
      }
    }
}
