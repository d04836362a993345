/// Crate-wide error type.
/// Implements Clone for sending through reply channels.
///
/// Attempt-level provider failures never show up here; they are
/// `AttemptResult` values consumed by the orchestrator. Only what a
/// caller has to act on is an `Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error
{   /// Request carried no messages
    #[error("Cannot generate a reply for an empty message list")]
    EmptyMessages
  , /// Every provider/credential/model combination failed
    #[error("All providers exhausted after {attempts} attempts")]
    AllProvidersExhausted { attempts: usize }
  , /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String)
  , /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    HttpError(String)
  , /// Primary generation call failed
    #[error("Primary generation failed: {0}")]
    PrimaryFailed(String)
  , /// Backend task is gone
    #[error("Backend disconnected")]
    BackendDisconnected
  , /// Timeout error
    #[error("Request timed out")]
    Timeout
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   Error::Timeout
        } else
        {   Error::HttpError(e.to_string())
        }
    }
}
