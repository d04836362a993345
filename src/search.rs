//! Web search tool with the same key rotation as the chat ladder

use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::credentials::{mask_credential, CredentialPool};
use crate::request::{is_rotating_status, FailureReason};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult
{   #[serde(default)]
    pub title: String
  , pub link: String
  , #[serde(default)]
    pub snippet: String
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>
}

impl SearchResult
{   fn sentinel(title: &str, link: String, snippet: String) -> Self
    {   SearchResult
        {   title: title.to_string()
          , link
          , snippet
          , position: Some(1)
        }
    }

    /// Returned when no search keys are configured.
    pub fn not_configured() -> Self
    {   Self::sentinel(
          "Web Search Not Configured",
          "#".to_string(),
          "The web search tool is not configured. Please set the \
           SERPER_API_KEYS environment variable.".to_string()
        )
    }

    /// Returned when a key worked but nothing matched.
    pub fn no_results(query: &str) -> Self
    {   let link = reqwest::Url::parse_with_params(
            "https://www.google.com/search", &[("q", query)]
          )
          .map(|url| url.to_string())
          .unwrap_or_else(|_| "#".to_string());
        Self::sentinel(
          "No results found",
          link,
          format!(
            "Your search - {} - did not match any documents. \
             Please try a different query.",
            query
          )
        )
    }

    /// Returned when every key failed.
    pub fn failed() -> Self
    {   Self::sentinel(
          "Search Failed",
          "#".to_string(),
          "The web search failed after trying all available API keys. \
           Please check the server logs for more details.".to_string()
        )
    }

    /// True for the placeholder records above.
    pub fn is_sentinel(&self) -> bool
    {   matches!(
          self.title.as_str(),
          "Web Search Not Configured" | "No results found" | "Search Failed"
        )
    }
}

// ===== Wire Types =====

#[derive(Debug, Clone, Serialize)]
struct SerperRequest<'a>
{   q: &'a str
  , #[serde(skip_serializing_if = "Option::is_none")]
    gl: Option<&'a str>
}

#[derive(Debug, Clone, Deserialize)]
struct SerperResponse
{   #[serde(default)]
    organic: Vec<OrganicItem>
}

/// Upstream hit as sent. Every field is optional so one odd item
/// cannot sink the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct OrganicItem
{   title: Option<String>
  , link: Option<String>
  , snippet: Option<String>
  , position: Option<u32>
}

impl OrganicItem
{   /// `None` when the item has no usable link.
    fn into_result(self) -> Option<SearchResult>
    {   let link = self.link.filter(|link| !link.trim().is_empty())?;
        Some(SearchResult
        {   title: self.title.unwrap_or_default()
          , link
          , snippet: self.snippet.unwrap_or_default()
          , position: self.position
        })
    }
}

impl SerperResponse
{   fn into_results(self) -> Vec<SearchResult>
    {   let total = self.organic.len();
        let results: Vec<SearchResult> = self.organic
          .into_iter()
          .filter_map(OrganicItem::into_result)
          .collect();
        if results.len() < total
        {   debug!("Skipped {} search items without a link", total - results.len());
        }
        results
    }
}

/// Outcome of one upstream query.
enum QueryOutcome
{   Hits(Vec<SearchResult>)
  , Failed(FailureReason)
}

/// Search tool. `search` never fails: problems come back as a
/// single sentinel record so the calling generation step keeps going.
#[derive(Debug, Clone)]
pub struct WebSearch
{   config: SearchConfig
  , http_client: reqwest::Client
}

impl WebSearch
{   pub fn new(config: SearchConfig, http_client: reqwest::Client) -> Self
    {   debug!(
          "Creating web search with {} keys, {} regions",
          config.credentials.len(),
          config.regions.len()
        );
        WebSearch
        {   config
          , http_client
        }
    }

    pub fn is_configured(&self) -> bool
    {   !self.config.credentials.is_empty()
    }

    /// `search(query) -> [{title, link, snippet}]`
    ///
    /// Keys are tried first to last. For each key every configured
    /// region is queried concurrently; the key counts as working when
    /// at least one of those queries answers. Results are merged in
    /// region order and de-duplicated by link.
    pub async fn search(&self, query: &str) -> Vec<SearchResult>
    {   let pool = CredentialPool::new(&self.config.credentials);
        if pool.is_empty()
        {   error!("Search API keys are not configured");
            return vec![SearchResult::not_configured()];
        }

        let query = query.trim();
        if query.is_empty()
        {   warn!("Empty search query");
            return vec![SearchResult::no_results(query)];
        }

        let regions: Vec<Option<&str>> = if self.config.regions.is_empty()
        {   vec![None]
        } else
        {   self.config.regions.iter().map(|r| r.as_deref()).collect()
        };

        let mut last_error: Option<FailureReason> = None;
        for (index, key) in pool
        {   let outcomes = join_all(
              regions.iter().map(|region| self.query_once(query, *region, key))
            ).await;

            let mut answered = false;
            let mut merged: Vec<SearchResult> = Vec::new();
            for outcome in outcomes
            {   match outcome
                {   QueryOutcome::Hits(hits) => {
                      answered = true;
                      for hit in hits
                      {   if !merged.iter().any(|m| m.link == hit.link)
                          {   merged.push(hit);
                          }
                      }
                    }
                  , QueryOutcome::Failed(reason) => {
                      match reason.status
                      {   Some(status) if is_rotating_status(status) => {
                            warn!(
                              "Search key {} ({}) failed with status {}",
                              index, mask_credential(key), status
                            );
                          }
                        , _ => {
                            error!(
                              "Search key {} ({}) error: {}",
                              index, mask_credential(key), reason
                            );
                          }
                      }
                      last_error = Some(reason);
                    }
                }
            }

            if answered
            {   if merged.is_empty()
                {   info!("No results for query");
                    return vec![SearchResult::no_results(query)];
                }
                info!("Search returned {} results", merged.len());
                return merged;
            }
            debug!("Trying next search key");
        }

        error!(
          "All search keys failed. Last error: {}",
          last_error
            .map(|r| r.to_string())
            .unwrap_or_else(|| "none".to_string())
        );
        vec![SearchResult::failed()]
    }

    async fn query_once(
      &self
    , query: &str
    , region: Option<&str>
    , key: &str
    ) -> QueryOutcome
    {   let body = SerperRequest { q: query, gl: region };

        let response = match self.http_client
          .post(&self.config.endpoint)
          .header("X-API-KEY", key)
          .header("Content-Type", "application/json")
          .json(&body)
          .send()
          .await
        {   Ok(response) => response
          , Err(e) => {
              return QueryOutcome::Failed(
                FailureReason::new(None, e.to_string())
              );
            }
        };

        let status = response.status();
        if !status.is_success()
        {   let text = response.text().await.unwrap_or_default();
            return QueryOutcome::Failed(
              FailureReason::new(Some(status.as_u16()), text)
            );
        }

        match response.json::<SerperResponse>().await
        {   Ok(parsed) => QueryOutcome::Hits(parsed.into_results())
          , Err(e) => QueryOutcome::Failed(
              FailureReason::new(Some(status.as_u16()), e.to_string())
            )
        }
    }
}
