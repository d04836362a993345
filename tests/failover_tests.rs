use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use allm_relay::config::{FailoverConfig, ProviderConfig};
use allm_relay::error::Error;
use allm_relay::failover::Orchestrator;
use allm_relay::flows::{self, PledgeEncouragement, DEFAULT_TITLE};
use allm_relay::primary::{ChatService, ReplySource, APOLOGY};
use allm_relay::providers::ProviderAdapter;
use allm_relay::request::{
  AttemptKind, AttemptResult, FailureReason, GenerationRequest
};
use allm_relay::{ChatMessage, PrimaryGenerator};
use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

/// Adapter answering from a (credential, model) script, recording calls.
struct ScriptedAdapter
{   name: String
  , script: HashMap<(String, String), AttemptResult>
  , fallback: AttemptResult
  , calls: Mutex<Vec<(String, String)>>
}

impl ScriptedAdapter
{   fn new(name: &str, fallback: AttemptResult) -> Self
    {   ScriptedAdapter
        {   name: name.to_string()
          , script: HashMap::new()
          , fallback
          , calls: Mutex::new(vec![])
        }
    }

    fn on(mut self, credential: &str, model: &str, result: AttemptResult)
      -> Self
    {   self.script.insert(
          (credential.to_string(), model.to_string()), result
        );
        self
    }

    fn calls(&self) -> Vec<(String, String)>
    {   self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter
{   fn name(&self) -> &str
    {   &self.name
    }

    async fn attempt(
      &self
    , _request: &GenerationRequest
    , model: &str
    , credential: &str
    ) -> AttemptResult
    {   self.calls.lock().unwrap().push(
          (credential.to_string(), model.to_string())
        );
        self.script
          .get(&(credential.to_string(), model.to_string()))
          .cloned()
          .unwrap_or_else(|| self.fallback.clone())
    }
}

fn success(text: &str) -> AttemptResult
{   AttemptResult::Success(text.to_string())
}

fn rate_limited() -> AttemptResult
{   AttemptResult::RecoverableFailure(
      FailureReason::new(Some(429), "rate limited")
    )
}

fn server_error() -> AttemptResult
{   AttemptResult::FatalFailure(
      FailureReason::new(Some(500), "internal error")
    )
}

fn provider(name: &str, keys: &[&str], models: &[&str]) -> ProviderConfig
{   ProviderConfig::new(
      name,
      format!("http://{}.invalid/chat/completions", name),
      keys.iter().map(|k| k.to_string()).collect(),
      models.iter().map(|m| m.to_string()).collect()
    )
}

fn hello_request() -> GenerationRequest
{   GenerationRequest::new(vec![ChatMessage::user("hello there")])
}

#[tokio::test]
async fn first_success_makes_exactly_one_call()
{   let adapter = Arc::new(ScriptedAdapter::new("a", success("hi")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1", "k2"], &["m1", "m2"]), adapter.clone());

    let response = assert_ok!(orchestrator.generate(&hello_request()).await);
    assert_eq!(response.content, "hi");
    assert_eq!(response.provider, "a");
    assert_eq!(response.model, "m1");
    assert_eq!(response.attempts, 1);
    assert_eq!(adapter.calls().len(), 1);
}

#[tokio::test]
async fn rate_limited_provider_is_walked_fully_before_the_next()
{   let first = Arc::new(ScriptedAdapter::new("a", rate_limited()));
    let second = Arc::new(ScriptedAdapter::new("b", success("from b")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1", "k2"], &["m1", "m2", "m3"]), first.clone())
      .with_provider(provider("b", &["k3"], &["n1"]), second.clone());

    let text = assert_ok!(
      orchestrator.generate_text(vec![ChatMessage::user("hi")], false).await
    );
    assert_eq!(text, "from b");
    assert_eq!(first.calls().len(), 2 * 3);
    assert_eq!(second.calls().len(), 1);
}

#[tokio::test]
async fn exhaustion_tries_each_combination_once()
{   let first = Arc::new(ScriptedAdapter::new("a", rate_limited()));
    let second = Arc::new(ScriptedAdapter::new("b", server_error()));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(
        provider("a", &["key-one", "key-two"], &["m1", "m2"]), first.clone()
      )
      .with_provider(provider("b", &["key-six"], &["n1", "n2"]), second.clone());

    let outcome = orchestrator.generate_traced(&hello_request()).await;
    assert_eq!(
      outcome.result,
      Err(Error::AllProvidersExhausted { attempts: 6 })
    );
    assert_eq!(outcome.trace.len(), 6);

    let mut seen: Vec<(String, String, String)> = outcome.trace
      .iter()
      .map(|r| (r.provider.clone(), r.credential.clone(), r.model.clone()))
      .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 6);
    assert_eq!(first.calls().len(), 4);
    assert_eq!(second.calls().len(), 2);
    assert!(outcome.trace[4..].iter().all(|r| r.outcome == AttemptKind::Fatal));
}

#[tokio::test]
async fn identical_runs_yield_identical_traces()
{   let adapter = Arc::new(
      ScriptedAdapter::new("a", rate_limited())
        .on("k2", "m2", success("done"))
    );
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1", "k2"], &["m1", "m2"]), adapter.clone());

    let first = orchestrator.generate_traced(&hello_request()).await;
    let second = orchestrator.generate_traced(&hello_request()).await;
    assert_eq!(first.trace, second.trace);
    assert_eq!(first.result, second.result);
    assert_eq!(first.trace.len(), 4);

    let calls = adapter.calls();
    assert_eq!(calls[..4], calls[4..]);
}

#[tokio::test]
async fn empty_success_keeps_rotating()
{   let adapter = Arc::new(
      ScriptedAdapter::new("a", rate_limited())
        .on("k1", "m1", AttemptResult::from_content(Some(String::new())))
        .on("k1", "m2", success("real text"))
    );
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1"], &["m1", "m2"]), adapter.clone());

    let response = assert_ok!(orchestrator.generate(&hello_request()).await);
    assert_eq!(response.content, "real text");
    assert_eq!(response.model, "m2");
    assert_eq!(adapter.calls().len(), 2);
}

#[tokio::test]
async fn empty_message_list_fails_before_any_call()
{   let adapter = Arc::new(ScriptedAdapter::new("a", success("hi")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1"], &["m1"]), adapter.clone());

    let err = assert_err!(
      orchestrator.generate(&GenerationRequest::new(vec![])).await
    );
    assert_eq!(err, Error::EmptyMessages);
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn two_provider_scenario_stops_inside_the_first()
{   let a = Arc::new(
      ScriptedAdapter::new("A", success("unexpected"))
        .on("k1", "m1", rate_limited())
        .on("k1", "m2", rate_limited())
        .on("k2", "m1", success("hello"))
    );
    let b = Arc::new(ScriptedAdapter::new("B", success("from B")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("A", &["k1", "k2"], &["m1", "m2"]), a.clone())
      .with_provider(provider("B", &["k3"], &["n1"]), b.clone());

    let response = assert_ok!(orchestrator.generate(&hello_request()).await);
    assert_eq!(response.content, "hello");
    assert_eq!(response.attempts, 3);
    assert_eq!(
      a.calls(),
      vec![
        ("k1".to_string(), "m1".to_string())
      , ("k1".to_string(), "m2".to_string())
      , ("k2".to_string(), "m1".to_string())
      ]
    );
    assert!(b.calls().is_empty());
}

#[tokio::test]
async fn provider_without_keys_is_skipped()
{   let unconfigured = Arc::new(ScriptedAdapter::new("a", success("never")));
    let configured = Arc::new(ScriptedAdapter::new("b", success("yes")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &[], &["m1"]), unconfigured.clone())
      .with_provider(provider("b", &["k"], &["n1"]), configured.clone());

    assert_eq!(orchestrator.available_providers(), 1);
    let response = assert_ok!(orchestrator.generate(&hello_request()).await);
    assert_eq!(response.provider, "b");
    assert!(unconfigured.calls().is_empty());
}

#[tokio::test]
async fn no_available_provider_is_total_failure()
{   let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(
        provider("a", &[], &["m1"]),
        Arc::new(ScriptedAdapter::new("a", success("never")))
      );
    let err = assert_err!(orchestrator.generate(&hello_request()).await);
    assert_eq!(err, Error::AllProvidersExhausted { attempts: 0 });
}

#[tokio::test]
async fn fatal_failure_moves_to_next_model_by_default()
{   let adapter = Arc::new(
      ScriptedAdapter::new("a", success("second model"))
        .on("k1", "m1", server_error())
    );
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1"], &["m1", "m2"]), adapter.clone());

    let response = assert_ok!(orchestrator.generate(&hello_request()).await);
    assert_eq!(response.model, "m2");
}

#[tokio::test]
async fn fatal_failure_can_skip_the_provider()
{   let a = Arc::new(
      ScriptedAdapter::new("a", success("same provider"))
        .on("k1", "m1", server_error())
    );
    let b = Arc::new(ScriptedAdapter::new("b", success("next provider")));
    let orchestrator = Orchestrator::new(FailoverConfig
      {   skip_provider_on_fatal: true
      })
      .with_provider(provider("a", &["k1", "k2"], &["m1", "m2"]), a.clone())
      .with_provider(provider("b", &["k3"], &["n1"]), b.clone());

    let response = assert_ok!(orchestrator.generate(&hello_request()).await);
    assert_eq!(response.content, "next provider");
    assert_eq!(a.calls().len(), 1);
}

#[tokio::test]
async fn model_hint_is_tried_first()
{   let adapter = Arc::new(ScriptedAdapter::new("a", success("ok")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("a", &["k1"], &["m1", "m2", "m3"]), adapter.clone());

    let request = hello_request().with_model_hint("m3");
    let response = assert_ok!(orchestrator.generate(&request).await);
    assert_eq!(response.model, "m3");
    assert_eq!(adapter.calls(), vec![("k1".to_string(), "m3".to_string())]);
}

#[tokio::test]
async fn responses_and_traces_name_the_adapter()
{   let first = Arc::new(ScriptedAdapter::new("groq", rate_limited()));
    let second = Arc::new(ScriptedAdapter::new("openrouter", success("ok")));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("slot-1", &["k1"], &["m1"]), first)
      .with_provider(provider("slot-2", &["k2"], &["n1"]), second);

    let outcome = orchestrator.generate_traced(&hello_request()).await;
    let response = assert_ok!(outcome.result);
    assert_eq!(response.provider, "openrouter");
    let names: Vec<&str> = outcome.trace
      .iter()
      .map(|r| r.provider.as_str())
      .collect();
    assert_eq!(names, vec!["groq", "openrouter"]);
}

// ===== Primary backstop =====

struct FixedPrimary
{   answer: Result<String, Error>
  , calls: Mutex<usize>
}

impl FixedPrimary
{   fn new(answer: Result<String, Error>) -> Self
    {   FixedPrimary
        {   answer
          , calls: Mutex::new(0)
        }
    }
}

#[async_trait]
impl PrimaryGenerator for FixedPrimary
{   fn name(&self) -> &str
    {   "primary"
    }

    async fn generate(&self, _request: &GenerationRequest)
      -> allm_relay::Result<String>
    {   *self.calls.lock().unwrap() += 1;
        self.answer.clone()
    }
}

fn service_with(fallback: AttemptResult) -> (ChatService, Arc<ScriptedAdapter>)
{   let adapter = Arc::new(ScriptedAdapter::new("fb", fallback));
    let orchestrator = Orchestrator::new(FailoverConfig::default())
      .with_provider(provider("fb", &["k1"], &["m1"]), adapter.clone());
    (ChatService::new(Arc::new(orchestrator)), adapter)
}

#[tokio::test]
async fn primary_answer_skips_the_fallback()
{   let (service, adapter) = service_with(success("fallback"));
    let service = service.with_primary(
      Arc::new(FixedPrimary::new(Ok("primary text".to_string())))
    );

    let reply = assert_ok!(service.complete(&hello_request()).await);
    assert_eq!(reply.content, "primary text");
    assert_eq!(reply.source, ReplySource::Primary("primary".to_string()));
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn primary_error_or_empty_output_falls_back()
{   for answer in [
      Err(Error::PrimaryFailed("tool crashed".to_string()))
    , Ok("   ".to_string())
    ]
    {   let (service, adapter) = service_with(success("fallback"));
        let service = service.with_primary(Arc::new(FixedPrimary::new(answer)));

        let reply = assert_ok!(service.complete(&hello_request()).await);
        assert_eq!(reply.content, "fallback");
        assert_eq!(
          reply.source,
          ReplySource::Fallback
          {   provider: "fb".to_string()
            , model: "m1".to_string()
          }
        );
        assert_eq!(adapter.calls().len(), 1);
    }
}

#[tokio::test]
async fn total_failure_becomes_the_apology()
{   let (service, _) = service_with(rate_limited());
    let service = service.with_primary(Arc::new(FixedPrimary::new(
      Err(Error::PrimaryFailed("down".to_string()))
    )));
    assert_eq!(service.reply(&hello_request()).await, APOLOGY);
}

#[tokio::test]
async fn empty_request_never_reaches_the_primary()
{   let primary = Arc::new(FixedPrimary::new(Ok("text".to_string())));
    let (service, _) = service_with(success("fallback"));
    let service = service.with_primary(primary.clone());

    let err = assert_err!(service.complete(&GenerationRequest::new(vec![])).await);
    assert_eq!(err, Error::EmptyMessages);
    assert_eq!(*primary.calls.lock().unwrap(), 0);
}

// ===== Structured flows =====

#[tokio::test]
async fn pledge_flow_parses_json_output()
{   let (service, _) = service_with(success(
      r#"{"encouragement":"You can do it","pledgeIdeas":["Plant a tree"]}"#
    ));
    let history = vec![ChatMessage::user("I want to help")];
    let pledge = flows::encourage_pledge(&service, &history).await;
    assert_eq!(pledge.encouragement, "You can do it");
    assert_eq!(pledge.pledge_ideas, vec!["Plant a tree"]);
}

#[tokio::test]
async fn pledge_flow_defaults_on_unparseable_output()
{   let (service, _) = service_with(success("Here are some ideas!"));
    let pledge = flows::encourage_pledge(&service, &[]).await;
    assert_eq!(pledge, PledgeEncouragement::default());
}

#[tokio::test]
async fn pledge_flow_reports_unavailable_on_exhaustion()
{   let (service, _) = service_with(rate_limited());
    let pledge = flows::encourage_pledge(&service, &[]).await;
    assert_eq!(pledge, PledgeEncouragement::unavailable());
}

#[tokio::test]
async fn title_flow_strips_quotes_and_defaults()
{   let (service, _) = service_with(success("\"Greener Commutes\""));
    let messages = vec![
      ChatMessage::system("be nice")
    , ChatMessage::user("how do I bike to work?")
    , ChatMessage::assistant("Start small.")
    ];
    assert_eq!(
      flows::summarize_title(&service, &messages).await,
      "Greener Commutes"
    );

    let (failing, _) = service_with(rate_limited());
    assert_eq!(
      flows::summarize_title(&failing, &messages).await,
      DEFAULT_TITLE
    );

    let (unused, adapter) = service_with(success("x"));
    assert_eq!(
      flows::summarize_title(&unused, &[ChatMessage::system("only")]).await,
      DEFAULT_TITLE
    );
    assert!(adapter.calls().is_empty());
}
