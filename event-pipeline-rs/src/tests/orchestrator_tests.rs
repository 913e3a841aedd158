use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::ResilientModelClient;
use crate::orchestrator::{GenerateOptions, GenerationOrchestrator};
use crate::resilience::{BreakerRegistry, BreakerStatus, InMemoryBreakerRegistry, RetryPolicy};
use crate::tests::support::*;
use crate::types::{AttemptOutcome, GenerationStatus};

fn orchestrator(
    transport: &Arc<ScriptedTransport>,
    registry: &Arc<InMemoryBreakerRegistry>,
    retry: RetryPolicy,
) -> GenerationOrchestrator {
    GenerationOrchestrator::new(
        client(transport.clone(), registry.clone(), retry),
        vec![model_b(), model_a()],
    )
    .with_defaults(6, 6)
}

fn outcomes(result: &crate::types::GenerationResult) -> Vec<(String, AttemptOutcome)> {
    result
        .attempts
        .iter()
        .map(|attempt| (attempt.model_id.clone(), attempt.outcome))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_when_primary_breaker_opens() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::Network, Step::Network])
            .script("model-b", vec![Step::Reply(six_valid_events())]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let result = orchestrator.generate_for_year(1969, None).await;

    assert_eq!(result.status, GenerationStatus::Success);
    assert_eq!(result.events.len(), 6);
    assert_eq!(
        outcomes(&result),
        vec![
            ("model-a".to_string(), AttemptOutcome::NetworkError),
            ("model-a".to_string(), AttemptOutcome::NetworkError),
            ("model-b".to_string(), AttemptOutcome::Success),
        ]
    );
    assert_eq!(result.attempts[2].raw_event_count, 6);
    assert_eq!(result.attempts[2].valid_event_count, 6);

    let state = registry.snapshot("model-a").unwrap();
    assert_eq!(state.status, BreakerStatus::Open);
    assert_eq!(state.consecutive_failures, 2);
    assert!(state.opened_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_no_healthy_model_makes_no_calls() {
    let transport = Arc::new(ScriptedTransport::new());
    let registry = registry(2);
    for model in ["model-a", "model-b"] {
        registry.record_failure(model);
        registry.record_failure(model);
    }
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let result = orchestrator.generate_for_year(1969, None).await;

    assert_eq!(result.status, GenerationStatus::NoHealthyModel);
    assert!(result.events.is_empty());
    assert!(result.attempts.is_empty());
    assert_eq!(transport.total_calls(), 0);
    assert!(result.failure_reason().unwrap().contains("circuit breaker"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_model_list_has_no_healthy_model() {
    let transport = Arc::new(ScriptedTransport::new());
    let registry = registry(2);
    let orchestrator = GenerationOrchestrator::new(
        client(transport.clone(), registry, RetryPolicy::no_retry()),
        Vec::new(),
    );

    let result = orchestrator.generate_for_year(1969, None).await;
    assert_eq!(result.status, GenerationStatus::NoHealthyModel);
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_over_represented_domain_is_truncated() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::Reply(events_payload(&politics_heavy_events()))]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let result = orchestrator.generate_for_year(1969, None).await;

    assert_eq!(result.status, GenerationStatus::Exhausted);
    assert_eq!(result.events.len(), 5);
    assert_eq!(
        result
            .events
            .iter()
            .filter(|event| event.domain == "politics")
            .count(),
        3
    );
    assert!(result
        .events
        .iter()
        .all(|event| !event.text.contains("de Gaulle")));
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_surplus_events_fill_in_after_truncation() {
    let mut events = politics_heavy_events();
    events.push(("The Concorde makes its first test flight in France", "technology"));
    events.push(("The Miracle Mets win the World Series", "sports"));
    let transport = Arc::new(
        ScriptedTransport::new().script("model-a", vec![Step::Reply(events_payload(&events))]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let result = orchestrator.generate_for_year(1969, None).await;

    assert_eq!(result.status, GenerationStatus::Success);
    assert_eq!(result.events.len(), 6);
    assert!(result
        .events
        .iter()
        .all(|event| !event.text.contains("de Gaulle")));
    assert_eq!(result.events[5].domain, "technology");
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_moves_to_next_model_without_retry() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::RateLimit])
            .script("model-b", vec![Step::Reply(six_valid_events())]),
    );
    let registry = registry(5);
    let orchestrator = orchestrator(&transport, &registry, fast_retry(3));

    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(transport.calls("model-a"), 1);
    assert_eq!(
        outcomes(&result),
        vec![
            ("model-a".to_string(), AttemptOutcome::RateLimit),
            ("model-b".to_string(), AttemptOutcome::Success),
        ]
    );
    assert_eq!(
        registry.snapshot("model-a").unwrap().consecutive_failures,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_model_waits_before_next_call() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::RateLimit, Step::Reply(six_valid_events())]),
    );
    let registry = registry(5);
    let orchestrator = GenerationOrchestrator::new(
        client(transport.clone(), registry.clone(), fast_retry(1)),
        vec![model_a()],
    );

    let started = Instant::now();
    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(transport.calls("model-a"), 2);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_models_back_off_between_rounds() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::RateLimit; 3])
            .script("model-b", vec![Step::RateLimit; 3]),
    );
    let registry = registry(10);
    let orchestrator = orchestrator(&transport, &registry, fast_retry(1));
    let options = GenerateOptions {
        max_attempts: Some(4),
        ..GenerateOptions::default()
    };

    let started = Instant::now();
    let result = orchestrator.generate_for_year(1969, Some(options)).await;

    assert_eq!(result.status, GenerationStatus::Exhausted);
    assert_eq!(
        result
            .attempts
            .iter()
            .map(|attempt| attempt.model_id.as_str())
            .collect::<Vec<_>>(),
        vec!["model-a", "model-b", "model-a", "model-b"]
    );
    assert!(result
        .attempts
        .iter()
        .all(|attempt| attempt.outcome == AttemptOutcome::RateLimit));
    // one 100ms backoff between the two rounds
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_rejection_after_pick_falls_through() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::Reply(six_valid_events())])
            .script("model-b", vec![Step::Reply(six_valid_events())]),
    );
    let registry = Arc::new(RejectingRegistry::new("model-a"));
    let orchestrator = GenerationOrchestrator::new(
        ResilientModelClient::new(transport.clone(), registry).with_retry_policy(RetryPolicy::no_retry()),
        vec![model_a(), model_b()],
    );

    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(
        outcomes(&result),
        vec![
            ("model-a".to_string(), AttemptOutcome::CircuitOpen),
            ("model-b".to_string(), AttemptOutcome::Success),
        ]
    );
    assert_eq!(transport.calls("model-a"), 0);
    assert_eq!(result.attempts[0].raw_event_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_schema_failures_drop_model_for_request() {
    let first = events_payload(&[
        ("Apollo astronauts land on the Moon with Armstrong and Aldrin", "science"),
        ("Woodstock festival draws huge crowds to Bethel", "culture"),
        ("Richard Nixon is inaugurated as President", "politics"),
    ]);
    let second = events_payload(&[
        ("The Concorde makes its first test flight in France", "technology"),
        ("Yasser Arafat becomes chairman of the PLO", "politics"),
        ("The Miracle Mets win the World Series", "sports"),
    ]);
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::BadShape, Step::BadShape, Step::Reply(six_valid_events())])
            .script("model-b", vec![Step::Reply(first), Step::Reply(second)]),
    );
    let registry = registry(5);
    let orchestrator = orchestrator(&transport, &registry, fast_retry(3));

    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(transport.calls("model-a"), 2);
    assert_eq!(transport.calls("model-b"), 2);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::SchemaInvalid);
    assert_eq!(result.attempts[1].outcome, AttemptOutcome::SchemaInvalid);
    assert!(registry.is_usable("model-a"));
}

#[tokio::test(start_paused = true)]
async fn test_network_error_retried_inside_one_attempt() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::Network, Step::Reply(six_valid_events())]),
    );
    let registry = registry(5);
    let orchestrator = orchestrator(&transport, &registry, fast_retry(2));

    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(transport.calls("model-a"), 2);
    assert!(result.attempts[0].elapsed_ms >= 100);

    let state = registry.snapshot("model-a").unwrap();
    assert_eq!(state.status, BreakerStatus::Closed);
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_call_times_out() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::Hang])
            .script("model-b", vec![Step::Reply(six_valid_events())]),
    );
    let registry = registry(1);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Timeout);
    assert!(result.attempts[0].elapsed_ms >= 5_000);
    assert_eq!(result.attempts[1].model_id, "model-b");
}

#[tokio::test(start_paused = true)]
async fn test_events_accumulate_across_attempts_without_duplicates() {
    let first = events_payload(&[
        ("Apollo astronauts land on the Moon with Armstrong and Aldrin", "science"),
        ("Woodstock festival draws huge crowds to Bethel", "culture"),
        ("Richard Nixon is inaugurated as President", "politics"),
    ]);
    let second = events_payload(&[
        ("apollo astronauts land on the  Moon with Armstrong and Aldrin.", "science"),
        ("Woodstock festival draws huge crowds to Bethel", "culture"),
        ("Moon landing watched by millions in 1969", "science"),
        ("The Concorde makes its first test flight in France", "technology"),
        ("Yasser Arafat becomes chairman of the PLO", "politics"),
        ("The Miracle Mets win the World Series", "sports"),
    ]);
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-a", vec![Step::Reply(first), Step::Reply(second)]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let result = orchestrator.generate_for_year(1969, None).await;

    assert!(result.is_success());
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].valid_event_count, 3);
    assert_eq!(result.attempts[1].raw_event_count, 6);
    assert_eq!(result.attempts[1].valid_event_count, 3);
    assert_eq!(result.events.len(), 6);
    assert_eq!(result.events[0].text, "Apollo astronauts land on the Moon with Armstrong and Aldrin");
    assert!(result.events.iter().all(|event| event.year == 1969));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_after_attempt_budget() {
    let transport = Arc::new(ScriptedTransport::new());
    let registry = registry(10);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());
    let options = GenerateOptions {
        max_attempts: Some(3),
        models: Some(vec![model_a()]),
        ..GenerateOptions::default()
    };

    let result = orchestrator.generate_for_year(1969, Some(options)).await;

    assert_eq!(result.status, GenerationStatus::Exhausted);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(transport.calls("model-a"), 3);
    assert!(result
        .attempts
        .iter()
        .all(|attempt| attempt.detail.is_some()));
    let reason = result.failure_reason().unwrap();
    assert!(reason.contains("model-a=NETWORK_ERROR"), "{}", reason);
}

#[tokio::test(start_paused = true)]
async fn test_zero_target_succeeds_without_calls() {
    let transport = Arc::new(ScriptedTransport::new());
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());
    let options = GenerateOptions {
        target_event_count: Some(0),
        ..GenerateOptions::default()
    };

    let result = orchestrator.generate_for_year(1969, Some(options)).await;

    assert_eq!(result.status, GenerationStatus::Success);
    assert!(result.events.is_empty());
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_model_override_replaces_configured_list() {
    let transport = Arc::new(
        ScriptedTransport::new().script("model-b", vec![Step::Reply(six_valid_events())]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());
    let options = GenerateOptions {
        models: Some(vec![model_b()]),
        ..GenerateOptions::default()
    };

    let result = orchestrator.generate_for_year(1969, Some(options)).await;

    assert!(result.is_success());
    assert_eq!(transport.calls("model-a"), 0);
    assert_eq!(result.attempts_for("model-b"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_models_are_tried_in_priority_order() {
    let transport = Arc::new(
        ScriptedTransport::new().script("model-a", vec![Step::Reply(six_valid_events())]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    assert_eq!(orchestrator.models()[0].id, "model-a");
    let result = orchestrator.generate_for_year(1969, None).await;
    assert!(result.is_success());
    assert_eq!(transport.calls("model-b"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_breaker_state() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("model-b", vec![Step::Reply(six_valid_events()), Step::Reply(six_valid_events())]),
    );
    let registry = registry(2);
    let orchestrator = orchestrator(&transport, &registry, RetryPolicy::no_retry());

    let (first, second) = tokio::join!(
        orchestrator.generate_for_year(1969, None),
        orchestrator.generate_for_year(1970, None)
    );

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(first.year, 1969);
    assert_eq!(second.year, 1970);
    assert_eq!(transport.calls("model-a"), 2);
    assert_eq!(transport.calls("model-b"), 2);
    assert_eq!(registry.snapshot("model-a").unwrap().status, BreakerStatus::Open);
}
