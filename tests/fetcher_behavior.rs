//! Behavior tests for the shared rate-limited fetcher: concurrency ceiling,
//! retry classification, deadlines, single-flight sharing and pagination.

mod support;

use std::sync::Arc;
use std::time::Duration;

use divscout_core::{FetchErrorKind, ProviderQuery, RetryPolicy};
use futures::future::join_all;
use serde_json::json;
use tokio::time::Instant;

use support::{fetcher, quick_retry, Reply, ScriptedProvider, API_KEY};

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn when_many_callers_fetch_at_once_in_flight_requests_never_exceed_the_cap() {
    // Given: a slow provider and a fetcher capped at 3 concurrent requests
    let provider = ScriptedProvider::new().with_latency(Duration::from_millis(25));
    provider.on_prefix("quote-short/", vec![Reply::json(json!([]))]);
    let fetcher = fetcher(&provider, 3, RetryPolicy::no_retry());

    // When: twelve independent queries are issued together
    let queries: Vec<ProviderQuery> = (0..12)
        .map(|index| ProviderQuery::new(format!("quote-short/T{index}")))
        .collect();
    let results = join_all(queries.iter().map(|query| fetcher.fetch(query))).await;

    // Then: every query succeeds and the ceiling was respected
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(provider.request_count(), 12);
    assert!(provider.peak_in_flight() <= 3, "peak {}", provider.peak_in_flight());
    assert!(provider.peak_in_flight() >= 2, "requests should overlap");
}

#[tokio::test]
async fn when_strategies_share_a_fetcher_clone_they_share_one_ceiling() {
    let provider = ScriptedProvider::new().with_latency(Duration::from_millis(20));
    provider.on_prefix("quote-short/", vec![Reply::json(json!([]))]);
    let fetcher = fetcher(&provider, 2, RetryPolicy::no_retry());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let fetcher = fetcher.scoped(None);
            tokio::spawn(async move {
                for index in 0..3 {
                    let query = ProviderQuery::new(format!("quote-short/W{worker}X{index}"));
                    fetcher.fetch(&query).await.expect("fetch");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join");
    }

    assert_eq!(provider.request_count(), 12);
    assert!(provider.peak_in_flight() <= 2);
    assert_eq!(fetcher.stats().successes, 12);
}

// =============================================================================
// Retry classification
// =============================================================================

#[tokio::test]
async fn when_provider_recovers_after_transient_errors_the_call_succeeds() {
    let provider = ScriptedProvider::new();
    provider.on(
        "stock-screener",
        vec![
            Reply::Status(503),
            Reply::Status(429),
            Reply::json(json!([{ "symbol": "O" }])),
        ],
    );
    let fetcher = fetcher(&provider, 4, quick_retry(4));

    let body = fetcher
        .fetch(&ProviderQuery::new("stock-screener"))
        .await
        .expect("third attempt succeeds");

    assert_eq!(body, json!([{ "symbol": "O" }]));
    assert_eq!(provider.request_count(), 3);
    let stats = fetcher.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.failures, 0);
}

#[tokio::test]
async fn when_transient_errors_persist_the_call_is_exhausted_after_max_attempts() {
    let provider = ScriptedProvider::new();
    provider.on("stock-screener", vec![Reply::Status(502)]);
    let fetcher = fetcher(&provider, 4, quick_retry(3));

    let error = fetcher
        .fetch(&ProviderQuery::new("stock-screener").with_param("sector", "Energy"))
        .await
        .expect_err("must exhaust");

    assert_eq!(error.kind(), FetchErrorKind::Exhausted);
    assert_eq!(error.attempts(), 3);
    assert!(error.retriable());
    assert_eq!(error.query(), "stock-screener?sector=Energy");
    assert_eq!(provider.request_count(), 3);
    assert_eq!(fetcher.stats().failures, 1);
}

#[tokio::test]
async fn when_transport_drops_the_connection_the_call_is_retried() {
    let provider = ScriptedProvider::new();
    provider.on(
        "etf/list",
        vec![Reply::Transport(true), Reply::json(json!([]))],
    );
    let fetcher = fetcher(&provider, 1, quick_retry(2));

    fetcher
        .fetch(&ProviderQuery::new("etf/list"))
        .await
        .expect("retry succeeds");
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn when_provider_rejects_the_request_no_retry_is_attempted() {
    let provider = ScriptedProvider::new();
    provider.on("quote-short/NOPE", vec![Reply::Status(404)]);
    let fetcher = fetcher(&provider, 4, quick_retry(5));

    let error = fetcher
        .fetch(&ProviderQuery::new("quote-short/NOPE"))
        .await
        .expect_err("404 is final");

    assert_eq!(error.kind(), FetchErrorKind::NonRetriable);
    assert_eq!(error.attempts(), 1);
    assert!(!error.retriable());
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn when_body_is_not_json_the_call_fails_as_malformed_without_retry() {
    let provider = ScriptedProvider::new();
    provider.on("etf/list", vec![Reply::Raw("<html>maintenance</html>")]);
    let fetcher = fetcher(&provider, 4, quick_retry(5));

    let error = fetcher
        .fetch(&ProviderQuery::new("etf/list"))
        .await
        .expect_err("malformed");

    assert_eq!(error.kind(), FetchErrorKind::Malformed);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn when_credential_is_refused_the_fetcher_remembers_it() {
    let provider = ScriptedProvider::new();
    provider.on("stock-screener", vec![Reply::Status(401)]);
    provider.on(
        "etf/list",
        vec![Reply::json(json!({ "Error Message": "Invalid API KEY." }))],
    );
    let fetcher = fetcher(&provider, 4, quick_retry(3));
    assert!(!fetcher.credential_rejected());

    let status_error = fetcher
        .fetch(&ProviderQuery::new("stock-screener"))
        .await
        .expect_err("401");
    let body_error = fetcher
        .fetch(&ProviderQuery::new("etf/list"))
        .await
        .expect_err("error body");

    assert!(status_error.is_unauthorized());
    assert!(body_error.is_unauthorized());
    assert_eq!(provider.request_count(), 2);
    assert!(fetcher.credential_rejected());
    assert!(!status_error.to_string().contains(API_KEY));
    assert!(!body_error.to_string().contains(API_KEY));
}

#[tokio::test]
async fn every_request_carries_the_credential_as_a_query_parameter() {
    let provider = ScriptedProvider::new();
    provider.on("stock-screener", vec![Reply::json(json!([]))]);
    let fetcher = fetcher(&provider, 1, RetryPolicy::no_retry());

    fetcher
        .fetch(&ProviderQuery::new("stock-screener").with_param("isEtf", false))
        .await
        .expect("fetch");

    let requests = provider.requests();
    assert_eq!(requests[0].query_param("apikey"), Some(API_KEY));
    assert_eq!(requests[0].query_param("isEtf"), Some("false"));
}

// =============================================================================
// Deadlines
// =============================================================================

#[tokio::test]
async fn when_deadline_has_passed_no_request_is_started() {
    let provider = ScriptedProvider::new();
    provider.on("etf/list", vec![Reply::json(json!([]))]);
    let fetcher = fetcher(&provider, 2, quick_retry(3)).scoped(Some(Instant::now()));

    let error = fetcher
        .fetch(&ProviderQuery::new("etf/list"))
        .await
        .expect_err("deadline");

    assert_eq!(error.kind(), FetchErrorKind::DeadlineExceeded);
    assert!(error.is_deadline());
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn when_a_retry_would_cross_the_deadline_the_call_stops_after_the_current_attempt() {
    let provider = ScriptedProvider::new();
    provider.on("stock-screener", vec![Reply::Status(503)]);
    let deadline = Instant::now() + Duration::from_millis(100);
    let fetcher = fetcher(
        &provider,
        2,
        RetryPolicy::fixed(Duration::from_millis(500), 5),
    )
    .scoped(Some(deadline));

    let started = Instant::now();
    let error = fetcher
        .fetch(&ProviderQuery::new("stock-screener"))
        .await
        .expect_err("deadline");

    assert_eq!(error.kind(), FetchErrorKind::DeadlineExceeded);
    assert_eq!(error.attempts(), 1);
    assert_eq!(provider.request_count(), 1);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn when_waiting_for_capacity_outlasts_the_deadline_the_call_gives_up() {
    // Given: one permit held by a slow request
    let provider = ScriptedProvider::new();
    provider.on(
        "etf/list",
        vec![Reply::json(json!([])).after(Duration::from_millis(300))],
    );
    provider.on("stock-screener", vec![Reply::json(json!([]))]);
    let fetcher = fetcher(&provider, 1, RetryPolicy::no_retry())
        .scoped(Some(Instant::now() + Duration::from_millis(60)));

    // When: a second query queues behind it
    let slow_query = ProviderQuery::new("etf/list");
    let queued_query = ProviderQuery::new("stock-screener");
    let (slow, queued) = tokio::join!(
        fetcher.fetch(&slow_query),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            fetcher.fetch(&queued_query).await
        }
    );

    // Then: the in-flight attempt finishes, the queued one never starts
    assert!(slow.is_ok());
    assert_eq!(
        queued.expect_err("deadline").kind(),
        FetchErrorKind::DeadlineExceeded
    );
    assert_eq!(provider.calls_to("stock-screener"), 0);
}

// =============================================================================
// Single-flight and pagination
// =============================================================================

#[tokio::test]
async fn concurrent_identical_shared_fetches_issue_one_request() {
    let provider = ScriptedProvider::new().with_latency(Duration::from_millis(20));
    provider.on("quote-short/KO", vec![Reply::json(json!([{ "symbol": "KO", "price": 61.2 }]))]);
    let fetcher = fetcher(&provider, 4, RetryPolicy::no_retry());
    let query = ProviderQuery::new("quote-short/KO");

    let results = join_all((0..5).map(|_| fetcher.fetch_shared(&query))).await;

    assert_eq!(provider.request_count(), 1);
    let first = results[0].as_ref().expect("shared");
    assert!(results.iter().all(|result| result.as_ref().ok() == Some(first)));
}

#[tokio::test]
async fn shared_fetch_failures_are_not_cached() {
    let provider = ScriptedProvider::new();
    provider.on(
        "quote-short/KO",
        vec![Reply::Status(404), Reply::json(json!([]))],
    );
    let fetcher = fetcher(&provider, 1, RetryPolicy::no_retry());
    let query = ProviderQuery::new("quote-short/KO");

    assert!(fetcher.fetch_shared(&query).await.is_err());
    assert!(fetcher.fetch_shared(&query).await.is_ok());
    assert!(fetcher.fetch_shared(&query).await.is_ok());
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn a_scoped_view_starts_with_an_empty_response_cache() {
    let provider = ScriptedProvider::new();
    provider.on("etf/list", vec![Reply::json(json!([]))]);
    let base = fetcher(&provider, 1, RetryPolicy::no_retry());
    let query = ProviderQuery::new("etf/list");

    let first_run = base.scoped(None);
    first_run.fetch_shared(&query).await.expect("first");
    first_run.fetch_shared(&query).await.expect("cached");
    base.scoped(None).fetch_shared(&query).await.expect("second run");

    assert_eq!(provider.request_count(), 2);
    assert_eq!(base.stats().successes, 2);
}

#[tokio::test]
async fn pagination_stops_at_the_first_short_page() {
    let provider = ScriptedProvider::new();
    provider.on_param(
        "stock-screener",
        "offset",
        "0",
        vec![Reply::json(json!([{ "symbol": "A" }, { "symbol": "B" }]))],
    );
    provider.on_param(
        "stock-screener",
        "offset",
        "2",
        vec![Reply::json(json!([{ "symbol": "C" }, { "symbol": "D" }]))],
    );
    provider.on_param(
        "stock-screener",
        "offset",
        "4",
        vec![Reply::json(json!([{ "symbol": "E" }]))],
    );
    let fetcher = fetcher(&provider, 2, RetryPolicy::no_retry());

    let rows = fetcher
        .fetch_pages(&ProviderQuery::new("stock-screener"), 2, 10)
        .await
        .expect("pages");

    assert_eq!(rows.len(), 5);
    assert_eq!(provider.request_count(), 3);
    assert_eq!(provider.requests()[2].query_param("limit"), Some("2"));
}

#[tokio::test]
async fn pagination_respects_the_page_budget() {
    let provider = ScriptedProvider::new();
    provider.on(
        "stock-screener",
        vec![Reply::json(json!([{ "symbol": "A" }, { "symbol": "B" }]))],
    );
    let fetcher = fetcher(&provider, 2, RetryPolicy::no_retry());

    let rows = fetcher
        .fetch_pages(&ProviderQuery::new("stock-screener"), 2, 3)
        .await
        .expect("pages");

    assert_eq!(rows.len(), 6);
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn a_non_array_page_is_malformed() {
    let provider = ScriptedProvider::new();
    provider.on("etf/list", vec![Reply::json(json!({ "rows": [] }))]);
    let fetcher = fetcher(&provider, 2, RetryPolicy::no_retry());

    let error = fetcher
        .fetch_pages(&ProviderQuery::new("etf/list"), 100, 2)
        .await
        .expect_err("malformed");
    assert_eq!(error.kind(), FetchErrorKind::Malformed);
}

#[tokio::test]
async fn fetcher_clones_share_counters() {
    let provider = ScriptedProvider::new();
    provider.on("etf/list", vec![Reply::json(json!([]))]);
    let fetcher = fetcher(&provider, 2, RetryPolicy::no_retry());
    let clone = fetcher.clone();

    clone.fetch(&ProviderQuery::new("etf/list")).await.expect("fetch");

    assert_eq!(fetcher.stats().requests, 1);
    assert_eq!(Arc::strong_count(&provider), 2);
}
