use std::time::Duration;

use tokio::time::timeout;

use encounter_docgen::ai_gateway::{
    budget::BudgetEnforcer, error::GatewayErrorKind, types::BudgetConfig,
};

use crate::support::canonical_request;

#[tokio::test]
async fn given_output_token_limit_exceeded_when_pre_dispatch_then_budget_exceeded_is_returned() {
    let enforcer = BudgetEnforcer::new(BudgetConfig {
        max_request_time_ms: 45_000,
        max_usage_tokens_per_request: Some(10),
        max_concurrency_per_backend: 1,
        rate_smoothing_per_second: None,
    });

    let err = enforcer
        .pre_dispatch(&canonical_request(Some("b1"), Some(20)), &"b1".to_string())
        .await
        .expect_err("should exceed budget");
    assert_eq!(err.kind, GatewayErrorKind::BudgetExceeded);
    assert!(!err.retryable);
}

#[tokio::test]
async fn given_concurrency_limit_reached_when_pre_dispatch_then_second_request_blocks() {
    let enforcer = BudgetEnforcer::new(BudgetConfig {
        max_request_time_ms: 45_000,
        max_usage_tokens_per_request: None,
        max_concurrency_per_backend: 1,
        rate_smoothing_per_second: None,
    });
    let backend = "b1".to_string();

    let lease = enforcer
        .pre_dispatch(&canonical_request(Some("b1"), None), &backend)
        .await
        .expect("first permit");

    let second = timeout(
        Duration::from_millis(40),
        enforcer.pre_dispatch(&canonical_request(Some("b1"), None), &backend),
    )
    .await;
    assert!(second.is_err(), "second request should block on semaphore");

    drop(lease);
    timeout(
        Duration::from_millis(200),
        enforcer.pre_dispatch(&canonical_request(Some("b1"), None), &backend),
    )
    .await
    .expect("permit is released with the lease")
    .expect("third permit");
}

#[test]
fn request_time_override_is_clamped_by_budget() {
    let enforcer = BudgetEnforcer::new(BudgetConfig {
        max_request_time_ms: 1_000,
        ..BudgetConfig::default()
    });

    let mut request = canonical_request(None, None);
    assert_eq!(
        enforcer.effective_timeout(&request),
        Duration::from_millis(1_000)
    );

    request.limits.max_request_time_ms = Some(250);
    assert_eq!(
        enforcer.effective_timeout(&request),
        Duration::from_millis(250)
    );

    request.limits.max_request_time_ms = Some(5_000);
    assert_eq!(
        enforcer.effective_timeout(&request),
        Duration::from_millis(1_000)
    );
}
