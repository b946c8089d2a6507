mod common;

use bulwark::{CircuitBreaker, CircuitBreakerConfig, CircuitState, ManualClock, PolicyError};
use common::{init_tracing, Flaky, TestError};
use std::time::Duration;

fn breaker(failures: u32, successes: u32) -> (CircuitBreaker, ManualClock) {
    let clock = ManualClock::starting_at(10_000);
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::new(failures, successes, Duration::from_millis(1_000)).unwrap(),
    )
    .with_clock(clock.clone());
    (breaker, clock)
}

async fn call(breaker: &CircuitBreaker, flaky: &Flaky) -> Result<usize, PolicyError<TestError>> {
    breaker.execute(move || flaky.call()).await
}

#[tokio::test]
async fn one_short_of_threshold_then_success_stays_closed() {
    init_tracing();
    for threshold in 1..=6u32 {
        let (breaker, _) = breaker(threshold, 1);
        let flaky = Flaky::new(threshold as usize - 1, TestError::ConnectionReset);
        for _ in 0..threshold {
            let _ = call(&breaker, &flaky).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed, "threshold {}", threshold);
        assert_eq!(breaker.failure_count(), 0);
    }
}

#[tokio::test]
async fn full_cycle_closed_open_half_open_closed() {
    init_tracing();
    let (breaker, clock) = breaker(3, 2);
    let down = Flaky::always(TestError::Unavailable(502));

    for _ in 0..3 {
        assert!(call(&breaker, &down).await.unwrap_err().is_inner());
    }
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Open);
    assert_eq!(snapshot.next_attempt_millis, Some(11_000));

    let err = call(&breaker, &down).await.unwrap_err();
    assert_eq!(err.to_string(), "circuit breaker open (next attempt at 11000ms)");
    assert_eq!(down.calls(), 3);

    clock.advance(Duration::from_millis(1_000));
    let up = Flaky::new(0, TestError::ConnectionReset);
    call(&breaker, &up).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    call(&breaker, &up).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().next_attempt_millis, None);
}

#[tokio::test]
async fn failed_trial_restarts_cool_down_from_its_own_time() {
    init_tracing();
    let (breaker, clock) = breaker(1, 1);
    let down = Flaky::always(TestError::ConnectionReset);

    let _ = call(&breaker, &down).await;
    clock.advance(Duration::from_millis(1_500));
    let _ = call(&breaker, &down).await;

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.snapshot().next_attempt_millis, Some(12_500));
    assert_eq!(down.calls(), 2);
}

#[tokio::test]
async fn reset_reopens_traffic_immediately() {
    init_tracing();
    let (breaker, _) = breaker(1, 1);
    let down = Flaky::always(TestError::ConnectionReset);
    let _ = call(&breaker, &down).await;
    assert!(!breaker.is_available());

    breaker.reset();
    assert!(breaker.is_available());
    let up = Flaky::new(0, TestError::ConnectionReset);
    assert_eq!(call(&breaker, &up).await.unwrap(), 1);
}
