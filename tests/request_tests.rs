//! Integration tests for the request lifecycle
//!
//! These tests verify request creation, replacement, and cancellation
//! through the queue facade, including the guarded update path that
//! validates terms against the oracle, and the solvability preview.

use atomic_queue::{
    AtomicRequest, QueueConfig, QueueError, QueueEvent, SolveMode,
};

mod helpers;
use helpers::*;

// ============================================================================
// PLAIN UPDATE TESTS
// ============================================================================

/// Test that the plain update stores whatever it is given
/// What is tested: zero-value and expired requests are stored as-is
/// Why: the plain path defers all validation to solve time
#[tokio::test]
async fn test_plain_update_stores_unvalidated_terms() {
    let world = TestWorld::new().await;

    // Zero amount, zero price, and a deadline in the past all store fine.
    let request = AtomicRequest::new(NOW - 1, 0, 0);
    world.submit("alice", request).await;

    let stored = world
        .queue
        .get_request(&addr("alice"), &asset(USDC), &asset(DAI))
        .await
        .unwrap();
    assert_eq!(stored, request, "Record should be stored unmodified");

    // But such a request never settles.
    world.fund("solver", DAI, 1000 * ONE_DAI).await;
    let report = world
        .solve_usdc_dai(&["alice"], &p2p(), SolveMode::Lenient)
        .await
        .unwrap();
    assert_eq!(report.settled_count(), 0, "Inert request must not settle");
}

/// Test that updating replaces the record in full
/// What is tested: a second update overwrites every field
/// Why: requests have replace semantics, not merge semantics
#[tokio::test]
async fn test_update_replaces_record_in_full() {
    let world = TestWorld::new().await;

    world.submit("alice", usdc_request(1000)).await;
    world.submit("alice", AtomicRequest::new(LATER + 5, 7, 9)).await;

    let stored = world
        .queue
        .get_request(&addr("alice"), &asset(USDC), &asset(DAI))
        .await
        .unwrap();
    assert_eq!(stored.deadline, LATER + 5);
    assert_eq!(stored.limit_price, 7);
    assert_eq!(stored.offer_amount, 9);
}

/// Test that updates emit RequestUpdated
/// What is tested: event content matches the stored record
/// Why: hosts consume events to mirror queue state
#[tokio::test]
async fn test_update_emits_event() {
    let world = TestWorld::new().await;
    world.submit("alice", usdc_request(5)).await;

    let events = world.queue.events().snapshot().await;
    assert_eq!(
        events,
        vec![QueueEvent::RequestUpdated {
            requester: addr("alice"),
            offer: asset(USDC),
            want: asset(DAI),
            offer_amount: 5 * ONE_USDC,
            limit_price: PRICE_1_TO_1,
            deadline: LATER,
        }]
    );
}

// ============================================================================
// GUARDED UPDATE TESTS
// ============================================================================

/// Test that the guarded update rejects empty terms
/// What is tested: zero offer amount and zero price fail upfront
/// Why: the guarded path exists to catch bad requests before they sit idle
#[tokio::test]
async fn test_safe_update_rejects_zero_terms() {
    let world = TestWorld::new().await;

    let result = world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            AtomicRequest::new(LATER, PRICE_1_TO_1, 0),
            500,
        )
        .await;
    assert_eq!(result, Err(QueueError::ZeroOfferAmount));

    let result = world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            AtomicRequest::new(LATER, 0, ONE_USDC),
            500,
        )
        .await;
    assert_eq!(result, Err(QueueError::ZeroPrice));
}

async fn submit_safe_with_deadline(world: &TestWorld, deadline: u64) -> Result<(), QueueError> {
    world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            AtomicRequest::new(deadline, PRICE_1_TO_1, ONE_USDC),
            500,
        )
        .await
}

/// Test the guarded update deadline window
/// What is tested: past deadlines and deadlines beyond the horizon fail;
/// the boundaries themselves pass
/// Why: both ends of the window are inclusive and easy to get wrong
#[tokio::test]
async fn test_safe_update_deadline_window() {
    let world = TestWorld::new().await;
    let horizon = QueueConfig::default().requests.max_deadline_horizon_secs;

    assert_eq!(
        submit_safe_with_deadline(&world, NOW - 1).await,
        Err(QueueError::DeadlineInPast)
    );
    assert_eq!(
        submit_safe_with_deadline(&world, NOW + horizon + 1).await,
        Err(QueueError::DeadlineTooDistant)
    );

    // A deadline of exactly now and exactly the horizon both pass.
    assert!(submit_safe_with_deadline(&world, NOW).await.is_ok());
    assert!(submit_safe_with_deadline(&world, NOW + horizon).await.is_ok());
}

async fn submit_safe_with_price(world: &TestWorld, price: u128) -> Result<(), QueueError> {
    world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            AtomicRequest::new(LATER, price, ONE_USDC),
            500, // 5%
        )
        .await
}

/// Test the guarded update price band
/// What is tested: prices inside the requested band pass, prices one unit
/// outside fail with PriceOutOfBounds
/// Why: the band is the core protection of the guarded path
#[tokio::test]
async fn test_safe_update_price_band() {
    let world = TestWorld::new().await;

    // At par the USDC -> DAI pair rate equals the 1:1 limit price.
    let low = PRICE_1_TO_1 / 10_000 * 9_500;
    let high = PRICE_1_TO_1 / 10_000 * 10_500;

    assert!(
        submit_safe_with_price(&world, low).await.is_ok(),
        "Lower bound is inclusive"
    );
    assert!(
        submit_safe_with_price(&world, high).await.is_ok(),
        "Upper bound is inclusive"
    );
    assert_eq!(
        submit_safe_with_price(&world, low - 1).await,
        Err(QueueError::PriceOutOfBounds)
    );
    assert_eq!(
        submit_safe_with_price(&world, high + 1).await,
        Err(QueueError::PriceOutOfBounds)
    );
}

/// Test that the discount bound is clamped to the configured cap
/// What is tested: a caller asking for a 50% band still gets the 20% cap
/// Why: the cap is a queue-level protection the caller cannot widen
#[tokio::test]
async fn test_safe_update_discount_clamped_to_config_cap() {
    let world = TestWorld::new().await;

    // 30% below par: inside the caller's requested 50% band, outside the
    // default 20% cap.
    let price = PRICE_1_TO_1 / 10 * 7;
    let result = world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            AtomicRequest::new(LATER, price, ONE_USDC),
            5_000,
        )
        .await;
    assert_eq!(result, Err(QueueError::PriceOutOfBounds));

    // 15% below par passes under the cap.
    let price = PRICE_1_TO_1 / 100 * 85;
    world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            AtomicRequest::new(LATER, price, ONE_USDC),
            5_000,
        )
        .await
        .unwrap();
}

/// Test that the guarded update needs an acceptable oracle rate
/// What is tested: a stale quote fails the update with RateUnavailable
/// Why: without a trusted rate the band cannot be evaluated
#[tokio::test]
async fn test_safe_update_requires_fresh_rate() {
    let world = TestWorld::new().await;
    let max_age = QueueConfig::default().oracle.max_age_secs;

    world.feed.set(asset(USDC), PAR_RATE, NOW - max_age - 1).await;

    let result = world
        .queue
        .update_request_safe(
            &ctx("alice"),
            asset(USDC),
            asset(DAI),
            usdc_request(1),
            500,
        )
        .await;
    assert_eq!(result, Err(QueueError::RateUnavailable));
}

/// Test that the guarded update rejects a jumping rate
/// What is tested: after one accepted update baselines the oracle, a 15%
/// feed move makes the next guarded update fail with RateUnavailable
/// Why: a single manipulated quote must not reprice the band
#[tokio::test]
async fn test_safe_update_rejects_jumping_rate() {
    let world = TestWorld::new().await;

    submit_safe_with_price(&world, PRICE_1_TO_1).await.unwrap();

    // 15% above the accepted baseline, past the default 10% jump bound.
    world.feed.set(asset(USDC), PAR_RATE / 100 * 115, NOW).await;

    assert_eq!(
        submit_safe_with_price(&world, PRICE_1_TO_1).await,
        Err(QueueError::RateUnavailable)
    );
}

// ============================================================================
// CANCELLATION TESTS
// ============================================================================

/// Test cancel removes the record and emits an event
/// What is tested: cancel round trip
/// Why: cancellation is the requester's only exit besides settlement
#[tokio::test]
async fn test_cancel_removes_request() {
    let world = TestWorld::new().await;
    world.submit("alice", usdc_request(10)).await;

    world
        .queue
        .cancel_request(&ctx("alice"), asset(USDC), asset(DAI))
        .await
        .unwrap();

    assert!(
        world
            .queue
            .get_request(&addr("alice"), &asset(USDC), &asset(DAI))
            .await
            .is_none(),
        "Cancelled request should be gone"
    );

    let events = world.queue.events().snapshot().await;
    assert!(events.contains(&QueueEvent::RequestCancelled {
        requester: addr("alice"),
        offer: asset(USDC),
        want: asset(DAI),
    }));
}

/// Test cancelling a missing request
/// What is tested: RequestNotFound for unknown keys
/// Why: cancel must not silently succeed on nothing
#[tokio::test]
async fn test_cancel_missing_request() {
    let world = TestWorld::new().await;
    let result = world
        .queue
        .cancel_request(&ctx("alice"), asset(USDC), asset(DAI))
        .await;
    assert_eq!(result, Err(QueueError::RequestNotFound));
}

/// Test that requests are keyed per requester
/// What is tested: bob cannot cancel alice's request
/// Why: lifecycle operations only ever touch the caller's own records
#[tokio::test]
async fn test_cancel_only_touches_own_request() {
    let world = TestWorld::new().await;
    world.submit("alice", usdc_request(10)).await;

    let result = world
        .queue
        .cancel_request(&ctx("bob"), asset(USDC), asset(DAI))
        .await;
    assert_eq!(result, Err(QueueError::RequestNotFound));

    assert!(
        world
            .queue
            .get_request(&addr("alice"), &asset(USDC), &asset(DAI))
            .await
            .is_some(),
        "Alice's request must be untouched"
    );
}

// ============================================================================
// SOLVABILITY PREVIEW TESTS
// ============================================================================

async fn check_alice_solvable(world: &TestWorld, now: u64) -> Result<(), QueueError> {
    world
        .queue
        .is_request_solvable(&addr("alice"), &asset(USDC), &asset(DAI), now)
        .await
}

/// Test the solvability preview across the failure ladder
/// What is tested: each missing precondition maps to its exact error
/// Why: solvers use the preview to build batches; reasons must be precise
#[tokio::test]
async fn test_is_request_solvable_reports_exact_reason() {
    let world = TestWorld::new().await;

    assert_eq!(
        check_alice_solvable(&world, NOW).await,
        Err(QueueError::RequestNotFound)
    );

    world.submit("alice", usdc_request(1000)).await;
    assert_eq!(
        check_alice_solvable(&world, NOW).await,
        Err(QueueError::InsufficientBalance)
    );

    // Enough balance, no allowance yet.
    world
        .ledger
        .mint(&asset(USDC), &addr("alice"), 1000 * ONE_USDC)
        .await
        .unwrap();
    assert_eq!(
        check_alice_solvable(&world, NOW).await,
        Err(QueueError::InsufficientAllowance)
    );

    world.approve_queue("alice", USDC, u128::MAX).await;
    assert_eq!(check_alice_solvable(&world, NOW).await, Ok(()));

    // The record stays solvable through its deadline, not past it.
    assert_eq!(check_alice_solvable(&world, LATER).await, Ok(()));
    assert_eq!(
        check_alice_solvable(&world, LATER + 1).await,
        Err(QueueError::DeadlineExceeded)
    );
}

// ============================================================================
// PAUSE INTERACTION TESTS
// ============================================================================

/// Test pause gating of the request surface
/// What is tested: updates fail while paused, cancel still works
/// Why: requesters must always be able to withdraw during an incident
#[tokio::test]
async fn test_paused_queue_blocks_updates_but_not_cancel() {
    let world = TestWorld::new().await;
    world.submit("alice", usdc_request(10)).await;

    world.queue.pause(&ctx("admin")).await.unwrap();

    assert_eq!(
        world
            .queue
            .update_request(&ctx("bob"), asset(USDC), asset(DAI), usdc_request(1))
            .await,
        Err(QueueError::Paused)
    );
    assert_eq!(
        world
            .queue
            .update_request_safe(&ctx("bob"), asset(USDC), asset(DAI), usdc_request(1), 500)
            .await,
        Err(QueueError::Paused)
    );

    world
        .queue
        .cancel_request(&ctx("alice"), asset(USDC), asset(DAI))
        .await
        .unwrap();

    world.queue.unpause(&ctx("admin")).await.unwrap();
    world.submit("bob", usdc_request(1)).await;
}
