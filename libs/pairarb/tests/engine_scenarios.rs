//! End-to-end engine scenarios against the simulated exchange.
//!
//! Covers the maker happy path, one-sided recovery in its three endings,
//! the executor protocol, and the engine-wide invariants (two-order bound,
//! no trading after Holding/Blocked, equal exposure).

mod common;

use common::{levels, test_market, BuyRule, SellRule, SimGateway, DOWN, UP};
use pairarb::application::executor::{ArbExecutor, TradeOutcome};
use pairarb::application::session::{MarketSession, MarketStatus};
use pairarb::application::stats::EngineStats;
use pairarb::infrastructure::book_cache::BookCache;
use pairarb::infrastructure::config::{QuoteTuning, RecoveryTuning, ScanTuning};
use pairarb::infrastructure::gateway::{BookTop, ExchangeGateway};
use std::sync::Arc;
use std::time::Duration;

const EPS: f64 = 1e-6;

/// Millisecond-scale recovery waits so polling paths run in test time.
fn fast_recovery() -> RecoveryTuning {
    RecoveryTuning {
        max_unwind_loss: 0.02,
        complete_wait_secs: 1,
        complete_poll_ms: 5,
        improve_wait_secs: 1,
        improve_poll_ms: 5,
        cutloss_attempts: 3,
        cutloss_poll_ms: 5,
        settlement_delay_ms: 1,
    }
}

struct Rig {
    gateway: Arc<SimGateway>,
    books: Arc<BookCache>,
    stats: Arc<EngineStats>,
    session: MarketSession,
}

fn rig(expiry_secs: i64, recovery: RecoveryTuning) -> Rig {
    let gateway = Arc::new(SimGateway::new());
    let books = Arc::new(BookCache::default());
    let stats = Arc::new(EngineStats::new());
    let session = MarketSession::new(
        test_market(expiry_secs),
        Arc::clone(&gateway) as Arc<dyn ExchangeGateway>,
        Arc::clone(&books),
        QuoteTuning::default(),
        recovery,
        Arc::clone(&stats),
    );
    Rig {
        gateway,
        books,
        stats,
        session,
    }
}

/// Rich two-sided book that prices to a 0.97 combined pair in LIVE.
fn feed_quotable_books(books: &BookCache) {
    books.apply_snapshot(
        UP,
        &levels(&[("0.46", "100")]),
        &levels(&[("0.53", "100")]),
    );
    books.apply_snapshot(
        DOWN,
        &levels(&[("0.45", "100")]),
        &levels(&[("0.52", "100")]),
    );
}

// ============================================================================
// Scenario: clean market-maker happy path
// ============================================================================

#[tokio::test]
async fn maker_happy_path_locks_pair_and_holds() {
    let mut r = rig(600, fast_recovery());
    feed_quotable_books(&r.books);
    r.gateway.set_buy_rule(UP, BuyRule::Fill);
    r.gateway.set_buy_rule(DOWN, BuyRule::Fill);

    // Tick 1: flat, prices a pair and places both legs
    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Quoting);
    assert_eq!(r.gateway.buys_placed(), 2);
    assert_eq!(r.gateway.position_of(UP), 5);
    assert_eq!(r.gateway.position_of(DOWN), 5);

    // Tick 2: sees both legs filled, locks in the pair
    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Holding);

    let (pos_up, pos_down) = r.session.positions();
    assert_eq!(pos_up, 5);
    assert_eq!(pos_down, 5);
    assert!(pos_up.abs_diff(pos_down) <= 1);

    // Bids summed to the 0.97 target, so 5 pairs lock 0.15
    assert!((r.stats.snapshot().realized_pnl - 0.15).abs() < 1e-3);

    // Invariants: never more than two resting orders, and Holding places
    // no further BUYs
    assert!(r.gateway.max_open_orders() <= 2);
    let buys_before = r.gateway.buys_placed();
    for _ in 0..3 {
        r.session.tick().await.unwrap();
    }
    assert_eq!(r.gateway.buys_placed(), buys_before);
    assert_eq!(r.gateway.open_order_count(), 0);
}

// ============================================================================
// Scenario: one-sided fill, cheap completion
// ============================================================================

#[tokio::test]
async fn one_sided_fill_completes_aggressively() {
    let mut r = rig(600, fast_recovery());
    feed_quotable_books(&r.books);
    r.gateway.set_buy_rule(UP, BuyRule::Fill);
    r.gateway.set_buy_rule(DOWN, BuyRule::Rest);

    r.session.tick().await.unwrap();
    assert_eq!(r.gateway.position_of(UP), 5);
    assert_eq!(r.gateway.position_of(DOWN), 0);

    // Down ask comes in cheap enough to complete within the 2% bound
    r.books
        .apply_snapshot(DOWN, &levels(&[("0.45", "100")]), &levels(&[("0.50", "100")]));
    r.gateway.set_buy_rule(DOWN, BuyRule::Fill);

    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Holding);
    assert_eq!(r.gateway.position_of(UP), 5);
    assert_eq!(r.gateway.position_of(DOWN), 5);

    // bid_up ~0.490, completion at ask 0.50: pays ~0.990 per pair
    let pnl = r.stats.snapshot().realized_pnl;
    assert!(pnl > 0.0 && pnl < 0.15, "unexpected pnl {}", pnl);

    assert!(r.gateway.max_open_orders() <= 2);
    assert_eq!(r.gateway.open_order_count(), 0);
}

// ============================================================================
// Scenario: one-sided fill, expensive -> wait -> improve
// ============================================================================

#[tokio::test]
async fn one_sided_fill_waits_for_improvement() {
    let mut r = rig(600, fast_recovery());
    feed_quotable_books(&r.books);
    r.gateway.set_buy_rule(UP, BuyRule::Fill);
    r.gateway.set_buy_rule(DOWN, BuyRule::Rest);

    r.session.tick().await.unwrap();
    assert_eq!(r.gateway.position_of(UP), 5);

    // Down side too expensive to complete right now (would pay ~1.04)
    r.books
        .apply_snapshot(DOWN, &levels(&[("0.45", "100")]), &levels(&[("0.55", "100")]));

    // Ask improves while recovery is polling
    let books = Arc::clone(&r.books);
    let gateway = Arc::clone(&r.gateway);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        books.apply_snapshot(DOWN, &levels(&[("0.45", "100")]), &levels(&[("0.48", "100")]));
        gateway.set_buy_rule(DOWN, BuyRule::Fill);
    });

    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Holding);
    assert_eq!(r.gateway.position_of(DOWN), 5);

    // Completed at 0.48 after improvement: positive realised edge
    assert!(r.stats.snapshot().realized_pnl > 0.0);
}

// ============================================================================
// Scenario: one-sided fill, no improvement -> cut loss
// ============================================================================

#[tokio::test]
async fn one_sided_fill_cuts_loss_and_blocks() {
    let mut recovery = fast_recovery();
    recovery.improve_wait_secs = 0; // single too-expensive check, then cut
    let mut r = rig(600, recovery);
    feed_quotable_books(&r.books);
    r.gateway.set_buy_rule(UP, BuyRule::Fill);
    r.gateway.set_buy_rule(DOWN, BuyRule::Rest);

    r.session.tick().await.unwrap();
    assert_eq!(r.gateway.position_of(UP), 5);

    // Down stays expensive for the whole window
    r.books
        .apply_snapshot(DOWN, &levels(&[("0.45", "100")]), &levels(&[("0.55", "100")]));

    r.session.tick().await.unwrap();

    assert_eq!(r.session.status(), MarketStatus::Blocked);
    assert_eq!(r.gateway.position_of(UP), 0);
    assert_eq!(r.gateway.position_of(DOWN), 0);

    let snap = r.stats.snapshot();
    assert_eq!(snap.cut_losses, 1);
    // Estimated unwind loss: 5 shares x 0.03
    assert!((snap.realized_pnl + 0.15).abs() < EPS);

    // Blocked is terminal: further ticks trade nothing
    let buys = r.gateway.buys_placed();
    let sells = r.gateway.sells_placed();
    for _ in 0..3 {
        r.session.tick().await.unwrap();
    }
    assert_eq!(r.gateway.buys_placed(), buys);
    assert_eq!(r.gateway.sells_placed(), sells);
}

// ============================================================================
// Scenario: flat book keeps the session quoting and re-evaluating
// ============================================================================

#[tokio::test]
async fn unfilled_quotes_stay_live_across_ticks() {
    let mut r = rig(600, fast_recovery());
    feed_quotable_books(&r.books);
    r.gateway.set_buy_rule(UP, BuyRule::Rest);
    r.gateway.set_buy_rule(DOWN, BuyRule::Rest);

    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Quoting);
    assert_eq!(r.gateway.open_order_count(), 2);

    // Same book, same pair: no churn
    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Quoting);
    assert_eq!(r.gateway.buys_placed(), 2);
    assert!(r.gateway.max_open_orders() <= 2);

    // Edge disappears: quotes withdrawn, back to idle
    r.books
        .apply_snapshot(UP, &levels(&[("0.46", "100")]), &levels(&[("0.49", "100")]));
    r.books
        .apply_snapshot(DOWN, &levels(&[("0.45", "100")]), &levels(&[("0.48", "100")]));
    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Idle);
    assert_eq!(r.gateway.open_order_count(), 0);
}

// ============================================================================
// Scenario: cancellation idempotence
// ============================================================================

#[tokio::test]
async fn cancel_all_then_list_is_empty_and_repeatable() {
    let gateway = SimGateway::new();

    // Cancel-all on an empty book is a no-op
    gateway.cancel_all().await.unwrap();
    assert!(gateway.list_open_orders().await.unwrap().is_empty());

    gateway.set_buy_rule(UP, BuyRule::Rest);
    gateway.place_limit_buy(UP, 0.48, 5.0).await.unwrap();
    assert_eq!(gateway.list_open_orders().await.unwrap().len(), 1);

    gateway.cancel_all().await.unwrap();
    assert!(gateway.list_open_orders().await.unwrap().is_empty());

    // Cancelling an order the exchange no longer knows is still success
    gateway.cancel("sim-1").await.unwrap();
    gateway.cancel("never-existed").await.unwrap();
}

// ============================================================================
// Scenario: expiry boundary
// ============================================================================

#[tokio::test]
async fn expiry_window_settles_paired_position() {
    let mut r = rig(50, fast_recovery());
    r.gateway.set_position(UP, 5);
    r.gateway.set_position(DOWN, 5);

    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Holding);
    // Never requotes inside the settlement window
    assert_eq!(r.gateway.buys_placed(), 0);
}

#[tokio::test]
async fn expiry_window_blocks_flat_market() {
    let mut r = rig(50, fast_recovery());
    feed_quotable_books(&r.books);

    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Blocked);
    assert_eq!(r.gateway.buys_placed(), 0);
}

#[tokio::test]
async fn expiry_window_closes_stranded_singleton() {
    let mut r = rig(50, fast_recovery());
    r.gateway.set_position(UP, 5);
    r.gateway
        .set_rest_book(UP, BookTop { bids: vec![(0.47, 50.0)], asks: vec![] });

    r.session.tick().await.unwrap();
    assert_eq!(r.session.status(), MarketStatus::Blocked);
    // Best-effort close fired, no BUY ever
    assert_eq!(r.gateway.sells_placed(), 1);
    assert_eq!(r.gateway.buys_placed(), 0);
    assert_eq!(r.gateway.position_of(UP), 0);
}

// ============================================================================
// Scenario: arbitrage executor success
// ============================================================================

fn executor_rig() -> (Arc<SimGateway>, Arc<BookCache>, Arc<EngineStats>, ArbExecutor) {
    let gateway = Arc::new(SimGateway::new());
    let books = Arc::new(BookCache::default());
    let stats = Arc::new(EngineStats::new());
    let executor = ArbExecutor::new(
        Arc::clone(&gateway) as Arc<dyn ExchangeGateway>,
        Arc::clone(&books),
        ScanTuning::default(),
        fast_recovery(),
        Arc::clone(&stats),
    );
    (gateway, books, stats, executor)
}

#[tokio::test]
async fn executor_takes_crossing_arb() {
    let (gateway, books, stats, executor) = executor_rig();
    let market = test_market(600);

    books.apply_snapshot(UP, &[], &levels(&[("0.48", "100")]));
    books.apply_snapshot(DOWN, &[], &levels(&[("0.49", "80")]));
    gateway.set_buy_rule(UP, BuyRule::Fill);
    gateway.set_buy_rule(DOWN, BuyRule::Fill);

    let opp = executor
        .scan_market(&market, chrono::Utc::now())
        .await
        .expect("crossing book is an opportunity");
    assert!((opp.edge - 0.03).abs() < EPS);
    assert_eq!(opp.executable_shares, 80);

    let outcome = executor.execute(&opp).await.unwrap();
    match outcome {
        TradeOutcome::Completed {
            shares,
            combined_cost,
        } => {
            assert_eq!(shares, 5);
            assert!((combined_cost - 0.97).abs() < EPS);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    // Equal exposure: both deltas match
    assert_eq!(gateway.position_of(UP), gateway.position_of(DOWN));
    assert_eq!(gateway.position_of(UP), 5);
    assert_eq!(stats.snapshot().arbs_executed, 1);
}

#[tokio::test]
async fn executor_ignores_market_without_edge() {
    let (_gateway, books, _stats, executor) = executor_rig();
    let market = test_market(600);

    books.apply_snapshot(UP, &[], &levels(&[("0.52", "100")]));
    books.apply_snapshot(DOWN, &[], &levels(&[("0.49", "100")]));

    assert!(executor
        .scan_market(&market, chrono::Utc::now())
        .await
        .is_none());
}

#[tokio::test]
async fn executor_respects_expiry_cutoff() {
    let (_gateway, books, _stats, executor) = executor_rig();
    let market = test_market(30); // inside the 60s cutoff

    books.apply_snapshot(UP, &[], &levels(&[("0.48", "100")]));
    books.apply_snapshot(DOWN, &[], &levels(&[("0.49", "100")]));

    assert!(executor
        .scan_market(&market, chrono::Utc::now())
        .await
        .is_none());
}

// ============================================================================
// Scenario: executor imbalance and recovery
// ============================================================================

#[tokio::test]
async fn executor_reverses_partial_fill_to_zero() {
    let (gateway, books, _stats, executor) = executor_rig();
    let market = test_market(600);

    books.apply_snapshot(UP, &[], &levels(&[("0.48", "100")]));
    books.apply_snapshot(DOWN, &[], &levels(&[("0.49", "80")]));
    gateway.set_buy_rule(DOWN, BuyRule::Fill);
    // The Up book evaporates under the order
    gateway.set_buy_rule(UP, BuyRule::Partial(3));

    let opp = executor
        .scan_market(&market, chrono::Utc::now())
        .await
        .unwrap();
    let outcome = executor.execute(&opp).await.unwrap();

    assert!(
        matches!(outcome, TradeOutcome::Retryable { .. }),
        "reversal restores a clean slate: {:?}",
        outcome
    );
    assert_eq!(gateway.position_of(UP), 0);
    assert_eq!(gateway.position_of(DOWN), 0);
}

#[tokio::test]
async fn executor_blocks_when_reversal_fails() {
    let (gateway, books, _stats, executor) = executor_rig();
    let market = test_market(600);

    books.apply_snapshot(UP, &[], &levels(&[("0.48", "100")]));
    books.apply_snapshot(DOWN, &[], &levels(&[("0.49", "80")]));
    gateway.set_buy_rule(DOWN, BuyRule::Fill);
    gateway.set_buy_rule(UP, BuyRule::Partial(3));
    // Up cannot be sold back
    gateway.set_sell_rule(UP, SellRule::Ignore);

    let opp = executor
        .scan_market(&market, chrono::Utc::now())
        .await
        .unwrap();
    let outcome = executor.execute(&opp).await.unwrap();

    assert!(
        matches!(outcome, TradeOutcome::Blocked { .. }),
        "unsellable leg must block: {:?}",
        outcome
    );
    // Down side was reversed, the stuck Up residual remains
    assert_eq!(gateway.position_of(DOWN), 0);
    assert_eq!(gateway.position_of(UP), 3);
}

#[tokio::test]
async fn executor_clears_preexisting_imbalance_before_trading() {
    let (gateway, books, _stats, executor) = executor_rig();
    let market = test_market(600);

    // Stale exposure from an earlier process
    gateway.set_position(UP, 2);

    books.apply_snapshot(UP, &[], &levels(&[("0.48", "100")]));
    books.apply_snapshot(DOWN, &[], &levels(&[("0.49", "80")]));
    gateway.set_buy_rule(UP, BuyRule::Fill);
    gateway.set_buy_rule(DOWN, BuyRule::Fill);

    let opp = executor
        .scan_market(&market, chrono::Utc::now())
        .await
        .unwrap();
    let outcome = executor.execute(&opp).await.unwrap();

    assert!(matches!(outcome, TradeOutcome::Completed { .. }));
    // Reversal zeroed the stale lot, the trade rebuilt equal exposure
    assert_eq!(gateway.position_of(UP), gateway.position_of(DOWN));
}
