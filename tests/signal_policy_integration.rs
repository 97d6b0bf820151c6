use candlecast::application::alerts::AdminAlerter;
use candlecast::application::signals::deduplicator::SignalDeduplicator;
use candlecast::application::simulation::trade_outcome::TradeOutcomeEvaluator;
use candlecast::application::training::training_controller::{ControlDecision, TrainingController};
use candlecast::domain::market::Candle;
use candlecast::domain::signals::{ExitReason, SignalType, TradeLevels, TradeSignal};
use candlecast::domain::watch::ConfigKey;
use candlecast::infrastructure::mock::RecordingNotifier;
use std::sync::Arc;

const MINUTE: i64 = 60_000;

#[tokio::test]
async fn test_uniform_high_accuracy_disables_simulation() {
    let notifier = Arc::new(RecordingNotifier::new());
    let controller =
        TrainingController::new().with_alerts(AdminAlerter::new(notifier.clone(), Some(99)));

    for _ in 0..50 {
        controller.record_accuracy(0.90);
    }
    assert_eq!(controller.training_counter(), 50);

    let decision = controller.evaluate().await;
    assert_eq!(decision, ControlDecision::Stable { transitioned: true });
    assert!(!controller.simulation_enabled());
    assert_eq!(controller.training_counter(), 0);
    assert_eq!(notifier.messages_for(99).len(), 1);

    // staying stable does not notify again
    assert_eq!(
        controller.evaluate().await,
        ControlDecision::Stable { transitioned: false }
    );
    assert_eq!(notifier.messages_for(99).len(), 1);
}

#[tokio::test]
async fn test_wide_accuracy_spread_rearms_simulation() {
    let controller = TrainingController::new();
    for _ in 0..50 {
        controller.record_accuracy(0.90);
    }
    controller.evaluate().await;
    assert!(!controller.simulation_enabled());

    // the window only holds the latest 50 samples
    for i in 0..50 {
        controller.record_accuracy(if i % 2 == 0 { 0.70 } else { 0.95 });
    }
    let stats = controller.stats().unwrap();
    assert_eq!(stats.samples, 50);
    assert!(stats.max - stats.min > 0.05);

    assert_eq!(
        controller.evaluate().await,
        ControlDecision::Unstable { rearmed: true }
    );
    assert!(controller.simulation_enabled());
    assert_eq!(
        controller.evaluate().await,
        ControlDecision::Unstable { rearmed: false }
    );
}

#[tokio::test]
async fn test_high_mean_with_spread_stays_enabled() {
    let controller = TrainingController::new();
    for i in 0..50 {
        controller.record_accuracy(if i % 2 == 0 { 0.86 } else { 0.99 });
    }
    assert!(matches!(controller.evaluate().await, ControlDecision::Unstable { .. }));
    assert!(controller.simulation_enabled());
}

fn forward(ts: i64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(ts, close, high, low, close, 1.0)
}

#[test]
fn test_long_trade_exits_on_first_touched_level() {
    let evaluator = TradeOutcomeEvaluator::new();
    let levels = TradeLevels {
        entry: 100.0,
        stop_loss: 95.0,
        take_profit: 110.0,
    };

    let stopped = evaluator
        .evaluate(
            SignalType::Long,
            &levels,
            0,
            &[forward(1, 101.0, 99.0, 100.0), forward(2, 100.0, 94.0, 96.0), forward(3, 111.0, 100.0, 110.0)],
        )
        .unwrap();
    assert_eq!(stopped.exit_price, 95.0);
    assert!((stopped.profit_pct + 5.0).abs() < 1e-9);
    assert_eq!(stopped.exit_reason, ExitReason::StopLoss);

    let won = evaluator
        .evaluate(
            SignalType::Long,
            &levels,
            0,
            &[forward(1, 111.0, 99.0, 108.0), forward(2, 100.0, 94.0, 96.0)],
        )
        .unwrap();
    assert_eq!(won.exit_price, 110.0);
    assert!((won.profit_pct - 10.0).abs() < 1e-9);
}

#[test]
fn test_trade_ignores_candles_up_to_signal_and_falls_back_to_last_close() {
    let evaluator = TradeOutcomeEvaluator::new();
    let levels = TradeLevels {
        entry: 100.0,
        stop_loss: 105.0,
        take_profit: 90.0,
    };
    let candles = [
        // at or before the signal: a stop touch that must not count
        forward(10, 120.0, 99.0, 100.0),
        forward(20, 102.0, 97.0, 98.0),
        forward(30, 101.0, 96.0, 97.0),
    ];

    let outcome = evaluator.evaluate(SignalType::Short, &levels, 10, &candles).unwrap();
    assert_eq!(outcome.exit_reason, ExitReason::LastClose);
    assert_eq!(outcome.exit_price, 97.0);
    assert!((outcome.profit_pct - 3.0).abs() < 1e-9);

    assert!(evaluator.evaluate(SignalType::Short, &levels, 30, &candles).is_none());
    assert!(evaluator.evaluate(SignalType::Wait, &levels, 0, &candles).is_none());
}

fn candidate(signal_type: SignalType, entry: f64) -> TradeSignal {
    TradeSignal {
        signal_type,
        confidence: 85,
        probability: 0.85,
        price: entry,
        atr: 2.0,
        levels: TradeLevels {
            entry,
            stop_loss: entry - 3.0,
            take_profit: entry + 6.0,
        },
        timestamp: 0,
    }
}

#[test]
fn test_deduplicator_collapses_repeats_but_lets_big_moves_through() {
    let dedup = SignalDeduplicator::new(10 * MINUTE, 0.5);
    let key = ConfigKey("42_ETH_USDT_15m".to_string());

    // identical candidates inside the cooldown: one emission
    assert!(dedup.should_emit(&key, &candidate(SignalType::Long, 100.0), 70, 0));
    assert!(!dedup.should_emit(&key, &candidate(SignalType::Long, 100.0), 70, MINUTE));
    assert!(!dedup.should_emit(&key, &candidate(SignalType::Long, 100.3), 70, 2 * MINUTE));

    // a move well beyond half an ATR is accepted inside the cooldown
    assert!(dedup.should_emit(&key, &candidate(SignalType::Long, 104.0), 70, 3 * MINUTE));
    assert!(!dedup.should_emit(&key, &candidate(SignalType::Long, 104.0), 70, 4 * MINUTE));

    // other configs are independent
    let other = ConfigKey("42_BTC_USDT_15m".to_string());
    assert!(dedup.should_emit(&other, &candidate(SignalType::Short, 100.0), 70, 4 * MINUTE));
    assert_eq!(dedup.len(), 2);
}
