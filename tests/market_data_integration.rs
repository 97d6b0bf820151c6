use candlecast::application::alerts::AdminAlerter;
use candlecast::application::market_data::backfill::BackfillService;
use candlecast::application::market_data::candle_cache::CandleCache;
use candlecast::application::market_data::staleness_monitor::StalenessMonitor;
use candlecast::application::market_data::subscription_manager::{
    ConnectionStatus, StreamSubscriptionManager,
};
use candlecast::domain::market::{Candle, SeriesKey, Timeframe};
use candlecast::infrastructure::mock::{
    MockConnection, MockMarketDataFeed, MockStreamConnector, RecordingNotifier, kline_message,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

fn btc() -> SeriesKey {
    SeriesKey::new("BTC", "USDT", Timeframe::OneMin)
}

fn candle(ts: i64, close: f64) -> Candle {
    Candle::new(ts, close, close + 1.0, close - 1.0, close, 5.0)
}

fn assert_strictly_increasing(series: &[Candle]) {
    for pair in series.windows(2) {
        assert!(
            pair[0].timestamp < pair[1].timestamp,
            "{} !< {}",
            pair[0].timestamp,
            pair[1].timestamp
        );
    }
}

#[test]
fn test_cache_stays_bounded_and_ordered_under_random_appends() {
    let cache = CandleCache::new(2000);
    let mut rng = StdRng::seed_from_u64(42);
    let mut ts = 0i64;

    for i in 0..5000 {
        // Some steps go backwards or repeat the last timestamp
        ts += rng.random_range(-2..6) * 60_000;
        cache.append_live(&btc(), candle(ts, 100.0 + i as f64 * 0.01));

        assert!(cache.len(&btc()) <= 2000);
        if i % 250 == 0 {
            assert_strictly_increasing(&cache.snapshot(&btc()));
        }
    }
    assert_strictly_increasing(&cache.snapshot(&btc()));
}

#[test]
fn test_merging_same_backfill_twice_is_idempotent() {
    let cache = CandleCache::new(2000);
    for i in 10..20 {
        cache.append_live(&btc(), candle(i * 60_000, 50.0 + i as f64));
    }

    let fetched: Vec<Candle> = (0..15).map(|i| candle(i * 60_000, 40.0 + i as f64)).collect();
    cache.merge_backfill(&btc(), &fetched);
    let once = cache.snapshot(&btc());
    cache.merge_backfill(&btc(), &fetched);
    let twice = cache.snapshot(&btc());

    assert_eq!(once, twice);
    assert_eq!(once.len(), 20);
    assert_strictly_increasing(&once);
    // fetched candles win for overlapping timestamps, newer cached ones survive
    assert_eq!(once[14].close, 54.0);
    assert_eq!(once[15].close, 65.0);
}

fn subscriptions(connector: Arc<MockStreamConnector>) -> (StreamSubscriptionManager, Arc<CandleCache>) {
    let cache = Arc::new(CandleCache::new(2000));
    let manager =
        StreamSubscriptionManager::new(connector, cache.clone(), Duration::from_secs(5), 5);
    (manager, cache)
}

#[tokio::test(start_paused = true)]
async fn test_balanced_subscribe_unsubscribe_closes_connection() {
    let connector = Arc::new(MockStreamConnector::holding());
    let (manager, _) = subscriptions(connector.clone());

    for n in 1..=4 {
        assert_eq!(manager.subscribe(&btc()), n);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(connector.connects(), 1);
    assert_eq!(connector.open_connections(), 1);

    // N subscribes, N-1 unsubscribes: still open
    for _ in 0..3 {
        manager.unsubscribe(&btc());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.ref_count(&btc()), 1);
    assert_eq!(connector.open_connections(), 1);

    // the last one closes it
    assert_eq!(manager.unsubscribe(&btc()), 0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.ref_count(&btc()), 0);
    assert_eq!(connector.open_connections(), 0);
    assert!(manager.status(&btc()).is_none());

    // extra unsubscribes are harmless
    assert_eq!(manager.unsubscribe(&btc()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_cap_stops_until_fresh_subscribe() {
    let connector = Arc::new(MockStreamConnector::new(MockConnection::Session(Vec::new())));
    for _ in 0..10 {
        connector.push(MockConnection::Refused);
    }
    let (manager, _) = subscriptions(connector.clone());

    manager.subscribe(&btc());
    tokio::time::sleep(Duration::from_secs(120)).await;

    // first attempt + 5 reconnects, then permanently stopped
    assert_eq!(connector.connects(), 6);
    assert_eq!(manager.status(&btc()), Some(ConnectionStatus::Stopped));
    assert!(manager.active_keys().is_empty());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.connects(), 6);

    // an explicit subscribe resets the attempt counter and reconnects
    manager.subscribe(&btc());
    assert_eq!(manager.reconnect_attempts(&btc()), Some(0));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(connector.connects(), 7);
    assert!(manager.is_connected(&btc()));
}

#[tokio::test(start_paused = true)]
async fn test_live_frames_reach_cache_and_malformed_are_dropped() {
    let closed = candle(60_000, 10.0);
    let open = candle(120_000, 11.0);
    let connector = Arc::new(MockStreamConnector::holding());
    connector.push(MockConnection::Hold(vec![
        "{not json".to_string(),
        kline_message("BTCUSDT", "1m", &closed, true),
        kline_message("BTCUSDT", "1m", &open, false),
    ]));
    let (manager, cache) = subscriptions(connector);

    manager.subscribe(&btc());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(cache.snapshot(&btc()), vec![closed]);
    assert_eq!(manager.status(&btc()), Some(ConnectionStatus::Open));
    assert_eq!(manager.ref_count(&btc()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_stream_falls_back_to_rest_and_suppresses_after_failures() {
    let connector = Arc::new(MockStreamConnector::holding());
    let (manager, cache) = subscriptions(connector);
    let feed = Arc::new(MockMarketDataFeed::new());
    feed.set_series(&btc(), (0..30).map(|i| candle(i * 60_000, 20.0 + i as f64)).collect());
    let backfill = Arc::new(BackfillService::new(
        feed.clone(),
        cache.clone(),
        AdminAlerter::new(Arc::new(RecordingNotifier::new()), None),
        3,
    ));
    let monitor = StalenessMonitor::new(
        manager.clone(),
        backfill.clone(),
        Duration::from_secs(5),
        Duration::from_secs(5),
        100,
    );

    manager.subscribe(&btc());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(monitor.tick().await.stale, 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    let report = monitor.tick().await;
    assert_eq!(report.refreshed, 1);
    assert_eq!(cache.len(&btc()), 30);

    // three failed fallbacks, then the key is left alone
    feed.fail_next(3);
    for _ in 0..3 {
        assert_eq!(monitor.tick().await.failed, 1);
    }
    let calls = feed.fetch_calls();
    assert_eq!(monitor.tick().await.suppressed, 1);
    assert_eq!(feed.fetch_calls(), calls);
    assert!(backfill.is_suppressed(&btc()));
}
