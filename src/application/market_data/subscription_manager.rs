use crate::application::market_data::candle_cache::CandleCache;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ports::{KlineStreamConnector, StreamEvent};
use crate::infrastructure::observability::Metrics;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_RECONNECTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Reconnecting,
    /// Reconnect cap reached; a fresh `subscribe` restarts the connection
    Stopped,
}

/// Live-stream bookkeeping for one series
#[derive(Debug)]
pub struct SubscriptionState {
    pub ref_count: usize,
    pub reconnect_attempts: u32,
    pub last_message_at: Instant,
    pub status: ConnectionStatus,
    cancel: CancellationToken,
    generation: u64,
}

/// What the connection task does after an attempt ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Reconnect(Duration),
    Stop,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    k: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
    x: bool,
}

/// Parses a kline frame (raw or wrapped by a combined stream) into a
/// candle and its "closed" flag
pub fn parse_kline_message(raw: &str) -> Option<(Candle, bool)> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let payload = value.get("data").cloned().unwrap_or(value);
    let k = serde_json::from_value::<KlineEvent>(payload).ok()?.k;
    let candle = Candle::new(
        k.t,
        k.o.parse().ok()?,
        k.h.parse().ok()?,
        k.l.parse().ok()?,
        k.c.parse().ok()?,
        k.v.parse().ok()?,
    );
    candle.is_valid().then_some((candle, k.x))
}

struct Inner {
    connector: Arc<dyn KlineStreamConnector>,
    cache: Arc<CandleCache>,
    reconnect_delay: Duration,
    max_reconnects: u32,
    states: Mutex<HashMap<SeriesKey, SubscriptionState>>,
    next_generation: Mutex<u64>,
    metrics: Option<Metrics>,
}

/// Ref-counted live kline subscriptions.
///
/// At most one connection task runs per series. Closed klines are appended
/// to the candle cache; every valid frame refreshes `last_message_at` for the
/// staleness monitor.
#[derive(Clone)]
pub struct StreamSubscriptionManager {
    inner: Arc<Inner>,
}

impl StreamSubscriptionManager {
    pub fn new(
        connector: Arc<dyn KlineStreamConnector>,
        cache: Arc<CandleCache>,
        reconnect_delay: Duration,
        max_reconnects: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                cache,
                reconnect_delay,
                max_reconnects,
                states: Mutex::new(HashMap::new()),
                next_generation: Mutex::new(0),
                metrics: None,
            }),
        }
    }

    /// Must be called before the manager is cloned
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.metrics = Some(metrics);
        }
        self
    }

    /// Adds a subscriber. Opens a connection for the first subscriber, or
    /// restarts a connection that hit the reconnect cap. Returns the ref count.
    pub fn subscribe(&self, key: &SeriesKey) -> usize {
        let generation = self.inner.next_generation();
        let (ref_count, start) = {
            let mut states = self.inner.lock();
            match states.get_mut(key) {
                Some(state) => {
                    state.ref_count += 1;
                    if state.status == ConnectionStatus::Stopped {
                        state.reconnect_attempts = 0;
                        state.status = ConnectionStatus::Connecting;
                        state.cancel = CancellationToken::new();
                        state.generation = generation;
                        (state.ref_count, Some(state.cancel.clone()))
                    } else {
                        (state.ref_count, None)
                    }
                }
                None => {
                    let cancel = CancellationToken::new();
                    states.insert(
                        key.clone(),
                        SubscriptionState {
                            ref_count: 1,
                            reconnect_attempts: 0,
                            last_message_at: Instant::now(),
                            status: ConnectionStatus::Connecting,
                            cancel: cancel.clone(),
                            generation,
                        },
                    );
                    (1, Some(cancel))
                }
            }
        };

        if let Some(cancel) = start {
            info!("StreamSubscriptionManager [{}]: Opening live stream", key);
            let inner = self.inner.clone();
            let key = key.clone();
            tokio::spawn(async move {
                Inner::connection_loop(inner, key, cancel, generation).await;
            });
        }
        self.inner.update_gauge();
        ref_count
    }

    /// Removes a subscriber; the last one closes the connection and discards
    /// the state. Returns the remaining ref count.
    pub fn unsubscribe(&self, key: &SeriesKey) -> usize {
        let remaining = {
            let mut states = self.inner.lock();
            let Some(state) = states.get_mut(key) else {
                debug!("StreamSubscriptionManager [{}]: Unsubscribe without subscription", key);
                return 0;
            };
            state.ref_count = state.ref_count.saturating_sub(1);
            let remaining = state.ref_count;
            if remaining == 0
                && let Some(state) = states.remove(key)
            {
                state.cancel.cancel();
                info!("StreamSubscriptionManager [{}]: Last subscriber left, stream closed", key);
            }
            remaining
        };
        self.inner.update_gauge();
        remaining
    }

    /// Applies one inbound frame. Returns true when a candle was appended.
    pub fn handle_message(&self, key: &SeriesKey, raw: &str) -> bool {
        self.inner.handle_message(key, raw)
    }

    pub fn ref_count(&self, key: &SeriesKey) -> usize {
        self.inner.lock().get(key).map(|s| s.ref_count).unwrap_or(0)
    }

    /// True while a connection task is alive for the key (open or retrying)
    pub fn is_connected(&self, key: &SeriesKey) -> bool {
        self.inner
            .lock()
            .get(key)
            .map(|s| s.status != ConnectionStatus::Stopped)
            .unwrap_or(false)
    }

    pub fn status(&self, key: &SeriesKey) -> Option<ConnectionStatus> {
        self.inner.lock().get(key).map(|s| s.status)
    }

    pub fn reconnect_attempts(&self, key: &SeriesKey) -> Option<u32> {
        self.inner.lock().get(key).map(|s| s.reconnect_attempts)
    }

    /// Keys with a running connection task
    pub fn active_keys(&self) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self
            .inner
            .lock()
            .iter()
            .filter(|(_, s)| s.status != ConnectionStatus::Stopped)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn last_message_at(&self, key: &SeriesKey) -> Option<Instant> {
        self.inner.lock().get(key).map(|s| s.last_message_at)
    }

    /// Closes every stream, e.g. on shutdown
    pub fn shutdown(&self) {
        let mut states = self.inner.lock();
        for (_, state) in states.drain() {
            state.cancel.cancel();
        }
        drop(states);
        self.inner.update_gauge();
    }

    #[cfg(test)]
    fn on_close(&self, key: &SeriesKey) -> CloseAction {
        let generation = self.inner.lock().get(key).map(|s| s.generation).unwrap_or(0);
        self.inner.on_close(key, generation)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SeriesKey, SubscriptionState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_generation(&self) -> u64 {
        let mut next = match self.next_generation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *next += 1;
        *next
    }

    fn update_gauge(&self) {
        if let Some(m) = &self.metrics {
            let active = self
                .lock()
                .values()
                .filter(|s| s.status != ConnectionStatus::Stopped)
                .count();
            m.active_subscriptions.set(active as f64);
        }
    }

    fn handle_message(&self, key: &SeriesKey, raw: &str) -> bool {
        let Some((candle, closed)) = parse_kline_message(raw) else {
            debug!("StreamSubscriptionManager [{}]: Dropped malformed message", key);
            return false;
        };

        if let Some(state) = self.lock().get_mut(key) {
            state.last_message_at = Instant::now();
        }

        // Only closed klines are final; open ones would break immutability
        if !closed {
            return false;
        }
        let appended = self.cache.append_live(key, candle);
        if appended && let Some(m) = &self.metrics {
            m.inc_candles("live", 1);
        }
        appended
    }

    fn on_opened(&self, key: &SeriesKey, generation: u64) {
        if let Some(state) = self.lock().get_mut(key)
            && state.generation == generation
        {
            state.reconnect_attempts = 0;
            state.status = ConnectionStatus::Open;
            state.last_message_at = Instant::now();
        }
        info!("StreamSubscriptionManager [{}]: Connected", key);
    }

    fn on_close(&self, key: &SeriesKey, generation: u64) -> CloseAction {
        let mut states = self.lock();
        let Some(state) = states.get_mut(key) else {
            return CloseAction::Stop;
        };
        if state.generation != generation || state.status == ConnectionStatus::Stopped {
            return CloseAction::Stop;
        }

        if state.reconnect_attempts < self.max_reconnects {
            state.reconnect_attempts += 1;
            state.status = ConnectionStatus::Reconnecting;
            info!(
                "StreamSubscriptionManager [{}]: Reconnecting in {:?} (attempt {}/{})",
                key, self.reconnect_delay, state.reconnect_attempts, self.max_reconnects
            );
            if let Some(m) = &self.metrics {
                m.stream_reconnects_total.inc();
            }
            CloseAction::Reconnect(self.reconnect_delay)
        } else {
            state.status = ConnectionStatus::Stopped;
            warn!(
                "StreamSubscriptionManager [{}]: Reconnect cap ({}) reached, stream stopped",
                key, self.max_reconnects
            );
            CloseAction::Stop
        }
    }

    fn on_event(&self, key: &SeriesKey, generation: u64, event: StreamEvent) {
        match event {
            StreamEvent::Opened => self.on_opened(key, generation),
            StreamEvent::Message(raw) => {
                self.handle_message(key, &raw);
            }
        }
    }

    async fn connection_loop(
        inner: Arc<Inner>,
        key: SeriesKey,
        cancel: CancellationToken,
        generation: u64,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let (tx, mut rx) = mpsc::channel::<StreamEvent>(256);
            let connector = inner.connector.clone();
            let attempt = connector.run(&key, tx);
            tokio::pin!(attempt);

            let result = loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("StreamSubscriptionManager [{}]: Connection task cancelled", key);
                        return;
                    }
                    Some(event) = rx.recv() => inner.on_event(&key, generation, event),
                    result = &mut attempt => break result,
                }
            };
            while let Ok(event) = rx.try_recv() {
                inner.on_event(&key, generation, event);
            }

            match result {
                Ok(()) => info!("StreamSubscriptionManager [{}]: Stream closed", key),
                Err(e) => warn!("StreamSubscriptionManager [{}]: Stream error: {}", key, e),
            }

            match inner.on_close(&key, generation) {
                CloseAction::Reconnect(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                CloseAction::Stop => {
                    inner.update_gauge();
                    return;
                }
            }
        }
    }
}
