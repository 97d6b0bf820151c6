//! Plain-text renderings of analyses, signals and reports for chat delivery

use crate::application::signals::analysis_service::Analysis;
use crate::application::simulation::engine::SimStats;
use crate::application::training::training_controller::{ACCURACY_WINDOW, AccuracyStats};
use crate::domain::ml::HyperparamConfig;
use crate::domain::signals::{SignalRecord, SignalType, TradeSignal};
use crate::domain::watch::WatchConfig;
use chrono::{TimeZone, Utc};
use std::fmt::Write;

/// ADX below this reads as a sideways market
const TREND_ADX_FLOOR: f64 = 20.0;

/// Counters shown by the status command
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub model_name: String,
    pub training_counter: u64,
    pub accuracy: Option<AccuracyStats>,
    pub simulation_enabled: bool,
    pub hyperparams: HyperparamConfig,
    pub active_simulations: usize,
    pub live_subscriptions: usize,
}

/// Picks a precision that keeps small-cap prices readable
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 1000.0 {
        format!("{:.2}", price)
    } else if abs >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.6}", price)
    }
}

fn format_time(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => timestamp_ms.to_string(),
    }
}

fn signal_icon(signal_type: SignalType) -> &'static str {
    match signal_type {
        SignalType::Long => "🟢",
        SignalType::Short => "🔴",
        SignalType::Wait => "⏸",
    }
}

fn trend_label(analysis: &Analysis) -> &'static str {
    let snapshot = &analysis.snapshot;
    match (snapshot.adx, snapshot.ma_short, snapshot.ma_long) {
        (Some(adx), _, _) if adx < TREND_ADX_FLOOR => "Sideways",
        (_, Some(short), Some(long)) if short > long => "Uptrend",
        (_, Some(short), Some(long)) if short < long => "Downtrend",
        _ => "Undetermined",
    }
}

fn ichimoku_position(analysis: &Analysis) -> &'static str {
    let snapshot = &analysis.snapshot;
    match (snapshot.ichimoku_span_a, snapshot.ichimoku_span_b) {
        (Some(a), Some(b)) => {
            if snapshot.price > a.max(b) {
                "above cloud"
            } else if snapshot.price < a.min(b) {
                "below cloud"
            } else {
                "inside cloud"
            }
        }
        _ => "n/a",
    }
}

fn optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    }
}

/// Manual analysis reply
pub fn format_analysis(analysis: &Analysis, show_indicators: bool) -> String {
    let signal = &analysis.signal;
    let snapshot = &analysis.snapshot;
    let mut out = String::new();

    let _ = writeln!(out, "📊 {}", analysis.key);
    let _ = writeln!(out, "Timeframe: {}", analysis.key.timeframe.label());
    let _ = writeln!(out, "Price: {}", format_price(signal.price));
    let _ = writeln!(
        out,
        "{} Signal: {} ({}% confidence)",
        signal_icon(signal.signal_type),
        signal.signal_type,
        signal.confidence
    );
    if signal.signal_type.is_directional() {
        let _ = writeln!(out, "Entry: {}", format_price(signal.levels.entry));
        let _ = writeln!(out, "Stop-loss: {}", format_price(signal.levels.stop_loss));
        let _ = writeln!(out, "Take-profit: {}", format_price(signal.levels.take_profit));
        let _ = writeln!(out, "R:R: {:.2}", signal.levels.risk_reward());
        let _ = writeln!(out, "Leverage hint: x{}", signal.leverage_hint());
    }
    let _ = writeln!(
        out,
        "Probabilities: L {:.1}% / S {:.1}% / W {:.1}%",
        analysis.prediction.long_prob * 100.0,
        analysis.prediction.short_prob * 100.0,
        analysis.prediction.wait_prob * 100.0
    );
    let _ = writeln!(out, "Trend: {} (ADX {})", trend_label(analysis), optional(snapshot.adx, 1));
    let _ = writeln!(
        out,
        "Volume spike: {}",
        if snapshot.volume_spike { "yes" } else { "no" }
    );
    let _ = writeln!(
        out,
        "Support: {} | Resistance: {}",
        format_price(snapshot.support),
        format_price(snapshot.resistance)
    );

    if show_indicators {
        let _ = writeln!(out, "RSI: {}", optional(snapshot.rsi, 1));
        let _ = writeln!(out, "Stochastic %K: {}", optional(snapshot.stoch_k, 1));
        let _ = writeln!(out, "VWAP: {}", snapshot.vwap.map(format_price).unwrap_or_else(|| "n/a".into()));
        let _ = writeln!(out, "OBV: {}", optional(snapshot.obv, 0));
        let _ = writeln!(out, "Ichimoku: {}", ichimoku_position(analysis));
        let _ = writeln!(
            out,
            "Fibonacci 38.2/50/61.8: {} / {} / {}",
            snapshot.fib_382.map(format_price).unwrap_or_else(|| "n/a".into()),
            snapshot.fib_500.map(format_price).unwrap_or_else(|| "n/a".into()),
            snapshot.fib_618.map(format_price).unwrap_or_else(|| "n/a".into())
        );
    }
    let _ = write!(out, "Candles analysed: {}", analysis.candles);
    out
}

/// Alert pushed to a watching chat
pub fn format_signal_alert(config: &WatchConfig, signal: &TradeSignal) -> String {
    format!(
        "🚨 {} {} signal\nTimeframe: {}\nPrice: {}\nEntry: {}\nStop-loss: {}\nTake-profit: {}\nConfidence: {}% | Leverage hint: x{}\nTime: {}",
        signal_icon(signal.signal_type),
        config.series,
        config.series.timeframe.label(),
        format_price(signal.price),
        format_price(signal.levels.entry),
        format_price(signal.levels.stop_loss),
        format_price(signal.levels.take_profit),
        signal.confidence,
        signal.leverage_hint(),
        format_time(signal.timestamp)
    )
}

pub fn format_signal_history(records: &[SignalRecord]) -> String {
    if records.is_empty() {
        return "No signals yet.".to_string();
    }
    let mut out = String::from("📜 Last signals:\n");
    for r in records {
        let _ = writeln!(
            out,
            "{} {} {} {}% @ {} ({})",
            signal_icon(r.signal_type),
            r.series,
            r.signal_type,
            r.confidence,
            format_price(r.entry_price),
            format_time(r.timestamp)
        );
    }
    out.trim_end().to_string()
}

pub fn format_trade_history(records: &[SignalRecord]) -> String {
    if records.is_empty() {
        return "No trades yet.".to_string();
    }
    let mut out = String::from("💼 Last trades:\n");
    for r in records {
        let result = match (r.exit_price, r.profit) {
            (Some(exit), Some(profit)) => format!("exit {} | {:+.2}%", format_price(exit), profit),
            _ => "pending".to_string(),
        };
        let _ = writeln!(
            out,
            "{} {} entry {} | {}",
            r.series,
            r.signal_type,
            format_price(r.entry_price),
            result
        );
    }
    out.trim_end().to_string()
}

/// Performance over resolved signals of one chat
pub fn format_performance(closed: &[SignalRecord]) -> String {
    let profits: Vec<f64> = closed.iter().filter_map(|r| r.profit).collect();
    if profits.is_empty() {
        return "No closed trades yet.".to_string();
    }
    let wins = profits.iter().filter(|p| **p > 0.0).count();
    let total: f64 = profits.iter().sum();
    format!(
        "📈 Simulation performance\nTrades: {}\nWin rate: {:.2}%\nAverage profit: {:+.2}%\nTotal profit: {:+.2}%",
        profits.len(),
        wins as f64 / profits.len() as f64 * 100.0,
        total / profits.len() as f64,
        total
    )
}

pub fn format_status(status: &StatusReport) -> String {
    let mut out = String::from("🤖 Status\n");
    let _ = writeln!(out, "Model: {}", status.model_name);
    let _ = writeln!(out, "Training counter: {}", status.training_counter);
    match &status.accuracy {
        Some(stats) => {
            let _ = writeln!(
                out,
                "Accuracy ({} / {}): avg {:.2}% | max {:.2}% | min {:.2}%",
                stats.samples,
                ACCURACY_WINDOW,
                stats.avg * 100.0,
                stats.max * 100.0,
                stats.min * 100.0
            );
        }
        None => {
            let _ = writeln!(out, "Accuracy: no samples yet");
        }
    }
    let _ = writeln!(
        out,
        "Simulation: {}",
        if status.simulation_enabled { "enabled" } else { "disabled (stable)" }
    );
    let _ = writeln!(
        out,
        "Hyperparameters: window {} | units {} | epochs {}",
        status.hyperparams.window_size, status.hyperparams.units, status.hyperparams.epochs
    );
    let _ = writeln!(out, "Active simulations: {}", status.active_simulations);
    let _ = write!(out, "Live subscriptions: {}", status.live_subscriptions);
    out
}

/// Periodic admin report on training quality
pub fn format_model_report(stats: &AccuracyStats, training_counter: u64) -> String {
    format!(
        "🧠 Model report\nSamples: {}\nAvg accuracy: {:.2}%\nMax: {:.2}% | Min: {:.2}% | Spread: {:.2}%\nTraining counter: {}",
        stats.samples,
        stats.avg * 100.0,
        stats.max * 100.0,
        stats.min * 100.0,
        (stats.max - stats.min) * 100.0,
        training_counter
    )
}

/// Periodic admin report on simulated trades per watch
pub fn format_simulation_report(stats: &[(WatchConfig, SimStats)]) -> String {
    if stats.is_empty() {
        return "🧪 Simulation report\nNo simulations.".to_string();
    }
    let mut out = String::from("🧪 Simulation report\n");
    for (config, s) in stats {
        let _ = writeln!(
            out,
            "{} [chat {}]: steps {} | signals {} | trades {} | win rate {:.1}% | avg {:+.2}%",
            config.series,
            config.chat_id,
            s.steps,
            s.signals,
            s.trades,
            s.win_rate(),
            s.avg_profit_pct()
        );
    }
    out.trim_end().to_string()
}
