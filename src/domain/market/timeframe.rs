use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binance kline intervals accepted by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    EightHour,
    TwelveHour,
    OneDay,
    ThreeDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    /// Converts to Binance API interval string
    pub fn to_binance_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::ThreeMin => "3m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHour => "2h",
            Timeframe::FourHour => "4h",
            Timeframe::SixHour => "6h",
            Timeframe::EightHour => "8h",
            Timeframe::TwelveHour => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThreeDay => "3d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }

    /// Human-readable label used in chat reports
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1 minute",
            Timeframe::ThreeMin => "3 minutes",
            Timeframe::FiveMin => "5 minutes",
            Timeframe::FifteenMin => "15 minutes",
            Timeframe::ThirtyMin => "30 minutes",
            Timeframe::OneHour => "1 hour",
            Timeframe::TwoHour => "2 hours",
            Timeframe::FourHour => "4 hours",
            Timeframe::SixHour => "6 hours",
            Timeframe::EightHour => "8 hours",
            Timeframe::TwelveHour => "12 hours",
            Timeframe::OneDay => "1 day",
            Timeframe::ThreeDay => "3 days",
            Timeframe::OneWeek => "1 week",
            Timeframe::OneMonth => "1 month",
        }
    }

    /// Returns all available timeframes in ascending order
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::ThreeMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::TwoHour,
            Timeframe::FourHour,
            Timeframe::SixHour,
            Timeframe::EightHour,
            Timeframe::TwelveHour,
            Timeframe::OneDay,
            Timeframe::ThreeDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    /// Accepts the Binance form (`15m`) and the reversed alias (`m15`).
    /// `1M`/`M1` is a month; every other input is case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "1M" || trimmed == "M1" {
            return Ok(Timeframe::OneMonth);
        }
        match trimmed.to_lowercase().as_str() {
            "1m" | "m1" => Ok(Timeframe::OneMin),
            "3m" | "m3" => Ok(Timeframe::ThreeMin),
            "5m" | "m5" => Ok(Timeframe::FiveMin),
            "15m" | "m15" => Ok(Timeframe::FifteenMin),
            "30m" | "m30" => Ok(Timeframe::ThirtyMin),
            "1h" | "h1" => Ok(Timeframe::OneHour),
            "2h" | "h2" => Ok(Timeframe::TwoHour),
            "4h" | "h4" => Ok(Timeframe::FourHour),
            "6h" | "h6" => Ok(Timeframe::SixHour),
            "8h" | "h8" => Ok(Timeframe::EightHour),
            "12h" | "h12" => Ok(Timeframe::TwelveHour),
            "1d" | "d1" => Ok(Timeframe::OneDay),
            "3d" | "d3" => Ok(Timeframe::ThreeDay),
            "1w" | "w1" => Ok(Timeframe::OneWeek),
            _ => {
                let valid: Vec<&str> = Timeframe::all()
                    .iter()
                    .map(Timeframe::to_binance_string)
                    .collect();
                Err(anyhow!(
                    "Invalid timeframe: '{}'. Valid options: {}",
                    s,
                    valid.join(", ")
                ))
            }
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_binance_string())
    }
}
