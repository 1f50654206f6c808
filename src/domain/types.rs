use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Identifier of one series inside a panel
pub type SeriesId = String;

// ============================================================================
// Sampling Frequency
// ============================================================================

/// Sampling frequency of the series in a panel.
///
/// Serialized with the short pandas-style aliases the forecasting API expects
/// (`"min"`, `"H"`, `"D"`, `"W"`, `"MS"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Frequency {
    #[serde(rename = "min")]
    #[strum(to_string = "min")]
    Minute,
    #[serde(rename = "H", alias = "h")]
    #[strum(to_string = "H", serialize = "h")]
    Hour,
    #[serde(rename = "D", alias = "d")]
    #[strum(to_string = "D", serialize = "d")]
    Day,
    #[serde(rename = "W", alias = "w")]
    #[strum(to_string = "W", serialize = "w")]
    Week,
    #[serde(rename = "MS")]
    #[strum(to_string = "MS")]
    MonthStart,
}

impl Frequency {
    /// Advance `ts` by `steps` periods. Returns `None` on calendar overflow.
    pub fn advance(&self, ts: NaiveDateTime, steps: u32) -> Option<NaiveDateTime> {
        let steps_i = i64::from(steps);
        match self {
            Self::Minute => ts.checked_add_signed(chrono::Duration::minutes(steps_i)),
            Self::Hour => ts.checked_add_signed(chrono::Duration::hours(steps_i)),
            Self::Day => ts.checked_add_signed(chrono::Duration::days(steps_i)),
            Self::Week => ts.checked_add_signed(chrono::Duration::weeks(steps_i)),
            Self::MonthStart => ts.checked_add_months(Months::new(steps)),
        }
    }

    /// The `horizon` timestamps following `last`.
    pub fn future_timestamps(&self, last: NaiveDateTime, horizon: usize) -> Option<Vec<NaiveDateTime>> {
        (1..=horizon)
            .map(|h| u32::try_from(h).ok().and_then(|h| self.advance(last, h)))
            .collect()
    }
}

/// Parse a timestamp as written in panel files.
///
/// Accepts plain dates (`2024-01-31`) as midnight, and date-times separated
/// by either a space or `T`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
