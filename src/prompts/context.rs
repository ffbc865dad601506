//! Context sources for prompt rendering and the Christmas-time phase oracle.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

type ProviderFn = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// A named value consulted on every render.
#[derive(Clone)]
pub enum ContextProvider {
    Static(Value),
    /// Evaluated fresh on each call.
    Dynamic(ProviderFn),
}

impl ContextProvider {
    pub fn value(value: impl Into<Value>) -> Self {
        ContextProvider::Static(value.into())
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        ContextProvider::Dynamic(Arc::new(f))
    }

    pub fn evaluate(&self) -> anyhow::Result<Value> {
        match self {
            ContextProvider::Static(v) => Ok(v.clone()),
            ContextProvider::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextProvider::Static(v) => f.debug_tuple("Static").field(v).finish(),
            ContextProvider::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preparing,
    Delivering,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preparing => "preparing",
            Phase::Delivering => "delivering",
            Phase::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SantaTimeContext {
    pub phase: Phase,
    pub is_christmas_eve: bool,
    pub is_christmas_day: bool,
    pub is_pre_christmas: bool,
    /// UTC, RFC 3339 with milliseconds.
    pub current_time: String,
    /// Milliseconds until delivery starts; zero once it has.
    pub time_until_christmas: i64,
    pub day_of_year: u32,
}

fn local_cutoff(year: i32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 12, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Delivery runs from Dec 24 18:00 to Dec 25 06:00 local time of the current
/// year. The phase restarts at `preparing` every January.
pub fn santa_time_context(now: DateTime<Local>) -> SantaTimeContext {
    let local = now.naive_local();
    let eve = local_cutoff(now.year(), 24, 18);
    let day = local_cutoff(now.year(), 25, 6);

    let phase = if local < eve {
        Phase::Preparing
    } else if local < day {
        Phase::Delivering
    } else {
        Phase::Finished
    };

    SantaTimeContext {
        phase,
        is_christmas_eve: phase == Phase::Delivering,
        is_christmas_day: phase == Phase::Finished,
        is_pre_christmas: phase == Phase::Preparing,
        current_time: now.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true),
        time_until_christmas: (eve - local).num_milliseconds().max(0),
        day_of_year: now.ordinal(),
    }
}

/// Live tracker numbers supplied by the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub gifts_delivered: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lon: f64,
}

/// `1234567.5` -> `"1,234,567.5"`; at most three fraction digits.
pub fn group_thousands(n: f64) -> String {
    let fixed = format!("{:.3}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if n < 0.0 && (int_part != "0" || !frac_part.is_empty()) { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

/// Variables for the Santa message templates: every time field plus the
/// tracker fragments, which are empty when the stat is missing.
pub fn santa_message_context(
    time: &SantaTimeContext,
    stats: Option<&LiveStats>,
    location: Option<&UserLocation>,
) -> Map<String, Value> {
    let mut context = match serde_json::to_value(time) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let distance = stats
        .and_then(|s| s.distance)
        .filter(|d| *d != 0.0)
        .map(|d| format!("He is about {} km away from the user's location.", group_thousands(d)))
        .unwrap_or_default();
    let gifts = stats
        .and_then(|s| s.gifts_delivered)
        .filter(|g| *g > 0)
        .map(|g| format!("He has delivered {} gifts so far!", group_thousands(g as f64)))
        .unwrap_or_default();
    let location = location
        .map(|l| format!("{:.2}, {:.2}", l.lat, l.lon))
        .unwrap_or_else(|| "unknown".to_string());
    let status = stats
        .and_then(|s| s.status.clone())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    context.insert("DISTANCE_CONTEXT".into(), Value::String(distance));
    context.insert("GIFTS_CONTEXT".into(), Value::String(gifts));
    context.insert("USER_LOCATION".into(), Value::String(location));
    context.insert("SANTA_STATUS".into(), Value::String(status));
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, month, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(santa_time_context(at(12, 24, 17, 59)).phase, Phase::Preparing);
        assert_eq!(santa_time_context(at(12, 24, 18, 0)).phase, Phase::Delivering);
        assert_eq!(santa_time_context(at(12, 25, 5, 59)).phase, Phase::Delivering);
        assert_eq!(santa_time_context(at(12, 25, 6, 0)).phase, Phase::Finished);
        assert_eq!(santa_time_context(at(12, 31, 23, 0)).phase, Phase::Finished);
        assert_eq!(santa_time_context(at(1, 2, 0, 0)).phase, Phase::Preparing);
    }

    #[test]
    fn auxiliary_fields() {
        let before = santa_time_context(at(12, 24, 17, 0));
        assert_eq!(before.time_until_christmas, 60 * 60 * 1000);
        assert!(before.is_pre_christmas && !before.is_christmas_eve);
        assert_eq!(before.day_of_year, 358);

        let during = santa_time_context(at(12, 24, 20, 0));
        assert_eq!(during.time_until_christmas, 0);
        assert!(during.is_christmas_eve);
        assert!(during.current_time.ends_with('Z'));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0.0), "0");
        assert_eq!(group_thousands(999.0), "999");
        assert_eq!(group_thousands(1500.0), "1,500");
        assert_eq!(group_thousands(1_234_567_890.0), "1,234,567,890");
        assert_eq!(group_thousands(12345.25), "12,345.25");
        assert_eq!(group_thousands(-4200.0), "-4,200");
    }

    #[test]
    fn message_fragments_are_empty_without_stats() {
        let time = santa_time_context(at(12, 24, 20, 0));

        let bare = santa_message_context(&time, None, None);
        assert_eq!(bare["DISTANCE_CONTEXT"], "");
        assert_eq!(bare["GIFTS_CONTEXT"], "");
        assert_eq!(bare["USER_LOCATION"], "unknown");
        assert_eq!(bare["SANTA_STATUS"], "unknown");
        assert_eq!(bare["phase"], "delivering");

        let stats = LiveStats {
            distance: Some(1500.0),
            gifts_delivered: Some(1_234_567),
            status: Some("Over Norway".into()),
        };
        let location = UserLocation { lat: 40.7484, lon: -73.9857 };
        let full = santa_message_context(&time, Some(&stats), Some(&location));
        assert_eq!(full["DISTANCE_CONTEXT"], "He is about 1,500 km away from the user's location.");
        assert_eq!(full["GIFTS_CONTEXT"], "He has delivered 1,234,567 gifts so far!");
        assert_eq!(full["USER_LOCATION"], "40.75, -73.99");
        assert_eq!(full["SANTA_STATUS"], "Over Norway");
    }

    #[test]
    fn dynamic_providers_run_each_time() {
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let seen = Arc::clone(&counter);
        let provider = ContextProvider::dynamic(move || {
            Ok(Value::from(seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst)))
        });

        assert_eq!(provider.evaluate().unwrap(), Value::from(0));
        assert_eq!(provider.evaluate().unwrap(), Value::from(1));
        assert_eq!(ContextProvider::value("x").evaluate().unwrap(), Value::from("x"));
    }
}
