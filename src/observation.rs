//! Observations and their storage shape.
//!
//! Stored histories carry two timestamp shapes: current entries use an ISO-8601
//! `datetime`, legacy entries only a `date` (midnight UTC). Both are decoded
//! into a [`Stamp`] when the document is read, so nothing downstream branches
//! on which JSON field was present. Entries whose timestamp cannot be parsed
//! are kept verbatim and written back unchanged; preprocessing drops them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of one observation as it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stamp {
    /// Full instant (`datetime` field).
    Instant(DateTime<Utc>),
    /// Legacy calendar date (`date` field), interpreted as midnight UTC.
    LegacyDate(NaiveDate),
    /// A timestamp string that could not be parsed.
    Unparsed { raw: String, legacy: bool },
    /// Neither field was present.
    Missing,
}

impl Stamp {
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            Stamp::Instant(t) => Some(*t),
            Stamp::LegacyDate(d) => d.and_hms_opt(0, 0, 0).map(|n| n.and_utc()),
            Stamp::Unparsed { .. } | Stamp::Missing => None,
        }
    }

    fn parse_datetime(raw: &str) -> Stamp {
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Stamp::Instant(t.with_timezone(&Utc));
        }
        // Offset-less instants are taken as UTC.
        if let Ok(n) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Stamp::Instant(n.and_utc());
        }
        Stamp::Unparsed { raw: raw.to_string(), legacy: false }
    }

    fn parse_date(raw: &str) -> Stamp {
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => Stamp::LegacyDate(d),
            Err(_) => Stamp::Unparsed { raw: raw.to_string(), legacy: true },
        }
    }
}

/// One measured (or synthesized) cumulative view count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireObservation", into = "WireObservation")]
pub struct Observation {
    pub stamp: Stamp,
    pub views: u64,
    pub predicted: bool,
}

impl Observation {
    pub fn real(at: DateTime<Utc>, views: u64) -> Self {
        Observation { stamp: Stamp::Instant(at), views, predicted: false }
    }

    pub fn predicted(at: DateTime<Utc>, views: u64) -> Self {
        Observation { stamp: Stamp::Instant(at), views, predicted: true }
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.stamp.resolve()
    }

    /// Instant at storage precision (milliseconds), used to detect rewrites of the same slot.
    pub fn normalized_millis(&self) -> Option<i64> {
        self.time().map(|t| t.timestamp_millis())
    }
}

/// Rewrite resolvable legacy `date` entries as `datetime` entries at midnight UTC.
/// Returns how many entries changed.
pub fn normalize_legacy(history: &mut [Observation]) -> usize {
    let mut changed = 0;
    for obs in history.iter_mut() {
        if let Stamp::LegacyDate(_) = obs.stamp {
            if let Some(t) = obs.stamp.resolve() {
                obs.stamp = Stamp::Instant(t);
                changed += 1;
            }
        }
    }
    changed
}

/// Latest resolvable observation, by time. Later entries win ties.
pub fn latest(history: &[Observation]) -> Option<(DateTime<Utc>, &Observation)> {
    let mut best: Option<(DateTime<Utc>, &Observation)> = None;
    for obs in history {
        if let Some(t) = obs.time() {
            if best.map_or(true, |(bt, _)| t >= bt) {
                best = Some((t, obs));
            }
        }
    }
    best
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Serialize, Deserialize)]
struct WireObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    views: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    predicted: bool,
}

impl From<WireObservation> for Observation {
    fn from(wire: WireObservation) -> Self {
        let stamp = match (wire.datetime.as_deref(), wire.date.as_deref()) {
            (Some(raw), _) => Stamp::parse_datetime(raw),
            (None, Some(raw)) => Stamp::parse_date(raw),
            (None, None) => Stamp::Missing,
        };
        Observation { stamp, views: wire.views, predicted: wire.predicted }
    }
}

impl From<Observation> for WireObservation {
    fn from(obs: Observation) -> Self {
        let (datetime, date) = match obs.stamp {
            Stamp::Instant(t) => (Some(t.to_rfc3339_opts(SecondsFormat::Millis, true)), None),
            Stamp::LegacyDate(d) => (None, Some(d.format("%Y-%m-%d").to_string())),
            Stamp::Unparsed { raw, legacy: false } => (Some(raw), None),
            Stamp::Unparsed { raw, legacy: true } => (None, Some(raw)),
            Stamp::Missing => (None, None),
        };
        WireObservation { datetime, date, views: obs.views, predicted: obs.predicted }
    }
}
