//! Message decoding and news-line formatting
//!
//! Vendor messages are loosely typed element trees. The functions here pull
//! out the handful of fields the monitor relies on and turn them into typed
//! values or formatted [`NewsLine`]s. A bad item is reported as a
//! [`DecodeError`] (or skipped with a log line) and never aborts the batch it
//! arrived in.

use crate::{
    data::NewsLine,
    error::{DecodeError, ErrorReporter, FaultClass},
    session::Message,
};
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime};
use serde_json::Value;

/// Decode a price field from a subscription message
///
/// `Ok(None)` means the message does not carry the field (e.g. a bid/ask only
/// update).
pub fn decode_price(message: &Message, field: &str) -> Result<Option<f64>, DecodeError> {
    let value = match message.element(field) {
        Some(value) => value,
        None => return Ok(None),
    };

    let price = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match price {
        Some(p) if p.is_finite() => Ok(Some(p)),
        _ => Err(DecodeError::InvalidDataType {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// One decoded headline before formatting
#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub headline: String,
    pub source: String,
    pub published: Option<String>,
}

impl Headline {
    /// `[HH:MM] source: headline`
    pub fn to_news_line(&self, now: DateTime<Local>) -> NewsLine {
        let time = match &self.published {
            Some(raw) => normalize_timestamp_at(raw, now),
            None => now.format("%H:%M").to_string(),
        };
        NewsLine::new(format!("[{}] {}: {}", time, self.source, self.headline))
    }
}

/// Decode a single news item, falling back between field names
///
/// Items without any headline text yield `Ok(None)`.
pub fn decode_headline(item: &Value, default_source: &str) -> Result<Option<Headline>, DecodeError> {
    if !item.is_object() {
        return Err(DecodeError::MalformedMessage(format!("news item is not an object: {}", item)));
    }

    let headline = match first_string(item, &["headline", "title"])? {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Ok(None),
    };
    let source = first_string(item, &["source", "provider"])?
        .unwrap_or_else(|| default_source.to_string());
    let published = first_string(item, &["publishedDateTime", "dateTime"])?;

    Ok(Some(Headline {
        headline,
        source,
        published,
    }))
}

/// Decode every headline in a message into formatted news lines
///
/// Items are looked up under `newsItems` or `GetNewsResponse.newsItems`.
pub fn decode_news_message(message: &Message, default_source: &str, now: DateTime<Local>) -> Vec<NewsLine> {
    let items = message
        .element("GetNewsResponse")
        .and_then(|r| r.get("newsItems"))
        .or_else(|| message.element("newsItems"))
        .and_then(Value::as_array);

    let items = match items {
        Some(items) => items,
        None => {
            tracing::debug!("No news items in {} message", message.message_type);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| match decode_headline(item, default_source) {
            Ok(headline) => headline.map(|h| h.to_news_line(now)),
            Err(e) => {
                ErrorReporter::report(FaultClass::Decode, "news item", &e);
                None
            }
        })
        .collect()
}

/// Per-security status decoded from a reference-data response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecurityStatus {
    pub security: String,
    pub name: Option<String>,
    pub last_update: Option<String>,
    pub description: Option<String>,
}

impl SecurityStatus {
    /// `[HH:MM:SS] security: name | Last Update: x | description`
    ///
    /// Returns `None` when none of the status fields were present.
    pub fn to_news_line(&self, now: DateTime<Local>) -> Option<NewsLine> {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(name.clone());
        }
        if let Some(last_update) = &self.last_update {
            parts.push(format!("Last Update: {}", last_update));
        }
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        if parts.is_empty() {
            return None;
        }

        Some(NewsLine::new(format!(
            "[{}] {}: {}",
            now.format("%H:%M:%S"),
            self.security,
            parts.join(" | ")
        )))
    }
}

/// Decode one `securityData` entry
pub fn decode_security(entry: &Value) -> Result<SecurityStatus, DecodeError> {
    if !entry.is_object() {
        return Err(DecodeError::MalformedMessage(format!("security entry is not an object: {}", entry)));
    }

    let security = entry
        .get("security")
        .map(value_to_string)
        .unwrap_or_else(|| "Unknown".to_string());

    if let Some(exceptions) = entry.get("fieldExceptions").and_then(Value::as_array) {
        for exception in exceptions {
            let field_id = exception.get("fieldId").map(value_to_string).unwrap_or_default();
            tracing::debug!("Field exception for {}: {}", security, field_id);
        }
    }

    let fields = match entry.get("fieldData") {
        Some(fields) if fields.is_object() => fields,
        Some(other) => {
            return Err(DecodeError::InvalidDataType {
                field: "fieldData".to_string(),
                value: other.to_string(),
            })
        }
        None => {
            return Ok(SecurityStatus {
                security,
                ..Default::default()
            })
        }
    };

    Ok(SecurityStatus {
        name: fields.get("NAME").map(value_to_string),
        last_update: fields.get("LAST_UPDATE_DT").map(value_to_string),
        description: fields.get("SECURITY_DES").map(value_to_string),
        security,
    })
}

/// Decode a reference-data (partial) response into status lines
pub fn decode_reference_message(message: &Message, now: DateTime<Local>) -> Vec<NewsLine> {
    let entries = match message.element("securityData").and_then(Value::as_array) {
        Some(entries) => entries,
        None => {
            tracing::debug!("No securityData in {} message", message.message_type);
            return Vec::new();
        }
    };

    entries
        .iter()
        .filter_map(|entry| match decode_security(entry) {
            Ok(status) => status.to_news_line(now),
            Err(e) => {
                ErrorReporter::report(FaultClass::Decode, "reference data", &e);
                None
            }
        })
        .collect()
}

/// Normalize a publish time to `HH:MM`, falling back to the local time now
pub fn normalize_timestamp(raw: &str) -> String {
    normalize_timestamp_at(raw, Local::now())
}

/// [`normalize_timestamp`] with an explicit fallback clock
///
/// Timestamps carrying an offset keep the wall-clock time of that offset.
pub fn normalize_timestamp_at(raw: &str, now: DateTime<Local>) -> String {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%H:%M").to_string();
    }
    if let Ok(dt) = raw.parse::<NaiveDateTime>() {
        return dt.format("%H:%M").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.format("%H:%M").to_string();
    }
    for pattern in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(raw, pattern) {
            return time.format("%H:%M").to_string();
        }
    }

    now.format("%H:%M").to_string()
}

fn first_string(item: &Value, names: &[&str]) -> Result<Option<String>, DecodeError> {
    for name in names {
        match item.get(*name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => return Ok(Some(s.clone())),
            Some(other) => {
                return Err(DecodeError::InvalidDataType {
                    field: name.to_string(),
                    value: other.to_string(),
                })
            }
        }
    }
    Ok(None)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_normalize_iso_timestamp() {
        assert_eq!(normalize_timestamp_at("2024-01-01T10:15:00Z", fixed_now()), "10:15");
        assert_eq!(normalize_timestamp_at("2024-01-01T10:15:00.250+09:00", fixed_now()), "10:15");
        assert_eq!(normalize_timestamp_at("2024-01-01T23:59:30", fixed_now()), "23:59");
    }

    #[test]
    fn test_normalize_falls_back_to_now() {
        assert_eq!(normalize_timestamp_at("yesterday-ish", fixed_now()), "14:07");
        assert_eq!(normalize_timestamp_at("2024-13-45T99:99:99Z", fixed_now()), "14:07");
    }

    #[test]
    fn test_headline_field_fallbacks() {
        let item = json!({"title": "Copper rallies", "provider": "Reuters", "dateTime": "2024-01-01T08:30:00Z"});
        let headline = decode_headline(&item, "Bloomberg").unwrap().unwrap();
        assert_eq!(headline.headline, "Copper rallies");
        assert_eq!(headline.source, "Reuters");
        assert_eq!(
            headline.to_news_line(fixed_now()).as_str(),
            "[08:30] Reuters: Copper rallies"
        );

        let bare = json!({"headline": "Stocks fall"});
        let headline = decode_headline(&bare, "Bloomberg").unwrap().unwrap();
        assert_eq!(headline.to_news_line(fixed_now()).as_str(), "[14:07] Bloomberg: Stocks fall");
    }

    #[test]
    fn test_price_decoding() {
        let msg = Message::new("MarketDataEvents", json!({"LAST_PRICE": 8512.5, "BID": 8512.0}));
        assert_eq!(decode_price(&msg, "LAST_PRICE"), Ok(Some(8512.5)));
        assert_eq!(decode_price(&msg, "ASK"), Ok(None));

        let bad = Message::new("MarketDataEvents", json!({"LAST_PRICE": "n/a"}));
        assert!(decode_price(&bad, "LAST_PRICE").is_err());
    }
}
