//! Attempt log export and payload display.

use std::{borrow::Cow, fmt::Display, fmt::Write as _};

use chrono::TimeZone;
use lifeline_core::AttemptLogEntry;
use serde_json::Value;

/// Header row of the CSV export.
pub const CSV_HEADER: &str =
    "timestamp,log_type,url,status_code,success,data_type,record_count,error_message";

/// Quotes `field` when it contains a comma, quote or newline, doubling
/// embedded quotes.
pub fn csv_escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Renders entries as CSV with timestamps formatted in `tz`.
///
/// Absent values are written as empty fields.
pub fn export_csv<Tz>(entries: &[AttemptLogEntry], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::with_capacity(CSV_HEADER.len() + entries.len() * 96);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for entry in entries {
        let timestamp = entry.timestamp.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string();
        let status = entry.status_code.map(|c| c.to_string()).unwrap_or_default();
        let count = entry.record_count.map(|c| c.to_string()).unwrap_or_default();
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            csv_escape(&timestamp),
            csv_escape(entry.source.as_str()),
            csv_escape(&entry.url),
            status,
            entry.success,
            csv_escape(entry.data_type.as_deref().unwrap_or_default()),
            count,
            csv_escape(entry.error_message.as_deref().unwrap_or_default()),
        );
    }

    out
}

/// Renders the parsed raw payloads as a pretty JSON array.
///
/// Entries without a payload or with one that is not valid JSON are
/// skipped.
pub fn export_json(entries: &[AttemptLogEntry]) -> String {
    let payloads: Vec<Value> = entries
        .iter()
        .filter_map(|e| e.raw_payload.as_deref())
        .filter_map(|raw| serde_json::from_str(raw).ok())
        .collect();
    format!("{:#}", Value::Array(payloads))
}

/// Pretty-prints a logged payload, falling back to the raw text when it
/// does not parse.
pub fn pretty_payload(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => format!("{value:#}"),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset, Utc};
    use lifeline_core::SourceKind;
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::*;

    fn entry(payload: Option<&str>) -> AttemptLogEntry {
        AttemptLogEntry {
            id: Uuid::nil(),
            timestamp: DateTime::from_timestamp(1_709_620_200, 0).unwrap_or_default(),
            url: "https://example.com/hook".into(),
            status_code: None,
            success: false,
            error_message: Some("network connection failed: refused, \"twice\"".into()),
            data_type: Some("screen_time".into()),
            record_count: Some(12),
            raw_payload: payload.map(str::to_string),
            source: SourceKind::Usage,
        }
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b\"c"), "\"a,b\"\"c\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn csv_rows_use_local_time_and_empty_nulls() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let csv = export_csv(&[entry(None)], &cet);

        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some(
                "2024-03-05 07:30:00,screen_time,https://example.com/hook,,false,screen_time,12,\
                 \"network connection failed: refused, \"\"twice\"\"\""
            )
        );
    }

    #[test]
    fn json_export_skips_missing_and_broken_payloads() {
        let entries = [entry(Some(r#"{"a":1}"#)), entry(None), entry(Some("not json"))];
        let exported: Value = serde_json::from_str(&export_json(&entries)).unwrap();
        assert_eq!(exported, serde_json::json!([{"a": 1}]));
    }

    #[test]
    fn pretty_payload_falls_back_to_raw() {
        assert_eq!(pretty_payload("{\"a\":1}"), "{\n  \"a\": 1\n}");
        assert_eq!(pretty_payload("{broken"), "{broken");
    }

    /// Minimal RFC 4180 field parser used to check escaping.
    fn parse_field(field: &str) -> String {
        match field.strip_prefix('"').and_then(|f| f.strip_suffix('"')) {
            Some(inner) => inner.replace("\"\"", "\""),
            None => field.to_string(),
        }
    }

    proptest! {
        #[test]
        fn escaping_round_trips(field in "[a-z,\"\n ]{0,24}") {
            let escaped = csv_escape(&field);
            prop_assert_eq!(parse_field(&escaped), field);
        }
    }
}
