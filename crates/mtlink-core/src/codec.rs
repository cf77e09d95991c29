//! Wire codec for the terminal link.
//!
//! Outbound commands are single text lines: a subject plus positional fields
//! joined by `;`, padded so every line carries exactly nine separators
//! regardless of how many fields the command uses. The terminal parses lines
//! by position and relies on the fixed width.
//!
//! Inbound lines are JSON. The grammar is closed: a bare array, or an object
//! with exactly one key, where the key is the subject and the value is the
//! payload. Array payloads report success; an object payload carrying an
//! `"error"` key is the terminal reporting a failed request. Any subject that
//! is not a known keyword is taken as a symbol name with a live data point as
//! payload.

use serde_json::Value;

use crate::error::LinkError;
use crate::time_util;
use crate::types::frame::format_field;

/// Field separator for outbound command lines.
pub const FIELD_SEPARATOR: char = ';';

/// Separators per outbound line after padding.
pub const SEPARATOR_COUNT: usize = 9;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Pad a command body so the line carries exactly [`SEPARATOR_COUNT`]
/// separators. Bodies that already carry that many (or more) pass unchanged.
pub fn pad(message: &str) -> String {
    let have = message.matches(FIELD_SEPARATOR).count();
    let missing = SEPARATOR_COUNT.saturating_sub(have);
    let mut line = String::with_capacity(message.len() + missing);
    line.push_str(message);
    for _ in 0..missing {
        line.push(FIELD_SEPARATOR);
    }
    line
}

/// Outbound commands understood by the terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Liveness probe sent during the startup check.
    Check,
    /// Ask the terminal to close its side of the bridge.
    Shutdown,
    /// Request a history dump. The frame travels in minutes.
    History {
        symbol: String,
        frame_minutes: f64,
        rows: u32,
    },
    /// Open a live stream into a terminal slot. The frame travels in its
    /// canonical seconds value (negative for tick counts).
    Stream {
        symbol: String,
        frame_secs: f64,
        slot: u32,
    },
    /// Release a terminal slot without naming a symbol.
    CancelStream { slot: u32 },
}

impl Command {
    /// Render the command body. [`pad`] runs separately before the line hits
    /// the wire.
    pub fn render(&self) -> String {
        match self {
            Self::Check => "Check".to_string(),
            Self::Shutdown => "Shutdown".to_string(),
            Self::History {
                symbol,
                frame_minutes,
                rows,
            } => format!("OHLCV;{symbol};{};{rows}", format_field(*frame_minutes)),
            Self::Stream {
                symbol,
                frame_secs,
                slot,
            } => format!("Ticks;{symbol};{};{slot}", format_field(*frame_secs)),
            Self::CancelStream { slot } => format!("Ticks;;0;{slot}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A history dump notice: the terminal wrote the requested file and echoes
/// the request parameters plus the covered span.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryNotice {
    pub symbol: String,
    pub frame_minutes: f64,
    pub start_secs: i64,
    pub end_secs: i64,
}

/// A failed request, reported by the terminal with a numeric error code.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub symbol: Option<String>,
    pub code: i64,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Echo of the startup probe.
    Check,
    /// Outcome of a history request.
    HistoryReady(Result<HistoryNotice, RemoteError>),
    /// Outcome of a stream request.
    StreamAck(Result<String, RemoteError>),
    /// A live observation: the subject names the symbol, the payload carries
    /// the stamp followed by the value fields.
    DataPoint {
        symbol: String,
        stamp_us: i64,
        fields: Vec<f64>,
    },
    /// A bare array with no subject. Carried through but not acted on.
    List(Vec<Value>),
}

/// Decode one inbound line.
pub fn decode(raw: &str) -> Result<Inbound, LinkError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| LinkError::Codec(format!("unparseable message: {e}")))?;

    match value {
        Value::Array(items) => Ok(Inbound::List(items)),
        Value::Object(map) => {
            let mut entries = map.into_iter();
            let (subject, payload) = match (entries.next(), entries.next()) {
                (Some(entry), None) => entry,
                _ => {
                    return Err(LinkError::Codec(
                        "expected an object with a single subject key".to_string(),
                    ));
                }
            };
            match subject.as_str() {
                "Check" => Ok(Inbound::Check),
                "OHLCV" => Ok(Inbound::HistoryReady(decode_history(payload)?)),
                "Ticks" => Ok(Inbound::StreamAck(decode_stream_ack(payload)?)),
                _ => decode_data_point(subject, payload),
            }
        }
        _ => Err(LinkError::Codec(
            "message must be a JSON object or array".to_string(),
        )),
    }
}

fn decode_history(payload: Value) -> Result<Result<HistoryNotice, RemoteError>, LinkError> {
    if let Some(err) = remote_error(&payload) {
        return Ok(Err(err));
    }
    let Value::Array(items) = payload else {
        return Err(LinkError::Codec(
            "history notice payload must be an array".to_string(),
        ));
    };
    match items.as_slice() {
        [Value::String(symbol), frame, start, end] => {
            let frame_minutes = number(frame).ok_or_else(|| {
                LinkError::Codec("history notice frame must be numeric".to_string())
            })?;
            let (Some(start_secs), Some(end_secs)) = (number(start), number(end)) else {
                return Err(LinkError::Codec(
                    "history notice span must be numeric".to_string(),
                ));
            };
            Ok(Ok(HistoryNotice {
                symbol: symbol.clone(),
                frame_minutes,
                start_secs: start_secs.round() as i64,
                end_secs: end_secs.round() as i64,
            }))
        }
        _ => Err(LinkError::Codec(
            "history notice must carry symbol, frame, start, end".to_string(),
        )),
    }
}

fn decode_stream_ack(payload: Value) -> Result<Result<String, RemoteError>, LinkError> {
    if let Some(err) = remote_error(&payload) {
        return Ok(Err(err));
    }
    let Value::Array(items) = payload else {
        return Err(LinkError::Codec(
            "stream ack payload must be an array".to_string(),
        ));
    };
    match items.first() {
        Some(Value::String(symbol)) => Ok(Ok(symbol.clone())),
        _ => Err(LinkError::Codec(
            "stream ack must start with a symbol".to_string(),
        )),
    }
}

fn decode_data_point(subject: String, payload: Value) -> Result<Inbound, LinkError> {
    let Value::Array(items) = payload else {
        return Err(LinkError::Codec(format!(
            "data point for {subject} must be an array"
        )));
    };
    let mut numbers = Vec::with_capacity(items.len());
    for item in &items {
        let n = item.as_f64().ok_or_else(|| {
            LinkError::Codec(format!("non-numeric field in data point for {subject}"))
        })?;
        numbers.push(n);
    }
    let Some((stamp_secs, fields)) = numbers.split_first() else {
        return Err(LinkError::Codec(format!("empty data point for {subject}")));
    };
    if !stamp_secs.is_finite() {
        return Err(LinkError::Codec(format!(
            "non-finite stamp in data point for {subject}"
        )));
    }
    Ok(Inbound::DataPoint {
        symbol: subject,
        stamp_us: time_util::secs_to_us(*stamp_secs),
        fields: fields.to_vec(),
    })
}

fn number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Extract the error marker from a payload, if present. Only object payloads
/// carry it.
fn remote_error(payload: &Value) -> Option<RemoteError> {
    let obj = payload.as_object()?;
    let code = obj.get("error")?;
    let code = code
        .as_i64()
        .or_else(|| code.as_f64().map(|f| f.round() as i64))?;
    let symbol = obj.get("symbol").and_then(|s| s.as_str()).map(String::from);
    Some(RemoteError { symbol, code })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_fills_to_nine_separators() {
        assert_eq!(pad("Check"), "Check;;;;;;;;;");
        assert_eq!(pad("OHLCV;EURUSD;5;10000"), "OHLCV;EURUSD;5;10000;;;;;;");
        let full = "a;b;c;d;e;f;g;h;i;j";
        assert_eq!(pad(full), full);
    }

    #[test]
    fn render_commands() {
        let history = Command::History {
            symbol: "EURUSD".to_string(),
            frame_minutes: 5.0,
            rows: 10_000,
        };
        assert_eq!(history.render(), "OHLCV;EURUSD;5;10000");

        let stream = Command::Stream {
            symbol: "EURUSD".to_string(),
            frame_secs: -100.0,
            slot: 0,
        };
        assert_eq!(stream.render(), "Ticks;EURUSD;-100;0");

        let sub_second = Command::Stream {
            symbol: "EURUSD".to_string(),
            frame_secs: 0.5,
            slot: 2,
        };
        assert_eq!(sub_second.render(), "Ticks;EURUSD;0.5;2");

        assert_eq!(Command::CancelStream { slot: 3 }.render(), "Ticks;;0;3");
        assert_eq!(Command::Check.render(), "Check");
        assert_eq!(Command::Shutdown.render(), "Shutdown");
    }

    #[test]
    fn decode_check_ignores_payload() {
        assert_eq!(decode(r#"{"Check": [1]}"#).unwrap(), Inbound::Check);
        assert_eq!(decode(r#"{"Check": 0}"#).unwrap(), Inbound::Check);
    }

    #[test]
    fn decode_history_notice() {
        let msg = r#"{"OHLCV": ["EURUSD", 5, 1700000000, 1700600000]}"#;
        match decode(msg).unwrap() {
            Inbound::HistoryReady(Ok(notice)) => {
                assert_eq!(notice.symbol, "EURUSD");
                assert_eq!(notice.frame_minutes, 5.0);
                assert_eq!(notice.start_secs, 1_700_000_000);
                assert_eq!(notice.end_secs, 1_700_600_000);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_history_remote_error() {
        let msg = r#"{"OHLCV": {"symbol": "XXXYYY", "error": 4106}}"#;
        match decode(msg).unwrap() {
            Inbound::HistoryReady(Err(err)) => {
                assert_eq!(err.symbol.as_deref(), Some("XXXYYY"));
                assert_eq!(err.code, 4106);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_stream_ack_and_error() {
        match decode(r#"{"Ticks": ["EURUSD", 0]}"#).unwrap() {
            Inbound::StreamAck(Ok(symbol)) => assert_eq!(symbol, "EURUSD"),
            other => panic!("unexpected: {other:?}"),
        }
        match decode(r#"{"Ticks": {"error": 1}}"#).unwrap() {
            Inbound::StreamAck(Err(err)) => {
                assert_eq!(err.symbol, None);
                assert_eq!(err.code, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_data_point_converts_stamp() {
        let msg = r#"{"EURUSD": [1700000000.25, 1.1, 1.2, 1.0, 1.15, 10, 3]}"#;
        match decode(msg).unwrap() {
            Inbound::DataPoint {
                symbol,
                stamp_us,
                fields,
            } => {
                assert_eq!(symbol, "EURUSD");
                assert_eq!(stamp_us, 1_700_000_000_250_000);
                assert_eq!(fields, vec![1.1, 1.2, 1.0, 1.15, 10.0, 3.0]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_bare_list() {
        match decode("[1, 2, 3]").unwrap() {
            Inbound::List(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_malformed() {
        for raw in [
            "not json at all",
            r#""just a string""#,
            "42",
            r#"{"A": 1, "B": 2}"#,
            r#"{"EURUSD": ["text", 1]}"#,
            r#"{"EURUSD": []}"#,
            r#"{"EURUSD": 7}"#,
            r#"{"OHLCV": ["EURUSD", 5]}"#,
            r#"{"Ticks": [7]}"#,
        ] {
            assert!(decode(raw).is_err(), "{raw:?} should fail");
        }
    }
}
