//! Conversion between literal tokens and typed values.
//!
//! [`Token::as_primitive`] reads a literal token into a [`Value`];
//! [`format_literal`] writes a value back in the literal syntax of a given
//! protocol version, so that `format_literal(v)` re-tokenizes to `v`.
//!
//! Where a version has no literal of the value's own type the value comes
//! back widened: bytes read as `Int32`, v4 numbers lose their `L`/`f`/`m`
//! suffixes, and a v2/v3 time of day reads as a duration.

use crate::ast::{ODataVersion, Token, TokenKind};
use crate::lexer::LexError;
use crate::value::Value;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

impl Token {
    /// Converts a literal token to its typed value.
    ///
    /// String tokens lose their outer quotes and doubled quotes collapse, so
    /// `'O''Neil'` becomes `O'Neil`. Non-literal tokens are an error.
    pub fn as_primitive(&self) -> Result<Value, LexError> {
        let text = self.text();
        let value = match self.kind() {
            TokenKind::Null => Some(Value::Null),
            TokenKind::True => Some(Value::Boolean(true)),
            TokenKind::False => Some(Value::Boolean(false)),
            TokenKind::String => Some(Value::String(clean_string(text))),
            TokenKind::Integer => {
                let digits = text.trim_start_matches('+');
                digits
                    .parse::<i32>()
                    .map(Value::Int32)
                    .or_else(|_| digits.parse::<i64>().map(Value::Int64))
                    .ok()
            }
            TokenKind::Long => text
                .trim_start_matches('+')
                .trim_end_matches(['L', 'l'])
                .parse::<i64>()
                .ok()
                .map(Value::Int64),
            TokenKind::Double => text
                .trim_start_matches('+')
                .trim_end_matches(['D', 'd'])
                .parse::<f64>()
                .ok()
                .map(Value::Double),
            TokenKind::Single => text
                .trim_start_matches('+')
                .trim_end_matches(['F', 'f'])
                .parse::<f32>()
                .ok()
                .map(Value::Single),
            TokenKind::Decimal => parse_decimal(text.trim_end_matches(['M', 'm'])).map(Value::Decimal),
            TokenKind::NaN | TokenKind::PosInfinity | TokenKind::NegInfinity => {
                let number = match self.kind() {
                    TokenKind::NaN => f64::NAN,
                    TokenKind::PosInfinity => f64::INFINITY,
                    _ => f64::NEG_INFINITY,
                };
                if text.ends_with(['f', 'F']) {
                    Some(Value::Single(number as f32))
                } else {
                    Some(Value::Double(number))
                }
            }
            TokenKind::Guid => Uuid::parse_str(unquote(text, &["guid'"]))
                .ok()
                .map(Value::Guid),
            TokenKind::Date => parse_date_time(unquote(text, &["datetimeoffset'", "datetime'"])),
            TokenKind::TimeOfDay => parse_time_of_day(text).map(Value::TimeOfDay),
            TokenKind::Duration => {
                parse_duration(unquote(text, &["duration'", "time'"])).map(Value::Duration)
            }
            TokenKind::Binary => decode_hex(unquote(text, &["X'", "binary'"])).map(Value::Binary),
            TokenKind::Base64 => decode_base64(unquote(text, &["binary'"])).map(Value::Binary),
            _ => None,
        };
        value.ok_or_else(|| LexError {
            message: format!("cannot convert {:?} token to a value", self.kind()),
            index: 0,
            fragment: text.to_string(),
        })
    }
}

/// Strips the outer quotes of a string literal and collapses `''` to `'`.
pub fn clean_string(text: &str) -> String {
    let inner = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(text);
    inner.replace("''", "'")
}

fn unquote<'a>(text: &'a str, prefixes: &[&str]) -> &'a str {
    let body = prefixes
        .iter()
        .find_map(|p| text.strip_prefix(p))
        .unwrap_or(text);
    body.strip_suffix('\'').unwrap_or(body)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim_start_matches('+');
    if text.contains(['e', 'E']) {
        Decimal::from_scientific(text).ok()
    } else {
        Decimal::from_str(text).ok()
    }
}

/// Parses `yyyy-mm-dd` into a date, and anything with a time part into a
/// date-time. A missing offset means UTC.
fn parse_date_time(text: &str) -> Option<Value> {
    if !text.contains('T') {
        return NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(Value::Date);
    }

    let (body, offset) = split_offset(text)?;
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(Value::DateTimeOffset)
}

fn split_offset(text: &str) -> Option<(&str, FixedOffset)> {
    if let Some(body) = text.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)?));
    }
    let time_start = text.find('T')?;
    let sign_at = text[time_start..]
        .rfind(['+', '-'])
        .map(|i| i + time_start);
    match sign_at {
        Some(at) => {
            let (body, offset) = text.split_at(at);
            let sign = if offset.starts_with('-') { -1 } else { 1 };
            let (hours, minutes) = offset[1..].split_once(':')?;
            let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
            Some((body, FixedOffset::east_opt(sign * seconds)?))
        }
        None => Some((text, FixedOffset::east_opt(0)?)),
    }
}

fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// Parses an ISO 8601 duration such as `P12DT23H59M59.999S` or `-PT5M`.
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let body = body.strip_prefix('P')?;
    let (days_part, time_part) = match body.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (body, None),
    };
    if days_part.is_empty() && time_part.is_none_or(str::is_empty) {
        return None;
    }

    let mut total = TimeDelta::zero();
    if !days_part.is_empty() {
        let days = days_part.strip_suffix('D')?;
        total += TimeDelta::try_days(parse_digits(days)?)?;
    }
    if let Some(mut rest) = time_part {
        if let Some((hours, after)) = rest.split_once('H') {
            total += TimeDelta::try_hours(parse_digits(hours)?)?;
            rest = after;
        }
        if let Some((minutes, after)) = rest.split_once('M') {
            total += TimeDelta::try_minutes(parse_digits(minutes)?)?;
            rest = after;
        }
        if !rest.is_empty() {
            let seconds = rest.strip_suffix('S')?;
            let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
            total += TimeDelta::try_seconds(parse_digits(whole)?)?;
            if !fraction.is_empty() {
                parse_digits(fraction)?;
                let nanos: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
                total += TimeDelta::nanoseconds(nanos.parse::<i64>().ok()?);
            }
        }
    }
    Some(if negative { -total } else { total })
}

fn parse_digits(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Formats a duration as ISO 8601, e.g. `P1DT2H3M4.5S`.
pub fn format_duration(duration: &TimeDelta) -> String {
    let mut out = String::new();
    if *duration < TimeDelta::zero() {
        out.push('-');
    }
    let abs = duration.abs();
    out.push('P');
    let days = abs.num_days();
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    let rest = abs - TimeDelta::days(days);
    let hours = rest.num_hours();
    let minutes = rest.num_minutes() % 60;
    let seconds = rest.num_seconds() % 60;
    let nanos = rest.subsec_nanos();
    if hours > 0 || minutes > 0 || seconds > 0 || nanos > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if nanos > 0 {
            let fraction = format!("{:09}", nanos);
            out.push_str(&format!("{}.{}S", seconds, fraction.trim_end_matches('0')));
        } else if seconds > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

const BASE64_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, BASE64_CONFIG);
const BASE64_STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, BASE64_CONFIG);

/// Decodes base64url, or the standard alphabet when the text uses `+` or `/`.
/// Padding is optional.
fn decode_base64(text: &str) -> Option<Vec<u8>> {
    BASE64_URL
        .decode(text)
        .or_else(|_| BASE64_STANDARD.decode(text))
        .ok()
}

/// Writes a value in the literal syntax accepted by `version`.
///
/// Prefixed and suffixed forms (`guid'..'`, `12L`, `X'..'`) are used unless
/// the version accepts v4, which has bare forms. Records and collections have
/// no literal form and yield `None`.
///
/// # Example
///
/// ```text
/// Int64(12), V3     12L
/// Int64(12), V4     12
/// Binary([255]), V3 X'FF'
/// Binary([255]), V4 binary'_w'
/// ```
pub fn format_literal(value: &Value, version: ODataVersion) -> Option<String> {
    let v4 = version.supports_v4();
    let suffixed = |text: String, suffix: &str| {
        if v4 { text } else { format!("{}{}", text, suffix) }
    };
    let text = match value {
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Byte(n) => n.to_string(),
        Value::Int32(n) => n.to_string(),
        Value::Int64(n) => suffixed(n.to_string(), "L"),
        Value::Single(n) => suffixed(format_float(f64::from(*n)), "f"),
        Value::Double(n) => suffixed(format_float(*n), "d"),
        Value::Decimal(d) => suffixed(d.to_string(), "m"),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Guid(g) if v4 => g.hyphenated().to_string(),
        Value::Guid(g) => format!("guid'{}'", g.hyphenated()),
        Value::DateTimeOffset(dt) => {
            let text = dt.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            if v4 { text } else { format!("datetimeoffset'{}'", text) }
        }
        Value::Date(d) if v4 => d.format("%Y-%m-%d").to_string(),
        Value::Date(d) => format!("datetime'{}'", d.format("%Y-%m-%d")),
        Value::TimeOfDay(t) if v4 => t.format("%H:%M:%S%.f").to_string(),
        Value::TimeOfDay(t) => {
            let since_midnight = *t - NaiveTime::MIN;
            format!("time'{}'", format_duration(&since_midnight))
        }
        Value::Duration(d) if v4 => format!("duration'{}'", format_duration(d)),
        Value::Duration(d) => format!("time'{}'", format_duration(d)),
        Value::Binary(bytes) if v4 => format!("binary'{}'", BASE64_URL.encode(bytes)),
        Value::Binary(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            format!("X'{}'", hex)
        }
        Value::Collection(_) | Value::Record(_) => return None,
    };
    Some(text)
}

fn format_float(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        format!("{:?}", n)
    }
}

/// Reads a date-time from a string field of dynamic data.
pub(crate) fn parse_date_time_text(text: &str) -> Option<Value> {
    parse_date_time(text).or_else(|| {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(Value::DateTimeOffset)
    })
}
