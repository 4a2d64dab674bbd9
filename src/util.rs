//! Input normalization and response helpers shared by the services.

use serde::{Deserialize, Deserializer, Serialize};

/// Trim, drop backslash escapes, and HTML-escape free text before storage.
pub fn sanitize_input(input: &str) -> String {
    let mut unescaped = String::with_capacity(input.len());
    let mut chars = input.trim().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
            }
        } else {
            unescaped.push(c);
        }
    }

    let mut out = String::with_capacity(unescaped.len());
    for c in unescaped.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable size: "0 B", "1.5 KB", "2.25 MB".
pub fn format_file_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", size);
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, UNITS[unit])
}

/// Parse the leading integer of a string, yielding 0 when there is none.
///
/// `"12"` → 12, `" 7abc"` → 7, `"-3"` → -3, `"abc"` → 0. Saturates on overflow.
pub fn parse_int_lenient(input: &str) -> i64 {
    let s = input.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = (b - b'0') as i64;
        value = value.saturating_mul(10).saturating_add(digit);
    }

    if negative { -value } else { value }
}

/// Parse an identifier from a query value; `None` unless it is a positive integer.
pub fn parse_id(input: Option<&str>) -> Option<i64> {
    input
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// Query-string flag: true only for "1" or "true".
pub fn parse_flag(input: Option<&str>) -> bool {
    matches!(input.map(str::trim), Some("1") | Some("true"))
}

/// Deserialize an optional integer from a JSON number, numeric string, or bool.
///
/// Anything else (objects, arrays, non-numeric strings) becomes 0 so that
/// validation rejects it with a field-specific message.
pub fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(b as i64),
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => Some(parse_int_lenient(&s)),
        _ => Some(0),
    }))
}

/// Deserialize an optional float the same way as [`lenient_int`].
pub fn lenient_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => Some(s.trim().parse().unwrap_or(0.0)),
        _ => Some(0.0),
    }))
}

/// Deserialize an optional bool from a JSON bool, number, or string.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(b),
        serde_json::Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        serde_json::Value::String(s) => Some(!matches!(s.trim(), "" | "0" | "false")),
        _ => Some(false),
    }))
}

/// A requested page, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Clamp raw `page`/`limit` query values: page ≥ 1, limit in `1..=max_limit`.
    pub fn from_query(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: u32,
        max_limit: u32,
    ) -> Self {
        let max_limit = max_limit.max(1);
        let page = page.map(parse_int_lenient).unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = limit
            .map(parse_int_lenient)
            .unwrap_or(default_limit as i64)
            .clamp(1, max_limit as i64) as u32;
        Self { page, limit }
    }

    /// Rows to skip.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Pagination metadata for a result set of `total` rows.
    pub fn paginate(&self, total: i64) -> Pagination {
        let total = total.max(0);
        let limit = self.limit as i64;
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// Pagination block of the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}
