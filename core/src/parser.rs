//! Raw HTTP response parsing.
//!
//! The engine hands back a complete response as bytes: status line, CRLF
//! delimited header block, a blank line, then the body. Nothing here does
//! I/O; every function takes the bytes it needs and returns owned data.
//!
//! # Design
//! Header names are lower-cased on the way in so lookups never care about
//! case, and `Set-Cookie` values are split into a flat name/value map as
//! they are seen. A declared `content-length` must match the body exactly;
//! HEAD responses are exempt and always come back with an empty body.

use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse, ResponseBody};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Find the blank line separating headers from body.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}

/// Split a raw response into its header block and body.
///
/// Without a blank line the whole input is treated as headers.
pub fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    match find_head_end(raw) {
        Some(pos) => (&raw[..pos], &raw[pos + HEAD_TERMINATOR.len()..]),
        None => (raw, &[]),
    }
}

/// Parse an HTTP status line.
///
/// Format: `HTTP/<major>.<minor> <status>[ reason]`. Only the version and the
/// numeric status are extracted; the reason phrase is ignored.
pub fn parse_status_line(line: &str) -> Result<(String, u16), ApiError> {
    let invalid = || ApiError::Parse(format!("invalid status line: {line:?}"));

    let rest = line.strip_prefix("HTTP/").ok_or_else(invalid)?;
    let version_len = rest.find(char::is_whitespace).ok_or_else(invalid)?;
    let version = &rest[..version_len];
    let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(major) || !is_digits(minor) {
        return Err(invalid());
    }

    let rest = rest[version_len..].trim_start();
    let status_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if status_len == 0 {
        return Err(invalid());
    }
    let status = rest[..status_len].parse::<u16>().map_err(|_| invalid())?;

    Ok((version.to_string(), status))
}

/// Split a header line at its first colon.
///
/// The name is lower-cased and leading whitespace is stripped from the value.
/// Returns `None` for lines without a colon.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    Some((name.to_ascii_lowercase(), value.trim_start().to_string()))
}

/// Decode a cookie header value into a name → value map.
///
/// Crumbs are separated by `"; "` and split at their first `=`. Both sides
/// are trimmed; a crumb without `=` maps to an empty value. When a name
/// repeats, the last value wins.
pub fn parse_cookie_string(cookie: &str) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for crumb in cookie.split("; ") {
        let (name, value) = crumb.split_once('=').unwrap_or((crumb, ""));
        cookies.insert(name.trim().to_string(), value.trim().to_string());
    }
    cookies
}

/// Parse a complete raw response received for a `method` request.
///
/// For anything but HEAD, a `content-length` header must match the body
/// length exactly. HEAD responses never carry a body.
pub fn parse_response(raw: &[u8], method: HttpMethod) -> Result<HttpResponse, ApiError> {
    let (head, body) = split_head(raw);
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap_or_default().to_string();
    let (version, status) = parse_status_line(&status_line)?;

    let mut headers = BTreeMap::new();
    let mut cookies = None;
    for line in lines {
        let Some((name, value)) = parse_header_line(line) else {
            continue;
        };
        if name == "set-cookie" {
            cookies = Some(parse_cookie_string(&value));
        }
        headers.insert(name, value);
    }

    if method == HttpMethod::Head {
        return Ok(HttpResponse {
            status,
            version,
            status_line,
            headers,
            cookies,
            body: ResponseBody::default(),
        });
    }

    if let Some(declared) = headers.get("content-length") {
        let expected = declared
            .trim()
            .parse::<usize>()
            .map_err(|_| ApiError::Parse(format!("invalid content-length: {declared:?}")))?;
        if expected != body.len() {
            return Err(ApiError::Parse(format!(
                "unexpected end of packet: content-length {expected}, received {}",
                body.len()
            )));
        }
    }

    Ok(HttpResponse {
        status,
        version,
        status_line,
        headers,
        cookies,
        body: ResponseBody::Raw(body.to_vec()),
    })
}
