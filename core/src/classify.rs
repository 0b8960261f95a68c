//! Turns parsed responses into results or database errors.
//!
//! CouchDB reports failures as a JSON body of the form
//! `{"error": "...", "reason": "..."}` next to a 4xx/5xx status. HEAD
//! responses have no body, so for them the status code is all there is.
//!
//! # Design
//! Only a body served as exactly `application/json` is inspected. Anything
//! that fails to decode is handed back untouched, so callers still see the
//! status and raw bytes. Decoding into `ResponseBody::Json` happens only for
//! `BodyDecoding::Structured`; error detection runs in both modes.

use serde_json::Value;

use crate::config::BodyDecoding;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse, ResponseBody};

/// Content type of the database's structured bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub const HEAD_ERROR_MESSAGE: &str = "HTTP/database error without message body";

/// Characters stripped from both ends of a database error reason.
const REASON_TRIM: &[char] = &['\t', '\n', '\r', '\0', '\x0B', '.'];

pub fn classify(
    mut response: HttpResponse,
    method: HttpMethod,
    decoding: BodyDecoding,
) -> Result<HttpResponse, ApiError> {
    if method == HttpMethod::Head {
        if response.status >= 400 {
            return Err(ApiError::Database {
                message: HEAD_ERROR_MESSAGE.to_string(),
                status: response.status,
            });
        }
        return Ok(response);
    }

    if response.header("content-type") != Some(JSON_CONTENT_TYPE) {
        return Ok(response);
    }

    let decoded = match &response.body {
        ResponseBody::Raw(bytes) => serde_json::from_slice::<Value>(bytes).ok(),
        ResponseBody::Json(_) => None,
    };
    let Some(json) = decoded.filter(|v| !v.is_null()) else {
        return Ok(response);
    };

    if let Some(error) = json.get("error").and_then(error_text) {
        return Err(ApiError::Database {
            message: database_error_message(&error, json.get("reason")),
            status: response.status,
        });
    }

    if decoding == BodyDecoding::Structured {
        response.body = ResponseBody::Json(json);
    }
    Ok(response)
}

/// Text of a non-empty `error` field. Non-string values use their JSON form;
/// `false`, `0` and empty containers count as empty.
fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// `"<Error> (<reason>)"` with the error's first letter upper-cased.
pub fn database_error_message(error: &str, reason: Option<&Value>) -> String {
    let reason = match reason {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    format!("{} ({})", capitalize(error), reason.trim_matches(REASON_TRIM))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn response(status: u16, content_type: Option<&str>, body: &str) -> HttpResponse {
        let mut headers = BTreeMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        HttpResponse {
            status,
            version: "1.1".to_string(),
            status_line: format!("HTTP/1.1 {status}"),
            headers,
            cookies: None,
            body: ResponseBody::Raw(body.as_bytes().to_vec()),
        }
    }

    #[test]
    fn not_found_becomes_database_error() {
        let resp = response(404, Some("application/json"), r#"{"error":"not_found","reason":"missing"}"#);
        let err = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap_err();
        match err {
            ApiError::Database { message, status } => {
                assert_eq!(message, "Not_found (missing)");
                assert_eq!(status, 404);
            }
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn reason_is_trimmed_of_trailing_punctuation() {
        let resp = response(
            409,
            Some("application/json"),
            r#"{"error":"conflict","reason":"Document update conflict.\n"}"#,
        );
        let err = classify(resp, HttpMethod::Put, BodyDecoding::Structured).unwrap_err();
        assert_eq!(err.to_string(), "Conflict (Document update conflict)");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn head_error_has_generic_message() {
        let resp = response(404, Some("application/json"), "");
        let err = classify(resp, HttpMethod::Head, BodyDecoding::Structured).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Database { ref message, status: 404 } if message == HEAD_ERROR_MESSAGE
        ));
    }

    #[test]
    fn head_success_passes_through() {
        let resp = response(200, Some("application/json"), "");
        let ok = classify(resp.clone(), HttpMethod::Head, BodyDecoding::Structured).unwrap();
        assert_eq!(ok, resp);
    }

    #[test]
    fn json_body_is_decoded_when_structured() {
        let resp = response(200, Some("application/json"), r#"{"ok":true,"id":"doc"}"#);
        let ok = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap();
        assert_eq!(ok.body.as_json().unwrap()["id"], "doc");
    }

    #[test]
    fn json_body_stays_raw_when_decoding_disabled() {
        let body = r#"{"ok":true}"#;
        let resp = response(200, Some("application/json"), body);
        let ok = classify(resp, HttpMethod::Get, BodyDecoding::Raw).unwrap();
        assert_eq!(ok.body.as_text(), Some(body));
    }

    #[test]
    fn raw_decoding_still_reports_errors() {
        let resp = response(401, Some("application/json"), r#"{"error":"unauthorized","reason":"You are not a server admin."}"#);
        let err = classify(resp, HttpMethod::Put, BodyDecoding::Raw).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized (You are not a server admin)");
    }

    #[test]
    fn content_type_must_match_exactly() {
        let body = r#"{"error":"not_found","reason":"missing"}"#;
        let resp = response(404, Some("application/json; charset=utf-8"), body);
        let ok = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap();
        assert_eq!(ok.status, 404);
        assert_eq!(ok.body.as_text(), Some(body));
    }

    #[test]
    fn undecodable_json_passes_through() {
        let resp = response(500, Some("application/json"), "<html>oops</html>");
        let ok = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap();
        assert_eq!(ok.body.as_text(), Some("<html>oops</html>"));
    }

    #[test]
    fn empty_error_field_is_not_an_error() {
        let resp = response(200, Some("application/json"), r#"{"error":"","rows":[]}"#);
        let ok = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap();
        assert!(ok.body.as_json().is_some());
    }

    #[test]
    fn non_string_error_field_is_still_an_error() {
        let resp = response(500, Some("application/json"), r#"{"error":true,"reason":"boom"}"#);
        let err = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap_err();
        assert_eq!(err.to_string(), "True (boom)");

        let resp = response(500, Some("application/json"), r#"{"error":42}"#);
        let err = classify(resp, HttpMethod::Get, BodyDecoding::Structured).unwrap_err();
        assert_eq!(err.to_string(), "42 ()");

        let resp = response(200, Some("application/json"), r#"{"error":false,"ok":true}"#);
        assert!(classify(resp, HttpMethod::Get, BodyDecoding::Structured).is_ok());
    }

    #[test]
    fn missing_reason_renders_empty_parens() {
        assert_eq!(database_error_message("bad_request", None), "Bad_request ()");
    }
}
