// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

#[yare::parameterized(
    message_only = { json!({ "message": "stale version" }), "Conflict: stale version" },
    detail_wins = { json!({ "detail": "row locked", "message": "ignored" }), "Conflict: row locked" },
    empty_detail_falls_back = { json!({ "detail": "", "message": "stale version" }), "Conflict: stale version" },
    plain_text = { json!("already exists"), "Conflict: already exists" },
    no_message = { json!({ "code": 7 }), "Conflict: request conflicts with the current state" },
    null_body = { Value::Null, "Conflict: request conflicts with the current state" },
)]
fn conflict_message_extraction(body: Value, expected: &str) {
    assert_eq!(conflict_message(&body), expected);
}

#[test]
fn display_includes_payload_message() {
    let err = ApiError::Status { status: 403, body: json!({ "detail": "forbidden" }) };
    assert_eq!(err.to_string(), "request failed (403): forbidden");
    assert_eq!(err.status(), Some(403));
    assert_eq!(err.code(), "STATUS");
}

#[test]
fn conflict_reports_409() {
    let err = ApiError::Conflict { message: "Conflict: x".into() };
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.to_string(), "Conflict: x");
}
