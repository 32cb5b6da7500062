//! # Assertion Engine
//!
//! Compares the memoized outcome of a call with what a scenario expects.
//!
//! Payload comparisons work on JSON values, never on text: both sides are decoded and their
//! extended-JSON tags removed first, so `{"id": 42}` equals `{"id": {"$numberInt": "42"}}`
//! and mapping keys may come in any order.
//!
//! RFC 3339 strings are compared as instants, whatever their fraction or offset.
//!
//! An expected value of `"<ignore-diff>"` accepts whatever the response holds at that path.
use crate::{
    payload::extjson::{self, ExtJsonError},
    status::code_name,
};
use assert_json_diff::{CompareMode, Config, NumericMode, assert_json_matches_no_panic};
use serde_json::Value;
use tonic::{Code, Status};

pub const IGNORE_DIFF: &str = "<ignore-diff>";

#[derive(Debug, thiserror::Error)]
pub enum AssertionError {
    #[error("Expected payload is not valid JSON: {0}")]
    InvalidExpected(#[source] serde_json::Error),
    #[error("Response payload is not valid JSON: {0}")]
    InvalidActual(#[source] serde_json::Error),
    #[error("Invalid extended JSON: {0}")]
    ExtJson(#[from] ExtJsonError),
    #[error("Response payload mismatch:\n{diff}\n\nactual response:\n{actual}")]
    PayloadMismatch { diff: String, actual: String },
    #[error("Got no error, want {}", code_name(*.0))]
    UnexpectedSuccess(Code),
    #[error("Got no error, want error message {0:?}")]
    UnexpectedSuccessMessage(String),
    #[error("Got {} ({message:?}), want {}", code_name(*.actual), code_name(*.expected))]
    CodeMismatch {
        expected: Code,
        actual: Code,
        message: String,
    },
    #[error("Got {} ({message:?}), want no error", code_name(*.code))]
    UnexpectedFailure { code: Code, message: String },
    #[error("Unexpected error message, got {actual:?}, want {expected:?}")]
    MessageMismatch { expected: String, actual: String },
}

/// How an expected document relates to the actual response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Same document, every field included.
    Equal,
    /// Every expected field is in the response, which may hold more.
    Match,
}

/// Decodes a rendered response into the plain JSON document published to scenario variables.
pub fn response_document(actual: &str) -> Result<Value, AssertionError> {
    let document = serde_json::from_str(actual).map_err(AssertionError::InvalidActual)?;
    Ok(extjson::to_plain(document)?)
}

pub fn assert_equal(expected: &str, actual: &str) -> Result<(), AssertionError> {
    compare(Comparison::Equal, expected, actual)
}

pub fn assert_match(expected: &str, actual: &str) -> Result<(), AssertionError> {
    compare(Comparison::Match, expected, actual)
}

pub fn compare(mode: Comparison, expected: &str, actual: &str) -> Result<(), AssertionError> {
    let mut actual_document = response_document(actual)?;
    let expected_document =
        serde_json::from_str(expected).map_err(AssertionError::InvalidExpected)?;
    let mut expected_document = extjson::to_plain(expected_document)?;

    extjson::normalize_dates(&mut actual_document);
    extjson::normalize_dates(&mut expected_document);

    fill_ignored(&mut expected_document, &actual_document);

    let compare_mode = match mode {
        Comparison::Equal => CompareMode::Strict,
        Comparison::Match => CompareMode::Inclusive,
    };
    let config = Config::new(compare_mode).numeric_mode(NumericMode::AssumeFloat);

    assert_json_matches_no_panic(&actual_document, &expected_document, config).map_err(|diff| {
        AssertionError::PayloadMismatch {
            diff,
            actual: actual.to_string(),
        }
    })
}

/// Checks the status code of a call outcome. A success only satisfies [`Code::Ok`].
pub fn assert_error_code(
    outcome: &Result<String, Status>,
    expected: Code,
) -> Result<(), AssertionError> {
    match outcome {
        Ok(_) if expected == Code::Ok => Ok(()),
        Ok(_) => Err(AssertionError::UnexpectedSuccess(expected)),
        Err(status) if status.code() == expected => Ok(()),
        Err(status) => Err(AssertionError::CodeMismatch {
            expected,
            actual: status.code(),
            message: status.message().to_string(),
        }),
    }
}

/// Checks the status message of a call outcome. An empty message expects a success.
pub fn assert_error_message(
    outcome: &Result<String, Status>,
    expected: &str,
) -> Result<(), AssertionError> {
    match outcome {
        Ok(_) if expected.is_empty() => Ok(()),
        Ok(_) => Err(AssertionError::UnexpectedSuccessMessage(expected.to_string())),
        Err(status) if expected.is_empty() => Err(AssertionError::UnexpectedFailure {
            code: status.code(),
            message: status.message().to_string(),
        }),
        Err(status) if status.message() == expected => Ok(()),
        Err(status) => Err(AssertionError::MessageMismatch {
            expected: expected.to_string(),
            actual: status.message().to_string(),
        }),
    }
}

/// Copies into `expected` the actual values found under every `<ignore-diff>` marker.
fn fill_ignored(expected: &mut Value, actual: &Value) {
    if expected.as_str() == Some(IGNORE_DIFF) {
        *expected = actual.clone();
        return;
    }

    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => {
            for (key, value) in expected.iter_mut() {
                if let Some(actual) = actual.get(key) {
                    fill_ignored(value, actual);
                }
            }
        }
        (Value::Array(expected), Value::Array(actual)) => {
            for (value, actual) in expected.iter_mut().zip(actual) {
                fill_ignored(value, actual);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGET: &str = r#"{"id": {"$numberInt": "42"}, "name": "widget"}"#;

    #[test]
    fn match_accepts_extra_fields() {
        assert_match(r#"{"id": 42}"#, WIDGET).unwrap();
    }

    #[test]
    fn match_rejects_missing_or_different_fields() {
        let err = assert_match(r#"{"id": 42, "stock": 3}"#, WIDGET).unwrap_err();
        assert!(matches!(err, AssertionError::PayloadMismatch { .. }));

        let err = assert_match(r#"{"id": 43}"#, WIDGET).unwrap_err();
        assert!(matches!(err, AssertionError::PayloadMismatch { .. }));
    }

    #[test]
    fn equal_rejects_extra_fields() {
        let err = assert_equal(r#"{"id": 42}"#, WIDGET).unwrap_err();
        assert!(matches!(err, AssertionError::PayloadMismatch { .. }));

        assert_equal(r#"{"name": "widget", "id": 42}"#, WIDGET).unwrap();
    }

    #[test]
    fn equal_compares_arrays_in_order() {
        let actual = r#"[{"id": {"$numberInt": "1"}}, {"id": {"$numberInt": "2"}}]"#;

        assert_equal(r#"[{"id": 1}, {"id": 2}]"#, actual).unwrap();
        assert!(assert_equal(r#"[{"id": 2}, {"id": 1}]"#, actual).is_err());
    }

    #[test]
    fn integers_and_doubles_compare_numerically() {
        assert_equal(
            r#"{"price": 10}"#,
            r#"{"price": {"$numberDouble": "10.0"}}"#,
        )
        .unwrap();
    }

    #[test]
    fn ignore_diff_markers_accept_any_value() {
        let actual = r#"{"id": {"$numberInt": "42"}, "createdAt": {"$date": {"$numberLong": "1700000000000"}}}"#;

        assert_equal(r#"{"id": 42, "createdAt": "<ignore-diff>"}"#, actual).unwrap();
        assert_match(r#"{"createdAt": "<ignore-diff>"}"#, actual).unwrap();
    }

    #[test]
    fn plain_dates_match_tagged_dates() {
        let actual = r#"{"createdAt": {"$date": {"$numberLong": "1700000000000"}}}"#;

        assert_equal(r#"{"createdAt": "2023-11-14T22:13:20.000Z"}"#, actual).unwrap();
        assert_equal(r#"{"createdAt": "2023-11-14T22:13:20Z"}"#, actual).unwrap();
        assert!(assert_equal(r#"{"createdAt": "2023-11-14T22:13:21.000Z"}"#, actual).is_err());
    }

    #[test]
    fn invalid_expected_documents_are_reported() {
        let err = assert_equal("{oops", WIDGET).unwrap_err();
        assert!(matches!(err, AssertionError::InvalidExpected(_)));
    }

    #[test]
    fn error_code_assertions() {
        let failed = Err(Status::not_found("item missing"));
        let succeeded = Ok(WIDGET.to_string());

        assert_error_code(&failed, Code::NotFound).unwrap();
        assert!(matches!(
            assert_error_code(&failed, Code::Ok).unwrap_err(),
            AssertionError::CodeMismatch { actual: Code::NotFound, .. }
        ));
        assert_error_code(&succeeded, Code::Ok).unwrap();
        assert!(matches!(
            assert_error_code(&succeeded, Code::NotFound).unwrap_err(),
            AssertionError::UnexpectedSuccess(Code::NotFound)
        ));
    }

    #[test]
    fn error_message_assertions() {
        let failed = Err(Status::not_found("item missing"));
        let succeeded = Ok(WIDGET.to_string());

        assert_error_message(&failed, "item missing").unwrap();
        assert!(assert_error_message(&failed, "other").is_err());
        assert_error_message(&succeeded, "").unwrap();
        assert!(assert_error_message(&succeeded, "item missing").is_err());

        let err = assert_error_message(&Err(Status::internal("")), "").unwrap_err();
        assert!(matches!(err, AssertionError::UnexpectedFailure { code: Code::Internal, .. }));
    }

    #[test]
    fn error_messages_name_the_codes() {
        let err = AssertionError::CodeMismatch {
            expected: Code::NotFound,
            actual: Code::Internal,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), r#"Got INTERNAL ("boom"), want NOT_FOUND"#);
    }
}
