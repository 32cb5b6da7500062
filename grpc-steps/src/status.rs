//! # Status Code Vocabulary
//!
//! Parses the status codes written in scenarios (`"not found"`, `"NotFound"`,
//! `"NOT_FOUND"`, `"5"`) into a [`tonic::Code`].
use once_cell::sync::Lazy;
use regex::Regex;
use tonic::Code;

static FIRST_CAP: Lazy<Regex> =
    Lazy::new(|| Regex::new("(.)([A-Z][a-z]+)").expect("valid first capital regex"));
static ALL_CAP: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z0-9])([A-Z])").expect("valid capital regex"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s_-]+").expect("valid separator regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized gRPC status code '{0}'")]
pub struct StatusCodeError(pub String);

/// Normalizes free text to `UPPER_SNAKE_CASE`, splitting words on case changes,
/// whitespace, `-` and `_`.
pub fn to_upper_snake_case(text: &str) -> String {
    let snake = FIRST_CAP.replace_all(text.trim(), "${1}_${2}");
    let snake = ALL_CAP.replace_all(&snake, "${1}_${2}");

    SEPARATORS
        .split(&snake)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Parses a status code by name or by number.
pub fn parse_status_code(text: &str) -> Result<Code, StatusCodeError> {
    let unrecognized = || StatusCodeError(text.to_string());

    if let Ok(number) = text.trim().parse::<i32>() {
        return match Code::from_i32(number) {
            // Out of range numbers map to Unknown.
            Code::Unknown if number != Code::Unknown as i32 => Err(unrecognized()),
            code => Ok(code),
        };
    }

    let code = match to_upper_snake_case(text).as_str() {
        "OK" => Code::Ok,
        "CANCELLED" | "CANCELED" => Code::Cancelled,
        "UNKNOWN" => Code::Unknown,
        "INVALID_ARGUMENT" => Code::InvalidArgument,
        "DEADLINE_EXCEEDED" => Code::DeadlineExceeded,
        "NOT_FOUND" => Code::NotFound,
        "ALREADY_EXISTS" => Code::AlreadyExists,
        "PERMISSION_DENIED" => Code::PermissionDenied,
        "RESOURCE_EXHAUSTED" => Code::ResourceExhausted,
        "FAILED_PRECONDITION" => Code::FailedPrecondition,
        "ABORTED" => Code::Aborted,
        "OUT_OF_RANGE" => Code::OutOfRange,
        "UNIMPLEMENTED" => Code::Unimplemented,
        "INTERNAL" => Code::Internal,
        "UNAVAILABLE" => Code::Unavailable,
        "DATA_LOSS" => Code::DataLoss,
        "UNAUTHENTICATED" => Code::Unauthenticated,
        _ => return Err(unrecognized()),
    };

    Ok(code)
}

/// Canonical `UPPER_SNAKE_CASE` name of `code`.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}
