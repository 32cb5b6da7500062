//! # Extended JSON
//!
//! Conversion between dynamic Protobuf messages and the canonical extended-JSON form,
//! where numbers, binaries and dates carry an explicit type tag:
//!
//! | Protobuf type                 | Extended JSON                                   |
//! |-------------------------------|-------------------------------------------------|
//! | `int32`, `sint32`, `sfixed32` | `{"$numberInt": "42"}`                          |
//! | 64-bit integers, `uint32`     | `{"$numberLong": "42"}`                         |
//! | `float`, `double`             | `{"$numberDouble": "1.5"}`                      |
//! | `bytes`                       | `{"$binary": {"base64": "...", "subType": "00"}}` |
//! | `google.protobuf.Timestamp`   | `{"$date": {"$numberLong": "<millis>"}}`        |
//!
//! Decoding goes the other way round through [`to_plain`]: every tag is replaced by the
//! plain JSON value `prost-reflect` understands, then the document is deserialized against
//! the message schema. `$numberDecimal`, `$oid` and `$symbol` are accepted and turn into
//! strings.
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use prost_reflect::{DynamicMessage, Kind, MapKey, ReflectMessage, Value};
use serde_json::{Map, Number, Value as Json, json};

const TIMESTAMP: &str = "google.protobuf.Timestamp";
const NULL_VALUE: &str = "google.protobuf.NullValue";
const WELL_KNOWN_PACKAGE: &str = "google.protobuf.";

#[derive(Debug, thiserror::Error)]
pub enum ExtJsonError {
    #[error("Invalid {tag} value: {value}")]
    InvalidNumber { tag: &'static str, value: Json },
    #[error("Invalid $binary value: {0}")]
    InvalidBinary(#[source] base64::DecodeError),
    #[error("Invalid $date value: {0}")]
    InvalidDate(Json),
    #[error("Malformed {tag} document: {value}")]
    MalformedTag { tag: &'static str, value: Json },
    #[error("Failed to serialize well-known type '{name}': {source}")]
    WellKnownType {
        name: String,
        source: serde_json::Error,
    },
}

/// Replaces every extended-JSON tag of `document` by its plain JSON equivalent.
///
/// Untagged values are kept as they are, so a plain JSON document is a valid input.
pub fn to_plain(document: Json) -> Result<Json, ExtJsonError> {
    match document {
        Json::Array(items) => items
            .into_iter()
            .map(to_plain)
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Json::Object(map) => untag(map),
        other => Ok(other),
    }
}

fn untag(map: Map<String, Json>) -> Result<Json, ExtJsonError> {
    // Legacy binary form: {"$binary": "<base64>", "$type": "00"}
    if map.len() == 2
        && map.contains_key("$type")
        && let Some(Json::String(base64)) = map.get("$binary")
    {
        return binary(base64.clone());
    }

    if map.len() != 1 {
        return map
            .into_iter()
            .map(|(key, value)| Ok((key, to_plain(value)?)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Json::Object);
    }

    let Some((key, value)) = map.into_iter().next() else {
        return Ok(Json::Object(Map::new()));
    };

    match key.as_str() {
        "$numberInt" => number_int(value),
        "$numberLong" => number_long(value),
        "$numberDouble" => number_double(value),
        "$binary" => match value {
            Json::Object(mut inner) => match inner.remove("base64") {
                Some(Json::String(base64)) => binary(base64),
                _ => Err(ExtJsonError::MalformedTag {
                    tag: "$binary",
                    value: Json::Object(inner),
                }),
            },
            value => Err(ExtJsonError::MalformedTag {
                tag: "$binary",
                value,
            }),
        },
        "$date" => date(value),
        "$numberDecimal" | "$oid" | "$symbol" => match value {
            Json::String(text) => Ok(Json::String(text)),
            value => Err(ExtJsonError::MalformedTag {
                tag: "$numberDecimal, $oid or $symbol",
                value,
            }),
        },
        _ => {
            let mut object = Map::new();
            object.insert(key, to_plain(value)?);
            Ok(Json::Object(object))
        }
    }
}

fn number_int(value: Json) -> Result<Json, ExtJsonError> {
    value
        .as_str()
        .and_then(|text| text.parse::<i32>().ok())
        .map(Json::from)
        .ok_or(ExtJsonError::InvalidNumber {
            tag: "$numberInt",
            value,
        })
}

fn number_long(value: Json) -> Result<Json, ExtJsonError> {
    let parsed = value.as_str().and_then(|text| {
        text.parse::<i64>()
            .map(Json::from)
            .or_else(|_| text.parse::<u64>().map(Json::from))
            .ok()
    });

    parsed.ok_or(ExtJsonError::InvalidNumber {
        tag: "$numberLong",
        value,
    })
}

fn number_double(value: Json) -> Result<Json, ExtJsonError> {
    let invalid = |value| ExtJsonError::InvalidNumber {
        tag: "$numberDouble",
        value,
    };

    let Some(text) = value.as_str() else {
        return Err(invalid(value));
    };

    match text {
        "Infinity" | "-Infinity" | "NaN" => Ok(Json::String(text.to_string())),
        _ => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Json::Number)
            .ok_or_else(|| invalid(value.clone())),
    }
}

fn binary(base64: String) -> Result<Json, ExtJsonError> {
    STANDARD
        .decode(&base64)
        .map_err(ExtJsonError::InvalidBinary)?;
    Ok(Json::String(base64))
}

fn date(value: Json) -> Result<Json, ExtJsonError> {
    let datetime = match &value {
        Json::Object(inner) => match inner.get("$numberLong").and_then(Json::as_str) {
            Some(millis) => millis
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            None => None,
        },
        Json::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|datetime| datetime.with_timezone(&Utc)),
        Json::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };

    datetime
        .map(|datetime| Json::String(datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        .ok_or(ExtJsonError::InvalidDate(value))
}

/// Rewrites every plain RFC 3339 string of `document` in the form `$date` values decode to,
/// so `"2023-11-14T22:13:20.000Z"` and `"2023-11-14T22:13:20Z"` compare equal.
pub fn normalize_dates(document: &mut Json) {
    match document {
        Json::String(text) => {
            if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
                *text = datetime
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
            }
        }
        Json::Array(items) => items.iter_mut().for_each(normalize_dates),
        Json::Object(map) => map.values_mut().for_each(normalize_dates),
        _ => {}
    }
}

/// Renders `message` in canonical extended JSON.
///
/// Fields are keyed by their JSON name and only populated fields are written, like the
/// Protobuf JSON mapping does.
pub fn from_message(message: &DynamicMessage) -> Result<Json, ExtJsonError> {
    let name = message.descriptor().full_name().to_string();

    if name == TIMESTAMP {
        return timestamp(message);
    }

    if name.starts_with(WELL_KNOWN_PACKAGE) {
        return serde_json::to_value(message)
            .map_err(|source| ExtJsonError::WellKnownType { name, source });
    }

    let mut document = Map::new();

    for (field, value) in message.fields() {
        let value = match value {
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(|item| from_value(item, &field.kind()))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let value_kind = match field.kind() {
                    Kind::Message(entry) => entry.map_entry_value_field().kind(),
                    kind => kind,
                };

                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(map_key(key), from_value(value, &value_kind)?);
                }
                Json::Object(object)
            }
            value => from_value(value, &field.kind())?,
        };

        document.insert(field.json_name().to_string(), value);
    }

    Ok(Json::Object(document))
}

fn from_value(value: &Value, kind: &Kind) -> Result<Json, ExtJsonError> {
    let json = match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::I32(i) => json!({ "$numberInt": i.to_string() }),
        Value::I64(i) => json!({ "$numberLong": i.to_string() }),
        Value::U32(u) => json!({ "$numberLong": u.to_string() }),
        Value::U64(u) => json!({ "$numberLong": u.to_string() }),
        Value::F32(f) => json!({ "$numberDouble": format_double(f64::from(*f), format!("{f:?}")) }),
        Value::F64(f) => json!({ "$numberDouble": format_double(*f, format!("{f:?}")) }),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => json!({
            "$binary": { "base64": STANDARD.encode(bytes), "subType": "00" }
        }),
        Value::EnumNumber(number) => match kind {
            Kind::Enum(descriptor) if descriptor.full_name() == NULL_VALUE => Json::Null,
            Kind::Enum(descriptor) => match descriptor.get_value(*number) {
                Some(value) => Json::String(value.name().to_string()),
                None => json!({ "$numberInt": number.to_string() }),
            },
            _ => json!({ "$numberInt": number.to_string() }),
        },
        Value::Message(message) => from_message(message)?,
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| from_value(item, kind))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => {
            let mut object = Map::new();
            for (key, value) in entries {
                object.insert(map_key(key), from_value(value, kind)?);
            }
            Json::Object(object)
        }
    };

    Ok(json)
}

fn format_double(value: f64, debug: String) -> String {
    if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        debug
    }
}

fn map_key(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(i) => i.to_string(),
        MapKey::I64(i) => i.to_string(),
        MapKey::U32(u) => u.to_string(),
        MapKey::U64(u) => u.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

fn timestamp(message: &DynamicMessage) -> Result<Json, ExtJsonError> {
    let seconds = message
        .get_field_by_name("seconds")
        .and_then(|value| value.as_i64())
        .unwrap_or_default();
    let nanos = message
        .get_field_by_name("nanos")
        .and_then(|value| value.as_i32())
        .unwrap_or_default();

    let invalid = || ExtJsonError::InvalidDate(json!({ "seconds": seconds, "nanos": nanos }));

    let nanos = u32::try_from(nanos).map_err(|_| invalid())?;

    if nanos % 1_000_000 == 0 {
        let millis = seconds
            .checked_mul(1000)
            .and_then(|millis| millis.checked_add(i64::from(nanos / 1_000_000)))
            .ok_or_else(invalid)?;
        return Ok(json!({ "$date": { "$numberLong": millis.to_string() } }));
    }

    // Sub-millisecond precision only survives in the ISO form.
    let datetime = DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid)?;
    Ok(json!({ "$date": datetime.to_rfc3339_opts(SecondsFormat::Nanos, true) }))
}
