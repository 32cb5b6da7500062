//! # Call Metadata
//!
//! Helpers to turn textual `name: value` pairs into gRPC metadata.
//!
//! Keys ending in `-bin` are binary metadata: their value is sent as raw bytes
//! (tonic takes care of the base64 transfer encoding). Every other key is ASCII metadata.
use std::str::FromStr;
use tonic::metadata::{
    Ascii, Binary, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue,
    errors::{InvalidMetadataKey, InvalidMetadataValue},
};

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// Appends a header to `metadata`, keeping any value already stored under the same key.
pub fn append_header(metadata: &mut MetadataMap, key: &str, value: &str) -> Result<(), HeaderError> {
    let invalid_key = |source| HeaderError::InvalidKey {
        key: key.to_string(),
        source,
    };

    if key.ends_with("-bin") {
        let name = MetadataKey::<Binary>::from_bytes(key.as_bytes()).map_err(invalid_key)?;
        metadata.append_bin(name, MetadataValue::from_bytes(value.as_bytes()));
    } else {
        let name = MetadataKey::<Ascii>::from_str(key).map_err(invalid_key)?;
        let val = MetadataValue::<Ascii>::from_str(value).map_err(|source| {
            HeaderError::InvalidValue {
                key: key.to_string(),
                source,
            }
        })?;
        metadata.append(name, val);
    }

    Ok(())
}

/// Builds a metadata map out of an ordered list of headers.
pub fn to_metadata(headers: &[(String, String)]) -> Result<MetadataMap, HeaderError> {
    let mut metadata = MetadataMap::new();
    for (key, value) in headers {
        append_header(&mut metadata, key, value)?;
    }
    Ok(metadata)
}

/// Appends every entry of `from` to `into`.
pub fn merge(into: &mut MetadataMap, from: &MetadataMap) {
    for entry in from.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                into.append(key.clone(), value.clone());
            }
            KeyAndValueRef::Binary(key, value) => {
                into.append_bin(key.clone(), value.clone());
            }
        }
    }
}
