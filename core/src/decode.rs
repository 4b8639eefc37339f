//! Decoding response bodies into caller-chosen types.
//!
//! # Design
//! The decoder is a type parameter of `Loader`, not part of the fetch path:
//! the bridge always yields bytes, and `request::<T>()` hands them to
//! whichever decoder the loader was built with. `JsonDecoder` is the
//! default and behaves like a plain `serde_json::from_slice`: unknown fields
//! are ignored, missing required fields and trailing garbage fail.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;

/// Turns response bytes into a value of type `T`.
pub trait Decoder: Clone + Send + Sync + 'static {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// serde_json-backed decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonDecoder {
    empty_as_null: bool,
    strip_bom: bool,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::strict()
    }
}

impl JsonDecoder {
    /// The body must be exactly one JSON value, optionally surrounded by
    /// whitespace.
    pub fn strict() -> Self {
        Self {
            empty_as_null: false,
            strip_bom: false,
        }
    }

    /// Like [`strict`](Self::strict), but an empty or all-whitespace body
    /// decodes as `null` and a leading UTF-8 byte order mark is skipped.
    pub fn lenient() -> Self {
        Self {
            empty_as_null: true,
            strip_bom: true,
        }
    }

    pub fn with_empty_as_null(mut self, enabled: bool) -> Self {
        self.empty_as_null = enabled;
        self
    }

    pub fn with_bom_stripping(mut self, enabled: bool) -> Self {
        self.strip_bom = enabled;
        self
    }
}

impl Decoder for JsonDecoder {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        let bytes = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) if self.strip_bom => rest,
            _ => bytes,
        };
        let bytes: &[u8] = if self.empty_as_null && bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            bytes
        };
        serde_json::from_slice(bytes).map_err(DecodeError::from_json::<T>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Fact {
        fact: String,
        length: u32,
    }

    #[test]
    fn decodes_and_ignores_unknown_fields() {
        let fact: Fact = JsonDecoder::default()
            .decode(br#"{"fact":"cats sleep","length":10,"source":"x"}"#)
            .unwrap();
        assert_eq!(
            fact,
            Fact {
                fact: "cats sleep".to_string(),
                length: 10
            }
        );
    }

    #[test]
    fn missing_field_fails_with_diagnostic() {
        let err = JsonDecoder::default()
            .decode::<Fact>(br#"{"fact":"cats sleep"}"#)
            .unwrap_err();
        assert!(err.type_name.ends_with("Fact"));
        assert!(err.message.contains("missing field `length`"));
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn trailing_characters_fail() {
        let err = JsonDecoder::default().decode::<u32>(b"1 2").unwrap_err();
        assert!(err.message.contains("trailing characters"));
    }

    #[test]
    fn strict_rejects_empty_body() {
        assert!(JsonDecoder::strict().decode::<Option<Fact>>(b"").is_err());
        assert!(JsonDecoder::strict().decode::<()>(b"  \n").is_err());
    }

    #[test]
    fn lenient_reads_empty_body_as_null() {
        let decoded: Option<Fact> = JsonDecoder::lenient().decode(b"").unwrap();
        assert!(decoded.is_none());
        JsonDecoder::lenient().decode::<()>(b" \r\n").unwrap();
    }

    #[test]
    fn bom_is_only_skipped_when_enabled() {
        let body = b"\xEF\xBB\xBF[1,2]";
        assert!(JsonDecoder::strict().decode::<Vec<u8>>(body).is_err());
        let decoded: Vec<u8> = JsonDecoder::strict()
            .with_bom_stripping(true)
            .decode(body)
            .unwrap();
        assert_eq!(decoded, vec![1, 2]);
    }
}
