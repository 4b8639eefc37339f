//! HTTP request and response types handed across the transport seam.
//!
//! # Design
//! These types describe one HTTP exchange as plain data. `RequestDescriptor`
//! is validated once by its builder and never changes afterwards, so a single
//! descriptor can be read by any number of in-flight operations without
//! locking. `ResponseMeta` is what a transport reports about the response
//! besides the body; it is derived from the status line and headers and is
//! read-only once produced.
//!
//! Header names are stored lower-cased in a `BTreeMap`, which gives unique
//! keys, case-insensitive lookup and a stable iteration order for tests.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::BuildError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Head,
    Delete,
    Patch,
    Options,
    Connect,
    Trace,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 9] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Head,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Connect,
        HttpMethod::Trace,
    ];

    /// Canonical upper-case name as it appears on the request line.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BuildError::UnknownMethod(s.to_string()))
    }
}

/// An HTTP request described as immutable data.
///
/// Built through [`RequestDescriptor::builder`]. There are no setters: once
/// built, the URL, method, headers and body stay as they are for the
/// lifetime of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    url: Url,
    method: HttpMethod,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn builder(url: &str) -> DescriptorBuilder {
        DescriptorBuilder::new(url)
    }

    /// Shorthand for a body-less GET with no extra headers.
    pub fn get(url: &str) -> Result<Self, BuildError> {
        Self::builder(url).build()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Headers keyed by lower-cased name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Look up a header value by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Collects the parts of a [`RequestDescriptor`] and validates them in
/// [`build`](DescriptorBuilder::build).
///
/// Validation is deferred so that a chain of calls reports the first
/// problem in the order the parts were supplied.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    url: String,
    method: HttpMethod,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl DescriptorBuilder {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: HttpMethod::default(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Add one header. A later header with the same name (in any case)
    /// replaces the earlier one.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn build(self) -> Result<RequestDescriptor, BuildError> {
        let url = Url::parse(&self.url).map_err(|source| BuildError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BuildError::UnsupportedScheme(url.scheme().to_string()));
        }

        let mut headers = BTreeMap::new();
        for (name, value) in self.headers {
            validate_header(&name, &value)?;
            headers.insert(name.to_ascii_lowercase(), value);
        }

        Ok(RequestDescriptor {
            url,
            method: self.method,
            headers,
            body: self.body,
        })
    }
}

/// Header names are RFC 9110 tokens; values may not contain line breaks.
fn validate_header(name: &str, value: &str) -> Result<(), BuildError> {
    let is_tchar = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
    if name.is_empty() || !name.chars().all(is_tchar) {
        return Err(BuildError::InvalidHeaderName(name.to_string()));
    }
    if value.chars().any(|c| c == '\r' || c == '\n' || c == '\0') {
        return Err(BuildError::InvalidHeaderValue {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// What the transport learned about a response besides its body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    /// Content type without parameters, lower-cased (`application/json`).
    pub mime_type: Option<String>,
    /// The `charset` parameter of the content type, if any.
    pub text_encoding: Option<String>,
    pub expected_content_length: Option<u64>,
    /// Response headers keyed by lower-cased name.
    pub headers: BTreeMap<String, String>,
}

impl ResponseMeta {
    /// Build metadata from a status code and raw headers, deriving the MIME
    /// type, text encoding and content length from them.
    ///
    /// Repeated header names are joined with `", "`.
    pub fn from_parts<I, K, V>(status: u16, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let name = name.as_ref().to_ascii_lowercase();
            let value = value.as_ref().trim();
            map.entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let (mime_type, text_encoding) = map
            .get("content-type")
            .map(|ct| parse_content_type(ct))
            .unwrap_or((None, None));
        let expected_content_length = map
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            status,
            mime_type,
            text_encoding,
            expected_content_length,
            headers: map,
        }
    }

    /// Metadata carrying only a status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// `true` for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Split `text/html; charset=UTF-8` into (`text/html`, `utf-8`).
fn parse_content_type(value: &str) -> (Option<String>, Option<String>) {
    let mut parts = value.split(';');
    let mime = parts
        .next()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty());
    let charset = parts.find_map(|param| {
        let (key, val) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| val.trim().trim_matches('"').to_ascii_lowercase())
    });
    (mime, charset)
}

/// Where an upload's request body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    File(PathBuf),
    Bytes(Bytes),
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::File(path)
    }
}

impl From<Bytes> for UploadSource {
    fn from(bytes: Bytes) -> Self {
        UploadSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Bytes(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_descriptor_has_defaults() {
        let req = RequestDescriptor::get("https://example.test/fact").unwrap();
        assert_eq!(req.method(), HttpMethod::Get);
        assert_eq!(req.url().as_str(), "https://example.test/fact");
        assert!(req.headers().is_empty());
        assert!(req.body().is_none());
    }

    #[test]
    fn builder_sets_method_headers_and_body() {
        let req = RequestDescriptor::builder("https://example.test/upload")
            .method(HttpMethod::Post)
            .header("Content-Type", "application/json")
            .body(r#"{"a":1}"#)
            .build()
            .unwrap();
        assert_eq!(req.method(), HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.body().unwrap().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn header_names_collapse_case_insensitively() {
        let req = RequestDescriptor::builder("http://example.test")
            .header("Accept", "text/plain")
            .header("accept", "application/json")
            .build()
            .unwrap();
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("Accept"), Some("application/json"));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = RequestDescriptor::get("not a url").unwrap_err();
        assert!(matches!(err, BuildError::InvalidUrl { .. }));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = RequestDescriptor::get("ftp://example.test/file").unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn header_with_newline_is_rejected() {
        let err = RequestDescriptor::builder("http://example.test")
            .header("X-Evil", "a\r\nInjected: yes")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidHeaderValue { .. }));
    }

    #[test]
    fn header_name_with_space_is_rejected() {
        let err = RequestDescriptor::builder("http://example.test")
            .header("Bad Name", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidHeaderName(_)));
    }

    #[test]
    fn method_parses_case_insensitively() {
        for method in HttpMethod::ALL {
            assert_eq!(method.as_str().parse::<HttpMethod>().unwrap(), method);
            assert_eq!(
                method.as_str().to_lowercase().parse::<HttpMethod>().unwrap(),
                method
            );
        }
        assert!(matches!(
            "FETCH".parse::<HttpMethod>(),
            Err(BuildError::UnknownMethod(_))
        ));
    }

    #[test]
    fn method_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&HttpMethod::Patch).unwrap(), r#""PATCH""#);
    }

    #[test]
    fn meta_derives_mime_type_and_charset() {
        let meta = ResponseMeta::from_parts(
            200,
            [
                ("Content-Type", "Application/JSON; charset=\"UTF-8\""),
                ("Content-Length", "42"),
            ],
        );
        assert_eq!(meta.mime_type.as_deref(), Some("application/json"));
        assert_eq!(meta.text_encoding.as_deref(), Some("utf-8"));
        assert_eq!(meta.expected_content_length, Some(42));
        assert_eq!(meta.header("content-type"), Some("Application/JSON; charset=\"UTF-8\""));
        assert!(meta.is_success());
    }

    #[test]
    fn meta_joins_repeated_headers() {
        let meta = ResponseMeta::from_parts(204, [("Vary", "Accept"), ("vary", "Origin")]);
        assert_eq!(meta.header("Vary"), Some("Accept, Origin"));
        assert!(meta.mime_type.is_none());
    }

    #[test]
    fn meta_without_content_type() {
        let meta = ResponseMeta::with_status(404);
        assert!(!meta.is_success());
        assert!(meta.mime_type.is_none());
        assert!(meta.text_encoding.is_none());
    }
}
