//! Result types shared by every operation.
//!
//! # Design
//! An operation either produced a payload together with the response
//! metadata, or it failed. `Outcome<T>` is a plain `Result` so callers get
//! `?`, `map` and friends for free; a payload without metadata (or the
//! reverse) cannot be expressed. Callers that only want the status code or
//! only the payload project a `Loaded` instead of calling a separate
//! operation.

use crate::error::OperationError;
use crate::http::ResponseMeta;

/// A successful operation: the payload and the metadata of the response
/// that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
    pub payload: T,
    pub meta: ResponseMeta,
}

impl<T> Loaded<T> {
    pub fn status(&self) -> u16 {
        self.meta.status
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn into_parts(self) -> (T, ResponseMeta) {
        (self.payload, self.meta)
    }

    pub fn with_status(self) -> (T, u16) {
        let status = self.meta.status;
        (self.payload, status)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loaded<U> {
        Loaded {
            payload: f(self.payload),
            meta: self.meta,
        }
    }
}

/// Terminal result of one operation.
pub type Outcome<T> = Result<Loaded<T>, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> Loaded<&'static str> {
        Loaded {
            payload: "body",
            meta: ResponseMeta::from_parts(201, [("content-type", "text/plain")]),
        }
    }

    #[test]
    fn projections_keep_payload_and_status() {
        assert_eq!(loaded().status(), 201);
        assert_eq!(loaded().with_status(), ("body", 201));
        let (payload, meta) = loaded().into_parts();
        assert_eq!(payload, "body");
        assert_eq!(meta.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(loaded().into_payload(), "body");
    }

    #[test]
    fn map_keeps_meta() {
        let mapped = loaded().map(str::len);
        assert_eq!(mapped.payload, 4);
        assert_eq!(mapped.meta.status, 201);
    }
}
