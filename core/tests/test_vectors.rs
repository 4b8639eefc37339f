//! Drive `Loader` operations through `StubTransport` using the JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each vector describes what a transport hands to its completion and the
//! outcome the caller must observe. Expected payloads are compared as parsed
//! values, not raw strings.

use std::sync::Arc;

use bytes::Bytes;
use callfetch_core::{
    HttpMethod, Loader, OperationError, ResponseMeta, ScriptedReply, StubTransport, Transport,
};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Fact {
    fact: String,
    length: u32,
}

/// Map an error to the label used in the vectors.
fn error_label(err: &OperationError) -> &'static str {
    err.kind()
}

fn reply_from(completion: &serde_json::Value) -> ScriptedReply {
    let body = completion["body"]
        .as_str()
        .map(|b| Bytes::copy_from_slice(b.as_bytes()));
    let meta = completion["status"].as_u64().map(|status| {
        let content_type = completion["content_type"].as_str();
        ResponseMeta::from_parts(status as u16, content_type.map(|ct| ("content-type", ct)))
    });
    let error = completion["error"].as_str().map(str::to_string);
    ScriptedReply::Raw { body, meta, error }
}

// ---------------------------------------------------------------------------
// Fetch and decode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_test_vectors() {
    let raw = include_str!("../../test-vectors/fetch.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let stub = Arc::new(StubTransport::replying(reply_from(&case["completion"])));
        let transport: Arc<dyn Transport> = stub.clone();
        let loader = Loader::get(transport, "https://example.test/fact").unwrap();

        let outcome = loader.request::<Fact>().await;
        assert_eq!(stub.call_count(), 1, "{name}: transport calls");

        if let Some(expected_error) = case.get("expected_error") {
            let err = outcome.unwrap_err();
            assert_eq!(error_label(&err), expected_error.as_str().unwrap(), "{name}: error kind");
        } else {
            let loaded = outcome.unwrap_or_else(|err| panic!("{name}: unexpected error {err}"));
            let expected: Fact = serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(loaded.payload, expected, "{name}: decoded payload");
            assert_eq!(
                u64::from(loaded.meta.status),
                case["expected_status"].as_u64().unwrap(),
                "{name}: status"
            );
        }
    }
}

#[tokio::test]
async fn fetch_test_vectors_are_stable_across_repeats() {
    let raw = include_str!("../../test-vectors/fetch.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let stub: Arc<dyn Transport> = Arc::new(StubTransport::replying(reply_from(&case["completion"])));
        let loader = Loader::get(stub, "https://example.test/fact").unwrap();
        let before = loader.descriptor().clone();

        let first = loader.request_bytes().await;
        let second = loader.request_bytes().await;
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "{name}: repeated success"),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string(), "{name}: repeated failure"),
            (a, b) => panic!("{name}: outcomes differ: {a:?} vs {b:?}"),
        }
        assert_eq!(loader.descriptor(), &before, "{name}: descriptor changed");
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_test_vectors() {
    let raw = include_str!("../../test-vectors/upload.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let method: HttpMethod = case["method"].as_str().unwrap().parse().unwrap();
        let stub = Arc::new(StubTransport::replying(ScriptedReply::bytes(200, "stored")));
        let transport: Arc<dyn Transport> = stub.clone();
        let loader = Loader::builder(transport, "https://example.test/upload")
            .method(method)
            .build()
            .unwrap();

        let outcome = loader.upload(b"file bytes".to_vec()).await;
        assert_eq!(
            stub.call_count() as u64,
            case["expected_transport_calls"].as_u64().unwrap(),
            "{name}: transport calls"
        );

        if let Some(expected_error) = case.get("expected_error") {
            let err = outcome.unwrap_err();
            assert_eq!(error_label(&err), expected_error.as_str().unwrap(), "{name}: error kind");
        } else {
            let loaded = outcome.unwrap_or_else(|err| panic!("{name}: unexpected error {err}"));
            assert_eq!(loaded.payload.as_ref(), b"stored", "{name}: body");
            assert_eq!(
                u64::from(loaded.status()),
                case["expected_status"].as_u64().unwrap(),
                "{name}: status"
            );
        }
    }
}
