//! The callback-based HTTP transport this crate adapts.
//!
//! # Design
//! A transport exposes three primitives (fetch bytes, download to a file,
//! upload a file or buffer). Each one takes a [`Completion`] and hands back a
//! [`TransportTask`] that has not started yet. The caller registers
//! everything it needs to observe the result first and only then calls
//! [`TransportTask::resume`], so a completion can never fire before anyone
//! is waiting for it.
//!
//! The completion receives `(payload, meta, error)`, each optional, and is
//! consumed by the call. Interpreting the combinations is the bridge's job,
//! not the transport's.

use std::path::PathBuf;

use bytes::Bytes;

use crate::error::BoxError;
use crate::http::{RequestDescriptor, ResponseMeta, UploadSource};

#[cfg(feature = "reqwest")]
mod reqwest_impl;
mod stub;

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{ReqwestTransport, TransportConfig};
pub use stub::{CallKind, RecordedCall, ScriptedReply, StubTransport};

/// Single-use callback a transport invokes when its call finishes.
pub type Completion<T> =
    Box<dyn FnOnce(Option<T>, Option<ResponseMeta>, Option<BoxError>) + Send + 'static>;

/// Handle to a transport call that has been created but not started.
pub trait TransportTask: Send {
    /// Start the call. Invoked at most once.
    fn resume(&self);

    /// Ask the transport to abandon the call. Transports without a
    /// cancellation mechanism keep the default no-op; their completion may
    /// still run later and is ignored.
    fn cancel(&self) {}
}

/// An HTTP client with callback-style completion.
pub trait Transport: Send + Sync {
    /// Fetch the response body into memory.
    fn fetch(&self, request: &RequestDescriptor, completion: Completion<Bytes>)
        -> Box<dyn TransportTask>;

    /// Stream the response body into a temporary file and report its path.
    fn download(
        &self,
        request: &RequestDescriptor,
        completion: Completion<PathBuf>,
    ) -> Box<dyn TransportTask>;

    /// Send `source` as the request body and fetch the response body.
    fn upload(
        &self,
        request: &RequestDescriptor,
        source: UploadSource,
        completion: Completion<Bytes>,
    ) -> Box<dyn TransportTask>;
}

/// A task that runs a closure once on `resume`.
///
/// Convenient for transports that do their work on another thread or hand
/// it to a runtime themselves.
pub struct DeferredTask {
    start: std::sync::Mutex<Option<Box<dyn FnOnce() + Send + 'static>>>,
}

impl DeferredTask {
    pub fn new(start: impl FnOnce() + Send + 'static) -> Self {
        Self {
            start: std::sync::Mutex::new(Some(Box::new(start))),
        }
    }

    pub fn boxed(start: impl FnOnce() + Send + 'static) -> Box<dyn TransportTask> {
        Box::new(Self::new(start))
    }
}

impl TransportTask for DeferredTask {
    fn resume(&self) {
        let start = match self.start.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(start) = start {
            start();
        }
    }
}
