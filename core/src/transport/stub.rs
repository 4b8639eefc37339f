//! Scripted in-process transport.
//!
//! `StubTransport` answers every call from a script instead of the network
//! and records what it was asked to do. It is public so downstream crates
//! can test code built on `Loader` without a server.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use super::{Completion, DeferredTask, Transport, TransportTask};
use crate::error::BoxError;
use crate::http::{HttpMethod, RequestDescriptor, ResponseMeta, UploadSource};

/// One scripted answer to a transport call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Complete with a body and metadata.
    Respond { body: Bytes, meta: ResponseMeta },
    /// Complete with a transport error carrying this message.
    Fail(String),
    /// Complete with exactly these three parts, however inconsistent.
    Raw {
        body: Option<Bytes>,
        meta: Option<ResponseMeta>,
        error: Option<String>,
    },
    /// Drop the completion without ever calling it.
    Dropped,
    /// Hold the completion until [`StubTransport::release_pending`], then
    /// answer with the inner reply.
    Pending(Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn json(status: u16, body: &str) -> Self {
        ScriptedReply::Respond {
            body: Bytes::copy_from_slice(body.as_bytes()),
            meta: ResponseMeta::from_parts(status, [("content-type", "application/json")]),
        }
    }

    pub fn bytes(status: u16, body: impl Into<Bytes>) -> Self {
        ScriptedReply::Respond {
            body: body.into(),
            meta: ResponseMeta::with_status(status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Fetch,
    Download,
    Upload,
}

/// What the stub saw for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub method: HttpMethod,
    pub url: String,
    pub upload: Option<UploadSource>,
}

#[derive(Debug)]
enum Script {
    Always(ScriptedReply),
    Queue(VecDeque<ScriptedReply>),
}

type Parked = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<RecordedCall>>,
    parked: Mutex<Vec<Parked>>,
    cancellations: AtomicUsize,
    downloads: AtomicUsize,
}

/// In-process [`Transport`] driven by [`ScriptedReply`] values.
pub struct StubTransport {
    script: Mutex<Script>,
    shared: Arc<Shared>,
    download_dir: PathBuf,
    threaded: bool,
}

impl StubTransport {
    /// Answer every call with `reply`.
    pub fn replying(reply: ScriptedReply) -> Self {
        Self::with_script(Script::Always(reply))
    }

    /// Answer calls with `replies` in order; calls past the end fail with a
    /// transport error.
    pub fn sequence(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self::with_script(Script::Queue(replies.into_iter().collect()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            shared: Arc::new(Shared::default()),
            download_dir: std::env::temp_dir(),
            threaded: false,
        }
    }

    /// Directory downloaded bodies are written to. Defaults to the system
    /// temporary directory.
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Deliver completions from a freshly spawned thread instead of inline
    /// inside `resume`.
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.shared.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.shared.calls).len()
    }

    /// Number of times a task handed out by this stub was cancelled.
    pub fn cancellations(&self) -> usize {
        self.shared.cancellations.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.parked).len()
    }

    /// Deliver every parked completion. Returns how many were released.
    pub fn release_pending(&self) -> usize {
        let parked: Vec<Parked> = lock(&self.shared.parked).drain(..).collect();
        let released = parked.len();
        for deliver in parked {
            deliver();
        }
        released
    }

    fn next_reply(&self) -> ScriptedReply {
        match &mut *lock(&self.script) {
            Script::Always(reply) => reply.clone(),
            Script::Queue(queue) => queue
                .pop_front()
                .unwrap_or_else(|| ScriptedReply::Fail("stub script exhausted".to_string())),
        }
    }

    fn record(&self, kind: CallKind, request: &RequestDescriptor, upload: Option<UploadSource>) {
        lock(&self.shared.calls).push(RecordedCall {
            kind,
            method: request.method(),
            url: request.url().to_string(),
            upload,
        });
    }

    fn task<T, F>(&self, completion: Completion<T>, payload: F) -> Box<dyn TransportTask>
    where
        T: Send + 'static,
        F: Fn(Bytes) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let reply = self.next_reply();
        let shared = Arc::clone(&self.shared);
        let threaded = self.threaded;
        let start = move || {
            let run = move || deliver(reply, completion, Arc::new(payload), &shared);
            if threaded {
                std::thread::spawn(run);
            } else {
                run();
            }
        };
        Box::new(StubTask {
            inner: DeferredTask::new(start),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Transport for StubTransport {
    fn fetch(&self, request: &RequestDescriptor, completion: Completion<Bytes>) -> Box<dyn TransportTask> {
        self.record(CallKind::Fetch, request, None);
        self.task(completion, Ok)
    }

    fn download(
        &self,
        request: &RequestDescriptor,
        completion: Completion<PathBuf>,
    ) -> Box<dyn TransportTask> {
        self.record(CallKind::Download, request, None);
        let dir = self.download_dir.clone();
        let shared = Arc::clone(&self.shared);
        self.task(completion, move |body| {
            let n = shared.downloads.fetch_add(1, Ordering::SeqCst);
            let path = dir.join(format!("callfetch-stub-{}-{n}.download", std::process::id()));
            std::fs::write(&path, &body)?;
            Ok(path)
        })
    }

    fn upload(
        &self,
        request: &RequestDescriptor,
        source: UploadSource,
        completion: Completion<Bytes>,
    ) -> Box<dyn TransportTask> {
        self.record(CallKind::Upload, request, Some(source));
        self.task(completion, Ok)
    }
}

struct StubTask {
    inner: DeferredTask,
    shared: Arc<Shared>,
}

impl TransportTask for StubTask {
    fn resume(&self) {
        self.inner.resume();
    }

    fn cancel(&self) {
        self.shared.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

fn deliver<T, F>(reply: ScriptedReply, completion: Completion<T>, payload: Arc<F>, shared: &Arc<Shared>)
where
    T: Send + 'static,
    F: Fn(Bytes) -> Result<T, BoxError> + Send + Sync + 'static,
{
    match reply {
        ScriptedReply::Respond { body, meta } => match payload(body) {
            Ok(value) => completion(Some(value), Some(meta), None),
            Err(err) => completion(None, None, Some(err)),
        },
        ScriptedReply::Fail(message) => completion(None, None, Some(message.into())),
        ScriptedReply::Raw { body, meta, error } => {
            let value = match body.map(|b| payload(b)).transpose() {
                Ok(value) => value,
                Err(err) => return completion(None, None, Some(err)),
            };
            completion(value, meta, error.map(BoxError::from));
        }
        ScriptedReply::Dropped => drop(completion),
        ScriptedReply::Pending(inner) => {
            let later = Arc::clone(shared);
            lock(&shared.parked).push(Box::new(move || deliver(*inner, completion, payload, &later)));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    type Seen = (Option<Bytes>, Option<ResponseMeta>, Option<String>);

    fn capture() -> (Completion<Bytes>, mpsc::Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        let completion: Completion<Bytes> = Box::new(move |body, meta, err| {
            let _ = tx.send((body, meta, err.map(|e| e.to_string())));
        });
        (completion, rx)
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::get("http://stub.test/x").unwrap()
    }

    #[test]
    fn nothing_happens_before_resume() {
        let stub = StubTransport::replying(ScriptedReply::bytes(200, "ok"));
        let (completion, rx) = capture();
        let task = stub.fetch(&request(), completion);
        assert!(rx.try_recv().is_err());
        task.resume();
        let (body, meta, err) = rx.try_recv().unwrap();
        assert_eq!(body.unwrap().as_ref(), b"ok");
        assert_eq!(meta.unwrap().status, 200);
        assert!(err.is_none());
    }

    #[test]
    fn sequence_is_consumed_in_order_then_fails() {
        let stub = StubTransport::sequence([ScriptedReply::bytes(200, "one")]);
        let (first, rx1) = capture();
        stub.fetch(&request(), first).resume();
        assert_eq!(rx1.recv().unwrap().0.unwrap().as_ref(), b"one");

        let (second, rx2) = capture();
        stub.fetch(&request(), second).resume();
        let (_, _, err) = rx2.recv().unwrap();
        assert_eq!(err.as_deref(), Some("stub script exhausted"));
        assert_eq!(stub.call_count(), 2);
    }

    #[test]
    fn pending_reply_waits_for_release() {
        let stub = StubTransport::replying(ScriptedReply::Pending(Box::new(ScriptedReply::bytes(
            201, "late",
        ))));
        let (completion, rx) = capture();
        stub.fetch(&request(), completion).resume();
        assert!(rx.try_recv().is_err());
        assert_eq!(stub.pending_count(), 1);
        assert_eq!(stub.release_pending(), 1);
        assert_eq!(rx.try_recv().unwrap().1.unwrap().status, 201);
    }

    #[test]
    fn download_writes_body_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubTransport::replying(ScriptedReply::bytes(200, "file body"))
            .download_dir(dir.path());
        let (tx, rx) = mpsc::channel();
        let completion: Completion<PathBuf> = Box::new(move |path, _, _| {
            let _ = tx.send(path);
        });
        stub.download(&request(), completion).resume();
        let path = rx.recv().unwrap().unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(path).unwrap(), b"file body");
    }

    #[test]
    fn upload_records_source() {
        let stub = StubTransport::replying(ScriptedReply::bytes(200, ""));
        let (completion, _rx) = capture();
        let req = RequestDescriptor::builder("http://stub.test/up")
            .method(HttpMethod::Post)
            .build()
            .unwrap();
        stub.upload(&req, UploadSource::from(vec![1, 2, 3]), completion);
        let calls = stub.calls();
        assert_eq!(calls[0].kind, CallKind::Upload);
        assert_eq!(calls[0].method, HttpMethod::Post);
        assert_eq!(calls[0].upload, Some(UploadSource::Bytes(Bytes::from_static(&[1, 2, 3]))));
    }
}
