//! Turns one callback-style transport call into one awaited outcome.
//!
//! # Design
//! The completion handed to the transport owns the only sender of a
//! `tokio::sync::oneshot` channel. `FnOnce` plus a consuming `send` means a
//! call can resolve at most once; if the transport drops the completion
//! without calling it, the receiver observes the closed channel and the
//! operation still resolves, with `ProtocolError::CompletionDropped`.
//!
//! The receiver exists before the task is resumed, so an inline completion
//! (fired from inside `resume`) is never lost. If the caller drops the
//! future first, the task is cancelled and a late completion just finds the
//! channel closed.

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, Missing, OperationError, ProtocolError};
use crate::http::{RequestDescriptor, ResponseMeta};
use crate::transport::{Completion, TransportTask};
use crate::types::{Loaded, Outcome};

/// Which transport primitive a bridged call uses. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Primitive {
    Fetch,
    Download,
    Upload,
}

impl Primitive {
    fn as_str(self) -> &'static str {
        match self {
            Primitive::Fetch => "fetch",
            Primitive::Download => "download",
            Primitive::Upload => "upload",
        }
    }
}

/// Create a transport call with `start`, resume it, and wait for its single
/// completion.
pub(crate) async fn complete<T, F>(
    primitive: Primitive,
    request: &RequestDescriptor,
    start: F,
) -> Outcome<T>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>) -> Box<dyn TransportTask>,
{
    let (tx, rx) = oneshot::channel::<Outcome<T>>();
    let completion: Completion<T> = Box::new(move |payload, meta, error| {
        if tx.send(resolve(payload, meta, error)).is_err() {
            trace!("completion arrived after the caller stopped waiting");
        }
    });

    debug!(
        operation = primitive.as_str(),
        method = %request.method(),
        url = %request.url(),
        "starting transport call"
    );
    let mut pending = CancelOnDrop {
        task: start(completion),
        armed: true,
    };
    pending.task.resume();

    let outcome = match rx.await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                operation = primitive.as_str(),
                url = %request.url(),
                "transport dropped its completion without calling it"
            );
            Err(ProtocolError::CompletionDropped.into())
        }
    };
    pending.armed = false;

    match &outcome {
        Ok(loaded) => debug!(
            operation = primitive.as_str(),
            status = loaded.meta.status,
            "transport call finished"
        ),
        Err(err) => debug!(
            operation = primitive.as_str(),
            error.kind = err.kind(),
            error = %err,
            "transport call failed"
        ),
    }
    outcome
}

/// Interpret the three optional parts a completion receives.
///
/// An error always wins, even when data came along with it. Otherwise both
/// the payload and the metadata have to be present.
pub(crate) fn resolve<T>(
    payload: Option<T>,
    meta: Option<ResponseMeta>,
    error: Option<BoxError>,
) -> Outcome<T> {
    if let Some(err) = error {
        return Err(OperationError::Transport(err));
    }
    match (payload, meta) {
        (Some(payload), Some(meta)) => Ok(Loaded { payload, meta }),
        (payload, meta) => {
            let missing = Missing::from_presence(payload.is_some(), meta.is_some())
                .unwrap_or(Missing::BodyAndMeta);
            Err(ProtocolError::BadServerResponse { missing }.into())
        }
    }
}

struct CancelOnDrop {
    task: Box<dyn TransportTask>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("caller stopped waiting, cancelling transport call");
            self.task.cancel();
        }
    }
}
