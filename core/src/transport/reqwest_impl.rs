//! Production transport on top of `reqwest`.
//!
//! reqwest is async-native, so this adapter does the opposite of what the
//! bridge does: each call becomes a future that is parked until `resume`,
//! then spawned onto the ambient tokio runtime, and its result is handed to
//! the completion callback. `cancel` aborts the spawned task.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Completion, Transport, TransportTask};
use crate::error::BoxError;
use crate::http::{HttpMethod, RequestDescriptor, ResponseMeta, UploadSource};

type Work<T> = Pin<Box<dyn Future<Output = Result<(T, ResponseMeta), BoxError>> + Send + 'static>>;

/// Client-level settings for [`ReqwestTransport`].
///
/// Timeouts live here rather than in the bridge: a call that times out
/// completes with a transport error like any other network failure.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Total time allowed per request, body included.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub user_agent: Option<String>,
    /// Where downloads are written. Defaults to the system temporary
    /// directory.
    pub download_dir: Option<PathBuf>,
}

impl TransportConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// Use an already configured client. Only `download_dir` is read from
    /// `config`; the client's own settings win for everything else.
    pub fn from_client(client: reqwest::Client, config: TransportConfig) -> Self {
        Self { client, config }
    }

    fn prepare(&self, request: &RequestDescriptor) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method()), request.url().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        builder
    }
}

impl Transport for ReqwestTransport {
    fn fetch(&self, request: &RequestDescriptor, completion: Completion<Bytes>) -> Box<dyn TransportTask> {
        let call = self.prepare(request);
        SpawnTask::boxed(
            Box::pin(async move {
                let response = call.send().await?;
                let meta = meta_of(&response);
                let body = response.bytes().await?;
                Ok::<_, BoxError>((body, meta))
            }),
            completion,
        )
    }

    fn download(
        &self,
        request: &RequestDescriptor,
        completion: Completion<PathBuf>,
    ) -> Box<dyn TransportTask> {
        let call = self.prepare(request);
        let dir = self
            .config
            .download_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        SpawnTask::boxed(
            Box::pin(async move {
                let mut response = call.send().await?;
                let meta = meta_of(&response);

                let temp = tempfile::Builder::new()
                    .prefix("callfetch-")
                    .suffix(".download")
                    .tempfile_in(&dir)?;
                let (file, temp_path) = temp.into_parts();
                let mut file = tokio::fs::File::from_std(file);
                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                drop(file);

                // Until `keep`, an error above removes the partial file.
                let path = temp_path.keep()?;
                Ok::<_, BoxError>((path, meta))
            }),
            completion,
        )
    }

    fn upload(
        &self,
        request: &RequestDescriptor,
        source: UploadSource,
        completion: Completion<Bytes>,
    ) -> Box<dyn TransportTask> {
        let call = self.prepare(request);
        SpawnTask::boxed(
            Box::pin(async move {
                let body = match source {
                    UploadSource::Bytes(bytes) => bytes,
                    UploadSource::File(path) => Bytes::from(tokio::fs::read(&path).await?),
                };
                let response = call.body(body).send().await?;
                let meta = meta_of(&response);
                let body = response.bytes().await?;
                Ok::<_, BoxError>((body, meta))
            }),
            completion,
        )
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Options => reqwest::Method::OPTIONS,
        HttpMethod::Connect => reqwest::Method::CONNECT,
        HttpMethod::Trace => reqwest::Method::TRACE,
    }
}

fn meta_of(response: &reqwest::Response) -> ResponseMeta {
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)));
    ResponseMeta::from_parts(response.status().as_u16(), headers)
}

struct Parked<T> {
    work: Work<T>,
    completion: Completion<T>,
}

/// A reqwest call waiting for `resume`, then running on the runtime.
struct SpawnTask<T> {
    parked: Mutex<Option<Parked<T>>>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> SpawnTask<T> {
    fn boxed(work: Work<T>, completion: Completion<T>) -> Box<dyn TransportTask> {
        Box::new(Self {
            parked: Mutex::new(Some(Parked { work, completion })),
            running: Mutex::new(None),
        })
    }
}

impl<T: Send + 'static> TransportTask for SpawnTask<T> {
    fn resume(&self) {
        let Some(Parked { work, completion }) = lock(&self.parked).take() else {
            return;
        };
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!("no tokio runtime to run the request on");
                return completion(None, None, Some(Box::new(err)));
            }
        };
        let join = handle.spawn(async move {
            match work.await {
                Ok((payload, meta)) => completion(Some(payload), Some(meta), None),
                Err(err) => completion(None, None, Some(err)),
            }
        });
        *lock(&self.running) = Some(join);
    }

    fn cancel(&self) {
        if lock(&self.parked).take().is_some() {
            debug!("request cancelled before it started");
        }
        if let Some(join) = lock(&self.running).take() {
            join.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
