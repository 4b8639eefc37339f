//! The request façade: one immutable descriptor, several ways to run it.
//!
//! # Design
//! `Loader` holds a `RequestDescriptor`, a shared transport and a decoder.
//! Every operation borrows the descriptor read-only and goes through the
//! bridge exactly once, so one loader can serve any number of concurrent
//! calls without locks. Typed requests decode only after the bridge reports
//! success; decoding is never attempted on a failed exchange.
//!
//! Status codes are not interpreted here. A 404 with a JSON body decodes
//! like a 200; callers look at `meta.status` when it matters.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::bridge::{self, Primitive};
use crate::decode::{Decoder, JsonDecoder};
use crate::error::{BuildError, OperationError, PreconditionError};
use crate::http::{DescriptorBuilder, HttpMethod, RequestDescriptor, ResponseMeta, UploadSource};
use crate::transport::Transport;
use crate::types::{Loaded, Outcome};

/// Runs one request description against a [`Transport`].
pub struct Loader<D = JsonDecoder> {
    descriptor: Arc<RequestDescriptor>,
    transport: Arc<dyn Transport>,
    decoder: D,
}

impl<D: Clone> Clone for Loader<D> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            transport: Arc::clone(&self.transport),
            decoder: self.decoder.clone(),
        }
    }
}

impl<D: std::fmt::Debug> std::fmt::Debug for Loader<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("descriptor", &self.descriptor)
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

impl Loader<JsonDecoder> {
    /// Wrap a pre-built descriptor.
    pub fn new(transport: Arc<dyn Transport>, descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            transport,
            decoder: JsonDecoder::default(),
        }
    }

    /// A GET request to `url` with no extra headers or body.
    pub fn get(transport: Arc<dyn Transport>, url: &str) -> Result<Self, BuildError> {
        Ok(Self::new(transport, RequestDescriptor::get(url)?))
    }

    pub fn builder(transport: Arc<dyn Transport>, url: &str) -> LoaderBuilder {
        LoaderBuilder {
            transport,
            descriptor: RequestDescriptor::builder(url),
            decoder: JsonDecoder::default(),
        }
    }
}

impl<D: Decoder> Loader<D> {
    /// Same descriptor and transport, different decoder.
    pub fn with_decoder<E: Decoder>(self, decoder: E) -> Loader<E> {
        Loader {
            descriptor: self.descriptor,
            transport: self.transport,
            decoder,
        }
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Fetch the body and decode it as `T`.
    pub async fn request<T: DeserializeOwned>(&self) -> Outcome<T> {
        let loaded = self.request_bytes().await?;
        match self.decoder.decode::<T>(&loaded.payload) {
            Ok(payload) => Ok(Loaded {
                payload,
                meta: loaded.meta,
            }),
            Err(err) => {
                debug!(
                    url = %self.descriptor.url(),
                    status = loaded.meta.status,
                    error = %err,
                    "response body did not decode"
                );
                Err(OperationError::Decode(err))
            }
        }
    }

    /// [`request`](Self::request), returning the payload with the full
    /// response metadata.
    pub async fn request_with_meta<T: DeserializeOwned>(
        &self,
    ) -> Result<(T, ResponseMeta), OperationError> {
        self.request().await.map(Loaded::into_parts)
    }

    /// [`request`](Self::request), returning the payload with just the
    /// status code.
    pub async fn request_with_status<T: DeserializeOwned>(&self) -> Result<(T, u16), OperationError> {
        self.request().await.map(Loaded::with_status)
    }

    /// Fetch the body without decoding it.
    pub async fn request_bytes(&self) -> Outcome<Bytes> {
        let transport = &self.transport;
        let descriptor = &*self.descriptor;
        bridge::complete(Primitive::Fetch, descriptor, |completion| {
            transport.fetch(descriptor, completion)
        })
        .await
    }

    /// Download the body into a temporary file and return its location.
    ///
    /// The file is not removed by this crate; the caller owns it.
    pub async fn download(&self) -> Outcome<PathBuf> {
        let transport = &self.transport;
        let descriptor = &*self.descriptor;
        bridge::complete(Primitive::Download, descriptor, |completion| {
            transport.download(descriptor, completion)
        })
        .await
    }

    /// Send `source` as the body of this POST request and return the
    /// server's response body.
    ///
    /// Fails with [`PreconditionError::MethodNotAllowed`] before touching the
    /// transport when the descriptor is not a POST.
    pub async fn upload(&self, source: impl Into<UploadSource>) -> Outcome<Bytes> {
        let method = self.descriptor.method();
        if method != HttpMethod::Post {
            return Err(PreconditionError::MethodNotAllowed {
                expected: HttpMethod::Post,
                actual: method,
            }
            .into());
        }

        let source = source.into();
        let transport = &self.transport;
        let descriptor = &*self.descriptor;
        bridge::complete(Primitive::Upload, descriptor, move |completion| {
            transport.upload(descriptor, source, completion)
        })
        .await
    }
}

/// Assembles a [`Loader`] and its descriptor in one chain.
pub struct LoaderBuilder<D = JsonDecoder> {
    transport: Arc<dyn Transport>,
    descriptor: DescriptorBuilder,
    decoder: D,
}

impl<D: Decoder> LoaderBuilder<D> {
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.descriptor = self.descriptor.method(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.header(name, value);
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.descriptor = self.descriptor.headers(headers);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.descriptor = self.descriptor.body(body);
        self
    }

    pub fn decoder<E: Decoder>(self, decoder: E) -> LoaderBuilder<E> {
        LoaderBuilder {
            transport: self.transport,
            descriptor: self.descriptor,
            decoder,
        }
    }

    pub fn build(self) -> Result<Loader<D>, BuildError> {
        Ok(Loader {
            descriptor: Arc::new(self.descriptor.build()?),
            transport: self.transport,
            decoder: self.decoder,
        })
    }
}
