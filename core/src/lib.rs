//! Typed HTTP requests on top of callback-style transports.
//!
//! # Overview
//! A [`Loader`] owns one immutable [`RequestDescriptor`] and runs it
//! against a [`Transport`]: fetch and decode the body as any
//! `DeserializeOwned` type, fetch raw bytes, download into a temporary file,
//! or upload a file or buffer. Every operation resolves to exactly one
//! [`Outcome`].
//!
//! # Design
//! - Transports report through a single-use completion callback
//!   (`transport`). The `bridge` module turns that callback into one awaited
//!   result and guarantees resolution even when the transport misbehaves.
//! - Decoding is a type parameter of `Loader` (`decode`), applied only after
//!   the bridge reports success.
//! - Failures are typed (`error`): transport, protocol, decode and
//!   precondition errors are told apart and always returned, never logged
//!   and swallowed.
//! - `ReqwestTransport` (feature `reqwest`, on by default) is the production
//!   transport; `StubTransport` answers from a script for tests.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use callfetch_core::{Loader, ReqwestTransport};
//!
//! #[derive(serde::Deserialize)]
//! struct Fact {
//!     fact: String,
//!     length: u32,
//! }
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let loader = Loader::get(transport, "https://catfact.ninja/fact")?;
//! let (fact, status) = loader.request_with_status::<Fact>().await?;
//! println!("{status}: {} ({} chars)", fact.fact, fact.length);
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod client;
pub mod decode;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use client::{Loader, LoaderBuilder};
pub use decode::{Decoder, JsonDecoder};
pub use error::{
    BoxError, BuildError, DecodeError, Missing, OperationError, PreconditionError, ProtocolError,
};
pub use http::{DescriptorBuilder, HttpMethod, RequestDescriptor, ResponseMeta, UploadSource};
#[cfg(feature = "reqwest")]
pub use transport::{ReqwestTransport, TransportConfig};
pub use transport::{Completion, ScriptedReply, StubTransport, Transport, TransportTask};
pub use types::{Loaded, Outcome};
