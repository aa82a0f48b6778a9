//! # modelhub - ModelHub platform client
//!
//! Async client for the ModelHub HTTP API. It sits between application code
//! and the platform and takes care of the request plumbing.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - JSON `get`/`post`/`put`/`delete` returning a [`ResponseEnvelope`]
//! - Multipart uploads from a file path or from memory, with progress
//! - Streamed responses decoded frame by frame
//! - Swappable bearer identity (API key or session token)
//! - One error type, [`ClientError`], for every failure
//! - Per-client event bus for `error`, `identity_changed` and `disconnected`
//!
//! ## Architecture
//!
//! - **`Client`**: facade owning configuration, identity and event bus.
//! - **`Transport`**: one HTTP exchange per call; reads the identity at call time.
//! - **`ErrorNormalizer`**: turns raw failures into `ClientError` and reports them.
//! - **`EventBus`**: ordered listener registry with synchronous dispatch.
//! - **`StreamDecoder`**: `data:` frame decoder for streamed responses.
//!
//! ## Example
//! ```no_run
//! use modelhub::{Client, ClientConfig, Environment};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::new("mh_live_key", Environment::Production))?;
//!
//!     let frames = client
//!         .stream("/inference/stream", &json!({"model": "m-1", "input": "hi"}), |frame: Value| {
//!             println!("{frame}");
//!         })
//!         .await?;
//!     println!("{frames} frames");
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod transport;
pub mod upload;

pub use auth::Identity;
pub use client::Client;
pub use error::{ClientError, ErrorKind, ErrorNormalizer};
pub use events::{EventBus, EventPayload, Listener};
pub use model::{PageMeta, ResponseEnvelope};
pub use options::{ClientConfig, Environment};
pub use sse::{DecoderState, StreamDecoder};
pub use transport::Transport;
pub use upload::{ProgressFn, UploadForm, UploadPayload};
