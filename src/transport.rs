//! One network exchange per call against the configured base endpoint.
//!
//! Every failure leaves through [`ErrorNormalizer::raise`], so callers only
//! ever see [`ClientError`] and each one is announced on the event bus once.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{require, ClientError, ErrorNormalizer, RawFailure};
use crate::http::{
    add_extra_headers, build_http_client, RequestBuilderExt, ResponseExt, CLIENT_REQUEST_ID,
};
use crate::model::ResponseEnvelope;
use crate::options::ClientConfig;
use crate::sse::StreamDecoder;
use crate::upload::{ProgressFn, UploadForm};

/// Query string pairs.
pub type Query<'a> = &'a [(&'a str, &'a str)];

/// HTTP transport bound to one base endpoint and one identity cell.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    config: ClientConfig,
    identity: Identity,
    errors: ErrorNormalizer,
}

impl Transport {
    pub fn new(
        config: ClientConfig,
        identity: Identity,
        errors: ErrorNormalizer,
    ) -> Result<Self, ClientError> {
        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            config,
            identity,
            errors,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query<'_>,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        self.json_request(Method::GET, path, query, None::<&()>).await
    }

    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<ResponseEnvelope<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.json_request(Method::POST, path, &[], Some(body)).await
    }

    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<ResponseEnvelope<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.json_request(Method::PUT, path, &[], Some(body)).await
    }

    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query<'_>,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        self.json_request(Method::DELETE, path, query, None::<&()>).await
    }

    /// POST a multipart form. `on_progress` receives non-decreasing
    /// percentages of the file part as it is handed to the connection.
    #[instrument(skip(self, form, on_progress), fields(path = %path))]
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: UploadForm,
        on_progress: Option<ProgressFn>,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        let url = self.url(path)?;
        let multipart = form
            .into_multipart(on_progress)
            .await
            .map_err(|f| self.errors.raise(f))?;

        let (request, request_id) = self.prepare(Method::POST, &url, false);
        let response = self.send(request.multipart(multipart), &request_id).await?;
        self.read_envelope(response, request_id).await
    }

    /// POST `body` and feed each decoded frame of the streamed response to
    /// `on_frame`, in arrival order. Resolves once the `[DONE]` sentinel
    /// arrives or the body ends; returns the number of frames delivered.
    #[instrument(skip(self, body, on_frame), fields(path = %path))]
    pub async fn stream<B, T, F>(&self, path: &str, body: &B, on_frame: F) -> Result<usize, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
        F: FnMut(T),
    {
        let url = self.url(path)?;
        let (request, request_id) = self.prepare(Method::POST, &url, true);
        let request = request
            .header(ACCEPT, "text/event-stream")
            .json_logged(body);
        let response = self.send(request, &request_id).await?;
        let request_id = response.request_id().or(Some(request_id));

        let mut decoder = StreamDecoder::new();
        let frames = decoder
            .run::<_, _, _, T, F>(response.bytes_stream(), on_frame)
            .await
            .map_err(|source| {
                self.errors.raise(RawFailure::Stream {
                    source,
                    request_id: request_id.clone(),
                })
            })?;
        debug!(frames, state = ?decoder.state(), "stream complete");
        Ok(frames)
    }

    async fn json_request<B, T>(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&B>,
    ) -> Result<ResponseEnvelope<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let (mut request, request_id) = self.prepare(method, &url, true);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json_logged(body);
        }
        let response = self.send(request, &request_id).await?;
        self.read_envelope(response, request_id).await
    }

    fn url(&self, path: &str) -> Result<String, ClientError> {
        let path = require("path", path).map_err(|e| self.errors.raise(e))?;
        Ok(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
    }

    /// Start a request with the default headers. The bearer value is read
    /// here, at call time.
    fn prepare(&self, method: Method, url: &str, json: bool) -> (RequestBuilder, String) {
        let request_id = Uuid::new_v4().to_string();
        debug!(%method, %url, %request_id, "sending request");
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, self.identity.bearer_header())
            .header(CLIENT_REQUEST_ID, &request_id);
        if json {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        (add_extra_headers(request, &self.config), request_id)
    }

    async fn send(&self, request: RequestBuilder, request_id: &str) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(|source| {
            self.errors.raise(RawFailure::Transport {
                source,
                request_id: Some(request_id.to_string()),
            })
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let server_request_id = response.request_id();
        let body = response.text_logged().await.unwrap_or_default();
        Err(self.errors.raise(RawFailure::Status {
            status: status.as_u16(),
            request_id: server_request_id.or_else(|| Some(request_id.to_string())),
            body,
        }))
    }

    async fn read_envelope<T: DeserializeOwned>(
        &self,
        response: Response,
        request_id: String,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        let status = response.status();
        let request_id = response.request_id().unwrap_or(request_id);
        let text = response.text_logged().await.map_err(|source| {
            self.errors.raise(RawFailure::Transport {
                source,
                request_id: Some(request_id.clone()),
            })
        })?;

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(ResponseEnvelope::default());
        }

        serde_json::from_str(&text).map_err(|source| {
            self.errors.raise(RawFailure::Decode {
                status: status.as_u16(),
                request_id: Some(request_id),
                source,
            })
        })
    }
}
