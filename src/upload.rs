//! Multipart upload payloads and progress reporting.
//!
//! A file can come from disk ([`UploadPayload::FilePath`]) or from memory
//! ([`UploadPayload::InMemory`]); the transport treats both the same way.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::Body;

use crate::error::{ClientError, RawFailure};

/// Receives upload progress as a whole percentage, 0 to 100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

const CHUNK_SIZE: usize = 64 * 1024;

/// File contents for an upload.
#[derive(Debug, Clone)]
pub enum UploadPayload {
    /// Read from the filesystem when the request is prepared.
    FilePath {
        path: PathBuf,
        file_name: Option<String>,
        mime: Option<String>,
    },
    InMemory {
        bytes: Bytes,
        file_name: String,
        mime: Option<String>,
    },
}

impl UploadPayload {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        UploadPayload::FilePath {
            path: path.into(),
            file_name: None,
            mime: None,
        }
    }

    pub fn bytes(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        UploadPayload::InMemory {
            bytes: bytes.into(),
            file_name: file_name.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            UploadPayload::FilePath { mime, .. } | UploadPayload::InMemory { mime, .. } => {
                *mime = Some(value.into())
            }
        }
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            UploadPayload::FilePath { file_name, .. } => *file_name = Some(name.into()),
            UploadPayload::InMemory { file_name, .. } => *file_name = name.into(),
        }
        self
    }

    /// Resolve to `(contents, file name, mime)`.
    async fn load(self) -> Result<(Bytes, String, Option<String>), RawFailure> {
        match self {
            UploadPayload::FilePath {
                path,
                file_name,
                mime,
            } => {
                let contents = tokio::fs::read(&path).await.map_err(RawFailure::Io)?;
                let name = file_name
                    .or_else(|| {
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                    })
                    .unwrap_or_else(|| "file".to_string());
                Ok((Bytes::from(contents), name, mime))
            }
            UploadPayload::InMemory {
                bytes,
                file_name,
                mime,
            } => Ok((bytes, file_name, mime)),
        }
    }
}

/// A multipart form: one file part plus plain text fields.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub field: String,
    pub payload: UploadPayload,
    pub fields: Vec<(String, String)>,
}

impl UploadForm {
    /// Form with the file under the `file` field.
    pub fn new(payload: UploadPayload) -> Self {
        Self {
            field: "file".to_string(),
            payload,
            fields: Vec::new(),
        }
    }

    pub fn with_field_name(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub(crate) async fn into_multipart(
        self,
        on_progress: Option<ProgressFn>,
    ) -> Result<Form, RawFailure> {
        let (contents, file_name, mime) = self.payload.load().await?;
        let total = contents.len() as u64;

        let mut tracker = on_progress.map(|callback| ProgressTracker::new(total, callback));
        let chunks: Vec<Bytes> = chunked(contents);
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            if let Some(tracker) = tracker.as_mut() {
                tracker.advance(chunk.len() as u64);
            }
            Ok::<_, std::io::Error>(chunk)
        }));

        let mut part = Part::stream_with_length(Body::wrap_stream(body), total).file_name(file_name);
        if let Some(mime) = mime {
            part = part.mime_str(&mime).map_err(|e| {
                ClientError::validation(format!("invalid content type `{mime}`: {e}"))
            })?;
        }

        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        Ok(form.part(self.field, part))
    }
}

fn chunked(contents: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(contents.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < contents.len() {
        let end = (offset + CHUNK_SIZE).min(contents.len());
        chunks.push(contents.slice(offset..end));
        offset = end;
    }
    chunks
}

/// `round(loaded * 100 / total)`, or `None` when the total is unknown.
pub fn percent(loaded: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let loaded = loaded.min(total);
    Some(((loaded * 100 + total / 2) / total) as u8)
}

struct ProgressTracker {
    total: u64,
    loaded: u64,
    callback: ProgressFn,
}

impl ProgressTracker {
    fn new(total: u64, callback: ProgressFn) -> Self {
        Self {
            total,
            loaded: 0,
            callback,
        }
    }

    fn advance(&mut self, bytes: u64) {
        self.loaded += bytes;
        if let Some(pct) = percent(self.loaded, self.total) {
            (self.callback)(pct);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn percent_rounds_and_handles_unknown_total() {
        assert_eq!(percent(0, 0), None);
        assert_eq!(percent(1, 3), Some(33));
        assert_eq!(percent(2, 3), Some(67));
        assert_eq!(percent(3, 3), Some(100));
        assert_eq!(percent(1, 200), Some(1));
        assert_eq!(percent(10, 3), Some(100));
    }

    #[test]
    fn tracker_is_monotonic_and_ends_at_100() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let total = (CHUNK_SIZE * 3 + 17) as u64;
        let mut tracker = ProgressTracker::new(total, Arc::new(move |p: u8| sink.lock().unwrap().push(p)));
        for chunk in chunked(Bytes::from(vec![0u8; total as usize])) {
            tracker.advance(chunk.len() as u64);
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn chunking_preserves_contents() {
        let data = Bytes::from((0..(CHUNK_SIZE * 2 + 5)).map(|i| i as u8).collect::<Vec<_>>());
        let chunks = chunked(data.clone());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data.to_vec());
        assert!(chunked(Bytes::new()).is_empty());
    }

    #[tokio::test]
    async fn file_payload_defaults_name_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let (contents, name, mime) = UploadPayload::file(&path)
            .with_mime("application/octet-stream")
            .load()
            .await
            .unwrap();
        assert_eq!(&contents[..], b"abc");
        assert_eq!(name, "weights.bin");
        assert_eq!(mime.as_deref(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn missing_file_is_io_failure() {
        let result = UploadPayload::file("/definitely/not/here.bin").load().await;
        assert!(matches!(result, Err(RawFailure::Io(_))));
    }

    #[tokio::test]
    async fn bad_mime_is_rejected() {
        let form = UploadForm::new(UploadPayload::bytes(&b"x"[..], "a.txt").with_mime("not a mime"));
        let err = form.into_multipart(None).await.unwrap_err();
        assert!(matches!(err, RawFailure::Normalized(e) if e.code == crate::error::VALIDATION_ERROR));
    }
}
