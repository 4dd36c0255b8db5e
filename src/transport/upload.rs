use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;

use super::ProgressFn;

const CHUNK_SIZE: usize = 16 * 1024;

/// A file sent as a multipart form alongside optional text fields.
#[derive(Clone)]
pub struct Upload {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Arc<[u8]>,
    pub fields: BTreeMap<String, String>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: Arc::from(bytes),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("field_name", &self.field_name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .field("fields", &self.fields)
            .finish()
    }
}

/// Chunked body stream that reports how much of the file has been consumed.
pub struct ProgressStream {
    bytes: Arc<[u8]>,
    offset: usize,
    on_progress: Option<ProgressFn>,
}

impl ProgressStream {
    pub fn new(bytes: Arc<[u8]>, on_progress: Option<ProgressFn>) -> Self {
        Self {
            bytes,
            offset: 0,
            on_progress,
        }
    }
}

impl Stream for ProgressStream {
    type Item = Result<Vec<u8>, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let total = self.bytes.len();
        if self.offset >= total {
            return Poll::Ready(None);
        }

        let end = (self.offset + CHUNK_SIZE).min(total);
        let chunk = self.bytes[self.offset..end].to_vec();
        self.offset = end;

        if let Some(on_progress) = &self.on_progress {
            on_progress(end as f64 * 100.0 / total as f64);
        }

        Poll::Ready(Some(Ok(chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bytes.len().saturating_sub(self.offset).div_ceil(CHUNK_SIZE);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::task::Waker;

    #[test]
    fn reports_monotonic_progress_up_to_100() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |p| sink.lock().push(p));
        let mut stream = ProgressStream::new(Arc::from(vec![0u8; CHUNK_SIZE * 2 + 10]), Some(progress));

        let mut cx = Context::from_waker(Waker::noop());
        let mut total = 0;
        while let Poll::Ready(Some(chunk)) = Pin::new(&mut stream).poll_next(&mut cx) {
            total += chunk.unwrap().len();
        }

        assert_eq!(total, CHUNK_SIZE * 2 + 10);
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }
}
