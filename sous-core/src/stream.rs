//! Conversation stream consumer.
//!
//! Drains a streamed response body into one string. Chunk boundaries may split
//! a multi-byte UTF-8 character; the pending tail is carried into the next chunk.
//! Any error (or the deadline) discards what was read so far.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::time::Duration;

use crate::error::SousError;

/// Boxed text stream as produced by chat backends.
pub type TextStream = BoxStream<'static, Result<Bytes, SousError>>;

pub async fn collect_text<S>(stream: S, deadline: Duration) -> Result<String, SousError>
where
    S: Stream<Item = Result<Bytes, SousError>> + Send,
{
    match tokio::time::timeout(deadline, drain(stream)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline_secs = deadline.as_secs(), "Response stream timed out");
            Err(SousError::Network(format!(
                "response stream timed out after {}s",
                deadline.as_secs()
            )))
        }
    }
}

async fn drain<S>(stream: S) -> Result<String, SousError>
where
    S: Stream<Item = Result<Bytes, SousError>> + Send,
{
    let mut decoder = Utf8Accumulator::default();
    futures::pin_mut!(stream);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => decoder.push(&bytes),
            Err(e) => {
                tracing::warn!(error = %e, received = decoder.len(), "Response stream failed, discarding partial buffer");
                return Err(e);
            }
        }
    }

    Ok(decoder.finish())
}

#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    text: String,
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to() guarantees this prefix decodes.
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
        }
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, SousError>> + Send {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    #[tokio::test]
    async fn test_collects_all_chunks() {
        let s = chunks(vec![b"Sure! ".to_vec(), b"Let's ".to_vec(), b"cook.".to_vec()]);
        let text = collect_text(s, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "Sure! Let's cook.");
    }

    #[tokio::test]
    async fn test_reassembles_split_multibyte_char() {
        let emoji = "🍲".as_bytes();
        let (a, b) = emoji.split_at(2);
        let s = chunks(vec![b"Soup ".to_vec(), a.to_vec(), b.to_vec(), b" time".to_vec()]);
        let text = collect_text(s, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "Soup 🍲 time");
    }

    #[tokio::test]
    async fn test_error_discards_partial_buffer() {
        let s = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(SousError::Network("connection reset".to_string())),
        ]);
        let result = collect_text(s, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(SousError::Network(_))));
    }

    #[tokio::test]
    async fn test_deadline_is_network_error() {
        let s = stream::pending::<Result<Bytes, SousError>>();
        let result = collect_text(s, Duration::from_millis(20)).await;
        match result {
            Err(SousError::Network(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_bytes_become_replacement_char() {
        let mut acc = Utf8Accumulator::default();
        acc.push(b"ok\xffok");
        assert_eq!(acc.finish(), "ok\u{FFFD}ok");
    }
}
