//! Narration speech synthesis boundary.

use anyhow::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Size of the audio chunks pushed to the client during narration.
pub const NARRATION_CHUNK_SIZE: usize = 4096;

/// A stream of raw PCM audio bytes.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Turns narration text into streamed audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}

/// Regroups an audio stream into chunks of exactly `chunk_size` bytes. The
/// final chunk holds whatever remains. An upstream error is yielded once and
/// ends the stream.
pub fn rechunk(stream: AudioStream, chunk_size: usize) -> AudioStream {
    let chunk_size = chunk_size.max(1);
    Box::pin(futures::stream::unfold(
        (stream, BytesMut::new(), false),
        move |(mut inner, mut buf, mut done)| async move {
            loop {
                if buf.len() >= chunk_size {
                    let chunk = buf.split_to(chunk_size).freeze();
                    return Some((Ok(chunk), (inner, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let chunk = buf.split().freeze();
                    return Some((Ok(chunk), (inner, buf, done)));
                }
                match inner.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        buf.clear();
                        return Some((Err(e), (inner, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn stream_of(parts: Vec<Result<Vec<u8>>>) -> AudioStream {
        Box::pin(futures::stream::iter(
            parts.into_iter().map(|p| p.map(Bytes::from)),
        ))
    }

    #[tokio::test]
    async fn test_rechunk_regroups_and_flushes_tail() {
        let input = stream_of(vec![Ok(vec![1; 3]), Ok(vec![2; 6]), Ok(vec![3; 2])]);
        let sizes: Vec<usize> = rechunk(input, 4)
            .map(|c| c.unwrap().len())
            .collect()
            .await;
        assert_eq!(sizes, vec![4, 4, 3]);
    }

    #[tokio::test]
    async fn test_rechunk_stops_after_error() {
        let input = stream_of(vec![Ok(vec![1; 2]), Err(anyhow!("reset")), Ok(vec![1; 8])]);
        let items: Vec<Result<Bytes>> = rechunk(input, 4).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
