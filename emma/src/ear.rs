use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};
use tracing::debug;

#[derive(Debug, Error)]
pub enum HearingError {
    #[error("no speech detected")]
    NoSpeechDetected,
    #[error("could not recognize speech: {0}")]
    Recognition(String),
    #[error("input closed")]
    Closed,
}

/// Source of the user's utterances.
#[async_trait]
pub trait Ear: Send {
    /// Wait up to `timeout` for the user to say something.
    async fn listen(&mut self, timeout: Duration) -> Result<String, HearingError>;
}

/// [`Ear`] that reads typed lines, one utterance per line.
pub struct TypedEar<R> {
    lines: Lines<BufReader<R>>,
}

impl TypedEar<Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin> TypedEar<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Ear for TypedEar<R> {
    async fn listen(&mut self, timeout: Duration) -> Result<String, HearingError> {
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Err(HearingError::NoSpeechDetected),
            Ok(Ok(Some(line))) => {
                let line = line.trim().to_string();
                debug!(%line, "heard");
                Ok(line)
            }
            Ok(Ok(None)) => Err(HearingError::Closed),
            Ok(Err(e)) => Err(HearingError::Recognition(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_trimmed_lines_until_closed() {
        let mut ear = TypedEar::new(&b"  hello there \nbye\n"[..]);
        let timeout = Duration::from_secs(1);
        assert_eq!(ear.listen(timeout).await.unwrap(), "hello there");
        assert_eq!(ear.listen(timeout).await.unwrap(), "bye");
        assert!(matches!(ear.listen(timeout).await, Err(HearingError::Closed)));
    }

    #[tokio::test]
    async fn silence_times_out() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut ear = TypedEar::new(reader);
        assert!(matches!(
            ear.listen(Duration::from_millis(20)).await,
            Err(HearingError::NoSpeechDetected)
        ));
    }
}
