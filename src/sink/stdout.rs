use super::Sink;
use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Prints one line per metric.
pub struct StdoutSink {
    out: Mutex<Output>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    /// Writes lines to `writer` instead of the process's stdout.
    pub fn with_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(data.len() + 1);
        line.extend_from_slice(data);
        line.push(b'\n');

        // Held for the whole line so concurrent workers do not interleave.
        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.out.lock().await.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
