//! Output transports
//!
//! A [`Sink`] receives encoded metrics from every worker of one collector
//! pool. It is connected once before the pool starts and closed after the
//! pool has drained.

pub mod nats;
pub mod stdout;

use crate::cluster::resources::OutputKind;
use crate::error::Result;
use async_trait::async_trait;

pub use nats::NatsSink;
pub use stdout::StdoutSink;

#[async_trait]
pub trait Sink: Send + Sync {
    async fn connect(&mut self) -> Result<()>;

    async fn send(&self, data: &[u8]) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Builds an unconnected sink for the resolved output selection.
pub fn sink_for(output: OutputKind) -> Box<dyn Sink> {
    match output {
        OutputKind::Stdout => Box::new(StdoutSink::new()),
        OutputKind::Nats(config) => Box::new(NatsSink::new(config)),
    }
}
