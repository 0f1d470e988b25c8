//! Single outstanding write per connection.
//!
//! The writer is moved into the write future and handed back when the
//! future finishes, so a second write cannot start while one is running.
//! Awaiting [`InFlightWriter::completion`] is cancel safe, which lets it sit
//! in a `tokio::select!` next to the read side.

use std::future::Future;

use futures_util::future::BoxFuture;

/// Owns the write half of a connection, or the write currently using it.
pub struct InFlightWriter<W, E> {
    idle: Option<W>,
    busy: Option<BoxFuture<'static, (W, Result<(), E>)>>,
}

impl<W, E> InFlightWriter<W, E>
where
    W: Send + 'static,
    E: Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            idle: Some(writer),
            busy: None,
        }
    }

    /// Whether a new write may start.
    pub fn is_idle(&self) -> bool {
        self.idle.is_some()
    }

    /// Start a write. The future must return the writer it was given.
    ///
    /// Returns `false` without calling `write` if a write is in flight.
    pub fn start<F, Fut>(&mut self, write: F) -> bool
    where
        F: FnOnce(W) -> Fut,
        Fut: Future<Output = (W, Result<(), E>)> + Send + 'static,
    {
        let Some(writer) = self.idle.take() else {
            return false;
        };
        self.busy = Some(Box::pin(write(writer)));
        true
    }

    /// Wait for the in-flight write to finish. Never resolves while idle.
    pub async fn completion(&mut self) -> Result<(), E> {
        let Some(busy) = self.busy.as_mut() else {
            return std::future::pending().await;
        };
        let (writer, result) = busy.await;
        self.busy = None;
        self.idle = Some(writer);
        result
    }

    /// Take the writer back. `None` if a write is still in flight (it is
    /// dropped).
    pub fn into_inner(self) -> Option<W> {
        self.idle
    }
}

impl<W, E> std::fmt::Debug for InFlightWriter<W, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightWriter")
            .field("idle", &self.idle.is_some())
            .finish()
    }
}
