//! Inbound message source and outbound message sink.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::message::Message;

/// The host side of the connection is gone; nothing more can be sent.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("host connection is gone")]
pub struct HostGone;

/// Source of inbound messages for one connection.
///
/// `recv` suspends until the next message arrives; `None` means the
/// connection has ended.
pub struct Inbound {
    stream: BoxStream<'static, Message>,
}

impl Inbound {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Message> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }

    pub fn from_receiver(rx: mpsc::Receiver<Message>) -> Self {
        Self::new(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        }))
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.stream.next().await
    }
}

impl std::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbound").finish_non_exhaustive()
    }
}

type SinkFn = dyn Fn(Message) -> BoxFuture<'static, Result<(), HostGone>> + Send + Sync;

/// Sink for outbound messages. Cheap to clone; clones feed the same connection.
#[derive(Clone)]
pub struct Outbound {
    sink: Arc<SinkFn>,
}

impl Outbound {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostGone>> + Send + 'static,
    {
        Self {
            sink: Arc::new(move |message| f(message).boxed()),
        }
    }

    pub fn from_sender(tx: mpsc::Sender<Message>) -> Self {
        Self::new(move |message| {
            let tx = tx.clone();
            async move { tx.send(message).await.map_err(|_| HostGone) }
        })
    }

    pub async fn send(&self, message: Message) -> Result<(), HostGone> {
        (self.sink)(message).await
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound").finish_non_exhaustive()
    }
}

/// Create a bounded message pipe: the sender side feeds the returned `Inbound`.
pub fn pipe(capacity: usize) -> (mpsc::Sender<Message>, Inbound) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, Inbound::from_receiver(rx))
}
