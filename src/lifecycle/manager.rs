//! Lifespan handling and ownership of the pooled client.
//!
//! # Responsibilities
//! - Create the pooled client when startup passes through
//! - Close it once the inner application acknowledges shutdown
//! - Answer startup/shutdown itself when the inner application
//!   does not speak the lifespan protocol
//!
//! # Design Decisions
//! - The inner application sees the host's messages through intercepting
//!   wrappers; the wrappers do the resource work, the app does the acking
//! - The fallback handshake starts only after the inner application has
//!   returned an error, never alongside it
//! - No state container on the scope means no pooled client; bridges then
//!   use private clients

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::stream;
use tokio::sync::Mutex;

use crate::lifecycle::pool::{UpstreamClient, HTTP_CLIENT_KEY};
use crate::protocol::{AppError, Application, Inbound, Message, Outbound, Scope, SharedState};

/// Lifecycle of the pooled client.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// Nothing created yet.
    Idle = 0,
    /// The pooled client is published in shared state.
    Created = 1,
    /// The pooled client has been closed; it is never recreated.
    Closed = 2,
}

impl From<u8> for PoolPhase {
    fn from(val: u8) -> Self {
        match val {
            1 => PoolPhase::Created,
            2 => PoolPhase::Closed,
            _ => PoolPhase::Idle,
        }
    }
}

/// Creates and closes the pooled client, at most once each.
#[derive(Debug)]
pub struct PoolLifecycle {
    phase: AtomicU8,
}

impl PoolLifecycle {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(PoolPhase::Idle as u8),
        }
    }

    pub fn phase(&self) -> PoolPhase {
        self.phase.load(Ordering::SeqCst).into()
    }

    /// Startup received: publish a fresh client into `state`.
    ///
    /// Returns true if a client was created. Without a state container, or
    /// after a client has already been created once, this does nothing.
    pub fn on_startup(&self, state: Option<&SharedState>) -> bool {
        let Some(state) = state else {
            tracing::debug!("Host provides no shared state; bridges will use private clients");
            return false;
        };

        if self
            .phase
            .compare_exchange(
                PoolPhase::Idle as u8,
                PoolPhase::Created as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::warn!(phase = ?self.phase(), "Ignoring repeated startup; pooled client already created");
            return false;
        }

        state.insert(HTTP_CLIENT_KEY, Arc::new(UpstreamClient::new()));
        tracing::info!("Pooled upstream client created");
        true
    }

    /// Shutdown complete: remove the client from `state` and close it.
    ///
    /// Returns true if a client was closed. Safe to call repeatedly.
    pub fn on_shutdown(&self, state: Option<&SharedState>) -> bool {
        let Some(state) = state else {
            return false;
        };

        let closed = state
            .remove::<UpstreamClient>(HTTP_CLIENT_KEY)
            .map(|client| client.close())
            .unwrap_or(false);

        if closed {
            self.phase.store(PoolPhase::Closed as u8, Ordering::SeqCst);
            tracing::info!("Pooled upstream client closed");
        }
        closed
    }
}

impl Default for PoolLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// How far the lifespan handshake has progressed.
#[derive(Debug, Default)]
struct Handshake {
    startup_seen: AtomicBool,
    startup_acked: AtomicBool,
    shutdown_seen: AtomicBool,
    shutdown_acked: AtomicBool,
}

impl Handshake {
    fn pending_startup(&self) -> bool {
        self.startup_seen.load(Ordering::SeqCst) && !self.startup_acked.load(Ordering::SeqCst)
    }

    fn pending_shutdown(&self) -> bool {
        self.shutdown_seen.load(Ordering::SeqCst) && !self.shutdown_acked.load(Ordering::SeqCst)
    }
}

/// Lifespan handler wrapped around an inner application.
#[derive(Debug, Clone, Default)]
pub struct LifespanManager {
    pool: Arc<PoolLifecycle>,
}

impl LifespanManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> &PoolLifecycle {
        &self.pool
    }

    /// Run a lifespan scope through `inner`, falling back to a local
    /// handshake if `inner` fails.
    pub async fn run<A>(
        &self,
        inner: &A,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> Result<(), AppError>
    where
        A: Application + ?Sized,
    {
        let state = scope.state.clone();
        let shared = Arc::new(Mutex::new(inbound));
        let handshake = Arc::new(Handshake::default());
        let outbound = self.intercept_outbound(outbound, state.clone(), handshake.clone());

        let inner_inbound = self.intercept_inbound(shared.clone(), state.clone(), handshake.clone());
        let error = match inner.call(scope, inner_inbound, outbound.clone()).await {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };

        tracing::debug!(
            error = %error,
            "Inner application does not handle lifespan; answering lifecycle signals locally"
        );

        if handshake.pending_startup() {
            outbound.send(Message::LifespanStartupComplete).await?;
        }
        // Shutdown already consumed by the inner application: nothing more
        // will arrive, so finish it here.
        if handshake.shutdown_seen.load(Ordering::SeqCst) {
            if handshake.pending_shutdown() {
                outbound.send(Message::LifespanShutdownComplete).await?;
            }
            return Ok(());
        }

        let mut inbound = self.intercept_inbound(shared, state, handshake);
        while let Some(message) = inbound.recv().await {
            match message {
                Message::LifespanStartup => {
                    outbound.send(Message::LifespanStartupComplete).await?;
                }
                Message::LifespanShutdown => {
                    outbound.send(Message::LifespanShutdownComplete).await?;
                    return Ok(());
                }
                other => {
                    tracing::debug!(kind = other.kind(), "Ignoring unexpected lifespan message");
                }
            }
        }
        Ok(())
    }

    fn intercept_inbound(
        &self,
        shared: Arc<Mutex<Inbound>>,
        state: Option<SharedState>,
        handshake: Arc<Handshake>,
    ) -> Inbound {
        let pool = self.pool.clone();
        Inbound::new(stream::unfold(
            (shared, pool, state, handshake),
            |(shared, pool, state, handshake)| async move {
                let message = shared.lock().await.recv().await?;
                match message {
                    Message::LifespanStartup => {
                        handshake.startup_seen.store(true, Ordering::SeqCst);
                        pool.on_startup(state.as_ref());
                    }
                    Message::LifespanShutdown => {
                        handshake.shutdown_seen.store(true, Ordering::SeqCst);
                    }
                    _ => {}
                }
                Some((message, (shared, pool, state, handshake)))
            },
        ))
    }

    fn intercept_outbound(
        &self,
        outbound: Outbound,
        state: Option<SharedState>,
        handshake: Arc<Handshake>,
    ) -> Outbound {
        let pool = self.pool.clone();
        Outbound::new(move |message| {
            let outbound = outbound.clone();
            let pool = pool.clone();
            let state = state.clone();
            let handshake = handshake.clone();
            async move {
                match message {
                    Message::LifespanStartupComplete | Message::LifespanStartupFailed { .. } => {
                        handshake.startup_acked.store(true, Ordering::SeqCst);
                    }
                    Message::LifespanShutdownComplete | Message::LifespanShutdownFailed { .. } => {
                        handshake.shutdown_acked.store(true, Ordering::SeqCst);
                        pool.on_shutdown(state.as_ref());
                    }
                    _ => {}
                }
                outbound.send(message).await
            }
        })
    }
}
