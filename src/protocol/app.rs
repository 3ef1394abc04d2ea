//! Application trait: the unit the host drives once per connection.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::protocol::channel::{Inbound, Outbound};
use crate::protocol::scope::Scope;

/// Error returned by an application. Boxed so inner applications are free
/// to use their own error types.
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// An application handles one connection scope to completion.
pub trait Application: Send + Sync + 'static {
    fn call(
        &self,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> BoxFuture<'_, Result<(), AppError>>;
}

impl<A> Application for Arc<A>
where
    A: Application + ?Sized,
{
    fn call(
        &self,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> BoxFuture<'_, Result<(), AppError>> {
        (**self).call(scope, inbound, outbound)
    }
}

/// Application built from an async function. See [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F> {
    f: F,
}

/// Wrap an async function as an [`Application`].
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Scope, Inbound, Outbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    FromFn { f }
}

impl<F, Fut> Application for FromFn<F>
where
    F: Fn(Scope, Inbound, Outbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    fn call(
        &self,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> BoxFuture<'_, Result<(), AppError>> {
        (self.f)(scope, inbound, outbound).boxed()
    }
}
