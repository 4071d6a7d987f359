#![forbid(unsafe_code)]

//! Event handlers returned by the dispatcher.
//!
//! A dispatcher maps each logical event to a [`Handler<M>`]:
//!
//! - [`Handler::Sync`] runs on the UI thread with the current model and
//!   returns the next one. It is expected to be fast and pure.
//! - [`Handler::Async`] receives a snapshot of the current model on a worker
//!   thread and returns a lazy [`ModelStream`]. Every item pulled from the
//!   stream is committed on the UI thread before the next item is pulled,
//!   so the work between items is what runs in the background.
//!
//! Handler failures are data ([`HandlerError`]) once they leave the handler:
//! an `Err` item, or a panic caught at the dispatch boundary.

use std::any::Any;
use std::error::Error;
use std::fmt;

use rebind_core::ChainError;

use crate::cancellation::CancellationToken;

/// Boxed error type accepted from fallible handlers.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Lazy sequence of models produced by an async handler, pulled on the
/// worker thread.
pub type ModelStream<M> = Box<dyn Iterator<Item = Result<M, HandlerError>> + Send>;

/// Failure raised by application handler code.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),
    /// The handler panicked; the payload message is kept when it is a string.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// The handler's model could not be reconciled with the bindings (a
    /// member read or rebuild failed).
    #[error("model could not be reconciled: {0}")]
    Reconcile(#[from] ChainError),
    /// The handler changed a member that the model's schema does not
    /// declare, so the change cannot reach the bindings.
    #[error("model `{model}` changed a member its schema does not declare")]
    UndeclaredMember { model: &'static str },
    /// The worker thread for an async handler could not be spawned.
    #[error("async handler worker could not be spawned: {0}")]
    Spawn(#[source] std::io::Error),
}

impl HandlerError {
    /// Wrap any error as [`HandlerError::Failed`].
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }

    /// Build from a payload caught with `catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked(message)
    }
}

type SyncFn<M> = Box<dyn FnOnce(&M) -> Result<M, HandlerError>>;
type AsyncFn<M> = Box<dyn FnOnce(M, CancellationToken) -> ModelStream<M> + Send>;

/// What to run for one logical event.
pub enum Handler<M> {
    Sync(SyncFn<M>),
    Async(AsyncFn<M>),
}

impl<M> fmt::Debug for Handler<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

impl<M: Send + 'static> Handler<M> {
    /// Pure `Model -> Model` update.
    pub fn update(f: impl FnOnce(&M) -> M + 'static) -> Self {
        Self::Sync(Box::new(move |model| Ok(f(model))))
    }

    /// Fallible update; `Err` is routed to the engine's error handler.
    pub fn try_update<E>(f: impl FnOnce(&M) -> Result<M, E> + 'static) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Sync(Box::new(move |model| f(model).map_err(HandlerError::failed)))
    }

    /// Streaming update. `f` runs on the worker thread, and so does every
    /// step of the iterator it returns.
    pub fn stream<I>(f: impl FnOnce(M) -> I + Send + 'static) -> Self
    where
        I: IntoIterator<Item = M>,
        I::IntoIter: Send + 'static,
    {
        Self::Async(Box::new(move |model, _| {
            Box::new(f(model).into_iter().map(Ok)) as ModelStream<M>
        }))
    }

    /// Streaming update that can observe cancellation. The token is
    /// cancelled when the session is disposed or a newer async event
    /// supersedes this one under `SupersedePolicy::CancelPrevious`.
    pub fn cancellable<I>(f: impl FnOnce(M, CancellationToken) -> I + Send + 'static) -> Self
    where
        I: IntoIterator<Item = M>,
        I::IntoIter: Send + 'static,
    {
        Self::Async(Box::new(move |model, token| {
            Box::new(f(model, token).into_iter().map(Ok)) as ModelStream<M>
        }))
    }

    /// Fallible streaming update; the first `Err` ends the stream and is
    /// routed to the engine's error handler.
    pub fn try_stream<I, E>(f: impl FnOnce(M) -> I + Send + 'static) -> Self
    where
        I: IntoIterator<Item = Result<M, E>>,
        I::IntoIter: Send + 'static,
        E: Into<BoxError>,
    {
        Self::Async(Box::new(move |model, _| {
            Box::new(
                f(model)
                    .into_iter()
                    .map(|item| item.map_err(HandlerError::failed)),
            ) as ModelStream<M>
        }))
    }

    /// The event changes nothing.
    #[must_use]
    pub fn ignore() -> Self
    where
        M: Clone,
    {
        Self::Sync(Box::new(|model| Ok(model.clone())))
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}
