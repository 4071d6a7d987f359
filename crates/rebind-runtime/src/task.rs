#![forbid(unsafe_code)]

//! Worker threads for async handlers.
//!
//! Each async handler runs on its own named thread. The worker pulls one
//! item from the handler's stream, hands it to the UI thread over a
//! rendezvous channel, then blocks until the UI thread sends a resume
//! signal after the item has been committed:
//!
//! ```text
//! worker:  next() ──Yield(m1)──▶ wait ◀──resume── next() ──Yield(m2)──▶ ...
//! UI:                  commit(m1) ──┘                       commit(m2)
//! ```
//!
//! Closing the channel is cancellation: dropping an [`AsyncTask`] releases
//! both channel ends, so a worker blocked on either side wakes and exits.
//! Panics in the handler are caught on the worker and delivered as
//! [`HandlerError::Panicked`].
//!
//! # Invariants
//!
//! 1. At most one yielded item per task is waiting for commit.
//! 2. The worker never pulls item `n + 1` before item `n` was committed.
//! 3. Nothing produced after cancellation is delivered.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread;

use tracing::{debug, trace, warn};
use web_time::Duration;

use crate::cancellation::{CancelReason, CancellationSource, CancellationToken};
use crate::handler::{HandlerError, ModelStream};

/// Identifier of one async handler run, unique per engine.
pub type TaskId = u64;

enum TaskMsg<M> {
    Yield(M),
    Done,
    Failed(HandlerError),
}

/// What the UI thread found when it checked a task.
#[derive(Debug)]
pub(crate) enum TaskPoll<M> {
    /// Nothing ready yet.
    Pending,
    /// An item to commit; call [`AsyncTask::resume`] afterwards.
    Yielded(M),
    /// The stream ended (or the worker went away after cancellation).
    Finished,
    Failed(HandlerError),
}

/// UI-thread handle to one running async handler.
pub(crate) struct AsyncTask<M> {
    id: TaskId,
    items: Receiver<TaskMsg<M>>,
    resume: SyncSender<()>,
    cancel: CancellationSource,
    awaiting_commit: bool,
    thread: Option<thread::JoinHandle<()>>,
}

impl<M> std::fmt::Debug for AsyncTask<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTask")
            .field("id", &self.id)
            .field("awaiting_commit", &self.awaiting_commit)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

type AsyncBody<M> = Box<dyn FnOnce(M, CancellationToken) -> ModelStream<M> + Send>;

impl<M: Send + 'static> AsyncTask<M> {
    /// Spawn the worker for `body` with `model` as its starting snapshot.
    pub(crate) fn spawn(
        id: TaskId,
        name_prefix: &str,
        body: AsyncBody<M>,
        model: M,
    ) -> Result<Self, HandlerError> {
        let (item_tx, items) = mpsc::sync_channel(0);
        let (resume, resume_rx) = mpsc::sync_channel(1);
        let cancel = CancellationSource::for_task(id);
        let token = cancel.token();
        let thread = thread::Builder::new()
            .name(format!("{name_prefix}-{id}"))
            .spawn(move || run_worker(id, body, model, token, &item_tx, &resume_rx))
            .map_err(HandlerError::Spawn)?;
        debug!(target: "rebind.task", task = id, "async handler started");
        Ok(Self {
            id,
            items,
            resume,
            cancel,
            awaiting_commit: false,
            thread: Some(thread),
        })
    }
}

impl<M> AsyncTask<M> {
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Take whatever the worker has ready, without blocking.
    pub(crate) fn poll(&mut self) -> TaskPoll<M> {
        if self.awaiting_commit {
            return TaskPoll::Pending;
        }
        match self.items.try_recv() {
            Ok(msg) => self.accept(msg),
            Err(TryRecvError::Empty) => TaskPoll::Pending,
            Err(TryRecvError::Disconnected) => TaskPoll::Finished,
        }
    }

    /// Like [`poll`](Self::poll) but waits up to `timeout` for the worker.
    pub(crate) fn wait(&mut self, timeout: Duration) -> TaskPoll<M> {
        if self.awaiting_commit {
            return TaskPoll::Pending;
        }
        match self.items.recv_timeout(timeout) {
            Ok(msg) => self.accept(msg),
            Err(RecvTimeoutError::Timeout) => TaskPoll::Pending,
            Err(RecvTimeoutError::Disconnected) => TaskPoll::Finished,
        }
    }

    fn accept(&mut self, msg: TaskMsg<M>) -> TaskPoll<M> {
        match msg {
            TaskMsg::Yield(model) => {
                self.awaiting_commit = true;
                TaskPoll::Yielded(model)
            }
            TaskMsg::Done => TaskPoll::Finished,
            TaskMsg::Failed(error) => TaskPoll::Failed(error),
        }
    }

    /// Let the worker compute its next item.
    pub(crate) fn resume(&mut self) {
        if std::mem::take(&mut self.awaiting_commit) {
            // Capacity 1 and one outstanding resume at most, so this never
            // blocks; an error means the worker already exited.
            let _ = self.resume.try_send(());
        }
    }

    /// Request cancellation. The caller drops the task afterwards, which
    /// closes both channels.
    pub(crate) fn cancel(&self, reason: CancelReason) {
        if self.cancel.cancel(reason) {
            warn!(target: "rebind.task", task = self.id, ?reason, "cancelling async handler");
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the worker thread to exit. Only safe once the worker has
    /// reported `Finished` or `Failed`, or after cancellation with the
    /// channels dropped.
    pub(crate) fn join(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl<M> Drop for AsyncTask<M> {
    fn drop(&mut self) {
        self.cancel.cancel(CancelReason::Dropped);
        // Not joined here: a worker inside a long handler step only notices
        // at its next channel operation.
        if self.thread.is_some() {
            trace!(target: "rebind.task", task = self.id, "detaching async worker");
        }
    }
}

fn run_worker<M: Send + 'static>(
    id: TaskId,
    body: AsyncBody<M>,
    model: M,
    token: CancellationToken,
    items: &SyncSender<TaskMsg<M>>,
    resume: &Receiver<()>,
) {
    let body_token = token.clone();
    let mut stream = match catch_unwind(AssertUnwindSafe(move || body(model, body_token))) {
        Ok(stream) => stream,
        Err(payload) => {
            let _ = items.send(TaskMsg::Failed(HandlerError::from_panic(payload)));
            return;
        }
    };
    let mut yielded = 0_u64;
    loop {
        if let Some(reason) = token.reason() {
            debug!(target: "rebind.task", task = id, yielded, ?reason, "async handler cancelled");
            return;
        }
        let next = catch_unwind(AssertUnwindSafe(|| stream.next()));
        if let Some(reason) = token.reason() {
            debug!(
                target: "rebind.task",
                task = id,
                yielded,
                ?reason,
                "item produced after cancel discarded"
            );
            return;
        }
        match next {
            Ok(Some(Ok(model))) => {
                if items.send(TaskMsg::Yield(model)).is_err() || resume.recv().is_err() {
                    debug!(target: "rebind.task", task = id, yielded, "async handler abandoned");
                    return;
                }
                yielded += 1;
            }
            Ok(None) => {
                debug!(target: "rebind.task", task = id, yielded, "async handler finished");
                let _ = items.send(TaskMsg::Done);
                return;
            }
            Ok(Some(Err(error))) => {
                let _ = items.send(TaskMsg::Failed(error));
                return;
            }
            Err(payload) => {
                let _ = items.send(TaskMsg::Failed(HandlerError::from_panic(payload)));
                return;
            }
        }
    }
}
