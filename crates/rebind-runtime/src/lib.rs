#![forbid(unsafe_code)]

//! Rebind Runtime
//!
//! The reconciliation engine: it binds GUI control properties to members of
//! an immutable model and keeps the two consistent as the user edits
//! controls and as event handlers produce new models.
//!
//! # Key Components
//!
//! - [`start`] / [`Session`] - run the binder once and wire a fresh engine
//! - [`Binding`] - one declared control-to-model relationship
//! - [`ChangeProxy`] - per-control value holder that suppresses echoes
//! - [`Handler`] - sync `Model -> Model` or async `Model -> stream of Model`
//! - [`ModelSignal`] - the latest committed model, observable and readable
//!   from any thread
//! - [`EngineConfig`] / [`EnginePolicy`] - error hook, toolkit adapter and
//!   tunables for one engine
//!
//! # Role in rebind
//! `rebind-core` knows how to diff and rebuild models. This crate owns the
//! canonical model, serializes view changes, logical events and async
//! handler items through a single queue on the UI thread, and pushes each
//! commit to exactly the bindings whose members changed.
//!
//! # Threading
//! Everything here except async handler bodies and [`ModelReader`] lives on
//! the UI thread and is `!Send`. Async handlers run on named worker
//! threads; their items are committed when the UI thread calls
//! [`Session::pump`] or [`Session::pump_until_idle`].

pub mod binding;
pub mod cancellation;
pub mod config;
pub mod control;
pub mod convert;
mod engine;
pub mod events;
pub mod handler;
pub mod index;
pub mod notify;
pub mod proxy;
mod session;
pub mod signal;
mod task;

pub use binding::{
    BindError, Binding, BindingDescriptor, Direction, ModelPart, ToolkitAdapter, ViewPart,
    control_part, model_part,
};
pub use cancellation::{CancelReason, CancellationSource, CancellationToken};
pub use config::{ConfigError, EngineConfig, EnginePolicy, SupersedePolicy};
pub use control::{ControlKind, ControlProperty, ObservableControl, UpdateTrigger};
pub use convert::{
    Converter, DefaultConvert, ValidatingConverter, blank_as_none, default_converter, display,
    non_null, option_or, parse_result, validate_text,
};
pub use engine::{EngineState, EngineStats};
pub use events::{EventSource, EventStream};
pub use handler::{BoxError, Handler, HandlerError, ModelStream};
pub use index::BindingIndex;
pub use notify::{Notifier, Subscription};
pub use proxy::ChangeProxy;
pub use session::{Session, start};
pub use signal::{ModelReader, ModelSignal};
pub use task::TaskId;

pub use rebind_core::{
    Change, PropertyChain, Record, Schema, Selector, TypedChain, Value, path, schema,
};
