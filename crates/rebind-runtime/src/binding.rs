#![forbid(unsafe_code)]

//! Binding descriptors: declared links between control properties and
//! model property chains.
//!
//! A binder function returns a `Vec<Binding<M>>`. Each binding is built from
//! a [`ViewPart`] (a control property, with its capabilities checked by
//! trait bounds) and one or more [`ModelPart`]s (typed property chains),
//! merged with a [`Direction`]:
//!
//! | Constructor | Direction | View-change source |
//! |---|---|---|
//! | [`Binding::from_parts`] / [`Binding::from_parts_with`] | any | if `TwoWay` / `ToModel` |
//! | [`Binding::one_way`] | `ToView` | never |
//! | [`Binding::validated`] | `TwoWay` / `ToModel` | yes |
//! | [`Binding::multi_bind2`] / [`Binding::multi_bind3`] | `ToView` | never |
//! | [`Binding::callback`] | `ToView` | never |
//! | [`Binding::items`] | `ToView` | never |
//!
//! # Invariants
//!
//! 1. A binding that can report view changes targets exactly one writable
//!    chain; multi-property bindings are model-to-view by construction.
//! 2. Once built, a binding is immutable.
//! 3. Every converter runs on the UI thread; a converter panic propagates.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use rebind_core::{
    ChainError, FieldValue, PathError, PropertyChain, Record, Selector, TypedChain, Value,
    resolve_typed,
};

use crate::config::ConfigError;
use crate::control::{ControlProperty, ObservableControl, UpdateTrigger};
use crate::convert::{Converter, DefaultConvert, ValidatingConverter, default_converter};
use crate::notify::Subscription;
use crate::proxy::ChangeProxy;

/// Declaration-time binding errors. Binders run once at start, so every
/// one of these is a programmer mistake surfaced before the view goes live.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("binding `{label}` writes to read-only chain `{chain}`")]
    ReadOnlyTarget { label: String, chain: String },
    #[error("binding `{label}` must observe the view but was declared `{direction:?}`")]
    NotAViewSource { label: String, direction: Direction },
    #[error("model `{model}` schema is invalid: {source}")]
    Schema {
        model: &'static str,
        #[source]
        source: rebind_core::SchemaError,
    },
    #[error("engine policy is invalid: {0}")]
    Policy(#[source] ConfigError),
    #[error("initial value for binding `{label}` could not be read: {source}")]
    InitialValue {
        label: String,
        #[source]
        source: ChainError,
    },
}

/// Which way values flow through a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    TwoWay(Option<UpdateTrigger>),
    ToModel(Option<UpdateTrigger>),
    ToView,
}

impl Direction {
    /// Whether control edits flow into the model.
    #[must_use]
    pub fn observes_view(self) -> bool {
        matches!(self, Self::TwoWay(_) | Self::ToModel(_))
    }

    /// Whether model changes flow into the control.
    #[must_use]
    pub fn writes_view(self) -> bool {
        matches!(self, Self::TwoWay(_) | Self::ToView)
    }

    fn explicit_trigger(self) -> Option<UpdateTrigger> {
        match self {
            Self::TwoWay(trigger) | Self::ToModel(trigger) => trigger,
            Self::ToView => None,
        }
    }

    /// The trigger actually used for a control of `C`'s kind, if the
    /// direction observes the view at all.
    #[must_use]
    pub fn effective_trigger<C: ControlProperty>(self) -> Option<UpdateTrigger> {
        self.observes_view().then(|| {
            self.explicit_trigger()
                .unwrap_or_else(|| UpdateTrigger::default_for(C::KIND))
        })
    }
}

/// The control side of a binding.
pub struct ViewPart<C> {
    control: C,
    name: String,
}

impl<C: ControlProperty> ViewPart<C> {
    #[must_use]
    pub fn new(control: C) -> Self {
        let name = control.describe();
        Self { control, name }
    }

    /// Override the diagnostic name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C> fmt::Debug for ViewPart<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewPart").field("name", &self.name).finish()
    }
}

/// Control side of a binding. Whether `C` can be a change source is decided
/// by the constructor it is later passed to.
pub fn control_part<C: ControlProperty>(control: C) -> ViewPart<C> {
    ViewPart::new(control)
}

/// The model side of a binding: a typed chain from `M` to an `A` leaf.
pub struct ModelPart<M, A> {
    chain: TypedChain<M, A>,
}

impl<M, A> Clone for ModelPart<M, A> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
        }
    }
}

impl<M, A> fmt::Debug for ModelPart<M, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelPart").field(&self.chain).finish()
    }
}

impl<M: Record, A: FieldValue> ModelPart<M, A> {
    #[must_use]
    pub fn chain(&self) -> &TypedChain<M, A> {
        &self.chain
    }
}

impl<M, A> From<TypedChain<M, A>> for ModelPart<M, A> {
    fn from(chain: TypedChain<M, A>) -> Self {
        Self { chain }
    }
}

/// Resolve the model side of a binding from a member path such as
/// `"home.score"`.
pub fn model_part<M: Record, A: FieldValue>(expr: &str) -> Result<ModelPart<M, A>, PathError> {
    resolve_typed::<M, A>(expr).map(ModelPart::from)
}

/// Public description of a binding, handed to the toolkit adapter at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDescriptor {
    pub index: usize,
    pub label: String,
    pub chains: Vec<PropertyChain>,
    pub direction: Direction,
    /// `None` when the binding never observes the view.
    pub trigger: Option<UpdateTrigger>,
    pub observes_view: bool,
}

/// Toolkit-specific wiring performed once per binding at start.
///
/// Adapters use this to create native binding objects, decorate controls,
/// or log the wiring; the engine's own wiring is already in place.
pub trait ToolkitAdapter {
    fn wire(&self, descriptor: &BindingDescriptor);
}

impl<F: Fn(&BindingDescriptor)> ToolkitAdapter for F {
    fn wire(&self, descriptor: &BindingDescriptor) {
        self(descriptor);
    }
}

type ViewSource = Box<dyn Fn(Box<dyn Fn(Value)>) -> Subscription>;
type SetView = Box<dyn Fn(&[Value]) -> Result<(), ChainError>>;

/// One declared binding over model type `M`.
pub struct Binding<M> {
    label: String,
    chains: Vec<PropertyChain>,
    direction: Direction,
    trigger: Option<UpdateTrigger>,
    view_source: Option<ViewSource>,
    set_view: Option<SetView>,
    _model: PhantomData<fn(&M)>,
}

impl<M> fmt::Debug for Binding<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("label", &self.label)
            .field("chains", &self.chains)
            .field("direction", &self.direction)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

fn require_writable(label: &str, chain: &PropertyChain) -> Result<(), BindError> {
    if chain.is_writable() {
        Ok(())
    } else {
        Err(BindError::ReadOnlyTarget {
            label: label.to_owned(),
            chain: chain.path(),
        })
    }
}

impl<M: Record> Binding<M> {
    /// Bind `view` to `source` with the default converter for the pair.
    pub fn from_parts<C, A>(
        view: ViewPart<C>,
        source: ModelPart<M, A>,
        direction: Direction,
    ) -> Result<Self, BindError>
    where
        C: ObservableControl,
        A: FieldValue + DefaultConvert<C::Value>,
    {
        Self::from_parts_with(view, source, default_converter(), direction)
    }

    /// Bind `view` to `source` through `converter`.
    pub fn from_parts_with<C, A>(
        view: ViewPart<C>,
        source: ModelPart<M, A>,
        converter: Converter<C::Value, A>,
        direction: Direction,
    ) -> Result<Self, BindError>
    where
        C: ObservableControl,
        A: FieldValue,
    {
        let arrow = match direction {
            Direction::TwoWay(_) => "<->",
            Direction::ToModel(_) => "->",
            Direction::ToView => "<-",
        };
        let label = format!("{} {arrow} {}", view.name, source.chain.chain());
        if direction.observes_view() {
            require_writable(&label, source.chain.chain())?;
        }
        let trigger = direction.effective_trigger::<C>();
        let proxy = match trigger {
            Some(trigger) => ChangeProxy::attach(view.control, trigger),
            None => ChangeProxy::detached(view.control),
        };

        let view_source = trigger.map(|_| {
            let proxy = proxy.clone();
            let converter = converter.clone();
            Box::new(move |sink: Box<dyn Fn(Value)>| {
                let converter = converter.clone();
                proxy.on_view_changed(move |control| sink(Value::new(converter.to_source(control))))
            }) as ViewSource
        });

        let set_view = direction.writes_view().then(|| {
            let chain = source.chain.clone();
            Box::new(move |values: &[Value]| {
                let model = chain.value_of(&values[0])?;
                proxy.set_view(converter.to_control(&model));
                Ok(())
            }) as SetView
        });

        Ok(Self {
            label,
            chains: vec![source.chain.erase()],
            direction,
            trigger,
            view_source,
            set_view,
            _model: PhantomData,
        })
    }

    /// Model-to-view binding for a control that cannot report edits.
    pub fn one_way<C, A>(view: ViewPart<C>, source: ModelPart<M, A>) -> Self
    where
        C: ControlProperty,
        A: FieldValue + DefaultConvert<C::Value>,
    {
        Self::one_way_with(view, source, default_converter())
    }

    /// Model-to-view binding through `converter`. Only its `to_control`
    /// half is ever used.
    pub fn one_way_with<C, A>(
        view: ViewPart<C>,
        source: ModelPart<M, A>,
        converter: Converter<C::Value, A>,
    ) -> Self
    where
        C: ControlProperty,
        A: FieldValue,
    {
        let label = format!("{} <- {}", view.name, source.chain.chain());
        let proxy = ChangeProxy::detached(view.control);
        let chain = source.chain.clone();
        Self {
            label,
            chains: vec![source.chain.erase()],
            direction: Direction::ToView,
            trigger: None,
            view_source: None,
            set_view: Some(Box::new(move |values: &[Value]| {
                let model = chain.value_of(&values[0])?;
                proxy.set_view(converter.to_control(&model));
                Ok(())
            })),
            _model: PhantomData,
        }
    }

    /// Validation-aware binding. The model member holds the conversion
    /// result, so an invalid entry still reaches the model as `Err`.
    /// `on_error` receives the error text, or `None` once the value is
    /// valid again, after every conversion in either direction.
    pub fn validated<C, T>(
        view: ViewPart<C>,
        source: ModelPart<M, Result<T, String>>,
        converter: ValidatingConverter<C::Value, T>,
        direction: Direction,
        on_error: impl Fn(Option<&str>) + 'static,
    ) -> Result<Self, BindError>
    where
        C: ObservableControl,
        T: FieldValue,
    {
        let label = format!("{} <-? {}", view.name, source.chain.chain());
        let Some(trigger) = direction.effective_trigger::<C>() else {
            return Err(BindError::NotAViewSource { label, direction });
        };
        require_writable(&label, source.chain.chain())?;
        let on_error: Rc<dyn Fn(Option<&str>)> = Rc::new(on_error);
        let proxy = ChangeProxy::attach(view.control, trigger);

        let view_source = {
            let proxy = proxy.clone();
            let converter = converter.clone();
            let on_error = Rc::clone(&on_error);
            Box::new(move |sink: Box<dyn Fn(Value)>| {
                let converter = converter.clone();
                let on_error = Rc::clone(&on_error);
                proxy.on_view_changed(move |control| {
                    let result = converter.to_source(control);
                    on_error(result.as_ref().err().map(String::as_str));
                    sink(Value::new(result));
                })
            }) as ViewSource
        };

        let set_view = direction.writes_view().then(|| {
            let chain = source.chain.clone();
            Box::new(move |values: &[Value]| {
                match chain.value_of(&values[0])? {
                    Ok(model) => {
                        proxy.set_view(converter.to_control(&model));
                        on_error(None);
                    }
                    // The control keeps the rejected text the user typed.
                    Err(message) => on_error(Some(message.as_str())),
                }
                Ok(())
            }) as SetView
        });

        Ok(Self {
            label,
            chains: vec![source.chain.erase()],
            direction,
            trigger: Some(trigger),
            view_source: Some(view_source),
            set_view,
            _model: PhantomData,
        })
    }

    /// One control fed from two model members.
    pub fn multi_bind2<C, A, B>(
        view: ViewPart<C>,
        first: ModelPart<M, A>,
        second: ModelPart<M, B>,
        to_control: impl Fn(&A, &B) -> C::Value + 'static,
    ) -> Self
    where
        C: ControlProperty,
        A: FieldValue,
        B: FieldValue,
    {
        let label = format!(
            "{} <- ({}, {})",
            view.name,
            first.chain.chain(),
            second.chain.chain()
        );
        let proxy = ChangeProxy::detached(view.control);
        let (a, b) = (first.chain.clone(), second.chain.clone());
        Self {
            label,
            chains: vec![first.chain.erase(), second.chain.erase()],
            direction: Direction::ToView,
            trigger: None,
            view_source: None,
            set_view: Some(Box::new(move |values: &[Value]| {
                let (a, b) = (a.value_of(&values[0])?, b.value_of(&values[1])?);
                proxy.set_view(to_control(&a, &b));
                Ok(())
            })),
            _model: PhantomData,
        }
    }

    /// One control fed from three model members.
    pub fn multi_bind3<C, A, B, D>(
        view: ViewPart<C>,
        first: ModelPart<M, A>,
        second: ModelPart<M, B>,
        third: ModelPart<M, D>,
        to_control: impl Fn(&A, &B, &D) -> C::Value + 'static,
    ) -> Self
    where
        C: ControlProperty,
        A: FieldValue,
        B: FieldValue,
        D: FieldValue,
    {
        let label = format!(
            "{} <- ({}, {}, {})",
            view.name,
            first.chain.chain(),
            second.chain.chain(),
            third.chain.chain()
        );
        let proxy = ChangeProxy::detached(view.control);
        let (a, b, d) = (
            first.chain.clone(),
            second.chain.clone(),
            third.chain.clone(),
        );
        Self {
            label,
            chains: vec![
                first.chain.erase(),
                second.chain.erase(),
                third.chain.erase(),
            ],
            direction: Direction::ToView,
            trigger: None,
            view_source: None,
            set_view: Some(Box::new(move |values: &[Value]| {
                let (a, b, d) = (
                    a.value_of(&values[0])?,
                    b.value_of(&values[1])?,
                    d.value_of(&values[2])?,
                );
                proxy.set_view(to_control(&a, &b, &d));
                Ok(())
            })),
            _model: PhantomData,
        }
    }

    /// Run `effect` with the member's value whenever it changes. No control
    /// is involved.
    pub fn callback<A: FieldValue>(source: ModelPart<M, A>, effect: impl Fn(&A) + 'static) -> Self {
        let label = format!("callback({})", source.chain.chain());
        let chain = source.chain.clone();
        Self {
            label,
            chains: vec![source.chain.erase()],
            direction: Direction::ToView,
            trigger: None,
            view_source: None,
            set_view: Some(Box::new(move |values: &[Value]| {
                effect(&chain.value_of(&values[0])?);
                Ok(())
            })),
            _model: PhantomData,
        }
    }

    /// Populate a list control with `(value, display)` pairs projected from
    /// each item of a list member.
    pub fn items<C, I, V, D>(
        view: ViewPart<C>,
        list: ModelPart<M, Vec<I>>,
        selector: Selector<I, V, D>,
    ) -> Self
    where
        C: ControlProperty<Value = Vec<(V, D)>>,
        I: Record,
        V: FieldValue,
        D: FieldValue,
    {
        let label = format!("{} <- items({}) {selector:?}", view.name, list.chain.chain());
        let proxy = ChangeProxy::detached(view.control);
        let chain = list.chain.clone();
        Self {
            label,
            chains: vec![list.chain.erase()],
            direction: Direction::ToView,
            trigger: None,
            view_source: None,
            set_view: Some(Box::new(move |values: &[Value]| {
                let items = chain.value_of(&values[0])?;
                let pairs = items
                    .iter()
                    .map(|item| selector.project(item))
                    .collect::<Result<Vec<_>, _>>()?;
                proxy.set_view(pairs);
                Ok(())
            })),
            _model: PhantomData,
        }
    }

    /// Replace the diagnostic label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn chains(&self) -> &[PropertyChain] {
        &self.chains
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn observes_view(&self) -> bool {
        self.view_source.is_some()
    }

    #[must_use]
    pub fn writes_view(&self) -> bool {
        self.set_view.is_some()
    }

    #[must_use]
    pub fn descriptor(&self, index: usize) -> BindingDescriptor {
        BindingDescriptor {
            index,
            label: self.label.clone(),
            chains: self.chains.clone(),
            direction: self.direction,
            trigger: self.trigger,
            observes_view: self.observes_view(),
        }
    }

    /// Route view changes to `sink` as model-side leaf values.
    pub(crate) fn subscribe_view(&self, sink: Box<dyn Fn(Value)>) -> Option<Subscription> {
        self.view_source.as_ref().map(|source| source(sink))
    }

    /// Push the values of every bound chain, read from `model`, into the
    /// control. Returns `false` when the binding never writes the view.
    pub(crate) fn push(&self, model: &Value) -> Result<bool, ChainError> {
        let Some(set_view) = &self.set_view else {
            return Ok(false);
        };
        let values = self
            .chains
            .iter()
            .map(|chain| chain.get(model))
            .collect::<Result<Vec<_>, _>>()?;
        set_view(&values)?;
        Ok(true)
    }
}
