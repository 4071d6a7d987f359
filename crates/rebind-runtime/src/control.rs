#![forbid(unsafe_code)]

//! Control capabilities consumed by bindings.
//!
//! Toolkit adapters implement these traits for each bindable control
//! property (a text box's text, a check box's checked state, ...). Whether a
//! control can act as a change source is a trait bound, checked when the
//! binding is declared, not a run-time type test.

use crate::notify::Subscription;

/// Broad category of a control, used to pick the default update trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Free text entry.
    Text,
    /// Check boxes, toggle buttons, radio buttons.
    Toggle,
    /// Combo boxes, list selection.
    Selection,
    /// Sliders, spinners.
    Range,
    Other,
}

/// When a control-originated edit is written to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config-file", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(rename_all = "snake_case"))]
pub enum UpdateTrigger {
    /// On every change event (keystroke, click).
    OnChange,
    /// When the control commits its value (focus loss, validation).
    OnValidation,
}

impl UpdateTrigger {
    /// `OnChange` for toggle-like and selection controls, `OnValidation`
    /// for everything else.
    #[must_use]
    pub fn default_for(kind: ControlKind) -> Self {
        match kind {
            ControlKind::Toggle | ControlKind::Selection => Self::OnChange,
            ControlKind::Text | ControlKind::Range | ControlKind::Other => Self::OnValidation,
        }
    }
}

/// A readable and writable control property.
pub trait ControlProperty: 'static {
    type Value: Clone + PartialEq + 'static;

    /// Category used for the default trigger.
    const KIND: ControlKind = ControlKind::Other;

    /// Short name for diagnostics, e.g. `"name_box.text"`.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }

    fn get(&self) -> Self::Value;

    /// Write `value` into the control. Adapters may fire their native change
    /// event from here; the change proxy suppresses it.
    fn set(&self, value: Self::Value);
}

/// A control property that reports user edits.
pub trait ObservableControl: ControlProperty {
    /// Call `on_change` with the new value whenever the user edits the
    /// property, at the moments `trigger` selects.
    fn subscribe(
        &self,
        trigger: UpdateTrigger,
        on_change: Box<dyn Fn(Self::Value)>,
    ) -> Subscription;
}
