#![forbid(unsafe_code)]

//! Value converters between control values and model values.
//!
//! A [`Converter<C, A>`] is a pair of pure functions bridging a control
//! value `C` and a model value `A`. When a binding is declared without one,
//! [`DefaultConvert`] supplies it: identity when the types agree, and a
//! structural converter for option-wrapped model members.
//!
//! Converters that can reject input return `Result` through
//! [`ValidatingConverter`]; a plain converter that meets input it cannot
//! represent is a contract violation and is expected to panic.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Bidirectional pure conversion between control value `C` and model value `A`.
pub struct Converter<C, A> {
    to_control: Rc<dyn Fn(&A) -> C>,
    to_source: Rc<dyn Fn(&C) -> A>,
}

impl<C, A> Clone for Converter<C, A> {
    fn clone(&self) -> Self {
        Self {
            to_control: Rc::clone(&self.to_control),
            to_source: Rc::clone(&self.to_source),
        }
    }
}

impl<C, A> fmt::Debug for Converter<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("control", &std::any::type_name::<C>())
            .field("source", &std::any::type_name::<A>())
            .finish()
    }
}

impl<C: 'static, A: 'static> Converter<C, A> {
    pub fn new(
        to_control: impl Fn(&A) -> C + 'static,
        to_source: impl Fn(&C) -> A + 'static,
    ) -> Self {
        Self {
            to_control: Rc::new(to_control),
            to_source: Rc::new(to_source),
        }
    }

    /// Model value to control value.
    pub fn to_control(&self, value: &A) -> C {
        (self.to_control)(value)
    }

    /// Control value to model value.
    pub fn to_source(&self, value: &C) -> A {
        (self.to_source)(value)
    }
}

/// Model values that know how to present themselves to a `C` control.
///
/// The synthesized set is small:
///
/// - `T` to `T` (identity) for any `Clone` type;
/// - `Option<String>` to `String`, where blank text means `None`.
///
/// Nothing else is implied. A plain `T` control bound to an `Option<T>`
/// member needs an explicit [`option_or`], the reverse needs [`non_null`],
/// and text shown for a number needs [`display`].
pub trait DefaultConvert<C>: Sized {
    fn to_control(&self) -> C;
    fn from_control(control: &C) -> Self;
}

impl<T: Clone> DefaultConvert<T> for T {
    fn to_control(&self) -> T {
        self.clone()
    }

    fn from_control(control: &T) -> T {
        control.clone()
    }
}

/// Optional text shown in a plain text control: blank means `None`.
impl DefaultConvert<String> for Option<String> {
    fn to_control(&self) -> String {
        self.clone().unwrap_or_default()
    }

    fn from_control(control: &String) -> Self {
        (!control.trim().is_empty()).then(|| control.clone())
    }
}

/// The converter synthesized when a binding declares none.
pub fn default_converter<C, A>() -> Converter<C, A>
where
    C: 'static,
    A: DefaultConvert<C> + 'static,
{
    Converter::new(
        <A as DefaultConvert<C>>::to_control,
        <A as DefaultConvert<C>>::from_control,
    )
}

/// Text control to optional text, blank (after trimming) as `None`.
pub fn blank_as_none() -> Converter<String, Option<String>> {
    default_converter()
}

/// Non-nullable control for an optional model value: `None` renders as
/// `fallback`, and every control value is `Some`.
pub fn option_or<T: Clone + 'static>(fallback: T) -> Converter<T, Option<T>> {
    Converter::new(
        move |value: &Option<T>| value.clone().unwrap_or_else(|| fallback.clone()),
        |control: &T| Some(control.clone()),
    )
}

/// Nullable control for a non-optional model value. A null control value
/// cannot be represented and panics; use a validating binding when the
/// control can be cleared.
pub fn non_null<T: Clone + 'static>() -> Converter<Option<T>, T> {
    Converter::new(
        |value: &T| Some(value.clone()),
        |control: &Option<T>| match control {
            Some(value) => value.clone(),
            None => panic!(
                "null control value bound to non-optional `{}` without a validating converter",
                std::any::type_name::<T>()
            ),
        },
    )
}

/// Text rendering of any displayable member. The reverse direction parses
/// and panics on input that does not parse; use [`parse_result`] when the
/// user can type arbitrary text.
pub fn display<T>() -> Converter<String, T>
where
    T: FromStr + fmt::Display + 'static,
    T::Err: fmt::Display,
{
    Converter::new(
        |value: &T| value.to_string(),
        |text: &String| match text.trim().parse::<T>() {
            Ok(value) => value,
            Err(error) => panic!(
                "cannot convert {text:?} to `{}`: {error}",
                std::any::type_name::<T>()
            ),
        },
    )
}

/// Converter whose control-to-model direction can reject input.
pub struct ValidatingConverter<C, T> {
    to_control: Rc<dyn Fn(&T) -> C>,
    to_source: Rc<dyn Fn(&C) -> Result<T, String>>,
}

impl<C, T> Clone for ValidatingConverter<C, T> {
    fn clone(&self) -> Self {
        Self {
            to_control: Rc::clone(&self.to_control),
            to_source: Rc::clone(&self.to_source),
        }
    }
}

impl<C, T> fmt::Debug for ValidatingConverter<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatingConverter")
            .field("control", &std::any::type_name::<C>())
            .field("source", &std::any::type_name::<T>())
            .finish()
    }
}

impl<C: 'static, T: 'static> ValidatingConverter<C, T> {
    pub fn new(
        to_control: impl Fn(&T) -> C + 'static,
        to_source: impl Fn(&C) -> Result<T, String> + 'static,
    ) -> Self {
        Self {
            to_control: Rc::new(to_control),
            to_source: Rc::new(to_source),
        }
    }

    pub fn to_control(&self, value: &T) -> C {
        (self.to_control)(value)
    }

    pub fn to_source(&self, value: &C) -> Result<T, String> {
        (self.to_source)(value)
    }
}

/// Text control parsed into `T`; parse failures become the error message.
pub fn parse_result<T>() -> ValidatingConverter<String, T>
where
    T: FromStr + fmt::Display + 'static,
    T::Err: fmt::Display,
{
    ValidatingConverter::new(
        |value: &T| value.to_string(),
        |text: &String| text.trim().parse::<T>().map_err(|e| e.to_string()),
    )
}

/// Text control validated by `check` without changing type.
pub fn validate_text(
    check: impl Fn(&str) -> Result<(), String> + 'static,
) -> ValidatingConverter<String, String> {
    ValidatingConverter::new(String::clone, move |text: &String| {
        check(text).map(|()| text.clone())
    })
}
