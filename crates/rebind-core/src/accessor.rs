#![forbid(unsafe_code)]

//! Single-hop field accessors and erased record field sets.
//!
//! An [`Accessor`] is the statically-typed getter/setter pair for one member
//! of one record type, erased behind [`FieldAccess`] so that chains can hop
//! across records of different types. Accessors are produced by
//! [`Schema`](crate::Schema) builders; they are never looked up by name at
//! run time once a chain has been resolved.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use crate::error::ChainError;
use crate::record::Record;
use crate::value::{AnyValue, Value};

/// Whether a member is a constructor parameter or derived from others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Primary constructor parameter: diffed, permuted, may be nested.
    Stored,
    /// Derived member: read-only, always recomputed by the record itself.
    Computed,
}

/// Identity of an accessor: the owning record type plus the member name.
#[derive(Clone, Copy)]
pub struct AccessorId {
    owner: TypeId,
    owner_name: &'static str,
    field: &'static str,
}

impl AccessorId {
    #[must_use]
    pub fn of<R: 'static>(field: &'static str) -> Self {
        Self {
            owner: TypeId::of::<R>(),
            owner_name: std::any::type_name::<R>(),
            field,
        }
    }

    #[must_use]
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    #[must_use]
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    #[must_use]
    pub fn field(&self) -> &'static str {
        self.field
    }
}

impl PartialEq for AccessorId {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.field == other.field
    }
}

impl Eq for AccessorId {}

impl Hash for AccessorId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.field.hash(state);
    }
}

impl fmt::Debug for AccessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", short_type_name(self.owner_name), self.field)
    }
}

/// Erased getter/setter for one member of one record type.
pub trait FieldAccess: Send + Sync {
    fn id(&self) -> AccessorId;
    fn kind(&self) -> FieldKind;
    /// `TypeId` and name of the member's value type.
    fn value_type(&self) -> (TypeId, &'static str);
    fn get(&self, owner: &dyn AnyValue) -> Result<Value, ChainError>;
    /// Assign in place on an owned copy of the record.
    fn set(&self, owner: &mut dyn AnyValue, value: Value) -> Result<(), ChainError>;
    /// Field set of the member's type when it is a nested record.
    fn nested(&self) -> Option<&Fields>;
}

/// Shared handle to one [`FieldAccess`].
#[derive(Clone)]
pub struct Accessor {
    inner: Arc<dyn FieldAccess>,
}

impl Accessor {
    #[must_use]
    pub fn new(access: impl FieldAccess + 'static) -> Self {
        Self {
            inner: Arc::new(access),
        }
    }

    #[must_use]
    pub fn id(&self) -> AccessorId {
        self.inner.id()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.id().field()
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.inner.kind()
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.kind() == FieldKind::Computed
    }

    #[must_use]
    pub fn value_type(&self) -> (TypeId, &'static str) {
        self.inner.value_type()
    }

    pub fn get(&self, owner: &Value) -> Result<Value, ChainError> {
        self.inner.get(owner.as_dyn())
    }

    pub fn set(&self, owner: &mut dyn AnyValue, value: Value) -> Result<(), ChainError> {
        self.inner.set(owner, value)
    }

    /// Nested record fields, only for stored record-typed members.
    #[must_use]
    pub fn nested(&self) -> Option<&Fields> {
        self.inner.nested()
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Accessor {}

impl Hash for Accessor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.id(), f)
    }
}

type Getter<R, A> = Box<dyn Fn(&R) -> A + Send + Sync>;
type Setter<R, A> = Box<dyn Fn(&mut R, A) + Send + Sync>;

/// Lazily built field set for a nested record type.
struct NestedFields {
    load: fn() -> Fields,
    cache: OnceLock<Fields>,
}

impl NestedFields {
    fn get(&self) -> &Fields {
        self.cache.get_or_init(self.load)
    }
}

/// Typed accessor for member `A` of record `R`.
pub(crate) struct TypedField<R, A> {
    name: &'static str,
    kind: FieldKind,
    get: Getter<R, A>,
    set: Option<Setter<R, A>>,
    nested: Option<NestedFields>,
    _marker: PhantomData<fn(&R) -> A>,
}

impl<R, A> TypedField<R, A>
where
    R: Record,
    A: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    pub(crate) fn stored(name: &'static str, get: Getter<R, A>, set: Setter<R, A>) -> Self {
        Self {
            name,
            kind: FieldKind::Stored,
            get,
            set: Some(set),
            nested: None,
            _marker: PhantomData,
        }
    }

    pub(crate) fn computed(name: &'static str, get: Getter<R, A>) -> Self {
        Self {
            name,
            kind: FieldKind::Computed,
            get,
            set: None,
            nested: None,
            _marker: PhantomData,
        }
    }

    fn owner<'a>(&self, owner: &'a dyn AnyValue) -> Result<&'a R, ChainError> {
        owner
            .as_any()
            .downcast_ref::<R>()
            .ok_or(ChainError::OwnerMismatch {
                field: self.name,
                expected: std::any::type_name::<R>(),
                found: owner.type_name(),
            })
    }
}

impl<R, A> TypedField<R, A>
where
    R: Record,
    A: Record,
{
    pub(crate) fn nested_record(
        name: &'static str,
        get: Getter<R, A>,
        set: Setter<R, A>,
    ) -> Self {
        let mut field = Self::stored(name, get, set);
        field.nested = Some(NestedFields {
            load: Fields::of::<A>,
            cache: OnceLock::new(),
        });
        field
    }
}

impl<R, A> FieldAccess for TypedField<R, A>
where
    R: Record,
    A: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn id(&self) -> AccessorId {
        AccessorId::of::<R>(self.name)
    }

    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn value_type(&self) -> (TypeId, &'static str) {
        (TypeId::of::<A>(), std::any::type_name::<A>())
    }

    fn get(&self, owner: &dyn AnyValue) -> Result<Value, ChainError> {
        let owner = self.owner(owner)?;
        Ok(Value::new((self.get)(owner)))
    }

    fn set(&self, owner: &mut dyn AnyValue, value: Value) -> Result<(), ChainError> {
        let Some(set) = &self.set else {
            return Err(ChainError::ReadOnly { field: self.name });
        };
        let found = owner.type_name();
        let owner = owner
            .as_any_mut()
            .downcast_mut::<R>()
            .ok_or(ChainError::OwnerMismatch {
                field: self.name,
                expected: std::any::type_name::<R>(),
                found,
            })?;
        let value = value.downcast::<A>().ok_or(ChainError::ValueMismatch {
            field: self.name,
            expected: std::any::type_name::<A>(),
            found: value.type_name(),
        })?;
        set(owner, value);
        Ok(())
    }

    fn nested(&self) -> Option<&Fields> {
        self.nested.as_ref().map(NestedFields::get)
    }
}

/// The erased, ordered member set of one record type.
#[derive(Clone)]
pub struct Fields {
    ty: &'static str,
    type_id: TypeId,
    accessors: Arc<[Accessor]>,
}

impl Fields {
    pub(crate) fn new(ty: &'static str, type_id: TypeId, accessors: Vec<Accessor>) -> Self {
        Self {
            ty,
            type_id,
            accessors: accessors.into(),
        }
    }

    /// Build the field set of `R` from its schema.
    #[must_use]
    pub fn of<R: Record>() -> Self {
        R::schema().into_fields()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.ty
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Every member, in declaration order.
    #[must_use]
    pub fn all(&self) -> &[Accessor] {
        &self.accessors
    }

    /// Constructor-parameter members, in declaration order.
    pub fn stored(&self) -> impl Iterator<Item = &Accessor> {
        self.accessors.iter().filter(|a| !a.is_computed())
    }

    /// Computed members, in declaration order.
    pub fn computed(&self) -> impl Iterator<Item = &Accessor> {
        self.accessors.iter().filter(|a| a.is_computed())
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Accessor> {
        self.accessors.iter().find(|a| a.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl fmt::Debug for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fields")
            .field("type", &short_type_name(self.ty))
            .field("accessors", &self.accessors)
            .finish()
    }
}

/// `a::b::Team` -> `Team`, keeping generic arguments intact.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
