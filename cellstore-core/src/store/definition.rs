//! Store Builder
//!
//! A [`Definition`] is the flat description a store is built from: a list of
//! named fields, each tagged as a base value, a derived getter, or an action.
//! The tag is fixed when the field is declared; nothing is inferred later.
//!
//! Building consumes the definition. The resulting field set is closed: a
//! built store cannot grow new fields.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::action::{ActionEntry, ActionFn, Partial};
use super::runtime::{Slot, Store, StoreInner};
use super::view::{ActionView, ReadView};
use super::FieldValue;
use crate::config::StoreOptions;
use crate::error::{Result, StoreError};
use crate::graph::{FieldId, FieldKind};
use crate::reactive::{BaseCell, DerivedCell, Getter};

/// One declared field.
pub enum FieldSpec<V> {
    /// A stored value with its initial value.
    Base(V),
    /// A cached getter.
    Derived(Getter<V>),
    /// A mutating entry point.
    Action(ActionEntry<V>),
}

impl<V> FieldSpec<V> {
    /// The kind tag of this field.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldSpec::Base(_) => FieldKind::Base,
            FieldSpec::Derived(_) => FieldKind::Derived,
            FieldSpec::Action(_) => FieldKind::Action,
        }
    }
}

/// Builder for a [`Store`].
///
/// # Example
///
/// ```rust
/// use cellstore_core::{Definition, Partial};
///
/// let store = Definition::new()
///     .value("a", 1_i64)
///     .value("b", 2_i64)
///     .derived("sum", |s| Ok(s.get("a")? + s.get("b")?))
///     .action("update_values", |_, args| {
///         Ok(Some(Partial::new().set("a", args[0]).set("b", args[1])))
///     })
///     .build()?;
///
/// store.invoke("update_values", &[3, 4])?;
/// assert_eq!(store.read("sum")?, 7);
/// # Ok::<(), cellstore_core::StoreError>(())
/// ```
pub struct Definition<V> {
    fields: IndexMap<String, FieldSpec<V>>,
    duplicates: Vec<String>,
    options: StoreOptions,
}

impl<V: FieldValue> Definition<V> {
    /// An empty definition with default options.
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
            duplicates: Vec::new(),
            options: StoreOptions::default(),
        }
    }

    /// Replace the store options.
    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Declare a base field with its initial value.
    pub fn value(self, key: impl Into<String>, value: V) -> Self {
        self.field(key, FieldSpec::Base(value))
    }

    /// Declare a derived field.
    ///
    /// The getter runs lazily, on first read, and again only when something
    /// it read has changed.
    pub fn derived<F>(self, key: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&ReadView<'_, V>) -> Result<V> + Send + Sync + 'static,
    {
        self.field(key, FieldSpec::Derived(Arc::new(getter)))
    }

    /// Declare an action accepting any number of arguments.
    pub fn action<F>(self, key: impl Into<String>, run: F) -> Self
    where
        F: Fn(&mut ActionView<'_, V>, &[V]) -> Result<Option<Partial<V>>> + Send + Sync + 'static,
    {
        let run: ActionFn<V> = Arc::new(run);
        self.field(key, FieldSpec::Action(ActionEntry::new(run, None)))
    }

    /// Declare an action that must be called with exactly `arity` arguments.
    pub fn action_with_arity<F>(self, key: impl Into<String>, arity: usize, run: F) -> Self
    where
        F: Fn(&mut ActionView<'_, V>, &[V]) -> Result<Option<Partial<V>>> + Send + Sync + 'static,
    {
        let run: ActionFn<V> = Arc::new(run);
        self.field(key, FieldSpec::Action(ActionEntry::new(run, Some(arity))))
    }

    /// Declare a field from an explicit [`FieldSpec`].
    ///
    /// Declaring a key twice makes the definition invalid; `build` reports it.
    pub fn field(mut self, key: impl Into<String>, spec: FieldSpec<V>) -> Self {
        let key = key.into();
        if self.fields.contains_key(&key) {
            self.duplicates.push(key);
        } else {
            self.fields.insert(key, spec);
        }
        self
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field has been declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared keys with their kinds, in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(key, spec)| (key.as_str(), spec.kind()))
    }

    /// Build the store.
    pub fn build(self) -> Result<Store<V>> {
        let Definition {
            fields,
            duplicates,
            options,
        } = self;

        if let Some(key) = duplicates.into_iter().next() {
            return Err(StoreError::DuplicateField(key));
        }
        check_field_count(fields.len())?;

        let mut base = Vec::new();
        let mut derived = 0usize;
        let mut actions = 0usize;
        let slots: IndexMap<String, Slot<V>> = fields
            .into_iter()
            .map(|(key, spec)| {
                let slot = match spec {
                    FieldSpec::Base(value) => {
                        base.push(BaseCell::new(value));
                        Slot::Base(base.len() - 1)
                    }
                    FieldSpec::Derived(getter) => {
                        derived += 1;
                        Slot::Derived(DerivedCell::new(getter))
                    }
                    FieldSpec::Action(entry) => {
                        actions += 1;
                        Slot::Action(entry)
                    }
                };
                (key, slot)
            })
            .collect();

        debug!(
            store = %options.name,
            base = base.len(),
            derived,
            actions,
            "built store"
        );

        let inner = StoreInner::new(options, slots, base);
        Ok(Store::from_inner(Arc::new(inner)))
    }
}

impl<V: FieldValue> Default for Definition<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every field needs a `FieldId`, so the count must fit in one.
fn check_field_count(count: usize) -> Result<()> {
    match count.checked_sub(1).map(FieldId::from_index) {
        Some(None) => Err(StoreError::TooManyFields(count)),
        _ => Ok(()),
    }
}

/// Build a store from a definition.
pub fn create_store<V: FieldValue>(definition: Definition<V>) -> Result<Store<V>> {
    definition.build()
}
