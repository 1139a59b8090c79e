// ============================================================================
// spark-dom - Reactive Containers
// Plain JSON-shaped data with per-key dependency tracking
// ============================================================================
//
// A `Reactive` owns an object or an array of values. Every key read under
// tracking gets its own `Dep`; writing the key notifies exactly the reactions
// that read it. Nested objects/arrays stay plain until first read through
// `child()`, at which point they are wrapped once and the wrapper is cached
// in place, so repeated reads return the same container.
//
// Two synthetic keys exist besides the data keys:
// - `length` (arrays): read by `len()`, written by every structural change
// - the iteration key: read by `keys()`/`snapshot()`, written whenever the
//   key set changes
// ============================================================================

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::core::context::is_tracking;
use crate::core::types::{AnySource, Dep};
use crate::primitives::computed::{computed, Computed};
use crate::primitives::effect::Effect;
use crate::primitives::watch::watch;
use crate::reactivity::batching::{batch, untrack};
use crate::reactivity::tracking::{notify_write, track_read, writes_allowed};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Synthetic key notified by every structural array change
pub const LENGTH_KEY: &str = "length";

/// Synthetic key for "the set of keys" (iteration, `has`, `keys`)
pub(crate) const ITERATE_KEY: &str = "\u{0}iterate";

/// Longest array a container will grow to (the JS array-length limit)
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

// =============================================================================
// FIELDS
// =============================================================================

/// What a container slot holds: plain data, or a nested container that has
/// already been wrapped (and must keep its identity).
#[derive(Clone)]
pub(crate) enum Slot {
    Plain(Value),
    Wrapped(Reactive),
}

impl Slot {
    /// Untracked deep copy of the slot's data
    pub(crate) fn raw(&self) -> Value {
        match self {
            Slot::Plain(value) => value.clone(),
            Slot::Wrapped(reactive) => reactive.raw(),
        }
    }
}

/// A value accepted by container writes.
pub enum Field {
    /// Plain data; objects and arrays are wrapped lazily on first read
    Value(Value),
    /// An existing container, stored by identity
    Reactive(Reactive),
}

/// Conversion into something a container can store.
pub trait IntoField {
    fn into_field(self) -> Field;
}

impl IntoField for Field {
    fn into_field(self) -> Field {
        self
    }
}

impl IntoField for Value {
    fn into_field(self) -> Field {
        Field::Value(self)
    }
}

impl IntoField for Reactive {
    fn into_field(self) -> Field {
        Field::Reactive(self)
    }
}

impl IntoField for &Reactive {
    fn into_field(self) -> Field {
        Field::Reactive(self.clone())
    }
}

macro_rules! into_field_via_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoField for $ty {
                fn into_field(self) -> Field {
                    Field::Value(Value::from(self))
                }
            }
        )*
    };
}

into_field_via_value!(bool, i32, i64, u32, u64, usize, f32, f64, &str, String, Vec<Value>);

impl From<Field> for Slot {
    fn from(field: Field) -> Self {
        match field {
            Field::Value(value) => Slot::Plain(value),
            Field::Reactive(reactive) => Slot::Wrapped(reactive),
        }
    }
}

/// Anything `Reactive::wrap` accepts.
pub trait IntoReactive {
    fn into_reactive(self) -> Option<Reactive>;
}

impl IntoReactive for Value {
    fn into_reactive(self) -> Option<Reactive> {
        match Reactive::from_container(self) {
            Ok(reactive) => Some(reactive),
            Err(primitive) => {
                warn!(
                    value = %primitive,
                    "[ReactiveState] Cannot wrap a primitive value; use reactive_ref() for primitives"
                );
                None
            }
        }
    }
}

impl IntoReactive for Reactive {
    fn into_reactive(self) -> Option<Reactive> {
        Some(self)
    }
}

impl IntoReactive for &Reactive {
    fn into_reactive(self) -> Option<Reactive> {
        Some(self.clone())
    }
}

// =============================================================================
// REACTIVE INNER
// =============================================================================

pub(crate) enum Body {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

pub(crate) struct ReactiveInner {
    pub(crate) body: RefCell<Body>,

    /// One dependency node per key read under tracking
    deps: RefCell<HashMap<String, Rc<Dep>>>,

    /// Computed properties, keyed by name
    computeds: RefCell<HashMap<String, Computed<Value>>>,
}

// =============================================================================
// REACTIVE - The public container handle
// =============================================================================

/// A reactive object or array.
///
/// Cloning is cheap and yields the same container (`ptr_eq` holds).
///
/// # Example
///
/// ```
/// use spark_dom::{effect, state};
/// use serde_json::json;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let user = state(json!({ "name": "Ada", "address": { "city": "London" } }));
/// let runs = Rc::new(Cell::new(0));
///
/// let _effect = effect({
///     let (user, runs) = (user.clone(), runs.clone());
///     move || {
///         let _ = user.get_path("address.city");
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// user.set("name", "Grace");
/// assert_eq!(runs.get(), 1);
///
/// user.child("address").unwrap().set("city", "Paris");
/// assert_eq!(runs.get(), 2);
/// ```
#[derive(Clone)]
pub struct Reactive {
    pub(crate) inner: Rc<ReactiveInner>,
}

impl Reactive {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    fn from_body(body: Body) -> Self {
        Self {
            inner: Rc::new(ReactiveInner {
                body: RefCell::new(body),
                deps: RefCell::new(HashMap::new()),
                computeds: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Build a container from an object or array, handing primitives back.
    pub(crate) fn from_container(value: Value) -> Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(Self::from_body(Body::Object(
                map.into_iter().map(|(k, v)| (k, Slot::Plain(v))).collect(),
            ))),
            Value::Array(items) => Ok(Self::from_body(Body::Array(
                items.into_iter().map(Slot::Plain).collect(),
            ))),
            other => Err(other),
        }
    }

    /// An empty object container
    pub fn new_object() -> Self {
        Self::from_body(Body::Object(IndexMap::new()))
    }

    /// An empty array container
    pub fn new_array() -> Self {
        Self::from_body(Body::Array(Vec::new()))
    }

    /// Wrap a value.
    ///
    /// Objects and arrays get a new container; an existing container is
    /// returned unchanged (same identity); primitives are refused with a
    /// warning.
    pub fn wrap(value: impl IntoReactive) -> Option<Self> {
        value.into_reactive()
    }

    /// Check whether two handles point at the same container
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this container holds an array
    pub fn is_array(&self) -> bool {
        matches!(&*self.inner.body.borrow(), Body::Array(_))
    }

    /// Whether this container holds an object
    pub fn is_object(&self) -> bool {
        !self.is_array()
    }

    pub(crate) fn downgrade(&self) -> Weak<ReactiveInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<ReactiveInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Whether `self` is `target` or holds it somewhere below
    fn reaches(&self, target: &Reactive) -> bool {
        let mut seen: HashSet<*const ReactiveInner> = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(current) = pending.pop() {
            if current.ptr_eq(target) {
                return true;
            }
            if !seen.insert(Rc::as_ptr(&current.inner)) {
                continue;
            }
            let body = current.inner.body.borrow();
            let slots: Box<dyn Iterator<Item = &Slot>> = match &*body {
                Body::Object(map) => Box::new(map.values()),
                Body::Array(items) => Box::new(items.iter()),
            };
            pending.extend(slots.filter_map(|slot| match slot {
                Slot::Wrapped(child) => Some(child.clone()),
                Slot::Plain(_) => None,
            }));
        }
        false
    }

    /// Refuse a slot that would make this container contain itself
    pub(crate) fn admits(&self, slot: &Slot, key: &str) -> bool {
        match slot {
            Slot::Wrapped(child) if child.reaches(self) => {
                warn!(key, "[ReactiveState] Refusing to store a container inside itself");
                false
            }
            _ => true,
        }
    }

    // =========================================================================
    // DEPENDENCY BOOKKEEPING
    // =========================================================================

    fn dep_for(&self, key: &str) -> Rc<Dep> {
        let mut deps = self.inner.deps.borrow_mut();
        deps.entry(key.to_string()).or_insert_with(Dep::new).clone()
    }

    /// Record a read of `key` (no-op when nothing is tracking)
    pub(crate) fn track_key(&self, key: &str) {
        if !is_tracking() {
            return;
        }
        let dep = self.dep_for(key);
        track_read(dep as Rc<dyn AnySource>);
    }

    /// Notify every reader of the given keys, coalesced into one batch
    pub(crate) fn notify_keys<S: AsRef<str>>(&self, keys: &[S]) {
        let deps: Vec<Rc<Dep>> = {
            let deps = self.inner.deps.borrow();
            keys.iter()
                .filter_map(|key| deps.get(key.as_ref()).cloned())
                .collect()
        };

        if deps.is_empty() {
            return;
        }

        batch(|| {
            for dep in deps {
                dep.bump();
                notify_write(dep as Rc<dyn AnySource>);
            }
        });

        self.release_unread(keys);
    }

    /// Forget the nodes of `keys` that no reaction reads any more. Readers
    /// that re-run have subscribed again by now; queued ones are still
    /// subscribed until they run.
    fn release_unread<S: AsRef<str>>(&self, keys: &[S]) {
        let mut deps = self.inner.deps.borrow_mut();
        for key in keys {
            let unread = deps.get(key.as_ref()).is_some_and(|dep| {
                dep.cleanup_dead_reactions();
                dep.reaction_count() == 0
            });
            if unread {
                deps.remove(key.as_ref());
            }
        }
    }

    /// Number of keys currently holding a dependency node
    pub fn tracked_key_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Tracked index keys at or after `start`
    pub(crate) fn tracked_indices_from(&self, start: usize) -> Vec<String> {
        self.inner
            .deps
            .borrow()
            .keys()
            .filter(|key| parse_index(key).is_some_and(|i| i >= start))
            .cloned()
            .collect()
    }

    /// Number of reactions subscribed to `key`
    pub fn subscriber_count(&self, key: &str) -> usize {
        let dep = self.inner.deps.borrow().get(key).cloned();
        match dep {
            Some(dep) => {
                dep.cleanup_dead_reactions();
                dep.reaction_count()
            }
            None => 0,
        }
    }

    /// Manually notify readers of `key`.
    ///
    /// Changes made to data obtained through `raw()` (or anywhere else outside
    /// the container's write methods) are not observed; pair them with
    /// `notify`.
    pub fn notify(&self, key: &str) {
        self.notify_keys(&[key]);
    }

    fn computed_for(&self, key: &str) -> Option<Computed<Value>> {
        self.inner.computeds.borrow().get(key).cloned()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Read `key`.
    ///
    /// Nested objects/arrays come back as snapshots whose every key was read
    /// under tracking, so writes anywhere inside them re-run the reader.
    /// Missing keys read as `null`.
    pub fn get(&self, key: &str) -> Value {
        if let Some(derived) = self.computed_for(key) {
            self.track_key(key);
            return derived.try_get().unwrap_or(Value::Null);
        }

        if self.is_array() && key == LENGTH_KEY {
            return Value::from(self.len());
        }

        self.track_key(key);

        match self.slot_kind(key) {
            SlotKind::Missing => Value::Null,
            SlotKind::Primitive(value) => value,
            SlotKind::Nested => match self.wrap_slot(key) {
                Some(child) => child.snapshot(),
                None => Value::Null,
            },
        }
    }

    /// Read `key` as a nested container.
    ///
    /// The first call wraps the plain value in place; later calls return the
    /// same container. `None` when the key is missing or primitive.
    pub fn child(&self, key: &str) -> Option<Reactive> {
        self.track_key(key);
        self.wrap_slot(key)
    }

    /// Read a dotted path such as `"address.city"` or `"items.0.title"`.
    pub fn get_path(&self, path: &str) -> Value {
        let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some(last) = segments.pop() else {
            return self.snapshot();
        };

        let mut current = self.clone();
        for segment in segments {
            match current.child(segment) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        current.get(last)
    }

    /// Whether `key` exists (data or computed)
    pub fn has(&self, key: &str) -> bool {
        self.track_key(key);
        if self.inner.computeds.borrow().contains_key(key) {
            return true;
        }
        match &*self.inner.body.borrow() {
            Body::Object(map) => map.contains_key(key),
            Body::Array(items) => parse_index(key).is_some_and(|i| i < items.len()),
        }
    }

    /// Data keys in order (array indices as strings)
    pub fn keys(&self) -> Vec<String> {
        self.track_key(ITERATE_KEY);
        match &*self.inner.body.borrow() {
            Body::Object(map) => map.keys().cloned().collect(),
            Body::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// Number of data keys (array length)
    pub fn len(&self) -> usize {
        let is_array = self.is_array();
        self.track_key(if is_array { LENGTH_KEY } else { ITERATE_KEY });
        match &*self.inner.body.borrow() {
            Body::Object(map) => map.len(),
            Body::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked deep read of the whole container
    pub fn snapshot(&self) -> Value {
        let keys = self.keys();
        if self.is_array() {
            self.track_key(LENGTH_KEY);
            Value::Array(keys.iter().map(|key| self.get(key)).collect())
        } else {
            let mut map = Map::new();
            for key in keys {
                let value = self.get(&key);
                map.insert(key, value);
            }
            Value::Object(map)
        }
    }

    /// Untracked deep copy of the data
    pub fn raw(&self) -> Value {
        match &*self.inner.body.borrow() {
            Body::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, slot)| (key.clone(), slot.raw()))
                    .collect(),
            ),
            Body::Array(items) => Value::Array(items.iter().map(Slot::raw).collect()),
        }
    }

    fn slot_kind(&self, key: &str) -> SlotKind {
        let body = self.inner.body.borrow();
        let slot = match &*body {
            Body::Object(map) => map.get(key),
            Body::Array(items) => parse_index(key).and_then(|i| items.get(i)),
        };
        match slot {
            None => SlotKind::Missing,
            Some(Slot::Wrapped(_)) => SlotKind::Nested,
            Some(Slot::Plain(value)) if value.is_object() || value.is_array() => SlotKind::Nested,
            Some(Slot::Plain(value)) => SlotKind::Primitive(value.clone()),
        }
    }

    /// Wrap the nested value at `key` in place (once) and return it
    fn wrap_slot(&self, key: &str) -> Option<Reactive> {
        let mut body = self.inner.body.borrow_mut();
        let slot = match &mut *body {
            Body::Object(map) => map.get_mut(key),
            Body::Array(items) => parse_index(key).and_then(|i| items.get_mut(i)),
        }?;

        match slot {
            Slot::Wrapped(child) => Some(child.clone()),
            Slot::Plain(value) if value.is_object() || value.is_array() => {
                let child = Reactive::from_container(value.take()).ok()?;
                *slot = Slot::Wrapped(child.clone());
                trace!(key, "[ReactiveState] Wrapped nested value");
                Some(child)
            }
            Slot::Plain(_) => None,
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Write `key`. Equal values still notify.
    pub fn set(&self, key: &str, value: impl IntoField) {
        if self.inner.computeds.borrow().contains_key(key) {
            warn!(key, "[ReactiveState] Cannot set computed property; computed properties are read-only");
            return;
        }
        if !writes_allowed() {
            return;
        }

        let slot = Slot::from(value.into_field());
        if !self.admits(&slot, key) {
            return;
        }
        if key == LENGTH_KEY && self.is_array() {
            self.set_length(slot.raw());
            return;
        }

        let mut notify: Vec<String> = vec![key.to_string()];

        {
            let mut body = self.inner.body.borrow_mut();
            match &mut *body {
                Body::Object(map) => {
                    if map.insert(key.to_string(), slot).is_none() {
                        notify.push(ITERATE_KEY.to_string());
                    }
                }
                Body::Array(items) => {
                    let Some(index) = parse_index(key) else {
                        warn!(key, "[ReactiveState] Ignoring non-index key written to an array container");
                        return;
                    };
                    if index < items.len() {
                        items[index] = slot;
                    } else {
                        if !grow_to(items, index.saturating_add(1)) {
                            return;
                        }
                        items.resize(index, Slot::Plain(Value::Null));
                        items.push(slot);
                        notify.push(LENGTH_KEY.to_string());
                        notify.push(ITERATE_KEY.to_string());
                    }
                }
            }
        }

        self.notify_keys(&notify);
    }

    /// Remove `key`. Returns whether it existed.
    ///
    /// Readers of `key` are notified either way. On arrays the slot becomes
    /// `null` and the length is unchanged.
    pub fn delete(&self, key: &str) -> bool {
        if self.inner.computeds.borrow().contains_key(key) {
            warn!(key, "[ReactiveState] Cannot delete computed property");
            return false;
        }
        if !writes_allowed() {
            return false;
        }

        let existed = {
            let mut body = self.inner.body.borrow_mut();
            match &mut *body {
                Body::Object(map) => map.shift_remove(key).is_some(),
                Body::Array(items) => match parse_index(key).and_then(|i| items.get_mut(i)) {
                    Some(slot) => {
                        *slot = Slot::Plain(Value::Null);
                        true
                    }
                    None => false,
                },
            }
        };

        if existed && self.is_object() {
            self.notify_keys(&[key, ITERATE_KEY]);
        } else {
            self.notify_keys(&[key]);
        }
        existed
    }

    /// Write every key of `patch` in one batch.
    pub fn assign(&self, patch: Value) {
        let Value::Object(map) = patch else {
            warn!(value = %patch, "[ReactiveState] assign() expects an object; ignoring");
            return;
        };

        batch(|| {
            for (key, value) in map {
                self.set(&key, value);
            }
        });
    }

    // =========================================================================
    // DERIVED STATE
    // =========================================================================

    /// Define a computed property.
    ///
    /// Reading `key` returns the cached result of `f`, recomputed only after
    /// one of its dependencies was written. Writing `key` is refused.
    ///
    /// ```
    /// use spark_dom::state;
    /// use serde_json::json;
    ///
    /// let cart = state(json!({ "price": 10, "qty": 2 }));
    /// cart.computed("total", |c| {
    ///     json!(c.get("price").as_i64().unwrap_or(0) * c.get("qty").as_i64().unwrap_or(0))
    /// });
    ///
    /// assert_eq!(cart.get("total"), json!(20));
    /// cart.set("qty", 3);
    /// assert_eq!(cart.get("total"), json!(30));
    /// ```
    pub fn computed<F>(&self, key: &str, f: F) -> Computed<Value>
    where
        F: Fn(&Reactive) -> Value + 'static,
    {
        let weak = self.downgrade();
        let derived = computed(move || match Reactive::from_weak(&weak) {
            Some(container) => f(&container),
            None => Value::Null,
        });

        self.inner
            .computeds
            .borrow_mut()
            .insert(key.to_string(), derived.clone());
        self.notify_keys(&[key, ITERATE_KEY]);

        derived
    }

    /// Call `callback(new, old)` whenever the value at `key` changes.
    pub fn watch<C>(&self, key: &str, callback: C) -> Effect
    where
        C: FnMut(&Value, Option<&Value>) + 'static,
    {
        let weak = self.downgrade();
        let key = key.to_string();
        watch(
            move || match Reactive::from_weak(&weak) {
                Some(container) => container.get(&key),
                None => Value::Null,
            },
            callback,
        )
    }

    /// Run `f` as one batch.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        batch(f)
    }

    // =========================================================================
    // ARRAY LENGTH
    // =========================================================================

    fn set_length(&self, value: Value) {
        let Some(new_len) = value.as_u64() else {
            warn!(value = %value, "[ReactiveState] Array length must be a non-negative integer");
            return;
        };
        let new_len = usize::try_from(new_len).unwrap_or(usize::MAX);

        let old_len = {
            let mut body = self.inner.body.borrow_mut();
            let Body::Array(items) = &mut *body else {
                return;
            };
            let old_len = items.len();
            if !grow_to(items, new_len) {
                return;
            }
            items.resize(new_len, Slot::Plain(Value::Null));
            old_len
        };

        if old_len != new_len {
            let mut keys = self.tracked_indices_from(old_len.min(new_len));
            keys.push(LENGTH_KEY.to_string());
            keys.push(ITERATE_KEY.to_string());
            self.notify_keys(&keys);
        } else {
            self.notify_keys(&[LENGTH_KEY]);
        }
    }
}

/// Make room for `len` items, refusing lengths past `MAX_ARRAY_LENGTH` or
/// that cannot be allocated. Shrinking always succeeds.
fn grow_to(items: &mut Vec<Slot>, len: usize) -> bool {
    if len > MAX_ARRAY_LENGTH {
        warn!(len, max = MAX_ARRAY_LENGTH, "[ReactiveState] Array length out of range; ignoring write");
        return false;
    }
    let additional = len.saturating_sub(items.len());
    if let Err(err) = items.try_reserve(additional) {
        warn!(len, error = %err, "[ReactiveState] Cannot grow array; ignoring write");
        return false;
    }
    true
}

enum SlotKind {
    Missing,
    Primitive(Value),
    Nested,
}

/// Canonical array index ("0", "12"; not "01" or "+1")
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(&untrack(|| self.raw())).finish()
    }
}

impl PartialEq<Value> for Reactive {
    fn eq(&self, other: &Value) -> bool {
        &self.raw() == other
    }
}

// =============================================================================
// STATE - Public constructor
// =============================================================================

/// Create reactive state from JSON-shaped data.
///
/// Objects and arrays are wrapped directly. A primitive is wrapped as
/// `{ "value": primitive }` with a warning (prefer `reactive_ref`).
pub fn state(initial: Value) -> Reactive {
    match Reactive::from_container(initial) {
        Ok(reactive) => reactive,
        Err(primitive) => {
            warn!(
                value = %primitive,
                "[ReactiveState] state() expects an object or array; wrapping the primitive under \"value\""
            );
            let mut map = IndexMap::new();
            map.insert("value".to_string(), Slot::Plain(primitive));
            Reactive::from_body(Body::Object(map))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
