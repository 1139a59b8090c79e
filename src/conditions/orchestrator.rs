// ============================================================================
// spark-dom - Conditions
// Declarative condition tables bound to reactive values
// ============================================================================
//
// A binding ties three things together: a value source, a condition table
// and a target. Every evaluation runs the same cycle:
//
//   1. read the value (tracked)
//   2. resolve the condition table (tracked, when dynamic)
//   3. resolve the target elements
//   4. pick the first matching branch, else `default`
//   5. clear listeners the previous evaluation attached
//   6. apply the branch: shared keys to every element, then index keys to
//      the element they address
//
// Steps 3 to 6 run untracked, so only the value and the table decide when a
// reactive binding re-runs. Nothing here returns an error or panics for a
// data-shape problem; each failure becomes a `[Conditions]` log line and an
// `ApplyOutcome`.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use super::config::{wrap_index, ConditionSpec, ConditionTable, Config};
use super::handlers::{HandlerRegistry, PropertyHandler};
use super::matchers::{Matcher, MatcherRegistry};
use crate::dom::element::ElementRef;
use crate::dom::target::{ElementResolver, Target};
use crate::error::SourceError;
use crate::primitives::computed::Computed;
use crate::primitives::effect::{effect_with_cleanup, CleanupFn, Effect};
use crate::primitives::reference::Ref;
use crate::reactivity::batching::{batch, untrack};
use crate::state::reactive::Reactive;

// =============================================================================
// VALUE SOURCE
// =============================================================================

type GetterFn = Rc<dyn Fn() -> Result<Value, SourceError>>;

/// Where a binding reads its value from.
#[derive(Clone)]
pub enum ValueSource {
    /// A plain value: the binding runs once
    Static(Value),
    /// Called on every evaluation; reads inside are tracked
    Getter(GetterFn),
}

impl ValueSource {
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        ValueSource::Getter(Rc::new(move || Ok(f())))
    }

    pub fn try_getter(f: impl Fn() -> Result<Value, SourceError> + 'static) -> Self {
        ValueSource::Getter(Rc::new(f))
    }

    /// Track one key of a container
    pub fn key(container: &Reactive, key: impl Into<String>) -> Self {
        let container = container.clone();
        let key = key.into();
        Self::getter(move || container.get(&key))
    }

    pub fn is_static(&self) -> bool {
        matches!(self, ValueSource::Static(_))
    }

    pub fn resolve(&self) -> Result<Value, SourceError> {
        match self {
            ValueSource::Static(value) => Ok(value.clone()),
            ValueSource::Getter(f) => f(),
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Static(value) => f.debug_tuple("Static").field(value).finish(),
            ValueSource::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

impl From<Value> for ValueSource {
    fn from(value: Value) -> Self {
        ValueSource::Static(value)
    }
}

macro_rules! static_value_source {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ValueSource {
                fn from(value: $ty) -> Self {
                    ValueSource::Static(Value::from(value))
                }
            }
        )*
    };
}

static_value_source!(bool, i32, i64, u32, u64, f64, &str, String);

impl<T: Clone + Into<Value> + 'static> From<&Ref<T>> for ValueSource {
    fn from(reference: &Ref<T>) -> Self {
        let reference = reference.clone();
        ValueSource::getter(move || reference.value().into())
    }
}

impl<T: Clone + Into<Value> + 'static> From<Ref<T>> for ValueSource {
    fn from(reference: Ref<T>) -> Self {
        ValueSource::getter(move || reference.value().into())
    }
}

impl<T: Clone + Into<Value> + 'static> From<&Computed<T>> for ValueSource {
    fn from(computed: &Computed<T>) -> Self {
        let computed = computed.clone();
        ValueSource::try_getter(move || {
            computed
                .try_get()
                .map(Into::into)
                .ok_or_else(|| SourceError::failed("computed value depends on itself"))
        })
    }
}

impl From<(&Reactive, &str)> for ValueSource {
    fn from((container, key): (&Reactive, &str)) -> Self {
        ValueSource::key(container, key)
    }
}

// =============================================================================
// OUTCOMES AND OPTIONS
// =============================================================================

/// What one evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A keyed branch matched and was applied
    Matched { condition: String },
    /// Nothing matched; the `default` branch was applied
    Default,
    /// Nothing matched and there is no `default`
    NoMatch,
    /// The target resolved to no elements
    NoElements,
    /// The condition table could not be resolved
    InvalidConditions,
    /// The value source failed
    SourceFailed,
    /// The binding was destroyed
    Disposed,
}

impl ApplyOutcome {
    /// Whether a configuration was applied
    pub fn applied(&self) -> bool {
        matches!(self, ApplyOutcome::Matched { .. } | ApplyOutcome::Default)
    }
}

/// Options for [`Conditions::when_state`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WhenStateOptions {
    /// `Some(false)` forces a one-shot static binding
    pub reactive: Option<bool>,
}

impl WhenStateOptions {
    pub fn static_only() -> Self {
        Self {
            reactive: Some(false),
        }
    }
}

/// Lifecycle of a [`Binding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No evaluation has resolved any element yet
    Idle,
    /// At least one evaluation resolved elements
    Bound,
    Disposed,
}

// =============================================================================
// CONDITIONS
// =============================================================================

struct ConditionsInner {
    resolver: Option<Rc<dyn ElementResolver>>,
    reactive: bool,
    matchers: RefCell<MatcherRegistry>,
    handlers: RefCell<HandlerRegistry>,
}

/// The conditions engine: matcher and handler registries plus an optional
/// element resolver. Cloning shares the registries.
///
/// ```
/// use spark_dom::{state, Conditions, MemoryElement};
/// use serde_json::json;
///
/// let el = MemoryElement::new("span");
/// let s = state(json!({ "count": 0 }));
/// let conditions = Conditions::new();
///
/// let _binding = conditions.when_state(
///     (&s, "count"),
///     json!({
///         "0": { "textContent": "zero" },
///         ">0": { "textContent": "positive" }
///     }),
///     &el,
///     Default::default(),
/// );
/// assert_eq!(el.text(), "zero");
///
/// s.set("count", 5);
/// assert_eq!(el.text(), "positive");
/// ```
#[derive(Clone)]
pub struct Conditions {
    inner: Rc<ConditionsInner>,
}

impl Conditions {
    /// Built-in matchers and handlers, reactive, no resolver
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ConditionsBuilder {
        ConditionsBuilder::default()
    }

    /// Add a condition matcher ahead of the string-equality fallback
    pub fn register_matcher(&self, name: impl Into<String>, matcher: impl Matcher + 'static) {
        self.inner.matchers.borrow_mut().register(name, matcher);
    }

    /// Add a property handler ahead of the plain-property fallback
    pub fn register_handler(&self, name: impl Into<String>, handler: impl PropertyHandler + 'static) {
        self.inner.handlers.borrow_mut().register(name, handler);
    }

    /// Run `f` as one batch
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        batch(f)
    }

    /// Whether `value` satisfies one condition key
    pub fn matches(&self, value: &Value, condition: &str) -> bool {
        self.inner.matchers.borrow().classify(value, condition)
    }

    pub fn is_reactive(&self) -> bool {
        self.inner.reactive
    }

    /// Evaluate `conditions` against `value` once and apply the result to
    /// `target`.
    pub fn apply(
        &self,
        value: impl Into<ValueSource>,
        conditions: impl Into<ConditionSpec>,
        target: impl Into<Target>,
    ) -> ApplyOutcome {
        let cycle = Cycle::new(self.clone(), value.into(), conditions.into(), target.into());
        cycle.run().0
    }

    /// Bind `conditions` to `value` on `target`.
    ///
    /// A getter source runs inside an effect and re-evaluates whenever what
    /// it reads changes. A plain value, `reactive: Some(false)`, or an engine
    /// built with `reactive(false)` gives a static binding that evaluates
    /// once and again on every [`Binding::update`].
    pub fn when_state(
        &self,
        value: impl Into<ValueSource>,
        conditions: impl Into<ConditionSpec>,
        target: impl Into<Target>,
        options: WhenStateOptions,
    ) -> Binding {
        let source = value.into();
        let reactive =
            self.inner.reactive && options.reactive != Some(false) && !source.is_static();
        let cycle = Rc::new(Cycle::new(self.clone(), source, conditions.into(), target.into()));

        if !reactive {
            debug!(binding_target = ?cycle.target, "[Conditions] Static binding");
            cycle.run();
            return Binding {
                cycle,
                effect: None,
            };
        }

        debug!(binding_target = ?cycle.target, "[Conditions] Reactive binding");
        let effect = effect_with_cleanup({
            let cycle = cycle.clone();
            move || {
                let (_, elements) = cycle.run();
                if elements.is_empty() {
                    return None;
                }
                let cleanup: CleanupFn = Box::new(move || {
                    for element in &elements {
                        element.listeners().clear(element.as_ref());
                    }
                });
                Some(cleanup)
            }
        });

        Binding {
            cycle,
            effect: Some(effect),
        }
    }

    fn resolver(&self) -> Option<&dyn ElementResolver> {
        self.inner.resolver.as_deref()
    }
}

impl Default for Conditions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditions")
            .field("reactive", &self.inner.reactive)
            .field("resolver", &self.inner.resolver.is_some())
            .field("matchers", &*self.inner.matchers.borrow())
            .field("handlers", &*self.inner.handlers.borrow())
            .finish()
    }
}

/// Builder for [`Conditions`].
pub struct ConditionsBuilder {
    resolver: Option<Rc<dyn ElementResolver>>,
    reactive: bool,
    matchers: MatcherRegistry,
    handlers: HandlerRegistry,
}

impl Default for ConditionsBuilder {
    fn default() -> Self {
        Self {
            resolver: None,
            reactive: true,
            matchers: MatcherRegistry::new(),
            handlers: HandlerRegistry::new(),
        }
    }
}

impl ConditionsBuilder {
    /// Resolves selector targets
    pub fn resolver(mut self, resolver: impl ElementResolver + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    pub fn resolver_rc(mut self, resolver: Rc<dyn ElementResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// `false` makes every binding static
    pub fn reactive(mut self, reactive: bool) -> Self {
        self.reactive = reactive;
        self
    }

    pub fn matcher(mut self, name: impl Into<String>, matcher: impl Matcher + 'static) -> Self {
        self.matchers.register(name, matcher);
        self
    }

    pub fn handler(mut self, name: impl Into<String>, handler: impl PropertyHandler + 'static) -> Self {
        self.handlers.register(name, handler);
        self
    }

    /// Replace the whole matcher registry
    pub fn matchers(mut self, matchers: MatcherRegistry) -> Self {
        self.matchers = matchers;
        self
    }

    /// Replace the whole handler registry
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn build(self) -> Conditions {
        Conditions {
            inner: Rc::new(ConditionsInner {
                resolver: self.resolver,
                reactive: self.reactive,
                matchers: RefCell::new(self.matchers),
                handlers: RefCell::new(self.handlers),
            }),
        }
    }
}

// =============================================================================
// EVALUATION CYCLE
// =============================================================================

struct Cycle {
    conditions: Conditions,
    source: ValueSource,
    spec: ConditionSpec,
    target: Target,
    state: Cell<BindingState>,
    last_outcome: RefCell<Option<ApplyOutcome>>,
    last_elements: RefCell<Vec<ElementRef>>,
}

impl Cycle {
    fn new(conditions: Conditions, source: ValueSource, spec: ConditionSpec, target: Target) -> Self {
        Self {
            conditions,
            source,
            spec,
            target,
            state: Cell::new(BindingState::Idle),
            last_outcome: RefCell::new(None),
            last_elements: RefCell::new(Vec::new()),
        }
    }

    /// One evaluation. Returns the outcome and the elements it touched.
    fn run(&self) -> (ApplyOutcome, Vec<ElementRef>) {
        let (outcome, elements) = self.evaluate();
        trace!(outcome = ?outcome, "[Conditions] Evaluated");
        *self.last_outcome.borrow_mut() = Some(outcome.clone());
        *self.last_elements.borrow_mut() = elements.clone();
        (outcome, elements)
    }

    fn evaluate(&self) -> (ApplyOutcome, Vec<ElementRef>) {
        if self.state.get() == BindingState::Disposed {
            return (ApplyOutcome::Disposed, Vec::new());
        }

        let value = match self.source.resolve() {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "[Conditions] Value source failed; skipping evaluation");
                return (ApplyOutcome::SourceFailed, Vec::new());
            }
        };

        let table = match self.spec.resolve() {
            Ok(table) => table,
            Err(err) => {
                error!(error = %err, "[Conditions] Invalid condition table");
                return (ApplyOutcome::InvalidConditions, Vec::new());
            }
        };

        untrack(|| {
            let elements = match self.target.resolve(self.conditions.resolver()) {
                Ok(elements) => elements,
                Err(err) => {
                    error!(error = %err, "[Conditions] Invalid target");
                    return (ApplyOutcome::NoElements, Vec::new());
                }
            };
            if elements.is_empty() {
                warn!(binding_target = ?self.target, "[Conditions] No elements found for target");
                return (ApplyOutcome::NoElements, elements);
            }
            self.state.set(BindingState::Bound);

            let outcome = self.apply_table(&value, &table, &elements);
            (outcome, elements)
        })
    }

    fn apply_table(&self, value: &Value, table: &ConditionTable, elements: &[ElementRef]) -> ApplyOutcome {
        // Snapshot the registries so user handlers may register more
        let matchers = self.conditions.inner.matchers.borrow().clone();
        let handlers = self.conditions.inner.handlers.borrow().clone();

        for element in elements {
            element.listeners().clear(element.as_ref());
        }

        let (keyed, default) = table.split_default();
        let matched = keyed
            .into_iter()
            .find(|(condition, _)| matchers.classify(value, condition));

        match (matched, default) {
            (Some((condition, config)), _) => {
                debug!(condition, value = %value, elements = elements.len(), "[Conditions] Condition matched");
                apply_config(&handlers, config, elements);
                ApplyOutcome::Matched {
                    condition: condition.to_string(),
                }
            }
            (None, Some(config)) => {
                info!(value = %value, "[Conditions] No condition matched; applying default branch");
                apply_config(&handlers, config, elements);
                ApplyOutcome::Default
            }
            (None, None) => {
                info!(value = %value, "[Conditions] No condition matched and no default branch; nothing applied");
                ApplyOutcome::NoMatch
            }
        }
    }
}

/// Shared keys to every element, then each index key to the one element it
/// addresses (negative indices count from the end).
fn apply_config(handlers: &HandlerRegistry, config: &Config, elements: &[ElementRef]) {
    let (shared, indexed) = config.split_indexed();

    if !shared.is_empty() {
        for element in elements {
            apply_to_element(handlers, element, &shared);
        }
    }

    for (index, sub_config) in indexed {
        match wrap_index(index, elements.len()) {
            Some(resolved) => apply_to_element(handlers, &elements[resolved], sub_config),
            None => debug!(index, len = elements.len(), "[Conditions] Index key out of range; skipping"),
        }
    }
}

/// Prefer the element's bulk updater; listener keys always go through the
/// handler registry so they are recorded for cleanup.
fn apply_to_element(handlers: &HandlerRegistry, element: &ElementRef, config: &Config) {
    let Some(updatable) = element.as_updatable() else {
        handlers.apply_config(element.as_ref(), config);
        return;
    };

    let (listeners, rest) = config.split_listeners();
    if !rest.is_empty() {
        if let Err(err) = updatable.update(&rest) {
            warn!(element = ?element, error = %err, "[Conditions] Element update() failed");
        }
    }
    if !listeners.is_empty() {
        handlers.apply_config(element.as_ref(), &listeners);
    }
}

// =============================================================================
// BINDING
// =============================================================================

/// A condition table bound to a value and a target.
///
/// A reactive binding owns its effect: dropping the binding at top level
/// disposes it. Inside another effect, the parent owns it and disposes it on
/// its next run.
pub struct Binding {
    cycle: Rc<Cycle>,
    effect: Option<Effect>,
}

impl Binding {
    /// Re-evaluate now
    pub fn update(&self) -> ApplyOutcome {
        if self.state() == BindingState::Disposed {
            debug!("[Conditions] Ignoring update() on a destroyed binding");
            return ApplyOutcome::Disposed;
        }
        match &self.effect {
            Some(effect) => {
                effect.run();
                self.last_outcome().unwrap_or(ApplyOutcome::Disposed)
            }
            None => self.cycle.run().0,
        }
    }

    /// Stop re-evaluating and remove every listener the binding attached
    pub fn destroy(&self) {
        if self.state() == BindingState::Disposed {
            return;
        }
        self.cycle.state.set(BindingState::Disposed);

        match &self.effect {
            // The effect's teardown clears the listeners
            Some(effect) => effect.dispose(),
            None => {
                for element in self.cycle.last_elements.take() {
                    element.listeners().clear(element.as_ref());
                }
            }
        }
        debug!("[Conditions] Binding destroyed");
    }

    pub fn state(&self) -> BindingState {
        self.cycle.state.get()
    }

    pub fn is_reactive(&self) -> bool {
        self.effect.is_some()
    }

    /// Outcome of the most recent evaluation
    pub fn last_outcome(&self) -> Option<ApplyOutcome> {
        self.cycle.last_outcome.borrow().clone()
    }

    /// The effect driving a reactive binding
    pub fn effect(&self) -> Option<&Effect> {
        self.effect.as_ref()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("state", &self.state())
            .field("reactive", &self.is_reactive())
            .field("target", &self.cycle.target)
            .field("last_outcome", &self.last_outcome())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::config::Setting;
    use crate::conditions::handlers::FnHandler;
    use crate::conditions::matchers::FnMatcher;
    use crate::dom::element::{Element, Event};
    use crate::dom::memory::{MemoryDocument, MemoryElement, MemoryList};
    use crate::primitives::effect::effect;
    use crate::primitives::reference::reactive_ref;
    use crate::state::reactive::state;
    use serde_json::json;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn text_table() -> Value {
        json!({
            "0": {"textContent": "zero"},
            ">0": {"textContent": "positive"},
            "default": {"textContent": "negative"}
        })
    }

    #[test]
    fn first_declared_match_wins() {
        let el = MemoryElement::new("p");
        let outcome = Conditions::new().apply(
            12,
            json!({
                ">10": {"textContent": "A"},
                "5-15": {"textContent": "B"},
                "default": {"textContent": "C"}
            }),
            &el,
        );
        assert_eq!(outcome, ApplyOutcome::Matched { condition: ">10".into() });
        assert_eq!(el.text(), "A");
    }

    #[test]
    #[traced_test]
    fn default_branch_is_logged() {
        let el = MemoryElement::new("p");
        let outcome = Conditions::new().apply(
            6,
            json!({"5": {"textContent": "A"}, "default": {"textContent": "C"}}),
            &el,
        );
        assert_eq!(outcome, ApplyOutcome::Default);
        assert_eq!(el.text(), "C");
        assert!(logs_contain("applying default branch"));
    }

    #[test]
    #[traced_test]
    fn no_match_leaves_element_alone() {
        let el = MemoryElement::new("p");
        el.set_property("textContent", &json!("untouched")).unwrap();
        let outcome = Conditions::new().apply(
            Value::Null,
            json!({"true": {"textContent": "yes"}, "false": {"textContent": "no"}}),
            &el,
        );
        assert_eq!(outcome, ApplyOutcome::NoMatch);
        assert_eq!(el.text(), "untouched");
        assert!(logs_contain("[Conditions] No condition matched and no default branch"));
    }

    #[test]
    fn collection_index_targeting() {
        let items: Vec<ElementRef> = (0..3).map(|_| MemoryElement::new("li") as ElementRef).collect();
        Conditions::new().apply(
            true,
            json!({"true": {
                "style": {"color": "red"},
                "0": {"textContent": "first"},
                "-1": {"textContent": "last"}
            }}),
            items.clone(),
        );

        for item in &items {
            assert_eq!(item.style("color").as_deref(), Some("red"));
        }
        assert_eq!(items[0].get_property("textContent"), Some(json!("first")));
        assert_eq!(items[1].get_property("textContent"), Some(json!("")));
        assert_eq!(items[2].get_property("textContent"), Some(json!("last")));
    }

    #[test]
    fn single_element_is_a_collection_of_one() {
        let el = MemoryElement::new("p");
        Conditions::new().apply(
            "x",
            json!({"x": {"-1": {"title": "last"}, "5": {"title": "never"}}}),
            &el,
        );
        assert_eq!(el.get_property("title"), Some(json!("last")));
    }

    #[test]
    fn reactive_binding_follows_state() {
        let el = MemoryElement::new("span");
        let s = state(json!({"count": 0}));
        let binding = Conditions::new().when_state((&s, "count"), text_table(), &el, Default::default());

        assert!(binding.is_reactive());
        assert_eq!(binding.state(), BindingState::Bound);
        assert_eq!(el.text(), "zero");

        s.set("count", 5);
        assert_eq!(el.text(), "positive");
        assert_eq!(binding.last_outcome(), Some(ApplyOutcome::Matched { condition: ">0".into() }));

        s.set("count", -2);
        assert_eq!(el.text(), "negative");
        assert_eq!(binding.last_outcome(), Some(ApplyOutcome::Default));
    }

    #[test]
    fn apply_inside_effect_matches_scenario() {
        let el = MemoryElement::new("span");
        let s = state(json!({"count": 0}));
        let conditions = Conditions::new();

        let _effect = effect({
            let (s, el, conditions) = (s.clone(), el.clone(), conditions.clone());
            move || {
                conditions.apply(
                    s.get("count"),
                    json!({"0": {"textContent": "zero"}, ">0": {"textContent": "positive"}}),
                    &el,
                );
            }
        });
        assert_eq!(el.text(), "zero");

        s.set("count", 5);
        assert_eq!(el.text(), "positive");
    }

    #[test]
    fn static_binding_runs_once_until_updated() {
        let el = MemoryElement::new("span");
        let r = reactive_ref(0);
        let binding = Conditions::new().when_state(
            &r,
            text_table(),
            &el,
            WhenStateOptions::static_only(),
        );
        assert!(!binding.is_reactive());
        assert_eq!(el.text(), "zero");

        r.set_value(3);
        assert_eq!(el.text(), "zero");

        assert_eq!(binding.update(), ApplyOutcome::Matched { condition: ">0".into() });
        assert_eq!(el.text(), "positive");
    }

    #[test]
    fn plain_value_binding_is_static() {
        let el = MemoryElement::new("span");
        let binding = Conditions::new().when_state(0, text_table(), &el, Default::default());
        assert!(!binding.is_reactive());
        assert_eq!(el.text(), "zero");
    }

    #[test]
    fn non_reactive_engine_makes_static_bindings() {
        let el = MemoryElement::new("span");
        let r = reactive_ref(1);
        let conditions = Conditions::builder().reactive(false).build();
        let binding = conditions.when_state(&r, text_table(), &el, Default::default());
        assert!(!binding.is_reactive());
        assert_eq!(r.subscriber_count(), 0);
    }

    #[test]
    fn listeners_are_cleared_between_evaluations() {
        let el = MemoryElement::new("button");
        let mode = reactive_ref("armed".to_string());
        let clicks = Rc::new(Cell::new(0));

        let table = ConditionSpec::dynamic({
            let clicks = clicks.clone();
            move || {
                ConditionTable::new()
                    .when(
                        "armed",
                        Config::new().on("click", {
                            let clicks = clicks.clone();
                            move |_: &Event| clicks.set(clicks.get() + 1)
                        }),
                    )
                    .when("idle", Config::new().set("title", "idle"))
            }
        });

        let _binding = Conditions::new().when_state(&mode, table, &el, Default::default());
        assert_eq!(el.listener_count("click"), 1);

        mode.set_value("armed".to_string());
        assert_eq!(el.listener_count("click"), 1);

        mode.set_value("idle".to_string());
        assert_eq!(el.listener_count("click"), 0);
        el.dispatch_event(&Event::new("click"));
        assert_eq!(clicks.get(), 0);
    }

    #[test]
    fn destroy_stops_updates_and_removes_listeners() {
        let el = MemoryElement::new("button");
        let flag = reactive_ref(true);
        let table = ConditionTable::new()
            .when("true", Config::new().set("title", "on").on("click", |_: &Event| {}))
            .when("false", Config::new().set("title", "off"));

        let binding = Conditions::new().when_state(&flag, table, &el, Default::default());
        assert_eq!(el.listener_count("click"), 1);

        binding.destroy();
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(el.listener_count("click"), 0);
        assert_eq!(flag.subscriber_count(), 0);

        flag.set_value(false);
        assert_eq!(el.get_property("title"), Some(json!("on")));
        assert_eq!(binding.update(), ApplyOutcome::Disposed);
    }

    #[test]
    fn dropping_a_top_level_binding_disposes_it() {
        let el = MemoryElement::new("p");
        let r = reactive_ref(0);
        {
            let _binding = Conditions::new().when_state(&r, text_table(), &el, Default::default());
            assert_eq!(r.subscriber_count(), 1);
        }
        assert_eq!(r.subscriber_count(), 0);
    }

    #[test]
    fn dynamic_table_is_tracked() {
        let el = MemoryElement::new("p");
        let threshold = reactive_ref(10);
        let table = ConditionSpec::dynamic({
            let threshold = threshold.clone();
            move || {
                ConditionTable::new()
                    .when(format!(">{}", threshold.value()), Config::new().set("title", "above"))
                    .otherwise(Config::new().set("title", "below"))
            }
        });

        let _binding = Conditions::new().when_state(ValueSource::getter(|| json!(15)), table, &el, Default::default());
        assert_eq!(el.get_property("title"), Some(json!("above")));

        threshold.set_value(20);
        assert_eq!(el.get_property("title"), Some(json!("below")));
    }

    #[test]
    #[traced_test]
    fn failures_are_logged_not_raised() {
        let el = MemoryElement::new("p");
        let conditions = Conditions::new();

        let outcome = conditions.apply(1, json!(["not", "a", "table"]), &el);
        assert_eq!(outcome, ApplyOutcome::InvalidConditions);
        assert!(logs_contain("[Conditions] Invalid condition table"));

        let outcome = conditions.apply(
            ValueSource::try_getter(|| Err(SourceError::failed("offline"))),
            json!({"1": {}}),
            &el,
        );
        assert_eq!(outcome, ApplyOutcome::SourceFailed);
        assert!(logs_contain("[Conditions] Value source failed"));

        let outcome = conditions.apply(1, json!({"1": {}}), Vec::<ElementRef>::new());
        assert_eq!(outcome, ApplyOutcome::NoElements);
        assert!(logs_contain("[Conditions] No elements found"));

        let outcome = conditions.apply(1, json!({"1": {}}), "#app");
        assert_eq!(outcome, ApplyOutcome::NoElements);
        assert!(logs_contain("[Conditions] Invalid target"));
    }

    #[test]
    fn selectors_resolve_through_the_document() {
        let doc = MemoryDocument::new();
        let a = doc.create_element("li");
        a.add_class("row");
        let b = doc.create_element("li");
        b.add_class("row");

        let conditions = Conditions::builder().resolver(doc.clone()).build();
        let outcome = conditions.apply(
            "ok",
            json!({"ok": {"classList": {"add": "ready"}, "-1": {"title": "tail"}}}),
            ".row",
        );
        assert!(outcome.applied());
        assert!(a.has_class("ready") && b.has_class("ready"));
        assert_eq!(b.get_property("title"), Some(json!("tail")));
    }

    #[test]
    fn selector_target_is_re_resolved_each_evaluation() {
        let doc = MemoryDocument::new();
        let conditions = Conditions::builder().resolver(doc.clone()).build();
        let r = reactive_ref(1);

        let binding = conditions.when_state(&r, json!({"truthy": {"title": "set"}}), ".late", Default::default());
        assert_eq!(binding.state(), BindingState::Idle);
        assert_eq!(binding.last_outcome(), Some(ApplyOutcome::NoElements));

        let late = doc.create_element("div");
        late.add_class("late");
        r.set_value(2);
        assert_eq!(binding.state(), BindingState::Bound);
        assert_eq!(late.get_property("title"), Some(json!("set")));
    }

    #[test]
    fn unreliable_lists_are_fully_applied() {
        let items: Vec<ElementRef> = (0..4).map(|_| MemoryElement::new("li") as ElementRef).collect();
        let list = Rc::new(MemoryList::with_broken_iterator(items.clone()));
        Conditions::new().apply("go", json!({"go": {"hidden": true}}), Target::list(list));
        for item in &items {
            assert_eq!(item.get_property("hidden"), Some(json!(true)));
        }
    }

    #[test]
    fn updater_path_is_preferred_but_listeners_stay_tracked() {
        let el = MemoryElement::with_updater("button");
        Conditions::new().apply(
            "on",
            ConditionTable::new().when(
                "on",
                Config::new().set("textContent", "bulk").on("click", |_: &Event| {}),
            ),
            &el,
        );
        assert_eq!(el.update_count(), 1);
        assert_eq!(el.text(), "bulk");
        assert_eq!(el.listeners().len(), 1);
    }

    #[test]
    fn custom_matchers_and_handlers() {
        let conditions = Conditions::new();
        conditions.register_matcher(
            "even",
            FnMatcher::new(
                |condition: &str, _: &Value| condition == "even",
                |value: &Value, _: &str| value.as_i64().is_some_and(|n| n % 2 == 0),
            ),
        );
        conditions.register_handler(
            "label",
            FnHandler::new(
                |_: &dyn Element, key: &str, _: &Setting| key == "label",
                |el: &dyn Element, setting: &Setting, _: &str| {
                    el.set_attribute("aria-label", &setting.describe())?;
                    Ok(())
                },
            ),
        );

        let el = MemoryElement::new("p");
        let outcome = conditions.apply(4, json!({"even": {"label": "yes"}}), &el);
        assert_eq!(outcome, ApplyOutcome::Matched { condition: "even".into() });
        assert_eq!(el.get_attribute("aria-label").as_deref(), Some("\"yes\""));
    }

    #[test]
    fn when_state_options_deserialize() {
        let options: WhenStateOptions = serde_json::from_value(json!({"reactive": false})).unwrap();
        assert_eq!(options, WhenStateOptions::static_only());
        let options: WhenStateOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options.reactive, None);
    }

    #[test]
    fn batch_coalesces_binding_runs() {
        let el = MemoryElement::new("p");
        let s = state(json!({"a": 1, "b": 1}));
        let conditions = Conditions::new();
        let binding = conditions.when_state(
            ValueSource::getter({
                let s = s.clone();
                move || json!(s.get("a").as_i64().unwrap_or(0) + s.get("b").as_i64().unwrap_or(0))
            }),
            json!({">3": {"title": "big"}, "default": {"title": "small"}}),
            &el,
            Default::default(),
        );
        let runs_before = binding.effect().map(Effect::run_count).unwrap_or(0);

        conditions.batch(|| {
            s.set("a", 2);
            s.set("b", 2);
        });

        assert_eq!(binding.effect().map(Effect::run_count).unwrap_or(0), runs_before + 1);
        assert_eq!(el.get_property("title"), Some(json!("big")));
    }
}
