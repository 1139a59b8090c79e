// ============================================================================
// spark-dom - Reactive State and Conditional DOM Updates
// ============================================================================
//
// Two layers:
//
// - A fine-grained reactive runtime: `state()` containers over JSON-shaped
//   data, `reactive_ref()`, `computed()`, `effect()`, `watch()` and
//   `batch()`. Reads inside an effect or computed are recorded per key;
//   writes re-run exactly the reactions that read what changed.
//
// - The conditions engine: declarative tables mapping condition keys
//   ("true", ">10", "/^\\d+$/", "20-30", ...) to element configurations,
//   bound to reactive values with `Conditions::when_state` so the DOM follows
//   the state.
//
// Elements are reached through the `dom::Element` trait; `dom::memory`
// provides a headless implementation.
// ============================================================================

pub mod conditions;
pub mod core;
pub mod dom;
pub mod error;
pub mod primitives;
pub mod reactivity;
pub mod state;

mod macros;

// Reactive runtime
pub use core::context::{is_tracking, with_context, ReactiveContext};
pub use core::types::{AnyReaction, AnySource, Dep};
pub use primitives::computed::{computed, Computed};
pub use primitives::effect::{effect, effect_tracking, effect_with_cleanup, CleanupFn, Effect};
pub use primitives::reference::{reactive_ref, Ref};
pub use primitives::watch::{watch, watch_immediate};
pub use reactivity::batching::{batch, is_batching, is_untracking, peek, untrack};
pub use reactivity::scheduling::flush_sync;

// Reactive containers
pub use state::{collection, state, Field, IntoField, IntoReactive, Reactive, ReactiveCollection};

// Conditions engine
pub use conditions::{
    ApplyOutcome, Binding, BindingState, ConditionSpec, ConditionTable, Conditions,
    ConditionsBuilder, Config, FnHandler, FnMatcher, HandlerRegistry, Matcher, MatcherRegistry,
    PropertyHandler, Setting, ValueSource, WhenStateOptions,
};

// DOM boundary
pub use dom::{
    Element, ElementList, ElementRef, ElementResolver, Event, EventHandler, ListenerOptions,
    MemoryDocument, MemoryElement, MemoryList, Resolved, Target, Updatable,
};

pub use error::{ApplyError, ConfigError, DomError, SourceError};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, impl Fn()) {
        let runs = Rc::new(Cell::new(0));
        let bump = {
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        };
        (runs, bump)
    }

    // =========================================================================
    // Reactive core
    // =========================================================================

    #[test]
    fn wrapping_is_identity_stable() {
        let s = state(json!({"user": {"name": "Ada"}}));
        let again = Reactive::wrap(&s).unwrap();
        assert!(again.ptr_eq(&s));

        let user = s.child("user").unwrap();
        assert!(Reactive::wrap(&user).unwrap().ptr_eq(&user));
        assert!(s.child("user").unwrap().ptr_eq(&user));
    }

    #[test]
    fn dependency_precision_follows_branches() {
        let s = state(json!({"flag": true, "a": 1, "b": 1}));
        let (runs, bump) = counter();

        let _effect = effect({
            let s = s.clone();
            move || {
                if s.get("flag") == json!(true) {
                    let _ = s.get("a");
                } else {
                    let _ = s.get("b");
                }
                bump();
            }
        });
        assert_eq!(runs.get(), 1);

        s.set("a", 2);
        assert_eq!(runs.get(), 2);
        s.set("b", 2);
        assert_eq!(runs.get(), 2);

        s.set("flag", false);
        assert_eq!(runs.get(), 3);
        s.set("a", 3);
        assert_eq!(runs.get(), 3);
        s.set("b", 3);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn batch_coalesces_writes() {
        let s = state(json!({"x": 0, "y": 0}));
        let (runs, bump) = counter();

        let _effect = effect({
            let s = s.clone();
            move || {
                let _ = s.get("x").as_i64().unwrap_or(0) + s.get("y").as_i64().unwrap_or(0);
                bump();
            }
        });

        batch(|| {
            s.set("x", 1);
            s.set("y", 1);
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn computed_property_caches() {
        let s = state(json!({"price": 10, "qty": 2}));
        let calls = Rc::new(Cell::new(0));
        let total = s.computed("total", {
            let calls = calls.clone();
            move |s: &Reactive| {
                calls.set(calls.get() + 1);
                json!(s.get("price").as_i64().unwrap_or(0) * s.get("qty").as_i64().unwrap_or(0))
            }
        });

        assert_eq!(s.get("total"), json!(20));
        assert_eq!(s.get("total"), json!(20));
        assert_eq!(total.compute_count(), 1);
        assert_eq!(calls.get(), 1);

        s.set("qty", 3);
        assert_eq!(s.get("total"), json!(30));
        assert_eq!(calls.get(), 2);
    }

    // =========================================================================
    // End to end
    // =========================================================================

    #[test]
    fn state_drives_text_through_conditions() {
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

        s.set("count", 5);
        assert_eq!(el.text(), "positive");
    }

    #[test]
    fn null_without_default_changes_nothing() {
        let el = MemoryElement::new("div");
        let outcome = Conditions::new().apply(Value::Null, json!({"true": {}, "false": {}}), &el);
        assert_eq!(outcome, ApplyOutcome::NoMatch);
        assert_eq!(el.text(), "");
        assert_eq!(el.class_name(), "");
    }

    #[test]
    fn regex_condition_end_to_end() {
        let conditions = Conditions::new();
        assert!(conditions.matches(&json!("123"), "/^\\d{3}$/"));
        assert!(!conditions.matches(&json!("12"), "/^\\d{3}$/"));
        assert!(!conditions.matches(&json!("1234"), "/^\\d{3}$/"));
    }

    #[test]
    fn collection_rows_follow_item_state() {
        let doc = MemoryDocument::new();
        let rows: Vec<Rc<MemoryElement>> = (0..3)
            .map(|_| {
                let row = doc.create_element("li");
                row.add_class("todo");
                row
            })
            .collect();

        let todos = collection(vec![
            json!({"id": 1, "done": false}),
            json!({"id": 2, "done": false}),
            json!({"id": 3, "done": false}),
        ]);
        let conditions = Conditions::builder().resolver(doc.clone()).build();

        let _binding = conditions.when_state(
            ValueSource::getter({
                let todos = todos.clone();
                move || json!(todos.filter(|t| t["done"] == true).len())
            }),
            json!({
                "0": {"0": {"textContent": "nothing done"}},
                ">0": {"classList": {"add": "progress"}, "-1": {"textContent": "some done"}}
            }),
            ".todo",
            WhenStateOptions::default(),
        );
        assert_eq!(rows[0].text(), "nothing done");
        assert!(!rows[1].has_class("progress"));

        todos.toggle_where(|t| t["id"] == 2, "done");
        assert!(rows.iter().all(|row| row.has_class("progress")));
        assert_eq!(rows[2].text(), "some done");
    }
}
