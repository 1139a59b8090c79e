use serde_json::json;
use spark_dom::{
    effect, effect_with_cleanup, reactive_ref, state, BindingState, Conditions, Config, Effect,
    Element, Event, MemoryElement, WhenStateOptions,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_effect_drop_runs_teardown() {
    let cleanup_called = Rc::new(Cell::new(false));

    {
        let _handle = effect_with_cleanup({
            let cleanup_called = cleanup_called.clone();
            move || {
                let cc = cleanup_called.clone();
                Some(Box::new(move || cc.set(true)))
            }
        });
    }

    assert!(cleanup_called.get(), "Dropping the handle should run the teardown");
}

#[test]
fn test_effect_drop_releases_subscriptions() {
    let count = reactive_ref(0);
    let runs = Rc::new(Cell::new(0));

    {
        let _handle = effect({
            let (count, runs) = (count.clone(), runs.clone());
            move || {
                let _ = count.value();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(count.subscriber_count(), 1);
    }

    assert_eq!(count.subscriber_count(), 0);
    count.set_value(1);
    assert_eq!(runs.get(), 1, "Dropped effect should not re-run");
}

#[test]
fn test_cloned_handle_keeps_effect_alive() {
    let count = reactive_ref(0);
    let runs = Rc::new(Cell::new(0));

    let keep: Effect;
    {
        let handle = effect({
            let (count, runs) = (count.clone(), runs.clone());
            move || {
                let _ = count.value();
                runs.set(runs.get() + 1);
            }
        });
        keep = handle.clone();
    }

    count.set_value(1);
    assert_eq!(runs.get(), 2);
    assert!(!keep.is_destroyed());

    drop(keep);
    count.set_value(2);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_child_effect_owned_by_parent() {
    let outer = reactive_ref(0);
    let inner = reactive_ref(0);
    let inner_runs = Rc::new(Cell::new(0));

    let _parent = effect({
        let (outer, inner, inner_runs) = (outer.clone(), inner.clone(), inner_runs.clone());
        move || {
            let _ = outer.value();
            // Handle dropped at once; the parent keeps the child alive
            let _child = effect({
                let (inner, inner_runs) = (inner.clone(), inner_runs.clone());
                move || {
                    let _ = inner.value();
                    inner_runs.set(inner_runs.get() + 1);
                }
            });
        }
    });

    assert_eq!(inner_runs.get(), 1);
    inner.set_value(1);
    assert_eq!(inner_runs.get(), 2);

    // Re-running the parent replaces the child instead of stacking another
    outer.set_value(1);
    assert_eq!(inner_runs.get(), 3);
    assert_eq!(inner.subscriber_count(), 1);

    inner.set_value(2);
    assert_eq!(inner_runs.get(), 4);
}

// =============================================================================
// Bindings
// =============================================================================

#[test]
fn test_binding_drop_stops_updates() {
    let el = MemoryElement::new("span");
    let s = state(json!({"count": 0}));
    let conditions = Conditions::new();

    {
        let _binding = conditions.when_state(
            (&s, "count"),
            json!({"0": {"textContent": "zero"}, "default": {"textContent": "other"}}),
            &el,
            WhenStateOptions::default(),
        );
        assert_eq!(el.text(), "zero");
        assert_eq!(s.subscriber_count("count"), 1);
    }

    assert_eq!(s.subscriber_count("count"), 0);
    s.set("count", 3);
    assert_eq!(el.text(), "zero");
}

#[test]
fn test_binding_drop_removes_listeners() {
    let el = MemoryElement::new("button");
    let clicks = Rc::new(Cell::new(0));
    let conditions = Conditions::new();
    let active = reactive_ref(true);

    let table = spark_dom::ConditionTable::new().when(
        "true",
        Config::new().on("click", {
            let clicks = clicks.clone();
            move |_: &Event| clicks.set(clicks.get() + 1)
        }),
    );

    {
        let _binding = conditions.when_state(&active, table, &el, WhenStateOptions::default());
        assert_eq!(el.listener_count("click"), 1);
        el.dispatch_event(&Event::new("click"));
        assert_eq!(clicks.get(), 1);
    }

    assert_eq!(el.listener_count("click"), 0);
    el.dispatch_event(&Event::new("click"));
    assert_eq!(clicks.get(), 1);
}

#[test]
fn test_destroyed_binding_ignores_update() {
    let el = MemoryElement::new("span");
    let value = reactive_ref(1);
    let binding = Conditions::new().when_state(
        &value,
        json!({"1": {"textContent": "one"}, "2": {"textContent": "two"}}),
        &el,
        WhenStateOptions::default(),
    );
    assert_eq!(binding.state(), BindingState::Bound);

    binding.destroy();
    assert_eq!(binding.state(), BindingState::Disposed);
    assert!(binding.effect().is_some_and(|e| e.is_destroyed()));

    value.set_value(2);
    assert_eq!(el.text(), "one");
    assert_eq!(binding.update(), spark_dom::ApplyOutcome::Disposed);

    // Destroying twice is harmless
    binding.destroy();
}

#[test]
fn test_binding_inside_effect_is_rebuilt_per_run() {
    let el = MemoryElement::new("div");
    let mode = reactive_ref("light".to_string());
    let count = reactive_ref(0);
    let conditions = Conditions::new();
    let evaluations = Rc::new(RefCell::new(Vec::new()));

    let _parent = effect({
        let (el, mode, count, conditions, evaluations) = (
            el.clone(),
            mode.clone(),
            count.clone(),
            conditions.clone(),
            evaluations.clone(),
        );
        move || {
            let class = format!("{}-positive", mode.value());
            let evaluations = evaluations.clone();
            let _binding = conditions.when_state(
                spark_dom::ValueSource::getter({
                    let count = count.clone();
                    move || {
                        let n = count.value();
                        evaluations.borrow_mut().push(n);
                        json!(n)
                    }
                }),
                spark_dom::ConditionTable::new()
                    .when(">0", Config::new().set("className", class.as_str()))
                    .otherwise(Config::new().set("className", "")),
                &el,
                WhenStateOptions::default(),
            );
        }
    });

    count.set_value(1);
    assert_eq!(el.class_name(), "light-positive");

    mode.set_value("dark".to_string());
    assert_eq!(el.class_name(), "dark-positive");
    assert_eq!(count.subscriber_count(), 1, "Old binding should be disposed");

    count.set_value(0);
    assert_eq!(el.class_name(), "");
    assert_eq!(*evaluations.borrow(), vec![0, 1, 1, 0]);
}
