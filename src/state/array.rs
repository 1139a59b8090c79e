// ============================================================================
// spark-dom - Array Containers
// Mutation methods for array-shaped reactive containers
// ============================================================================
//
// Every structural change notifies `length`, the iteration key, and each
// tracked index from the first position whose content moved. All of it goes
// out in one batch, so an effect that iterates the array re-runs once.
// ============================================================================

use std::cmp::Ordering;

use serde_json::Value;
use tracing::warn;

use super::reactive::{Body, IntoField, Reactive, Slot, ITERATE_KEY, LENGTH_KEY};
use crate::reactivity::batching::untrack;
use crate::reactivity::tracking::writes_allowed;

impl Reactive {
    /// Run `f` over the items of an array container, then notify readers of
    /// every index from the position `f` reports as first changed.
    ///
    /// Returns `None` (after a warning) for object containers.
    fn mutate_array<R>(
        &self,
        method: &str,
        f: impl FnOnce(&mut Vec<Slot>) -> (Option<usize>, R),
    ) -> Option<R> {
        if !writes_allowed() {
            return None;
        }

        let (first_changed, result) = {
            let mut body = self.inner.body.borrow_mut();
            let Body::Array(items) = &mut *body else {
                warn!(method, "[ReactiveState] Array method called on an object container; ignoring");
                return None;
            };
            f(items)
        };

        if let Some(start) = first_changed {
            let mut keys = self.tracked_indices_from(start);
            keys.push(LENGTH_KEY.to_string());
            keys.push(ITERATE_KEY.to_string());
            self.notify_keys(&keys);
        }

        Some(result)
    }

    /// Append an item. Returns the new length.
    pub fn push(&self, value: impl IntoField) -> usize {
        let slot = Slot::from(value.into_field());
        if !self.admits(&slot, "push") {
            return untrack(|| self.len());
        }
        self.mutate_array("push", move |items| {
            items.push(slot);
            (Some(items.len() - 1), items.len())
        })
        .unwrap_or(0)
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<Value> {
        self.mutate_array("pop", |items| match items.pop() {
            Some(slot) => (Some(items.len()), Some(slot.raw())),
            None => (None, None),
        })
        .flatten()
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Option<Value> {
        self.mutate_array("shift", |items| {
            if items.is_empty() {
                (None, None)
            } else {
                (Some(0), Some(items.remove(0).raw()))
            }
        })
        .flatten()
    }

    /// Prepend an item. Returns the new length.
    pub fn unshift(&self, value: impl IntoField) -> usize {
        let slot = Slot::from(value.into_field());
        if !self.admits(&slot, "unshift") {
            return untrack(|| self.len());
        }
        self.mutate_array("unshift", move |items| {
            items.insert(0, slot);
            (Some(0), items.len())
        })
        .unwrap_or(0)
    }

    /// Insert at `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: impl IntoField) {
        let slot = Slot::from(value.into_field());
        if !self.admits(&slot, "insert") {
            return;
        }
        self.mutate_array("insert", move |items| {
            let index = index.min(items.len());
            items.insert(index, slot);
            (Some(index), ())
        });
    }

    /// Remove and return the item at `index`, if in range.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.mutate_array("remove", |items| {
            if index < items.len() {
                (Some(index), Some(items.remove(index).raw()))
            } else {
                (None, None)
            }
        })
        .flatten()
    }

    /// Remove `delete_count` items at `start` and insert `replacements`
    /// there. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, replacements: Vec<Value>) -> Vec<Value> {
        self.mutate_array("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let inserted = replacements.len();
            let removed: Vec<Value> = items
                .splice(start..end, replacements.into_iter().map(Slot::Plain))
                .map(|slot| slot.raw())
                .collect();

            let changed = if removed.is_empty() && inserted == 0 {
                None
            } else {
                Some(start)
            };
            (changed, removed)
        })
        .unwrap_or_default()
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.mutate_array("clear", |items| {
            if items.is_empty() {
                (None, ())
            } else {
                items.clear();
                (Some(0), ())
            }
        });
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate_array("reverse", |items| {
            items.reverse();
            (Some(0), ())
        });
    }

    /// Sort in place by comparing item data.
    ///
    /// The comparator sees plain snapshots and runs while the container is
    /// detached, so it must not read this container.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let Some(taken) = self.take_items("sort_by") else {
            return;
        };

        let mut keyed: Vec<(Value, Slot)> =
            taken.into_iter().map(|slot| (slot.raw(), slot)).collect();
        keyed.sort_by(|a, b| compare(&a.0, &b.0));

        self.mutate_array("sort_by", move |items| {
            *items = keyed.into_iter().map(|(_, slot)| slot).collect();
            (Some(0), ())
        });
    }

    /// Keep only items for which `keep` returns true. Returns how many were
    /// removed.
    pub fn retain(&self, mut keep: impl FnMut(&Value) -> bool) -> usize {
        let Some(taken) = self.take_items("retain") else {
            return 0;
        };

        let original_len = taken.len();
        let mut first_removed = None;
        let mut kept = Vec::with_capacity(original_len);
        for (index, slot) in taken.into_iter().enumerate() {
            if keep(&slot.raw()) {
                kept.push(slot);
            } else if first_removed.is_none() {
                first_removed = Some(index);
            }
        }
        let removed = original_len - kept.len();

        self.mutate_array("retain", move |items| {
            *items = kept;
            (first_removed, removed)
        })
        .unwrap_or(0)
    }

    /// Move the items out without notifying (they are put back by the caller)
    fn take_items(&self, method: &str) -> Option<Vec<Slot>> {
        if !writes_allowed() {
            return None;
        }
        let mut body = self.inner.body.borrow_mut();
        match &mut *body {
            Body::Array(items) => Some(std::mem::take(items)),
            Body::Object(_) => {
                warn!(method, "[ReactiveState] Array method called on an object container; ignoring");
                None
            }
        }
    }

    /// Read the item at `index` (tracked; `null` when out of range).
    pub fn get_index(&self, index: usize) -> Value {
        self.get(&index.to_string())
    }

    /// Read the item at `index` as a nested container.
    pub fn child_index(&self, index: usize) -> Option<Reactive> {
        self.child(&index.to_string())
    }

    /// Write the item at `index`. Writing past the end pads with `null`.
    pub fn set_index(&self, index: usize, value: impl IntoField) {
        self.set(&index.to_string(), value);
    }

    /// Tracked snapshot of every item.
    pub fn values(&self) -> Vec<Value> {
        match self.snapshot() {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::primitives::effect::effect;
    use crate::state::reactive::state;
    use serde_json::{json, Value};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn array_cannot_hold_itself() {
        let list = state(json!([{ "id": 1 }]));
        let item = list.child_index(0).unwrap();

        assert_eq!(list.push(&list), 1);
        assert_eq!(list.unshift(&list), 1);
        list.insert(0, &list);
        item.set("parent", &list);

        assert_eq!(list.raw(), json!([{ "id": 1 }]));
        assert!(logs_contain("[ReactiveState] Refusing to store a container inside itself"));

        let other = state(json!([]));
        assert_eq!(list.push(&other), 2);
    }

    #[test]
    fn push_pop_shift_unshift() {
        let list = state(json!([1, 2]));
        assert_eq!(list.push(3), 3);
        assert_eq!(list.unshift(0), 4);
        assert_eq!(list.raw(), json!([0, 1, 2, 3]));

        assert_eq!(list.pop(), Some(json!(3)));
        assert_eq!(list.shift(), Some(json!(0)));
        assert_eq!(list.raw(), json!([1, 2]));

        list.clear();
        assert_eq!(list.pop(), None);
        assert_eq!(list.shift(), None);
    }

    #[test]
    fn length_readers_rerun_once_per_push() {
        let list = state(json!([]));
        let runs = Rc::new(Cell::new(0));
        let len = Rc::new(Cell::new(0));

        let _e = effect({
            let (list, runs, len) = (list.clone(), runs.clone(), len.clone());
            move || {
                len.set(list.len());
                runs.set(runs.get() + 1);
            }
        });

        list.push("a");
        assert_eq!(len.get(), 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn iterating_effect_sees_structural_changes() {
        let list = state(json!(["a", "b", "c"]));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let runs = Rc::new(Cell::new(0));

        let _e = effect({
            let (list, seen, runs) = (list.clone(), seen.clone(), runs.clone());
            move || {
                *seen.borrow_mut() = list.values();
                runs.set(runs.get() + 1);
            }
        });

        list.splice(1, 1, vec![json!("x"), json!("y")]);
        assert_eq!(*seen.borrow(), vec![json!("a"), json!("x"), json!("y"), json!("c")]);
        assert_eq!(runs.get(), 2);

        list.reverse();
        assert_eq!(*seen.borrow(), vec![json!("c"), json!("y"), json!("x"), json!("a")]);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn index_readers_rerun_when_items_shift() {
        let list = state(json!(["a", "b"]));
        let first = Rc::new(RefCell::new(Value::Null));

        let _e = effect({
            let (list, first) = (list.clone(), first.clone());
            move || *first.borrow_mut() = list.get_index(0)
        });

        list.unshift("z");
        assert_eq!(*first.borrow(), json!("z"));

        list.remove(0);
        assert_eq!(*first.borrow(), json!("a"));
    }

    #[test]
    fn appending_does_not_rerun_earlier_index_readers() {
        let list = state(json!(["a"]));
        let runs = Rc::new(Cell::new(0));

        let _e = effect({
            let (list, runs) = (list.clone(), runs.clone());
            move || {
                let _ = list.get_index(0);
                runs.set(runs.get() + 1);
            }
        });

        list.push("b");
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn sort_and_retain() {
        let list = state(json!([3, 1, 2, 5, 4]));
        list.sort_by(|a, b| a.as_i64().cmp(&b.as_i64()));
        assert_eq!(list.raw(), json!([1, 2, 3, 4, 5]));

        let removed = list.retain(|v| v.as_i64().is_some_and(|n| n % 2 == 1));
        assert_eq!(removed, 2);
        assert_eq!(list.raw(), json!([1, 3, 5]));
    }

    #[test]
    fn sort_keeps_wrapped_children() {
        let list = state(json!([{ "n": 2 }, { "n": 1 }]));
        let second = list.child_index(0).unwrap();

        list.sort_by(|a, b| a["n"].as_i64().cmp(&b["n"].as_i64()));

        assert!(list.child_index(1).unwrap().ptr_eq(&second));
    }

    #[test]
    fn insert_clamps_and_set_index_pads() {
        let list = state(json!([1]));
        list.insert(10, 2);
        assert_eq!(list.raw(), json!([1, 2]));

        list.set_index(3, 4);
        assert_eq!(list.raw(), json!([1, 2, null, 4]));
    }

    #[test]
    #[traced_test]
    fn array_methods_on_objects_warn() {
        let obj = state(json!({ "a": 1 }));
        assert_eq!(obj.push(1), 0);
        assert!(logs_contain("[ReactiveState] Array method called on an object container"));
        assert_eq!(obj.raw(), json!({ "a": 1 }));
    }

    #[test]
    fn splice_returns_removed() {
        let list = state(json!([1, 2, 3, 4]));
        let removed = list.splice(1, 2, vec![]);
        assert_eq!(removed, vec![json!(2), json!(3)]);
        assert_eq!(list.raw(), json!([1, 4]));

        assert!(list.splice(10, 1, vec![]).is_empty());
    }
}
