// ============================================================================
// spark-dom - Reactive Collections
// A list of items with the usual add/remove/update helpers
// ============================================================================

use serde_json::Value;
use tracing::{debug, warn};

use super::reactive::{state, Reactive};
use crate::conditions::coerce::is_truthy;
use crate::reactivity::batching::{batch, untrack};

/// A reactive list of items backed by an array container.
///
/// Predicates receive plain snapshots of the items. Updates go through the
/// nested item containers, so only the keys actually written notify.
///
/// ```
/// use spark_dom::collection;
/// use serde_json::json;
///
/// let todos = collection(vec![
///     json!({ "id": 1, "done": false }),
///     json!({ "id": 2, "done": true }),
/// ]);
///
/// todos.toggle_where(|t| t["id"] == 1, "done");
/// assert_eq!(todos.filter(|t| t["done"] == true).len(), 2);
///
/// todos.remove_where(|t| t["done"] == true);
/// assert!(todos.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct ReactiveCollection {
    items: Reactive,
}

impl ReactiveCollection {
    /// The underlying array container
    pub fn items(&self) -> &Reactive {
        &self.items
    }

    /// Append an item. Returns the new length.
    pub fn add(&self, item: Value) -> usize {
        self.items.push(item)
    }

    /// Remove every item matching `pred`. Returns how many were removed.
    pub fn remove_where(&self, mut pred: impl FnMut(&Value) -> bool) -> usize {
        let removed = self.items.retain(|item| !pred(item));
        debug!(removed, "[ReactiveState] Removed collection items");
        removed
    }

    /// Merge `patch` into every object item matching `pred`. Returns how many
    /// items were updated.
    pub fn update_where(&self, mut pred: impl FnMut(&Value) -> bool, patch: Value) -> usize {
        if !patch.is_object() {
            warn!(patch = %patch, "[ReactiveState] update_where() expects an object patch; ignoring");
            return 0;
        }

        let targets = self.matching_children(&mut pred);
        batch(|| {
            for child in &targets {
                child.assign(patch.clone());
            }
        });
        targets.len()
    }

    /// Flip the boolean `field` on every object item matching `pred`.
    /// Returns how many items were toggled.
    pub fn toggle_where(&self, mut pred: impl FnMut(&Value) -> bool, field: &str) -> usize {
        let targets = self.matching_children(&mut pred);
        batch(|| {
            for child in &targets {
                let current = untrack(|| child.get(field));
                child.set(field, !is_truthy(&current));
            }
        });
        targets.len()
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.items.clear();
    }

    /// First item matching `pred` (tracked).
    pub fn find(&self, mut pred: impl FnMut(&Value) -> bool) -> Option<Value> {
        self.items.values().into_iter().find(|item| pred(item))
    }

    /// Every item matching `pred` (tracked).
    pub fn filter(&self, mut pred: impl FnMut(&Value) -> bool) -> Vec<Value> {
        self.items
            .values()
            .into_iter()
            .filter(|item| pred(item))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Containers of the object items matching `pred`, found untracked
    fn matching_children(&self, pred: &mut impl FnMut(&Value) -> bool) -> Vec<Reactive> {
        untrack(|| {
            let Value::Array(items) = self.items.raw() else {
                return Vec::new();
            };

            let mut children = Vec::new();
            for (index, item) in items.iter().enumerate() {
                if !pred(item) {
                    continue;
                }
                match self.items.child_index(index) {
                    Some(child) if child.is_object() => children.push(child),
                    _ => warn!(index, "[ReactiveState] Collection item is not an object; skipping"),
                }
            }
            children
        })
    }
}

/// Create a reactive collection.
pub fn collection(items: Vec<Value>) -> ReactiveCollection {
    ReactiveCollection {
        items: state(Value::Array(items)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::effect::effect;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn todos() -> ReactiveCollection {
        collection(vec![
            json!({ "id": 1, "title": "write", "done": false }),
            json!({ "id": 2, "title": "test", "done": false }),
            json!({ "id": 3, "title": "ship", "done": true }),
        ])
    }

    #[test]
    fn add_find_filter() {
        let list = todos();
        assert_eq!(list.len(), 3);
        assert_eq!(list.add(json!({ "id": 4, "done": false })), 4);

        let found = list.find(|t| t["id"] == 2).unwrap();
        assert_eq!(found["title"], json!("test"));

        assert_eq!(list.filter(|t| t["done"] == false).len(), 3);
        assert!(list.find(|t| t["id"] == 99).is_none());
    }

    #[test]
    fn update_where_touches_only_patched_keys() {
        let list = todos();
        let title_runs = Rc::new(Cell::new(0));

        let _e = effect({
            let (list, title_runs) = (list.clone(), title_runs.clone());
            move || {
                let _ = list.items().get_path("0.title");
                title_runs.set(title_runs.get() + 1);
            }
        });

        let updated = list.update_where(|t| t["id"] == 1, json!({ "done": true }));
        assert_eq!(updated, 1);
        assert_eq!(title_runs.get(), 1);
        assert_eq!(list.items().raw()[0]["done"], json!(true));

        list.update_where(|t| t["id"] == 1, json!({ "title": "rewrite" }));
        assert_eq!(title_runs.get(), 2);
    }

    #[test]
    fn toggle_where_flips_booleans() {
        let list = todos();
        assert_eq!(list.toggle_where(|t| t["id"] != 2, "done"), 2);
        let raw = list.items().raw();
        assert_eq!(raw[0]["done"], json!(true));
        assert_eq!(raw[1]["done"], json!(false));
        assert_eq!(raw[2]["done"], json!(false));
    }

    #[test]
    fn remove_where_and_clear() {
        let list = todos();
        assert_eq!(list.remove_where(|t| t["done"] == true), 1);
        assert_eq!(list.len(), 2);

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn effect_over_filter_reruns_on_change() {
        let list = todos();
        let open = Rc::new(Cell::new(0));

        let _e = effect({
            let (list, open) = (list.clone(), open.clone());
            move || open.set(list.filter(|t| t["done"] == false).len())
        });
        assert_eq!(open.get(), 2);

        list.toggle_where(|t| t["id"] == 1, "done");
        assert_eq!(open.get(), 1);

        list.add(json!({ "id": 5, "done": false }));
        assert_eq!(open.get(), 2);
    }

    #[test]
    fn update_where_rejects_non_object_patch() {
        let list = todos();
        assert_eq!(list.update_where(|_| true, json!(5)), 0);
    }
}
