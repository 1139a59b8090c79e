// ============================================================================
// spark-dom - Targets
// Turning "what to apply to" into a list of elements
// ============================================================================

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::element::{Element, ElementRef};
use crate::error::ConfigError;

// =============================================================================
// ELEMENT LISTS
// =============================================================================

/// An array-like collection of elements (a `NodeList`, an `HTMLCollection`).
///
/// Iteration is optional and allowed to be unreliable; indexed access is the
/// source of truth.
pub trait ElementList {
    fn len(&self) -> usize;

    fn item(&self, index: usize) -> Option<ElementRef>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native iteration, when the list supports it
    fn try_iter(&self) -> Option<Box<dyn Iterator<Item = ElementRef> + '_>> {
        None
    }
}

/// Collect an element list, preferring native iteration and falling back to
/// index-bounded access when the iterator is missing or disagrees with
/// `len()`.
pub fn safe_collect(list: &dyn ElementList) -> Vec<ElementRef> {
    let expected = list.len();

    if let Some(iter) = list.try_iter() {
        let collected: Vec<ElementRef> = iter.take(expected.saturating_add(1)).collect();
        if collected.len() == expected {
            return collected;
        }
        debug!(
            expected,
            got = collected.len(),
            "[Conditions] Element list iterator is unreliable; falling back to indexed access"
        );
    }

    (0..expected).filter_map(|index| list.item(index)).collect()
}

// =============================================================================
// RESOLVER
// =============================================================================

/// What a selector resolved to.
pub enum Resolved {
    Nothing,
    Single(ElementRef),
    Many(Vec<ElementRef>),
    List(Rc<dyn ElementList>),
}

/// Looks elements up by selector (`#id`, `.class`, tag, ...).
pub trait ElementResolver {
    fn resolve(&self, selector: &str) -> Resolved;
}

// =============================================================================
// TARGET
// =============================================================================

/// The element(s) a configuration is applied to.
#[derive(Clone)]
pub enum Target {
    Element(ElementRef),
    Elements(Vec<ElementRef>),
    List(Rc<dyn ElementList>),
    /// Resolved on every evaluation through the configured resolver
    Selector(String),
}

impl Target {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }

    pub fn list(list: Rc<dyn ElementList>) -> Self {
        Self::List(list)
    }

    /// Resolve to concrete elements. A single element comes back as a list of
    /// one, so index keys treat it like any other collection.
    pub fn resolve(
        &self,
        resolver: Option<&dyn ElementResolver>,
    ) -> Result<Vec<ElementRef>, ConfigError> {
        match self {
            Target::Element(element) => Ok(vec![element.clone()]),
            Target::Elements(elements) => Ok(elements.clone()),
            Target::List(list) => Ok(safe_collect(list.as_ref())),
            Target::Selector(selector) => {
                let selector = selector.trim();
                if selector.is_empty() {
                    return Err(ConfigError::EmptySelector);
                }
                let Some(resolver) = resolver else {
                    return Err(ConfigError::NoResolver {
                        selector: selector.to_string(),
                    });
                };
                Ok(match resolver.resolve(selector) {
                    Resolved::Nothing => Vec::new(),
                    Resolved::Single(element) => vec![element],
                    Resolved::Many(elements) => elements,
                    Resolved::List(list) => safe_collect(list.as_ref()),
                })
            }
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Element(element) => f.debug_tuple("Element").field(element).finish(),
            Target::Elements(elements) => f.debug_tuple("Elements").field(&elements.len()).finish(),
            Target::List(list) => f.debug_tuple("List").field(&list.len()).finish(),
            Target::Selector(selector) => f.debug_tuple("Selector").field(selector).finish(),
        }
    }
}

impl<E: Element + 'static> From<Rc<E>> for Target {
    fn from(element: Rc<E>) -> Self {
        Target::Element(element)
    }
}

impl<E: Element + 'static> From<&Rc<E>> for Target {
    fn from(element: &Rc<E>) -> Self {
        Target::Element(element.clone())
    }
}

impl From<Vec<ElementRef>> for Target {
    fn from(elements: Vec<ElementRef>) -> Self {
        Target::Elements(elements)
    }
}

impl From<&str> for Target {
    fn from(selector: &str) -> Self {
        Target::Selector(selector.to_string())
    }
}

impl From<String> for Target {
    fn from(selector: String) -> Self {
        Target::Selector(selector)
    }
}
