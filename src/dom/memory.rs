// ============================================================================
// spark-dom - In-Memory DOM
// A headless element/document pair implementing the engine's boundary traits
// ============================================================================
//
// Enough DOM to drive the conditions engine without a browser: inline style,
// class list, attributes, dataset, a fixed set of properties and methods,
// and event listeners with `capture`/`once` semantics. Tests and headless
// renderers use it; a browser binding implements the same traits over real
// nodes.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use super::element::{Element, ElementRef, Event, EventHandler, ListenerOptions, Updatable};
use super::listeners::ListenerRegistry;
use super::target::{ElementList, ElementResolver, Resolved};
use crate::conditions::coerce::{is_truthy, to_js_string};
use crate::conditions::config::Config;
use crate::conditions::handlers::HandlerRegistry;
use crate::error::DomError;

// =============================================================================
// KNOWN PROPERTIES AND METHODS
// =============================================================================

/// Properties every memory element has, with their initial values
const STRING_PROPERTIES: &[&str] = &[
    "textContent",
    "innerHTML",
    "innerText",
    "value",
    "title",
    "href",
    "src",
    "placeholder",
    "name",
    "type",
];

const BOOL_PROPERTIES: &[&str] = &["checked", "disabled", "hidden", "selected", "readOnly"];

const NUMBER_PROPERTIES: &[&str] = &["tabIndex", "scrollTop", "scrollLeft"];

const METHODS: &[&str] = &[
    "focus",
    "blur",
    "click",
    "scrollIntoView",
    "select",
    "reset",
    "submit",
    "remove",
];

/// `name` as the DOM would accept it in `setAttribute`
fn valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

// =============================================================================
// MEMORY ELEMENT
// =============================================================================

struct AttachedListener {
    event: String,
    handler: EventHandler,
    options: ListenerOptions,
}

/// A headless element.
pub struct MemoryElement {
    tag: String,
    styles: RefCell<IndexMap<String, String>>,
    classes: RefCell<Vec<String>>,
    attributes: RefCell<IndexMap<String, String>>,
    dataset: RefCell<IndexMap<String, String>>,
    properties: RefCell<IndexMap<String, Value>>,
    attached: RefCell<Vec<AttachedListener>>,
    registry: ListenerRegistry,
    calls: RefCell<Vec<(String, Vec<Value>)>>,
    bulk_updates: Option<Cell<usize>>,
}

impl MemoryElement {
    fn build(tag: &str, bulk: bool) -> Rc<Self> {
        let mut properties = IndexMap::new();
        for name in STRING_PROPERTIES {
            properties.insert(name.to_string(), Value::from(""));
        }
        for name in BOOL_PROPERTIES {
            properties.insert(name.to_string(), Value::Bool(false));
        }
        for name in NUMBER_PROPERTIES {
            properties.insert(name.to_string(), Value::from(0));
        }

        Rc::new(Self {
            tag: tag.to_ascii_uppercase(),
            styles: RefCell::new(IndexMap::new()),
            classes: RefCell::new(Vec::new()),
            attributes: RefCell::new(IndexMap::new()),
            dataset: RefCell::new(IndexMap::new()),
            properties: RefCell::new(properties),
            attached: RefCell::new(Vec::new()),
            registry: ListenerRegistry::new(),
            calls: RefCell::new(Vec::new()),
            bulk_updates: bulk.then(|| Cell::new(0)),
        })
    }

    /// A plain element
    pub fn new(tag: &str) -> Rc<Self> {
        Self::build(tag, false)
    }

    /// An element exposing the bulk `.update()` helper
    pub fn with_updater(tag: &str) -> Rc<Self> {
        Self::build(tag, true)
    }

    /// `textContent` as a string
    pub fn text(&self) -> String {
        self.get_property("textContent")
            .map(|value| to_js_string(&value))
            .unwrap_or_default()
    }

    /// Inline styles in assignment order
    pub fn styles(&self) -> IndexMap<String, String> {
        self.styles.borrow().clone()
    }

    /// Attributes in assignment order
    pub fn attributes(&self) -> IndexMap<String, String> {
        self.attributes.borrow().clone()
    }

    /// Every method call so far, with its arguments
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.borrow().clone()
    }

    /// How many times the bulk helper ran (always 0 without one)
    pub fn update_count(&self) -> usize {
        self.bulk_updates.as_ref().map_or(0, Cell::get)
    }

    fn is_listener(entry: &AttachedListener, event: &str, handler: &EventHandler, options: ListenerOptions) -> bool {
        entry.event == event && entry.handler.ptr_eq(handler) && entry.options.capture == options.capture
    }
}

impl Element for MemoryElement {
    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn set_style(&self, property: &str, value: &str) -> Result<(), DomError> {
        if property.is_empty() {
            return Err(DomError::PropertyRejected {
                name: "style".into(),
                reason: "empty style property".into(),
            });
        }
        let mut styles = self.styles.borrow_mut();
        if value.is_empty() {
            styles.shift_remove(property);
        } else {
            styles.insert(property.to_string(), value.to_string());
        }
        Ok(())
    }

    fn style(&self, property: &str) -> Option<String> {
        self.styles.borrow().get(property).cloned()
    }

    fn add_class(&self, class: &str) {
        let mut classes = self.classes.borrow_mut();
        if !class.is_empty() && !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }

    fn remove_class(&self, class: &str) {
        self.classes.borrow_mut().retain(|c| c != class);
    }

    fn toggle_class(&self, class: &str) -> bool {
        if self.has_class(class) {
            self.remove_class(class);
            false
        } else {
            self.add_class(class);
            true
        }
    }

    fn replace_class(&self, old: &str, new: &str) -> bool {
        let mut classes = self.classes.borrow_mut();
        let Some(index) = classes.iter().position(|c| c == old) else {
            return false;
        };
        if classes.iter().any(|c| c == new) {
            classes.remove(index);
        } else {
            classes[index] = new.to_string();
        }
        true
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.borrow().iter().any(|c| c == class)
    }

    fn set_class_name(&self, classes: &str) {
        let mut list: Vec<String> = Vec::new();
        for class in classes.split_whitespace() {
            if !list.iter().any(|c| c == class) {
                list.push(class.to_string());
            }
        }
        *self.classes.borrow_mut() = list;
    }

    fn class_name(&self) -> String {
        self.classes.borrow().join(" ")
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        if !valid_attribute_name(name) {
            return Err(DomError::InvalidAttributeName {
                name: name.to_string(),
            });
        }
        if name == "class" {
            self.set_class_name(value);
            return Ok(());
        }
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        if name == "class" {
            let classes = self.class_name();
            return (!classes.is_empty()).then_some(classes);
        }
        self.attributes.borrow().get(name).cloned()
    }

    fn remove_attribute(&self, name: &str) {
        if name == "class" {
            self.classes.borrow_mut().clear();
            return;
        }
        self.attributes.borrow_mut().shift_remove(name);
    }

    fn set_data(&self, key: &str, value: &str) {
        self.dataset
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn data(&self, key: &str) -> Option<String> {
        self.dataset.borrow().get(key).cloned()
    }

    fn has_property(&self, name: &str) -> bool {
        matches!(name, "id" | "className") || self.properties.borrow().contains_key(name)
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.get_attribute("id").unwrap_or_default())),
            "className" => Some(Value::from(self.class_name())),
            _ => self.properties.borrow().get(name).cloned(),
        }
    }

    fn set_property(&self, name: &str, value: &Value) -> Result<(), DomError> {
        match name {
            "id" => {
                self.attributes
                    .borrow_mut()
                    .insert("id".to_string(), to_js_string(value));
            }
            "className" => self.set_class_name(&to_js_string(value)),
            _ if BOOL_PROPERTIES.contains(&name) => {
                self.properties
                    .borrow_mut()
                    .insert(name.to_string(), Value::Bool(is_truthy(value)));
            }
            _ if NUMBER_PROPERTIES.contains(&name) => {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                    _ => None,
                };
                let Some(number) = number else {
                    return Err(DomError::PropertyRejected {
                        name: name.to_string(),
                        reason: format!("{value} is not a number"),
                    });
                };
                self.properties
                    .borrow_mut()
                    .insert(name.to_string(), Value::from(number));
            }
            _ if STRING_PROPERTIES.contains(&name) => {
                self.properties
                    .borrow_mut()
                    .insert(name.to_string(), Value::from(to_js_string(value)));
            }
            // Expando property
            _ => {
                self.properties
                    .borrow_mut()
                    .insert(name.to_string(), value.clone());
            }
        }
        Ok(())
    }

    fn has_method(&self, name: &str) -> bool {
        METHODS.contains(&name)
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, DomError> {
        if !self.has_method(name) {
            return Err(DomError::MissingMethod {
                tag: self.tag.clone(),
                method: name.to_string(),
            });
        }

        self.calls
            .borrow_mut()
            .push((name.to_string(), args.to_vec()));

        match name {
            "click" | "focus" | "blur" | "submit" | "reset" => {
                self.dispatch_event(&Event::new(name));
            }
            _ => {}
        }
        Ok(Value::Null)
    }

    fn add_event_listener(&self, event: &str, handler: &EventHandler, options: ListenerOptions) {
        let mut attached = self.attached.borrow_mut();
        if attached
            .iter()
            .any(|entry| Self::is_listener(entry, event, handler, options))
        {
            return;
        }
        attached.push(AttachedListener {
            event: event.to_string(),
            handler: handler.clone(),
            options,
        });
    }

    fn remove_event_listener(&self, event: &str, handler: &EventHandler, options: ListenerOptions) {
        self.attached
            .borrow_mut()
            .retain(|entry| !Self::is_listener(entry, event, handler, options));
    }

    fn listener_count(&self, event: &str) -> usize {
        self.attached
            .borrow()
            .iter()
            .filter(|entry| entry.event == event)
            .count()
    }

    fn dispatch_event(&self, event: &Event) -> usize {
        // Handlers may add/remove listeners: run them on a snapshot
        let handlers: Vec<EventHandler> = {
            let mut attached = self.attached.borrow_mut();
            let handlers = attached
                .iter()
                .filter(|entry| entry.event == event.kind)
                .map(|entry| entry.handler.clone())
                .collect();
            attached.retain(|entry| !(entry.event == event.kind && entry.options.once));
            handlers
        };

        trace!(event = %event.kind, listeners = handlers.len(), "[Conditions] Dispatching event");
        for handler in &handlers {
            handler.call(event);
        }
        handlers.len()
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.registry
    }

    fn as_updatable(&self) -> Option<&dyn Updatable> {
        self.bulk_updates.as_ref().map(|_| self as &dyn Updatable)
    }
}

impl Updatable for MemoryElement {
    fn update(&self, config: &Config) -> Result<(), DomError> {
        if let Some(count) = &self.bulk_updates {
            count.set(count.get() + 1);
        }
        HandlerRegistry::new().apply_config(self, config);
        Ok(())
    }
}

// =============================================================================
// MEMORY LIST
// =============================================================================

#[derive(Clone, Copy)]
enum IterMode {
    Native,
    Broken,
    Missing,
}

/// An array-like element list.
pub struct MemoryList {
    items: Vec<ElementRef>,
    mode: IterMode,
}

impl MemoryList {
    pub fn new(items: Vec<ElementRef>) -> Self {
        Self {
            items,
            mode: IterMode::Native,
        }
    }

    /// A list whose iterator stops after the first item, like an array-like
    /// proxy with a bad iteration hook
    pub fn with_broken_iterator(items: Vec<ElementRef>) -> Self {
        Self {
            items,
            mode: IterMode::Broken,
        }
    }

    /// A list with indexed access only
    pub fn without_iterator(items: Vec<ElementRef>) -> Self {
        Self {
            items,
            mode: IterMode::Missing,
        }
    }
}

impl ElementList for MemoryList {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn item(&self, index: usize) -> Option<ElementRef> {
        self.items.get(index).cloned()
    }

    fn try_iter(&self) -> Option<Box<dyn Iterator<Item = ElementRef> + '_>> {
        match self.mode {
            IterMode::Native => Some(Box::new(self.items.iter().cloned())),
            IterMode::Broken => Some(Box::new(self.items.iter().take(1).cloned())),
            IterMode::Missing => None,
        }
    }
}

// =============================================================================
// MEMORY DOCUMENT
// =============================================================================

/// A flat document that resolves simple selectors.
///
/// Supported: `#id`, `.class`, `tag`, `tag.class`, `*`, `[attr]`,
/// `[attr=value]`. `#id` resolves to a single element; everything else to a
/// collection.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    elements: Rc<RefCell<Vec<Rc<MemoryElement>>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an element and append it to the document
    pub fn create_element(&self, tag: &str) -> Rc<MemoryElement> {
        let element = MemoryElement::new(tag);
        self.elements.borrow_mut().push(element.clone());
        element
    }

    /// Create an element with the bulk helper and append it
    pub fn create_element_with_updater(&self, tag: &str) -> Rc<MemoryElement> {
        let element = MemoryElement::with_updater(tag);
        self.elements.borrow_mut().push(element.clone());
        element
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Rc<MemoryElement>> {
        self.elements
            .borrow()
            .iter()
            .find(|el| el.get_attribute("id").as_deref() == Some(id))
            .cloned()
    }

    pub fn query_selector_all(&self, selector: &str) -> Vec<Rc<MemoryElement>> {
        let Some(matcher) = SimpleSelector::parse(selector) else {
            return Vec::new();
        };
        self.elements
            .borrow()
            .iter()
            .filter(|el| matcher.matches(el.as_ref()))
            .cloned()
            .collect()
    }
}

impl ElementResolver for MemoryDocument {
    fn resolve(&self, selector: &str) -> Resolved {
        if let Some(id) = selector.strip_prefix('#') {
            if !id.contains(['.', '[', ' ']) {
                return match self.get_element_by_id(id) {
                    Some(element) => Resolved::Single(element),
                    None => Resolved::Nothing,
                };
            }
        }

        let items: Vec<ElementRef> = self
            .query_selector_all(selector)
            .into_iter()
            .map(|el| el as ElementRef)
            .collect();
        Resolved::List(Rc::new(MemoryList::new(items)))
    }
}

/// `tag`, `#id`, `.class` and `[attr(=value)]` parts, all required to match
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl SimpleSelector {
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() || selector.contains(char::is_whitespace) {
            return None;
        }

        let mut parsed = Self {
            tag: None,
            id: None,
            classes: Vec::new(),
            attributes: Vec::new(),
        };

        let mut rest = selector;
        let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        if !tag.is_empty() && tag != "*" {
            parsed.tag = Some(tag.to_ascii_uppercase());
        }
        rest = &rest[tag_end..];

        while let Some(first) = rest.chars().next() {
            match first {
                '#' | '.' => {
                    let body = &rest[1..];
                    let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                    let name = &body[..end];
                    if name.is_empty() {
                        return None;
                    }
                    if first == '#' {
                        parsed.id = Some(name.to_string());
                    } else {
                        parsed.classes.push(name.to_string());
                    }
                    rest = &body[end..];
                }
                '[' => {
                    let close = rest.find(']')?;
                    let inner = &rest[1..close];
                    let (name, value) = match inner.split_once('=') {
                        Some((name, value)) => (
                            name.trim(),
                            Some(value.trim().trim_matches(['"', '\'']).to_string()),
                        ),
                        None => (inner.trim(), None),
                    };
                    if name.is_empty() {
                        return None;
                    }
                    parsed.attributes.push((name.to_string(), value));
                    rest = &rest[close + 1..];
                }
                _ => return None,
            }
        }

        Some(parsed)
    }

    fn matches(&self, element: &MemoryElement) -> bool {
        if let Some(tag) = &self.tag {
            if &element.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.get_attribute("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| {
            match (element.get_attribute(name), expected) {
                (Some(actual), Some(expected)) => &actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
