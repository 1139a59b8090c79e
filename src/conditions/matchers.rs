// ============================================================================
// spark-dom - Condition Matchers
// Ordered strategies that decide whether a value satisfies a condition key
// ============================================================================
//
// Each matcher has two halves: `test` claims a condition key ("is this key my
// syntax?") and `matches` decides the value. The first matcher that claims
// the key decides, even when its answer is "no". String equality is the
// fallback and always claims last.
//
// Built-ins, in precedence order:
//
//   "true" / "false"                 boolean identity
//   "truthy" / "falsy"               truthiness
//   "null" / "undefined"             null identity
//   "empty"                          null, "", [], {} or falsy
//   "'x'" / "\"x\""                  strict string equality
//   "includes:" / "startsWith:" / "endsWith:"
//   "/pattern/flags"                 regex against String(value)
//   "5", ">10", "<=3", "20-30"       numeric, only for number values
//   anything else                    String(value) == key
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::{trace, warn};

use super::coerce::{is_empty_value, is_truthy, to_js_string};

/// A condition-key strategy.
pub trait Matcher {
    /// Whether this matcher owns the (trimmed) condition key
    fn test(&self, condition: &str, value: &Value) -> bool;

    /// Whether `value` satisfies the condition
    fn matches(&self, value: &Value, condition: &str) -> bool;
}

/// A matcher built from two closures.
pub struct FnMatcher<T, M> {
    test: T,
    matches: M,
}

impl<T, M> FnMatcher<T, M>
where
    T: Fn(&str, &Value) -> bool,
    M: Fn(&Value, &str) -> bool,
{
    pub fn new(test: T, matches: M) -> Self {
        Self { test, matches }
    }
}

impl<T, M> Matcher for FnMatcher<T, M>
where
    T: Fn(&str, &Value) -> bool,
    M: Fn(&Value, &str) -> bool,
{
    fn test(&self, condition: &str, value: &Value) -> bool {
        (self.test)(condition, value)
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        (self.matches)(value, condition)
    }
}

// =============================================================================
// BUILT-IN MATCHERS
// =============================================================================

pub struct BooleanMatcher;

impl Matcher for BooleanMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        matches!(condition, "true" | "false")
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        *value == Value::Bool(condition == "true")
    }
}

pub struct TruthinessMatcher;

impl Matcher for TruthinessMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        matches!(condition, "truthy" | "falsy")
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        is_truthy(value) == (condition == "truthy")
    }
}

/// `undefined` has no separate representation, so both keys match `null`.
pub struct NullishMatcher;

impl Matcher for NullishMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        matches!(condition, "null" | "undefined")
    }

    fn matches(&self, value: &Value, _condition: &str) -> bool {
        value.is_null()
    }
}

pub struct EmptyMatcher;

impl Matcher for EmptyMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        condition == "empty"
    }

    fn matches(&self, value: &Value, _condition: &str) -> bool {
        is_empty_value(value)
    }
}

pub struct QuotedStringMatcher;

impl QuotedStringMatcher {
    fn unquote(condition: &str) -> Option<&str> {
        ['\'', '"'].into_iter().find_map(|quote| {
            condition
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
    }
}

impl Matcher for QuotedStringMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        condition.len() >= 2 && Self::unquote(condition).is_some()
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        match (value, Self::unquote(condition)) {
            (Value::String(s), Some(expected)) => s == expected,
            _ => false,
        }
    }
}

pub struct StringOperationMatcher;

const STRING_OPERATIONS: &[&str] = &["includes:", "startsWith:", "endsWith:"];

impl Matcher for StringOperationMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        STRING_OPERATIONS
            .iter()
            .any(|prefix| condition.starts_with(prefix))
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        let text = to_js_string(value);
        if let Some(needle) = condition.strip_prefix("includes:") {
            text.contains(needle.trim())
        } else if let Some(prefix) = condition.strip_prefix("startsWith:") {
            text.starts_with(prefix.trim())
        } else if let Some(suffix) = condition.strip_prefix("endsWith:") {
            text.ends_with(suffix.trim())
        } else {
            false
        }
    }
}

/// Distinct patterns a `RegexMatcher` keeps compiled before starting over
pub const REGEX_CACHE_LIMIT: usize = 256;

/// `/pattern/flags`. Compiled patterns are cached per condition key, up to
/// `REGEX_CACHE_LIMIT` of them; an invalid pattern warns when compiled and
/// never matches.
#[derive(Default)]
pub struct RegexMatcher {
    cache: RefCell<HashMap<String, Option<Regex>>>,
}

impl RegexMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn split(condition: &str) -> Option<(&str, &str)> {
        let body = condition.strip_prefix('/')?;
        let last = body.rfind('/')?;
        Some((&body[..last], &body[last + 1..]))
    }

    fn compile(condition: &str) -> Option<Regex> {
        let (pattern, flags) = Self::split(condition)?;
        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                // Global, sticky and unicode change nothing for a single test
                'g' | 'y' | 'u' => {}
                other => {
                    warn!(condition, flag = %other, "[ConditionMatcher] Unsupported regex flag");
                    return None;
                }
            }
        }
        match builder.build() {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(condition, error = %err, "[ConditionMatcher] Invalid regex condition");
                None
            }
        }
    }
}

impl Matcher for RegexMatcher {
    fn test(&self, condition: &str, _value: &Value) -> bool {
        condition.len() >= 2 && Self::split(condition).is_some()
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        let mut cache = self.cache.borrow_mut();
        if cache.len() >= REGEX_CACHE_LIMIT && !cache.contains_key(condition) {
            trace!(limit = REGEX_CACHE_LIMIT, "[ConditionMatcher] Regex cache full; clearing");
            cache.clear();
        }
        let regex = cache
            .entry(condition.to_string())
            .or_insert_with(|| Self::compile(condition));
        regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(&to_js_string(value)))
    }
}

/// A parsed numeric condition
#[derive(Debug, Clone, Copy, PartialEq)]
enum NumericCondition {
    Exact(f64),
    Greater(f64),
    GreaterOrEqual(f64),
    Less(f64),
    LessOrEqual(f64),
    Range(f64, f64),
}

/// `-?\d*\.?\d+`
fn parse_number_literal(text: &str) -> Option<f64> {
    let text = text.trim();
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || digits.ends_with('.') {
        return None;
    }
    if digits.matches('.').count() > 1 || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    text.parse().ok()
}

fn parse_numeric_condition(condition: &str) -> Option<NumericCondition> {
    let operators: [(&str, fn(f64) -> NumericCondition); 4] = [
        (">=", NumericCondition::GreaterOrEqual),
        ("<=", NumericCondition::LessOrEqual),
        (">", NumericCondition::Greater),
        ("<", NumericCondition::Less),
    ];
    for (operator, build) in operators {
        if let Some(operand) = condition.strip_prefix(operator) {
            return parse_number_literal(operand).map(build);
        }
    }
    if let Some(operand) = condition.strip_prefix("==").or_else(|| condition.strip_prefix('=')) {
        return parse_number_literal(operand).map(NumericCondition::Exact);
    }

    if let Some(exact) = parse_number_literal(condition) {
        return Some(NumericCondition::Exact(exact));
    }

    // "min-max": try every dash after the first character as the separator
    condition
        .char_indices()
        .skip(1)
        .filter(|(_, c)| *c == '-')
        .find_map(|(at, _)| {
            let min = parse_number_literal(&condition[..at])?;
            let max = parse_number_literal(&condition[at + 1..])?;
            Some(NumericCondition::Range(min, max))
        })
}

/// Comparisons and inclusive ranges, only for number values. A range with
/// `min > max` never matches.
pub struct NumericMatcher;

impl Matcher for NumericMatcher {
    fn test(&self, condition: &str, value: &Value) -> bool {
        value.is_number() && parse_numeric_condition(condition).is_some()
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        let (Some(number), Some(parsed)) = (value.as_f64(), parse_numeric_condition(condition)) else {
            return false;
        };
        match parsed {
            NumericCondition::Exact(n) => number == n,
            NumericCondition::Greater(n) => number > n,
            NumericCondition::GreaterOrEqual(n) => number >= n,
            NumericCondition::Less(n) => number < n,
            NumericCondition::LessOrEqual(n) => number <= n,
            NumericCondition::Range(min, max) if min > max => {
                warn!(condition, min, max, "[ConditionMatcher] Range minimum exceeds maximum; condition never matches");
                false
            }
            NumericCondition::Range(min, max) => (min..=max).contains(&number),
        }
    }
}

/// `String(value) == condition`
pub struct StringEqualityMatcher;

impl Matcher for StringEqualityMatcher {
    fn test(&self, _condition: &str, _value: &Value) -> bool {
        true
    }

    fn matches(&self, value: &Value, condition: &str) -> bool {
        to_js_string(value) == condition
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// An ordered, owned table of matchers.
#[derive(Clone)]
pub struct MatcherRegistry {
    entries: Vec<(String, Rc<dyn Matcher>)>,
    fallback: Option<(String, Rc<dyn Matcher>)>,
}

impl MatcherRegistry {
    /// The built-in matchers, with string equality as fallback
    pub fn new() -> Self {
        let entries: Vec<(String, Rc<dyn Matcher>)> = vec![
            ("boolean".into(), Rc::new(BooleanMatcher)),
            ("truthiness".into(), Rc::new(TruthinessMatcher)),
            ("nullish".into(), Rc::new(NullishMatcher)),
            ("empty".into(), Rc::new(EmptyMatcher)),
            ("quotedString".into(), Rc::new(QuotedStringMatcher)),
            ("stringOperation".into(), Rc::new(StringOperationMatcher)),
            ("regex".into(), Rc::new(RegexMatcher::new())),
            ("numeric".into(), Rc::new(NumericMatcher)),
        ];
        Self {
            entries,
            fallback: Some(("stringEquality".into(), Rc::new(StringEqualityMatcher))),
        }
    }

    /// No matchers at all; every condition classifies as `false`
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            fallback: None,
        }
    }

    /// Add a matcher ahead of the fallback. A matcher registered under an
    /// existing name replaces it in place.
    pub fn register(&mut self, name: impl Into<String>, matcher: impl Matcher + 'static) {
        self.register_rc(name, Rc::new(matcher));
    }

    pub fn register_rc(&mut self, name: impl Into<String>, matcher: Rc<dyn Matcher>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = matcher;
            return;
        }
        if let Some(fallback) = self.fallback.as_mut().filter(|(n, _)| *n == name) {
            fallback.1 = matcher;
            return;
        }
        self.entries.push((name, matcher));
    }

    /// Whether `value` satisfies `condition` according to the first matcher
    /// that claims the (trimmed) key. `false` when none does.
    pub fn classify(&self, value: &Value, condition: &str) -> bool {
        let condition = condition.trim();
        for (name, matcher) in self.entries.iter().chain(self.fallback.iter()) {
            if matcher.test(condition, value) {
                let matched = matcher.matches(value, condition);
                trace!(matcher = %name, condition, matched, "[ConditionMatcher] Classified");
                return matched;
            }
        }
        false
    }

    /// Matcher names in evaluation order
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .chain(self.fallback.iter())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistry")
            .field("matchers", &self.names())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
