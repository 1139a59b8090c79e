// ============================================================================
// spark-dom - Conditions Engine
// ============================================================================

pub mod coerce;
pub mod config;
pub mod handlers;
pub mod matchers;
pub mod orchestrator;

pub use coerce::{is_empty_value, is_truthy, to_js_string};
pub use config::{ConditionSpec, ConditionTable, Config, ListenerSpec, Setting};
pub use handlers::{FnHandler, HandlerRegistry, PropertyHandler};
pub use matchers::{FnMatcher, Matcher, MatcherRegistry};
pub use orchestrator::{
    ApplyOutcome, Binding, BindingState, Conditions, ConditionsBuilder, ValueSource,
    WhenStateOptions,
};
