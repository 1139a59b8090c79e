// ============================================================================
// spark-dom - State Module
// Reactive containers over JSON-shaped data
// ============================================================================

pub mod array;
pub mod collection;
pub mod reactive;

pub use collection::{collection, ReactiveCollection};
pub use reactive::{state, Field, IntoField, IntoReactive, Reactive, LENGTH_KEY};
