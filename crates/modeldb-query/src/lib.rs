//! Structural SQL building for modeldb.
//!
//! Predicates, joins and selects are assembled from typed parts and rendered
//! to MySQL text with an [`Escape`](modeldb_core::Escape) primitive, so no
//! caller ever concatenates user input into SQL.
//!
//! - [`Condition`]: recursive WHERE/HAVING trees with NULL and list handling.
//! - [`Join`]: LEFT JOIN clauses with process-unique aliases.
//! - [`FieldWrap`] / [`PrefixedField`]: column references with templates or
//!   explicit aliases.
//! - [`SelectQuery`]: the SELECT builder used by multi-row reads.

pub mod condition;
pub mod join;
pub mod select;
pub mod wrap;

pub use condition::{BoolOp, Comparison, Condition, ConditionKey, ConditionValue};
pub use join::{Join, JoinValue};
pub use select::{FieldRef, Order, RECORD_COUNT_ALIAS, SelectQuery};
pub use wrap::{DEFAULT_PLACEHOLDER, FieldWrap, PrefixedField};
