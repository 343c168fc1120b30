//! Predicate trees for WHERE and HAVING clauses.
//!
//! A [`Condition`] is one comparison plus an ordered chain of child conditions,
//! each attached with AND/OR and optional parentheses and negation. Rendering
//! is left to right in chain order.
//!
//! # Example
//!
//! ```
//! use modeldb_core::MysqlEscape;
//! use modeldb_query::{Comparison, Condition};
//!
//! let cond = Condition::new("status", vec!["new", "open"])
//!     .and(Condition::with("deleted", None::<i64>, Comparison::Eq))
//!     .or_group(Condition::new("owner", "ann").or(Condition::new("owner", "bob")));
//!
//! assert_eq!(
//!     cond.build(&MysqlEscape, true),
//!     "m.`status` IN ('new','open') AND m.`deleted` IS NULL \
//!      OR (m.`owner` = 'ann' OR m.`owner` = 'bob')"
//! );
//! ```

use std::fmt;

use modeldb_core::{DEFAULT_ALIAS, Escape, Value, aliased_column};

use crate::wrap::{FieldWrap, PrefixedField};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Like,
    Regexp,
    Is,
    IsNot,
    In,
    NotIn,
}

impl Comparison {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::NotEq => "!=",
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::LtEq => "<=",
            Comparison::GtEq => ">=",
            Comparison::Like => "LIKE",
            Comparison::Regexp => "REGEXP",
            Comparison::Is => "IS",
            Comparison::IsNot => "IS NOT",
            Comparison::In => "IN",
            Comparison::NotIn => "NOT IN",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Operator joining a chained condition to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub const fn as_sql(self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    Null,
    Scalar(String),
    List(Vec<String>),
}

impl ConditionValue {
    fn is_null(&self) -> bool {
        match self {
            ConditionValue::Null => true,
            ConditionValue::Scalar(s) => s == "NULL",
            ConditionValue::List(_) => false,
        }
    }

    fn into_scalar(self) -> String {
        match self {
            ConditionValue::Null => String::new(),
            ConditionValue::Scalar(s) => s,
            ConditionValue::List(items) => items.join(","),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(v: &str) -> Self {
        ConditionValue::Scalar(v.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(v: String) -> Self {
        ConditionValue::Scalar(v)
    }
}

impl From<&String> for ConditionValue {
    fn from(v: &String) -> Self {
        ConditionValue::Scalar(v.clone())
    }
}

impl From<i32> for ConditionValue {
    fn from(v: i32) -> Self {
        ConditionValue::Scalar(v.to_string())
    }
}

impl From<i64> for ConditionValue {
    fn from(v: i64) -> Self {
        ConditionValue::Scalar(v.to_string())
    }
}

impl From<u64> for ConditionValue {
    fn from(v: u64) -> Self {
        ConditionValue::Scalar(v.to_string())
    }
}

impl From<f64> for ConditionValue {
    fn from(v: f64) -> Self {
        ConditionValue::Scalar(v.to_string())
    }
}

impl From<bool> for ConditionValue {
    fn from(v: bool) -> Self {
        ConditionValue::Scalar(if v { "1" } else { "0" }.to_string())
    }
}

impl From<Value> for ConditionValue {
    fn from(v: Value) -> Self {
        if v.is_null() {
            ConditionValue::Null
        } else {
            ConditionValue::Scalar(v.to_string())
        }
    }
}

impl From<&Value> for ConditionValue {
    fn from(v: &Value) -> Self {
        v.clone().into()
    }
}

impl<T: Into<ConditionValue>> From<Option<T>> for ConditionValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ConditionValue::Null, Into::into)
    }
}

impl<T: Into<ConditionValue>> From<Vec<T>> for ConditionValue {
    fn from(items: Vec<T>) -> Self {
        ConditionValue::List(
            items
                .into_iter()
                .map(|item| item.into().into_scalar())
                .collect(),
        )
    }
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKey {
    /// Renders `1 = 1`.
    MatchAll,
    /// Renders `0 = 1`.
    MatchNone,
    Field(PrefixedField),
}

impl From<&str> for ConditionKey {
    fn from(key: &str) -> Self {
        match key {
            "1" => ConditionKey::MatchAll,
            "0" => ConditionKey::MatchNone,
            field => ConditionKey::Field(PrefixedField::main(field)),
        }
    }
}

impl From<String> for ConditionKey {
    fn from(key: String) -> Self {
        key.as_str().into()
    }
}

impl From<&String> for ConditionKey {
    fn from(key: &String) -> Self {
        key.as_str().into()
    }
}

impl From<PrefixedField> for ConditionKey {
    fn from(field: PrefixedField) -> Self {
        ConditionKey::Field(field)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Chained {
    condition: Condition,
    op: BoolOp,
    parenthesize: bool,
    negate: bool,
}

/// A comparison with an ordered chain of attached conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    key: ConditionKey,
    value: ConditionValue,
    comparison: Comparison,
    wrap: Option<String>,
    chain: Vec<Chained>,
}

impl Condition {
    /// `key = value`.
    pub fn new(key: impl Into<ConditionKey>, value: impl Into<ConditionValue>) -> Self {
        Self::with(key, value, Comparison::Eq)
    }

    pub fn with(
        key: impl Into<ConditionKey>,
        value: impl Into<ConditionValue>,
        comparison: Comparison,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comparison,
            wrap: None,
            chain: Vec::new(),
        }
    }

    /// Always-true base condition.
    pub fn match_all() -> Self {
        Self::with(ConditionKey::MatchAll, ConditionValue::Null, Comparison::Eq)
    }

    /// Always-false base condition.
    pub fn match_none() -> Self {
        Self::with(ConditionKey::MatchNone, ConditionValue::Null, Comparison::Eq)
    }

    /// Equality on every pair, AND-ed onto a match-all base.
    ///
    /// A list value becomes a parenthesized OR group of equalities.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<ConditionKey>,
        V: Into<ConditionValue>,
    {
        let mut cond = Self::match_all();
        for (key, value) in pairs {
            let key = key.into();
            match value.into() {
                ConditionValue::List(items) => {
                    let mut group = Self::match_none();
                    for item in items {
                        group = group.or(Self::new(key.clone(), item));
                    }
                    cond = cond.and_group(group);
                }
                value => cond = cond.and(Self::new(key, value)),
            }
        }
        cond
    }

    /// Render the key through `template`; `%s` marks the column.
    #[must_use]
    pub fn wrapped(mut self, template: impl Into<String>) -> Self {
        self.wrap = Some(template.into());
        self
    }

    /// Attach `condition` to the end of the chain.
    #[must_use]
    pub fn chain_with(
        mut self,
        condition: Condition,
        op: BoolOp,
        parenthesize: bool,
        negate: bool,
    ) -> Self {
        self.chain.push(Chained {
            condition,
            op,
            parenthesize,
            negate,
        });
        self
    }

    #[must_use]
    pub fn and(self, condition: Condition) -> Self {
        self.chain_with(condition, BoolOp::And, false, false)
    }

    #[must_use]
    pub fn or(self, condition: Condition) -> Self {
        self.chain_with(condition, BoolOp::Or, false, false)
    }

    #[must_use]
    pub fn and_group(self, condition: Condition) -> Self {
        self.chain_with(condition, BoolOp::And, true, false)
    }

    #[must_use]
    pub fn or_group(self, condition: Condition) -> Self {
        self.chain_with(condition, BoolOp::Or, true, false)
    }

    #[must_use]
    pub fn and_not(self, condition: Condition) -> Self {
        self.chain_with(condition, BoolOp::And, true, true)
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn key(&self) -> &ConditionKey {
        &self.key
    }

    /// The operator actually rendered: `=`/`!=` become `IN`/`NOT IN` for
    /// lists and `IS`/`IS NOT` for NULL.
    pub fn effective_comparison(&self) -> Comparison {
        match (&self.value, self.comparison) {
            (ConditionValue::List(_), Comparison::Eq) => Comparison::In,
            (ConditionValue::List(_), Comparison::NotEq) => Comparison::NotIn,
            (value, Comparison::Eq) if value.is_null() => Comparison::Is,
            (value, Comparison::NotEq) if value.is_null() => Comparison::IsNot,
            (_, comparison) => comparison,
        }
    }

    /// Render to SQL. With `use_alias`, columns are qualified with their
    /// table alias (`m` unless the key is a [`PrefixedField`]).
    pub fn build<E: Escape + ?Sized>(&self, escaper: &E, use_alias: bool) -> String {
        let mut sql = self.build_own(escaper, use_alias);
        for link in &self.chain {
            sql.push(' ');
            sql.push_str(link.op.as_sql());
            if link.negate {
                sql.push_str(" NOT");
            }
            sql.push(' ');
            if link.parenthesize {
                sql.push('(');
            }
            sql.push_str(&link.condition.build(escaper, use_alias));
            if link.parenthesize {
                sql.push(')');
            }
        }
        sql
    }

    fn build_own<E: Escape + ?Sized>(&self, escaper: &E, use_alias: bool) -> String {
        let field = match &self.key {
            ConditionKey::MatchAll => return "1 = 1".to_string(),
            ConditionKey::MatchNone => return "0 = 1".to_string(),
            ConditionKey::Field(field) => field,
        };

        let value = match &self.value {
            ConditionValue::List(items) => {
                let quoted: Vec<String> = items.iter().map(|item| escaper.escape(item)).collect();
                format!("('{}')", quoted.join("','"))
            }
            value if value.is_null() => "NULL".to_string(),
            ConditionValue::Scalar(raw) => format!("'{}'", escaper.escape(raw)),
            ConditionValue::Null => "NULL".to_string(),
        };

        let alias = if use_alias { field.alias.as_str() } else { "" };
        // Only scalar comparisons go through the wrap template.
        let scalar = matches!(self.value, ConditionValue::Scalar(_)) && !self.value.is_null();
        let column = match self.wrap.as_ref().filter(|_| scalar) {
            Some(template) if field.alias != DEFAULT_ALIAS => {
                FieldWrap::new(field.aliased_name(), template.as_str()).wrap("")
            }
            Some(template) => FieldWrap::new(field.field.as_str(), template.as_str()).wrap(alias),
            None => aliased_column(alias, &field.field),
        };

        format!("{column} {} {value}", self.effective_comparison())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldb_core::MysqlEscape;

    fn sql(cond: &Condition) -> String {
        cond.build(&MysqlEscape, true)
    }

    #[test]
    fn test_scalar_equality() {
        assert_eq!(sql(&Condition::new("name", "Ann")), "m.`name` = 'Ann'");
        assert_eq!(
            Condition::new("name", "Ann").build(&MysqlEscape, false),
            "`name` = 'Ann'"
        );
    }

    #[test]
    fn test_value_is_escaped() {
        assert_eq!(sql(&Condition::new("name", "O'Brien")), "m.`name` = 'O\\'Brien'");
    }

    #[test]
    fn test_null_rewrites_operator() {
        assert_eq!(sql(&Condition::new("deleted", None::<&str>)), "m.`deleted` IS NULL");
        assert_eq!(
            sql(&Condition::with("deleted", "NULL", Comparison::NotEq)),
            "m.`deleted` IS NOT NULL"
        );
    }

    #[test]
    fn test_list_rewrites_operator() {
        assert_eq!(
            sql(&Condition::new("id", vec!["a", "b"])),
            "m.`id` IN ('a','b')"
        );
        assert_eq!(
            sql(&Condition::with("id", vec![1_i64, 2], Comparison::NotEq)),
            "m.`id` NOT IN ('1','2')"
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let cond = Condition::new("id", vec!["a"]);
        assert_eq!(sql(&cond), sql(&cond));
        assert_eq!(cond.effective_comparison(), Comparison::In);
    }

    #[test]
    fn test_other_comparisons() {
        assert_eq!(
            sql(&Condition::with("age", 18, Comparison::GtEq)),
            "m.`age` >= '18'"
        );
        assert_eq!(
            sql(&Condition::with("name", "A%", Comparison::Like)),
            "m.`name` LIKE 'A%'"
        );
    }

    #[test]
    fn test_sentinels_ignore_value() {
        assert_eq!(sql(&Condition::match_all()), "1 = 1");
        assert_eq!(sql(&Condition::match_none()), "0 = 1");
        assert_eq!(sql(&Condition::new("1", "whatever")), "1 = 1");
    }

    #[test]
    fn test_chain_order_and_grouping() {
        let cond = Condition::new("a", 1)
            .and(Condition::new("b", 2))
            .or_group(Condition::new("c", 3).or(Condition::new("d", 4)));
        assert_eq!(
            sql(&cond),
            "m.`a` = '1' AND m.`b` = '2' OR (m.`c` = '3' OR m.`d` = '4')"
        );
    }

    #[test]
    fn test_negated_group() {
        let cond = Condition::match_all().and_not(Condition::new("archived", true));
        assert_eq!(sql(&cond), "1 = 1 AND NOT (m.`archived` = '1')");
    }

    #[test]
    fn test_wrap_template_owns_alias() {
        let cond = Condition::new("name", "ann").wrapped("LOWER(%s)");
        assert_eq!(sql(&cond), "LOWER(m.`name`) = 'ann'");
        assert_eq!(cond.build(&MysqlEscape, false), "LOWER(`name`) = 'ann'");
    }

    #[test]
    fn test_wrap_skipped_for_null_and_lists() {
        let null = Condition::new("name", None::<&str>).wrapped("LOWER(%s)");
        assert_eq!(sql(&null), "m.`name` IS NULL");

        let literal_null = Condition::new("name", "NULL").wrapped("LOWER(%s)");
        assert_eq!(sql(&literal_null), "m.`name` IS NULL");

        let list = Condition::new("name", vec!["a", "b"]).wrapped("LOWER(%s)");
        assert_eq!(sql(&list), "m.`name` IN ('a','b')");
        assert_eq!(list.build(&MysqlEscape, false), "`name` IN ('a','b')");
    }

    #[test]
    fn test_prefixed_key() {
        let cond = Condition::new(PrefixedField::new("title", "j3"), "x");
        assert_eq!(sql(&cond), "j3.`title` = 'x'");

        let wrapped = Condition::new(PrefixedField::new("title", "j3"), "x").wrapped("TRIM(%s)");
        assert_eq!(wrapped.build(&MysqlEscape, false), "TRIM(j3.`title`) = 'x'");
    }

    #[test]
    fn test_from_pairs() {
        let cond = Condition::from_pairs([
            ("name", ConditionValue::from("Ann")),
            ("role", ConditionValue::from(vec!["admin", "staff"])),
        ]);
        assert_eq!(
            sql(&cond),
            "1 = 1 AND m.`name` = 'Ann' AND (0 = 1 OR m.`role` = 'admin' OR m.`role` = 'staff')"
        );
    }

    #[test]
    fn test_empty_list_renders_empty_literal() {
        assert_eq!(sql(&Condition::new("id", Vec::<String>::new())), "m.`id` IN ('')");
    }
}
