//! SELECT statements over a single mapped table.
//!
//! The main table is always aliased `m`; joins get their own `j<N>` aliases.
//!
//! # Example
//!
//! ```
//! use modeldb_core::MysqlEscape;
//! use modeldb_query::{Condition, Order, SelectQuery};
//!
//! let query = SelectQuery::new()
//!     .filter(Condition::new("active", true))
//!     .order_by("name", Order::Asc)
//!     .limit(10);
//! let sql = query.build("person", |c| c == "name", &MysqlEscape);
//! assert_eq!(
//!     sql,
//!     "SELECT DISTINCT m.* FROM person m WHERE m.`active` = '1' ORDER BY m.`name` ASC LIMIT 10"
//! );
//! ```

use modeldb_core::{DEFAULT_ALIAS, Escape, aliased_column, quote_identifier};

use crate::condition::Condition;
use crate::join::Join;
use crate::wrap::{FieldWrap, PrefixedField};

/// Column alias of the counting select.
pub const RECORD_COUNT_ALIAS: &str = "record_count";

/// A field reference in select lists and GROUP BY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    /// Qualified with `m.` unless it already contains `.`.
    Name(String),
    Prefixed(PrefixedField),
    Wrapped(FieldWrap),
}

impl FieldRef {
    pub fn aliased(&self) -> String {
        match self {
            FieldRef::Name(name) if name.contains('.') => name.clone(),
            FieldRef::Name(name) => format!("{DEFAULT_ALIAS}.{name}"),
            FieldRef::Prefixed(field) => field.aliased_name(),
            FieldRef::Wrapped(wrap) => wrap.wrap(DEFAULT_ALIAS),
        }
    }

    /// Bare column name.
    pub fn name(&self) -> &str {
        match self {
            FieldRef::Name(name) => name,
            FieldRef::Prefixed(field) => &field.field,
            FieldRef::Wrapped(wrap) => wrap.field(),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(v: &str) -> Self {
        FieldRef::Name(v.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(v: String) -> Self {
        FieldRef::Name(v)
    }
}

impl From<PrefixedField> for FieldRef {
    fn from(v: PrefixedField) -> Self {
        FieldRef::Prefixed(v)
    }
}

impl From<FieldWrap> for FieldRef {
    fn from(v: FieldWrap) -> Self {
        FieldRef::Wrapped(v)
    }
}

/// Sort direction. `Natural` omits the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Natural,
    Asc,
    Desc,
}

impl Order {
    const fn suffix(self) -> &'static str {
        match self {
            Order::Natural => "",
            Order::Asc => " ASC",
            Order::Desc => " DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Projection {
    Rows,
    Count(Option<FieldRef>),
}

/// Builder for the multi-row read surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    filter: Option<Condition>,
    having: Option<Condition>,
    joins: Vec<Join>,
    fields: Vec<(FieldRef, Option<String>)>,
    projection: Projection,
    group_by: Vec<FieldRef>,
    order: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Default for SelectQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectQuery {
    pub fn new() -> Self {
        Self {
            filter: None,
            having: None,
            joins: Vec::new(),
            fields: Vec::new(),
            projection: Projection::Rows,
            group_by: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Shorthand for a query filtered by `condition`.
    pub fn matching(condition: Condition) -> Self {
        Self::new().filter(condition)
    }

    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    #[must_use]
    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(condition);
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<FieldRef>) -> Self {
        self.fields.push((field.into(), None));
        self
    }

    #[must_use]
    pub fn field_as(mut self, field: impl Into<FieldRef>, alias: impl Into<String>) -> Self {
        self.fields.push((field.into(), Some(alias.into())));
        self
    }

    /// Select `COUNT(*)` instead of rows.
    #[must_use]
    pub fn count(mut self) -> Self {
        self.projection = Projection::Count(None);
        self
    }

    /// Select `COUNT(<field>)` instead of rows.
    #[must_use]
    pub fn count_field(mut self, field: impl Into<FieldRef>) -> Self {
        self.projection = Projection::Count(Some(field.into()));
        self
    }

    #[must_use]
    pub fn group_by(mut self, field: impl Into<FieldRef>) -> Self {
        self.group_by.push(field.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, key: impl Into<String>, order: Order) -> Self {
        self.order.push((key.into(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn filter_condition(&self) -> Option<&Condition> {
        self.filter.as_ref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn is_count(&self) -> bool {
        matches!(self.projection, Projection::Count(_))
    }

    /// `<table> m` followed by the join clauses.
    pub fn source<E: Escape + ?Sized>(table: &str, joins: &[Join], escaper: &E) -> String {
        let mut source = format!("{table} {DEFAULT_ALIAS}");
        for join in joins {
            source.push(' ');
            source.push_str(&join.build(escaper));
        }
        source
    }

    /// Render the statement. `is_column` tells ORDER BY keys that are table
    /// columns (qualified with `m`) from free expressions (verbatim).
    pub fn build<E, F>(&self, table: &str, is_column: F, escaper: &E) -> String
    where
        E: Escape + ?Sized,
        F: Fn(&str) -> bool,
    {
        let mut distinct = true;
        let mut order_by = Vec::new();

        let select_list = match &self.projection {
            Projection::Count(field) => {
                let counted = field
                    .as_ref()
                    .map_or_else(|| "*".to_string(), FieldRef::aliased);
                format!("COUNT({counted}) AS {RECORD_COUNT_ALIAS}")
            }
            Projection::Rows => {
                for (key, order) in &self.order {
                    let target = if is_column(key) {
                        aliased_column(DEFAULT_ALIAS, key)
                    } else {
                        key.clone()
                    };
                    order_by.push(format!("{target}{}", order.suffix()));
                    if !self.fields.is_empty() && !self.selects(key) {
                        distinct = false;
                    }
                }
                if self.fields.is_empty() {
                    format!("{DEFAULT_ALIAS}.*")
                } else {
                    self.fields
                        .iter()
                        .map(|(field, alias)| match alias {
                            Some(alias) => format!("{} AS {}", field.aliased(), quote_identifier(alias)),
                            None => field.aliased(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            }
        };

        let mut sql = String::from("SELECT ");
        if distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&select_list);
        sql.push_str(" FROM ");
        sql.push_str(&Self::source(table, &self.joins, escaper));

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.build(escaper, true));
        }
        if !self.group_by.is_empty() {
            let groups: Vec<String> = self.group_by.iter().map(FieldRef::aliased).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(&having.build(escaper, true));
        }
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {offset}", u64::MAX)),
            (None, None) => {}
        }

        tracing::trace!(table, sql = %sql, "built select");
        sql
    }

    fn selects(&self, key: &str) -> bool {
        self.fields
            .iter()
            .any(|(field, alias)| field.name() == key || alias.as_deref() == Some(key))
    }
}
