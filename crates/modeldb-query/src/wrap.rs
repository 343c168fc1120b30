//! Column references that carry their own alias or SQL template.

use modeldb_core::{DEFAULT_ALIAS, aliased_column};

/// Placeholder substituted by [`FieldWrap`] unless configured otherwise.
pub const DEFAULT_PLACEHOLDER: &str = "%s";

/// A column qualified with an explicit table alias.
///
/// ```
/// use modeldb_query::PrefixedField;
/// assert_eq!(PrefixedField::new("name", "j1").aliased_name(), "j1.`name`");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixedField {
    pub field: String,
    pub alias: String,
}

impl PrefixedField {
    pub fn new(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: alias.into(),
        }
    }

    /// A column of the main table.
    pub fn main(field: impl Into<String>) -> Self {
        Self::new(field, DEFAULT_ALIAS)
    }

    pub fn aliased_name(&self) -> String {
        aliased_column(&self.alias, &self.field)
    }
}

/// A column embedded in an SQL template, e.g. `LOWER(%s)` or `SUM(%s)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWrap {
    field: String,
    template: String,
    placeholder: String,
}

impl FieldWrap {
    pub fn new(field: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            template: template.into(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }

    #[must_use]
    pub fn placeholder(mut self, token: impl Into<String>) -> Self {
        self.placeholder = token.into();
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Render the template with the column qualified by `alias`.
    ///
    /// A field that already contains `.` is taken as qualified and inserted
    /// verbatim.
    pub fn wrap(&self, alias: &str) -> String {
        let column = if self.field.contains('.') {
            self.field.clone()
        } else {
            aliased_column(alias, &self.field)
        };
        self.template.replace(&self.placeholder, &column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_with_alias() {
        let wrap = FieldWrap::new("name", "LOWER(%s)");
        assert_eq!(wrap.wrap("m"), "LOWER(m.`name`)");
        assert_eq!(wrap.wrap(""), "LOWER(`name`)");
    }

    #[test]
    fn test_wrap_qualified_field_is_verbatim() {
        let wrap = FieldWrap::new("j2.`price`", "SUM(%s)");
        assert_eq!(wrap.wrap("m"), "SUM(j2.`price`)");
    }

    #[test]
    fn test_custom_placeholder() {
        let wrap = FieldWrap::new("created", "DATE_FORMAT({col}, '%Y')").placeholder("{col}");
        assert_eq!(wrap.wrap("m"), "DATE_FORMAT(m.`created`, '%Y')");
    }

    #[test]
    fn test_prefixed_main() {
        assert_eq!(PrefixedField::main("id").aliased_name(), "m.`id`");
    }
}
