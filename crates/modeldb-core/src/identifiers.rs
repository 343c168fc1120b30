//! Identifier quoting, literal escaping and class-to-table naming.

use convert_case::{Case, Casing};

/// Quote a MySQL identifier with backticks, doubling embedded backticks.
///
/// ```
/// use modeldb_core::quote_identifier;
/// assert_eq!(quote_identifier("name"), "`name`");
/// assert_eq!(quote_identifier("we`ird"), "`we``ird`");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `alias.`column``, or just the quoted column when the alias is empty.
pub fn aliased_column(alias: &str, column: &str) -> String {
    if alias.is_empty() {
        quote_identifier(column)
    } else {
        format!("{alias}.{}", quote_identifier(column))
    }
}

/// Escape a string for use inside a single-quoted MySQL literal.
pub fn escape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(c),
        }
    }
    out
}

/// Simple class name: the last segment of a `::`, `\` or `.` separated path.
pub fn simple_class_name(class: &str) -> &str {
    class
        .rsplit(|c| c == ':' || c == '\\' || c == '.')
        .next()
        .unwrap_or(class)
}

/// Table name for a class: its simple name in snake case.
///
/// ```
/// use modeldb_core::table_name_for;
/// assert_eq!(table_name_for("app::models::BlogPost"), "blog_post");
/// ```
pub fn table_name_for(class: &str) -> String {
    simple_class_name(class).to_case(Case::Snake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("plain"), "plain");
        assert_eq!(escape_string("a'b"), "a\\'b");
        assert_eq!(escape_string("back\\slash"), "back\\\\slash");
        assert_eq!(escape_string("line\nbreak"), "line\\nbreak");
        assert_eq!(escape_string("say \"hi\""), "say \\\"hi\\\"");
    }

    #[test]
    fn test_aliased_column() {
        assert_eq!(aliased_column("m", "id"), "m.`id`");
        assert_eq!(aliased_column("", "id"), "`id`");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(table_name_for("Person"), "person");
        assert_eq!(table_name_for("BlogPost"), "blog_post");
        assert_eq!(table_name_for("App\\Model\\OrderItem"), "order_item");
        assert_eq!(table_name_for("crate::model::UserGroup"), "user_group");
    }
}
