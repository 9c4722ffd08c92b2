//! Statement text sent to PostgreSQL. Everything goes through the simple query
//! protocol, so identifiers and literals are quoted here.

use postgres_protocol::escape::{escape_identifier, escape_literal};

use super::address::TupleAddress;

pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", escape_identifier(schema), escape_identifier(table))
}

/// Reads every column of the tuple. Detoasting happens here, so a missing
/// chunk makes this statement fail.
pub fn full_row_query(relation: &str, address: TupleAddress) -> String {
    format!(
        "SELECT ctid, * FROM {} WHERE ctid = '{}'",
        relation,
        address.to_tid_literal()
    )
}

/// Reads only the identifier column, which normally survives when the wide
/// columns of the tuple are damaged.
pub fn identifier_query(relation: &str, id_column: &str, address: TupleAddress) -> String {
    format!(
        "SELECT ctid, {} FROM {} WHERE ctid = '{}'",
        escape_identifier(id_column),
        relation,
        address.to_tid_literal()
    )
}

pub fn table_statistics_query(schema: &str, table: &str) -> String {
    format!(
        "SELECT relpages::bigint AS pages, reltuples::bigint AS estimate FROM pg_class WHERE oid = {}::regclass",
        escape_literal(&qualified_name(schema, table))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_quotes_both_parts() {
        assert_eq!(qualified_name("public", "orders"), "\"public\".\"orders\"");
        assert_eq!(qualified_name("Sales", "we\"ird"), "\"Sales\".\"we\"\"ird\"");
    }

    #[test]
    fn test_identifier_column_is_quoted() {
        let relation = qualified_name("public", "orders");
        assert_eq!(
            identifier_query(&relation, "Order Id", TupleAddress::new(1, 2)),
            "SELECT ctid, \"Order Id\" FROM \"public\".\"orders\" WHERE ctid = '(1,2)'"
        );
    }

    #[test]
    fn test_statistics_query_escapes_backslashes() {
        let query = table_statistics_query("public", r"a\b");
        assert!(query.ends_with(r#"E'"public"."a\\b"'::regclass"#), "{}", query);
    }

    #[test]
    fn test_tuple_queries() {
        let relation = qualified_name("public", "orders");
        let address = TupleAddress::new(12070712, 36);

        assert_eq!(
            full_row_query(&relation, address),
            "SELECT ctid, * FROM \"public\".\"orders\" WHERE ctid = '(12070712,36)'"
        );
        assert_eq!(
            identifier_query(&relation, "id", address),
            "SELECT ctid, \"id\" FROM \"public\".\"orders\" WHERE ctid = '(12070712,36)'"
        );
    }

    #[test]
    fn test_statistics_query_quotes_regclass() {
        assert_eq!(
            table_statistics_query("public", "o'rders"),
            "SELECT relpages::bigint AS pages, reltuples::bigint AS estimate FROM pg_class WHERE oid = '\"public\".\"o''rders\"'::regclass"
        );
    }
}
