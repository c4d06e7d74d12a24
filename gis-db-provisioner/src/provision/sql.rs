//! SQL text for the provisioning sequence
//!
//! Identifiers are always passed through [`quote_ident`] and passwords through
//! [`quote_literal`]; DDL cannot take bind parameters, so this is the only way
//! values reach statement text. Catalog lookups use bind parameters instead.

/// Existence check for a database. Binds `$1` = database name.
pub const DATABASE_EXISTS: &str = "SELECT 1 FROM pg_database WHERE datname = $1";

/// Existence check for a role. Binds `$1` = role name.
pub const ROLE_EXISTS: &str = "SELECT 1 FROM pg_roles WHERE rolname = $1";

/// Tables, sequences and views in the given namespaces. Binds `$1` = text[].
///
/// Sequences sort last: an owned sequence follows its table when the table
/// changes owner, and reassigning it separately afterwards is harmless.
pub const CATALOG_OBJECTS: &str = "SELECT n.nspname::text, c.relname::text \
     FROM pg_class c JOIN pg_namespace n ON c.relnamespace = n.oid \
     WHERE n.nspname::text = ANY($1) AND c.relkind IN ('r', 'S', 'v') \
     ORDER BY c.relkind = 'S', n.nspname, c.relname";

/// Quote an identifier the way PostgreSQL's `quote_ident` does, always.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal the way PostgreSQL's `quote_literal` does.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

/// `schema.name` with both parts quoted.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(database))
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

/// Make unqualified names resolve to the target schema before `public`.
pub fn set_search_path(database: &str, schema: &str) -> String {
    format!(
        "ALTER DATABASE {} SET search_path = {}, public",
        quote_ident(database),
        quote_ident(schema)
    )
}

/// Contains the password. Never log the result.
pub fn create_login_role(role: &str, password: &str) -> String {
    format!(
        "CREATE ROLE {} WITH LOGIN PASSWORD {}",
        quote_ident(role),
        quote_literal(password)
    )
}

pub fn grant_membership(group: &str, member: &str) -> String {
    format!("GRANT {} TO {}", quote_ident(group), quote_ident(member))
}

/// Tables later created by `owner` in `schema` become selectable by `reader`.
pub fn default_select_for_owner(owner: &str, schema: &str, reader: &str) -> String {
    format!(
        "ALTER DEFAULT PRIVILEGES FOR ROLE {} IN SCHEMA {} GRANT SELECT ON TABLES TO {}",
        quote_ident(owner),
        quote_ident(schema),
        quote_ident(reader)
    )
}

pub fn create_extension(extension: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(extension))
}

/// `ALTER TABLE` also covers sequences and views.
pub fn alter_owner(schema: &str, relation: &str, owner: &str) -> String {
    format!(
        "ALTER TABLE {} OWNER TO {}",
        qualified(schema, relation),
        quote_ident(owner)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("geo"), "\"geo\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("s3cret"), "'s3cret'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("a\\b'c"), "E'a\\\\b''c'");
    }

    #[test]
    fn test_injection_stays_inside_identifier() {
        let stmt = create_schema("geo\"; DROP DATABASE postgres; --");
        assert_eq!(
            stmt,
            "CREATE SCHEMA IF NOT EXISTS \"geo\"\"; DROP DATABASE postgres; --\""
        );
    }

    #[test]
    fn test_search_path_prefers_schema() {
        assert_eq!(
            set_search_path("geo_db", "geo"),
            "ALTER DATABASE \"geo_db\" SET search_path = \"geo\", public"
        );
    }

    #[test]
    fn test_alter_owner_qualifies_relation() {
        assert_eq!(
            alter_owner("topology", "layer", "gis_admin"),
            "ALTER TABLE \"topology\".\"layer\" OWNER TO \"gis_admin\""
        );
    }

    #[test]
    fn test_create_login_role() {
        assert_eq!(
            create_login_role("read", "p'w"),
            "CREATE ROLE \"read\" WITH LOGIN PASSWORD 'p''w'"
        );
    }
}
