//! Privilege tiers of the provisioned login roles

use super::sql::quote_ident;
use std::fmt;

/// The three application roles, each with a fixed privilege set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTier {
    /// Reads every table in the target schema, including future ones.
    Read,
    /// Creates tables and writes rows in the target schema.
    Write,
    /// Manages extensions and owns the spatial catalog objects.
    Admin,
}

impl RoleTier {
    /// Order in which roles are created and granted.
    pub const SEQUENCE: [RoleTier; 3] = [RoleTier::Write, RoleTier::Read, RoleTier::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    /// Step label used in errors for this tier's grants.
    pub fn grant_step(&self) -> &'static str {
        match self {
            Self::Read => "grant read role",
            Self::Write => "grant write role",
            Self::Admin => "grant admin role",
        }
    }

    /// Step label used in errors for this tier's role creation.
    pub fn create_step(&self) -> &'static str {
        match self {
            Self::Read => "create read role",
            Self::Write => "create write role",
            Self::Admin => "create admin role",
        }
    }

    /// Grants applied on every run. All of them are no-ops when already held.
    ///
    /// Default privileges without `FOR ROLE` apply to objects created by the
    /// connected role, which is the master account.
    pub fn grants(&self, role: &str, database: &str, schema: &str) -> Vec<String> {
        let role = quote_ident(role);
        let database = quote_ident(database);
        let schema = quote_ident(schema);

        match self {
            Self::Write => vec![
                format!("GRANT CONNECT ON DATABASE {database} TO {role}"),
                format!("GRANT USAGE, CREATE ON SCHEMA {schema} TO {role}"),
                format!(
                    "ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} \
                     GRANT INSERT, UPDATE, DELETE ON TABLES TO {role}"
                ),
            ],
            Self::Read => vec![
                format!("GRANT CONNECT ON DATABASE {database} TO {role}"),
                format!("GRANT USAGE ON SCHEMA {schema} TO {role}"),
                format!("GRANT SELECT ON ALL TABLES IN SCHEMA {schema} TO {role}"),
                format!(
                    "ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT SELECT ON TABLES TO {role}"
                ),
            ],
            Self::Admin => vec![
                format!("GRANT CONNECT ON DATABASE {database} TO {role}"),
                format!("GRANT USAGE, CREATE ON SCHEMA {schema}, public TO {role}"),
                format!("GRANT SELECT ON ALL TABLES IN SCHEMA {schema}, public TO {role}"),
                format!("GRANT ALL PRIVILEGES ON DATABASE {database} TO {role}"),
            ],
        }
    }
}

impl fmt::Display for RoleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
