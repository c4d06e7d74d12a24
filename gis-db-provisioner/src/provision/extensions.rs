//! Spatial extensions and the namespaces they create

/// Extensions installed by the admin role, in dependency order.
pub const SPATIAL_EXTENSIONS: [&str; 4] = [
    "postgis",
    "postgis_topology",
    "fuzzystrmatch",
    "postgis_tiger_geocoder",
];

/// Namespaces created by the extensions whose objects end up owned by the
/// admin role.
pub const EXTENSION_SCHEMAS: [&str; 3] = ["topology", "tiger", "tiger_data"];

/// One table, sequence or view found in an extension namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogObject {
    pub schema: String,
    pub name: String,
}

impl CatalogObject {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

pub fn extension_schemas() -> Vec<String> {
    EXTENSION_SCHEMAS.iter().map(|s| s.to_string()).collect()
}
