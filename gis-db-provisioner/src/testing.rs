//! In-memory stand-in for a PostgreSQL server
//!
//! Understands just enough of the provisioning statements to track which
//! databases, roles, extensions and owners exist, and records every call.

use crate::db::{ConnectTarget, Connector, Session};
use crate::provision::extensions::CatalogObject;
use crate::provision::sql;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Connect { user: String, database: String },
    Exists { query: String, param: String },
    Execute(String),
    Catalog(Vec<String>),
    Close,
}

impl Call {
    pub(crate) fn connect(user: &str, database: &str) -> Self {
        Self::Connect {
            user: user.to_string(),
            database: database.to_string(),
        }
    }
}

#[derive(Default)]
struct State {
    databases: HashSet<String>,
    roles: HashSet<String>,
    extensions: HashSet<String>,
    catalog: Vec<(CatalogObject, char)>,
    owners: HashMap<(String, String), String>,
    calls: Vec<Call>,
    fail_on: Option<String>,
    refuse: bool,
}

#[derive(Clone)]
pub(crate) struct FakeServer {
    state: Arc<Mutex<State>>,
}

impl FakeServer {
    /// A fresh server: only the `postgres` database and superuser exist.
    pub(crate) fn new() -> Self {
        let mut state = State::default();
        state.databases.insert("postgres".to_string());
        state.roles.insert("postgres".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn add_database(&self, name: &str) {
        self.with(|s| s.databases.insert(name.to_string()));
    }

    pub(crate) fn add_role(&self, name: &str) {
        self.with(|s| s.roles.insert(name.to_string()));
    }

    pub(crate) fn set_catalog(&self, objects: Vec<(CatalogObject, char)>) {
        self.with(|s| s.catalog = objects);
    }

    /// Fail any statement containing `fragment`.
    pub(crate) fn fail_on(&self, fragment: &str) {
        self.with(|s| s.fail_on = Some(fragment.to_string()));
    }

    pub(crate) fn refuse_connections(&self) {
        self.with(|s| s.refuse = true);
    }

    pub(crate) fn has_database(&self, name: &str) -> bool {
        self.with(|s| s.databases.contains(name))
    }

    pub(crate) fn has_role(&self, name: &str) -> bool {
        self.with(|s| s.roles.contains(name))
    }

    pub(crate) fn has_extension(&self, name: &str) -> bool {
        self.with(|s| s.extensions.contains(name))
    }

    pub(crate) fn owner_of(&self, schema: &str, name: &str) -> Option<String> {
        self.with(|s| {
            s.owners
                .get(&(schema.to_string(), name.to_string()))
                .cloned()
        })
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub(crate) fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub(crate) fn connects(&self) -> usize {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|c| matches!(c, Call::Connect { .. }))
                .count()
        })
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Execute(stmt) => Some(stmt.clone()),
                    _ => None,
                })
                .collect()
        })
    }
}

fn protocol(message: String) -> sqlx::Error {
    sqlx::Error::Protocol(message)
}

/// Quoted identifiers of a statement, in order. Test names never contain quotes.
fn identifiers(statement: &str) -> Vec<&str> {
    statement.split('"').skip(1).step_by(2).collect()
}

#[async_trait]
impl Connector for FakeServer {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn Session>, sqlx::Error> {
        self.with(|s| {
            s.calls.push(Call::connect(target.username, target.database));
            if s.refuse {
                return Err(sqlx::Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            if !s.databases.contains(target.database) {
                return Err(protocol(format!(
                    "database \"{}\" does not exist",
                    target.database
                )));
            }
            Ok(())
        })?;

        Ok(Box::new(FakeSession {
            server: self.clone(),
        }))
    }
}

struct FakeSession {
    server: FakeServer,
}

#[async_trait]
impl Session for FakeSession {
    async fn exists(&mut self, query: &str, param: &str) -> Result<bool, sqlx::Error> {
        self.server.with(|s| {
            s.calls.push(Call::Exists {
                query: query.to_string(),
                param: param.to_string(),
            });
            match query {
                sql::DATABASE_EXISTS => Ok(s.databases.contains(param)),
                sql::ROLE_EXISTS => Ok(s.roles.contains(param)),
                other => Err(protocol(format!("unexpected lookup: {}", other))),
            }
        })
    }

    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        self.server.with(|s| {
            s.calls.push(Call::Execute(statement.to_string()));
            if let Some(fragment) = &s.fail_on {
                if statement.contains(fragment.as_str()) {
                    return Err(protocol(format!("injected failure: {}", fragment)));
                }
            }

            let idents = identifiers(statement);
            if statement.starts_with("CREATE DATABASE ") {
                if !s.databases.insert(idents[0].to_string()) {
                    return Err(protocol("database already exists".to_string()));
                }
            } else if statement.starts_with("CREATE ROLE ") {
                if !s.roles.insert(idents[0].to_string()) {
                    return Err(protocol("role already exists".to_string()));
                }
            } else if statement.starts_with("CREATE EXTENSION IF NOT EXISTS ") {
                s.extensions.insert(idents[0].to_string());
            } else if statement.starts_with("ALTER TABLE ") && statement.contains(" OWNER TO ") {
                s.owners.insert(
                    (idents[0].to_string(), idents[1].to_string()),
                    idents[2].to_string(),
                );
            } else if statement.starts_with("GRANT ") && !statement.contains(" ON ") {
                for role in &idents {
                    if !s.roles.contains(*role) {
                        return Err(protocol(format!("role \"{}\" does not exist", role)));
                    }
                }
            }
            Ok(())
        })
    }

    async fn catalog_objects(
        &mut self,
        schemas: &[String],
    ) -> Result<Vec<CatalogObject>, sqlx::Error> {
        self.server.with(|s| {
            s.calls.push(Call::Catalog(schemas.to_vec()));
            let mut rows: Vec<&(CatalogObject, char)> = s
                .catalog
                .iter()
                .filter(|(object, _)| schemas.contains(&object.schema))
                .collect();
            rows.sort_by_key(|(_, kind)| *kind == 'S');
            Ok(rows.into_iter().map(|(object, _)| object.clone()).collect())
        })
    }

    async fn close(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.server.with(|s| s.calls.push(Call::Close));
        Ok(())
    }
}
