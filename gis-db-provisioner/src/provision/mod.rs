//! The provisioning sequence
//!
//! Brings a target database to its provisioned state in three phases, each on
//! its own connection:
//! - master on the administrative database: create the target database
//! - master on the target database: schema, roles, grants
//! - admin on the target database: spatial extensions, ownership fixes
//!
//! Every step is idempotent, so a failed run is repaired by running again.
//! Nothing is rolled back on failure.

pub mod extensions;
pub mod roles;
pub mod sql;

use crate::config::ProvisionConfig;
use crate::db::{ConnectTarget, Connector, Session};
use crate::error::{ProvisionError, Result};
use crate::secrets::{CredentialBundle, ResolvedCredentials};
use extensions::{extension_schemas, SPATIAL_EXTENSIONS};
use roles::RoleTier;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Database every PostgreSQL server has, used before the target exists.
pub const ADMIN_DATABASE: &str = "postgres";

/// What a successful run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub database: String,
    pub schema: String,
    pub database_created: bool,
    pub roles_created: Vec<String>,
    pub extensions: Vec<String>,
    pub objects_reassigned: usize,
}

fn statement(step: &'static str) -> impl FnOnce(sqlx::Error) -> ProvisionError {
    move |source| ProvisionError::Statement { step, source }
}

/// Runs the fixed provisioning sequence for one configuration.
pub struct Provisioner<'a> {
    config: &'a ProvisionConfig,
    credentials: &'a ResolvedCredentials,
    connector: &'a dyn Connector,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        credentials: &'a ResolvedCredentials,
        connector: &'a dyn Connector,
    ) -> Self {
        Self {
            config,
            credentials,
            connector,
        }
    }

    fn bundle(&self, tier: RoleTier) -> &'a CredentialBundle {
        match tier {
            RoleTier::Read => &self.credentials.read,
            RoleTier::Write => &self.credentials.write,
            RoleTier::Admin => &self.credentials.admin,
        }
    }

    /// Database the master connects to first.
    ///
    /// The master bundle's own database is used unless it is the target
    /// itself, which may not exist yet.
    fn admin_database(&self) -> &'a str {
        match self.credentials.master.database.as_deref() {
            Some(db) if !db.is_empty() && db != self.config.database => db,
            _ => ADMIN_DATABASE,
        }
    }

    /// Run every step in order, stopping at the first failure.
    #[instrument(skip_all, fields(database = %self.config.database, schema = %self.config.schema))]
    pub async fn run(&self) -> Result<ProvisionReport> {
        let master = &self.credentials.master;
        let database = self.config.database.as_str();
        let mut report = ProvisionReport {
            database: self.config.database.clone(),
            schema: self.config.schema.clone(),
            ..Default::default()
        };

        let mut session = self.connect(master, self.admin_database()).await?;
        let created = self.ensure_database(session.as_mut()).await;
        report.database_created = finish(session, created).await?;

        let mut session = self.connect(master, database).await?;
        let roles = self.prepare_target(session.as_mut()).await;
        report.roles_created = finish(session, roles).await?;

        let mut session = self.connect(&self.credentials.admin, database).await?;
        let spatial = self.prepare_extensions(session.as_mut()).await;
        (report.extensions, report.objects_reassigned) = finish(session, spatial).await?;

        info!(
            database_created = report.database_created,
            roles_created = ?report.roles_created,
            objects_reassigned = report.objects_reassigned,
            "Provisioning complete"
        );
        Ok(report)
    }

    /// Schema, roles, grants and cross-role defaults; returns the roles created.
    async fn prepare_target(&self, session: &mut dyn Session) -> Result<Vec<String>> {
        let mut created = Vec::new();
        self.ensure_schema(session).await?;
        for tier in RoleTier::SEQUENCE {
            if self.ensure_role(session, tier).await? {
                created.push(self.bundle(tier).username.clone());
            }
            self.apply_grants(session, tier).await?;
        }
        self.link_roles(session).await?;
        Ok(created)
    }

    async fn prepare_extensions(&self, session: &mut dyn Session) -> Result<(Vec<String>, usize)> {
        let extensions = self.install_extensions(session).await?;
        let reassigned = self.reassign_ownership(session).await?;
        Ok((extensions, reassigned))
    }

    async fn connect(
        &self,
        bundle: &CredentialBundle,
        database: &str,
    ) -> Result<Box<dyn Session>> {
        let endpoint = bundle
            .endpoint_or(&self.credentials.master)
            .ok_or_else(|| {
                ProvisionError::Config(format!("no host known for '{}'", bundle.username))
            })?;

        info!(user = %bundle.username, database, host = %endpoint.host, "Opening connection");

        self.connector
            .connect(ConnectTarget {
                endpoint: &endpoint,
                username: &bundle.username,
                password: &bundle.password,
                database,
            })
            .await
            .map_err(|source| ProvisionError::Connect {
                user: bundle.username.clone(),
                database: database.to_string(),
                source,
            })
    }

    /// Returns whether the database had to be created.
    async fn ensure_database(&self, session: &mut dyn Session) -> Result<bool> {
        let database = &self.config.database;
        let exists = session
            .exists(sql::DATABASE_EXISTS, database)
            .await
            .map_err(statement("check database"))?;

        if exists {
            info!(database = %database, "Database already exists");
            return Ok(false);
        }

        session
            .execute(&sql::create_database(database))
            .await
            .map_err(statement("create database"))?;
        info!(database = %database, "Created database");
        Ok(true)
    }

    async fn ensure_schema(&self, session: &mut dyn Session) -> Result<()> {
        let schema = &self.config.schema;
        session
            .execute(&sql::create_schema(schema))
            .await
            .map_err(statement("create schema"))?;
        session
            .execute(&sql::set_search_path(&self.config.database, schema))
            .await
            .map_err(statement("set search path"))?;
        info!(schema = %schema, "Schema ready, search path set");
        Ok(())
    }

    /// Returns whether the role had to be created.
    async fn ensure_role(&self, session: &mut dyn Session, tier: RoleTier) -> Result<bool> {
        let bundle = self.bundle(tier);
        let exists = session
            .exists(sql::ROLE_EXISTS, &bundle.username)
            .await
            .map_err(statement("check role"))?;

        if exists {
            info!(role = %bundle.username, %tier, "Role already exists");
            return Ok(false);
        }

        session
            .execute(&sql::create_login_role(&bundle.username, &bundle.password))
            .await
            .map_err(statement(tier.create_step()))?;
        info!(role = %bundle.username, %tier, "Created role");
        Ok(true)
    }

    /// Grants are applied on every run; re-granting is a no-op.
    async fn apply_grants(&self, session: &mut dyn Session, tier: RoleTier) -> Result<()> {
        let role = &self.bundle(tier).username;
        for grant in tier.grants(role, &self.config.database, &self.config.schema) {
            session
                .execute(&grant)
                .await
                .map_err(statement(tier.grant_step()))?;
        }

        if tier == RoleTier::Admin {
            self.grant_admin_group(session, role).await?;
        }

        info!(role = %role, %tier, "Grants applied");
        Ok(())
    }

    async fn grant_admin_group(&self, session: &mut dyn Session, role: &str) -> Result<()> {
        let group = &self.config.admin_group_role;
        let exists = session
            .exists(sql::ROLE_EXISTS, group)
            .await
            .map_err(statement("check admin group role"))?;

        if !exists {
            warn!(
                group = %group,
                "Admin group role not present on this server, skipping membership"
            );
            return Ok(());
        }

        session
            .execute(&sql::grant_membership(group, role))
            .await
            .map_err(statement("grant admin group role"))
    }

    /// Let master manage what write owns, and let read see what write creates.
    async fn link_roles(&self, session: &mut dyn Session) -> Result<()> {
        let write = &self.credentials.write.username;
        let read = &self.credentials.read.username;

        session
            .execute(&sql::grant_membership(write, &self.credentials.master.username))
            .await
            .map_err(statement("grant write role to master"))?;
        session
            .execute(&sql::default_select_for_owner(
                write,
                &self.config.schema,
                read,
            ))
            .await
            .map_err(statement("default read access to write-owned tables"))?;

        info!(write = %write, read = %read, "Cross-role defaults applied");
        Ok(())
    }

    async fn install_extensions(&self, session: &mut dyn Session) -> Result<Vec<String>> {
        for extension in SPATIAL_EXTENSIONS {
            session
                .execute(&sql::create_extension(extension))
                .await
                .map_err(statement("create extension"))?;
        }
        info!(extensions = ?SPATIAL_EXTENSIONS, "Spatial extensions installed");
        Ok(SPATIAL_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    /// One ownership transfer per catalog row; returns how many ran.
    async fn reassign_ownership(&self, session: &mut dyn Session) -> Result<usize> {
        let admin = &self.credentials.admin.username;
        let objects = session
            .catalog_objects(&extension_schemas())
            .await
            .map_err(statement("list extension objects"))?;

        for object in &objects {
            session
                .execute(&sql::alter_owner(&object.schema, &object.name, admin))
                .await
                .map_err(statement("reassign ownership"))?;
        }

        info!(owner = %admin, objects = objects.len(), "Extension objects reassigned");
        Ok(objects.len())
    }
}

/// Close the session whatever the phase returned; a phase error takes precedence.
async fn finish<T>(session: Box<dyn Session>, phase: Result<T>) -> Result<T> {
    let closed = session.close().await.map_err(statement("close connection"));
    match (phase, closed) {
        (Ok(value), closed) => closed.map(|()| value),
        (Err(e), Err(close_error)) => {
            warn!(error = %close_error, "Failed to close connection after error");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
    }
}
