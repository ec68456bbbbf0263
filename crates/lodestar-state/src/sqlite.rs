//! `SQLite`-backed store implementations.
//!
//! One [`SqliteWorkspace`] owns the connection behind a `Mutex` and hands
//! out per-project store handles sharing it. Spec and resource payloads
//! are stored as JSON documents keyed by `(project, name)`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use lodestar_types::{InstanceRecord, JobSpec, Project, ResourceSpec, SecretItem};
use rusqlite::Connection;

use crate::error::{self, StoreError};
use crate::stores::{
    InstanceStore, ProjectStore, ResourceStore, ResourceStoreFactory, SecretStore, SpecStore,
    SpecStoreFactory,
};

/// Idempotent DDL for the control-plane tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    name TEXT PRIMARY KEY,
    config_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS job_specs (
    project TEXT NOT NULL,
    name TEXT NOT NULL,
    spec_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (project, name)
);

CREATE TABLE IF NOT EXISTS resource_specs (
    project TEXT NOT NULL,
    datastore TEXT NOT NULL,
    name TEXT NOT NULL,
    spec_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (project, name)
);

CREATE TABLE IF NOT EXISTS secrets (
    project TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (project, name)
);

CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    job_name TEXT NOT NULL,
    scheduled_at TEXT NOT NULL,
    kind TEXT NOT NULL,
    registered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resource_specs_datastore
    ON resource_specs (project, datastore);
";

/// `SQLite`-backed control-plane storage.
///
/// Create with [`SqliteWorkspace::open`] for file-backed persistence or
/// [`SqliteWorkspace::in_memory`] for tests. Cheap to clone; clones share
/// the connection.
#[derive(Clone)]
pub struct SqliteWorkspace {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWorkspace {
    /// Open or create the workspace database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory can't be
    /// created, or [`StoreError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory workspace (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the database can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ProjectStore for SqliteWorkspace {
    fn save(&self, project: &Project) -> error::Result<()> {
        let config_json = serde_json::to_string(&project.config).map_err(|e| {
            StoreError::Corrupt {
                kind: "project",
                name: project.name.to_string(),
                source: e,
            }
        })?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO projects (name, config_json, updated_at) \
             VALUES (?1, ?2, datetime('now')) \
             ON CONFLICT(name) DO UPDATE SET config_json = ?2, updated_at = datetime('now')",
            rusqlite::params![project.name.as_str(), config_json],
        )?;
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> error::Result<Project> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT name, config_json FROM projects WHERE name = ?1",
            [name],
            |row| {
                let name: String = row.get(0)?;
                let config_json: String = row.get(1)?;
                Ok((name, config_json))
            },
        );
        match result {
            Ok((name, config_json)) => decode_project(&name, &config_json),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::not_found("project", name))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn all(&self) -> error::Result<Vec<Project>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name, config_json FROM projects ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let config_json: String = row.get(1)?;
            Ok((name, config_json))
        })?;
        let mut projects = Vec::new();
        for row in rows {
            let (name, config_json) = row?;
            projects.push(decode_project(&name, &config_json)?);
        }
        Ok(projects)
    }
}

fn decode_project(name: &str, config_json: &str) -> error::Result<Project> {
    let config = serde_json::from_str(config_json).map_err(|e| StoreError::Corrupt {
        kind: "project",
        name: name.to_string(),
        source: e,
    })?;
    let project_name =
        lodestar_types::ProjectName::new(name).ok_or_else(|| StoreError::Corrupt {
            kind: "project",
            name: name.to_string(),
            source: serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "blank project name",
            )),
        })?;
    Ok(Project {
        name: project_name,
        config,
    })
}

impl SecretStore for SqliteWorkspace {
    fn save(&self, project: &Project, secret: &SecretItem) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO secrets (project, name, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT(project, name) DO UPDATE SET value = ?3",
            rusqlite::params![project.name.as_str(), secret.name, secret.value],
        )?;
        Ok(())
    }

    fn get_by_name(&self, project: &Project, name: &str) -> error::Result<Option<SecretItem>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT name, value FROM secrets WHERE project = ?1 AND name = ?2",
            rusqlite::params![project.name.as_str(), name],
            |row| {
                Ok(SecretItem {
                    name: row.get(0)?,
                    value: row.get(1)?,
                })
            },
        );
        match result {
            Ok(secret) => Ok(Some(secret)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl InstanceStore for SqliteWorkspace {
    fn save(&self, project: &Project, record: &InstanceRecord) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO instances (project, job_name, scheduled_at, kind, registered_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                project.name.as_str(),
                record.job_name,
                record.scheduled_at.to_rfc3339(),
                record.kind.as_str(),
                record.registered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Per-project [`SpecStore`] handle over the shared connection.
pub struct SqliteSpecStore {
    conn: Arc<Mutex<Connection>>,
    project: String,
}

impl SqliteSpecStore {
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl SpecStore for SqliteSpecStore {
    fn all(&self) -> error::Result<Vec<JobSpec>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, spec_json FROM job_specs WHERE project = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([&self.project], |row| {
            let name: String = row.get(0)?;
            let spec_json: String = row.get(1)?;
            Ok((name, spec_json))
        })?;
        let mut specs = Vec::new();
        for row in rows {
            let (name, spec_json) = row?;
            specs.push(decode_spec(&name, &spec_json)?);
        }
        Ok(specs)
    }

    fn save(&self, spec: &JobSpec) -> error::Result<()> {
        let spec_json = serde_json::to_string(spec).map_err(|e| StoreError::Corrupt {
            kind: "job spec",
            name: spec.name.clone(),
            source: e,
        })?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO job_specs (project, name, spec_json, updated_at) \
             VALUES (?1, ?2, ?3, datetime('now')) \
             ON CONFLICT(project, name) DO UPDATE SET spec_json = ?3, updated_at = datetime('now')",
            rusqlite::params![self.project, spec.name, spec_json],
        )?;
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> error::Result<Option<JobSpec>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT spec_json FROM job_specs WHERE project = ?1 AND name = ?2",
            rusqlite::params![self.project, name],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(spec_json) => Ok(Some(decode_spec(name, &spec_json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let affected = conn.execute(
            "DELETE FROM job_specs WHERE project = ?1 AND name = ?2",
            rusqlite::params![self.project, name],
        )?;
        if affected == 0 {
            return Err(StoreError::not_found("job spec", name));
        }
        Ok(())
    }
}

fn decode_spec(name: &str, spec_json: &str) -> error::Result<JobSpec> {
    serde_json::from_str(spec_json).map_err(|e| StoreError::Corrupt {
        kind: "job spec",
        name: name.to_string(),
        source: e,
    })
}

impl SpecStoreFactory for SqliteWorkspace {
    fn open(&self, project: &Project) -> error::Result<Arc<dyn SpecStore>> {
        Ok(Arc::new(SqliteSpecStore {
            conn: self.conn.clone(),
            project: project.name.to_string(),
        }))
    }
}

/// Per-project [`ResourceStore`] handle over the shared connection.
pub struct SqliteResourceStore {
    conn: Arc<Mutex<Connection>>,
    project: String,
}

impl SqliteResourceStore {
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ResourceStore for SqliteResourceStore {
    fn save(&self, spec: &ResourceSpec) -> error::Result<()> {
        let spec_json = serde_json::to_string(spec).map_err(|e| StoreError::Corrupt {
            kind: "resource",
            name: spec.name.clone(),
            source: e,
        })?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO resource_specs (project, datastore, name, spec_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4, datetime('now')) \
             ON CONFLICT(project, name) \
             DO UPDATE SET datastore = ?2, spec_json = ?4, updated_at = datetime('now')",
            rusqlite::params![self.project, spec.datastore, spec.name, spec_json],
        )?;
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> error::Result<Option<ResourceSpec>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT spec_json FROM resource_specs WHERE project = ?1 AND name = ?2",
            rusqlite::params![self.project, name],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(spec_json) => Ok(Some(decode_resource(name, &spec_json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn all(&self, datastore: &str) -> error::Result<Vec<ResourceSpec>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, spec_json FROM resource_specs \
             WHERE project = ?1 AND datastore = ?2 ORDER BY name",
        )?;
        let rows = stmt.query_map(rusqlite::params![self.project, datastore], |row| {
            let name: String = row.get(0)?;
            let spec_json: String = row.get(1)?;
            Ok((name, spec_json))
        })?;
        let mut specs = Vec::new();
        for row in rows {
            let (name, spec_json) = row?;
            specs.push(decode_resource(&name, &spec_json)?);
        }
        Ok(specs)
    }
}

fn decode_resource(name: &str, spec_json: &str) -> error::Result<ResourceSpec> {
    serde_json::from_str(spec_json).map_err(|e| StoreError::Corrupt {
        kind: "resource",
        name: name.to_string(),
        source: e,
    })
}

impl ResourceStoreFactory for SqliteWorkspace {
    fn open(&self, project: &Project) -> error::Result<Arc<dyn ResourceStore>> {
        Ok(Arc::new(SqliteResourceStore {
            conn: self.conn.clone(),
            project: project.name.to_string(),
        }))
    }
}
