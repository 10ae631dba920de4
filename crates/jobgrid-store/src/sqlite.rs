use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use tracing::info;
use uuid::Uuid;

use jobgrid_model::{
    AgentDefinition, IterationPage, IterationStatus, JobDefinition, JobIteration, JobPage,
    JobStatus,
};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::traits::{AgentStore, IterationStore, JobStore};

/// Open a SQLite database at `path` and wrap it for sharing between the
/// three store types. The schema is initialised on open.
pub fn open_shared(path: &str) -> Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open(path)?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// SQLite-backed job store.
///
/// Wraps a shared connection in a `Mutex`; the single-record guarantees the
/// controller relies on come from serialising every statement on that lock.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Wrap an already-initialised shared connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        init_db(&conn.lock().unwrap())?;
        Ok(Self { conn })
    }

    fn write_row(conn: &Connection, definition: &JobDefinition) -> Result<()> {
        let json = serde_json::to_string(definition)?;
        conn.execute(
            "INSERT OR REPLACE INTO jobs
             (id, code, job_group, job_type, cluster, status, modified, definition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                definition.id,
                definition.code,
                definition.group,
                definition.job_type,
                definition.cluster,
                definition.status.to_string(),
                definition.modified.map(|m| m.to_rfc3339()),
                json,
            ],
        )?;
        Ok(())
    }

    fn query_definitions(conn: &Connection, sql: &str, args: &[String]) -> Result<Vec<JobDefinition>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for json in rows {
            jobs.push(serde_json::from_str(&json)?);
        }
        Ok(jobs)
    }
}

impl JobStore for SqliteJobStore {
    fn get_by_id(&self, id: &str) -> Result<Option<JobDefinition>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row("SELECT definition FROM jobs WHERE id = ?1", [id], |row| {
            row.get::<_, String>(0)
        }) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn get_all(&self) -> Result<Vec<JobDefinition>> {
        let conn = self.conn.lock().unwrap();
        Self::query_definitions(&conn, "SELECT definition FROM jobs ORDER BY code", &[])
    }

    fn get_page_by_code(&self, page: usize, size: usize) -> Result<JobPage> {
        let conn = self.conn.lock().unwrap();
        let total =
            conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get::<_, i64>(0))? as usize;
        let jobs = Self::query_definitions(
            &conn,
            &format!(
                "SELECT definition FROM jobs ORDER BY code LIMIT {size} OFFSET {offset}",
                offset = page * size
            ),
            &[],
        )?;
        Ok(JobPage { jobs, total })
    }

    fn get_by_type(&self, job_type: &str) -> Result<Vec<JobDefinition>> {
        let conn = self.conn.lock().unwrap();
        Self::query_definitions(
            &conn,
            "SELECT definition FROM jobs WHERE job_type = ?1 ORDER BY code",
            &[job_type.to_string()],
        )
    }

    fn get_by_status_in(
        &self,
        job_type: Option<&str>,
        group: Option<&str>,
        cluster: Option<&str>,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDefinition>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let mut sql = format!("SELECT definition FROM jobs WHERE status IN ({placeholders})");
        let mut args: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        if let Some(t) = job_type {
            sql.push_str(" AND job_type = ?");
            args.push(t.to_string());
        }
        if let Some(g) = group {
            sql.push_str(" AND job_group = ?");
            args.push(g.to_string());
        }
        if let Some(c) = cluster {
            sql.push_str(" AND cluster = ?");
            args.push(c.to_string());
        }
        sql.push_str(" ORDER BY code");

        let conn = self.conn.lock().unwrap();
        Self::query_definitions(&conn, &sql, &args)
    }

    fn get_groups(&self, cluster: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT job_group FROM jobs WHERE cluster = ?1 ORDER BY job_group")?;
        let groups = stmt
            .query_map([cluster], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(groups)
    }

    fn get_types(&self, cluster: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT job_type FROM jobs WHERE cluster = ?1 ORDER BY job_type")?;
        let types = stmt
            .query_map([cluster], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(types)
    }

    fn insert(&self, mut definition: JobDefinition) -> Result<JobDefinition> {
        let conn = self.conn.lock().unwrap();

        if definition.status.is_active() {
            let clash = conn.query_row(
                "SELECT COUNT(*) FROM jobs
                 WHERE code = ?1 AND job_group = ?2 AND cluster = ?3 AND status = 'ACTIVE'",
                params![definition.code, definition.group, definition.cluster],
                |row| row.get::<_, i64>(0),
            )?;
            if clash > 0 {
                return Err(StoreError::Conflict {
                    code: definition.code,
                    group: definition.group,
                });
            }
        }

        let now = Utc::now();
        if definition.id.is_empty() {
            definition.id = Uuid::new_v4().to_string();
        }
        if definition.created.is_none() {
            definition.created = Some(now);
        }
        if definition.modified.is_none() {
            definition.modified = Some(now);
        }

        Self::write_row(&conn, &definition)?;
        Ok(definition)
    }

    fn update(&self, mut definition: JobDefinition) -> Result<Option<JobDefinition>> {
        let conn = self.conn.lock().unwrap();

        let exists = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE id = ?1",
            [&definition.id],
            |row| row.get::<_, i64>(0),
        )?;
        if exists == 0 {
            return Ok(None);
        }

        // a status change to ACTIVE must not create a second ACTIVE
        // (code, group) in the cluster
        if definition.status.is_active() {
            let clash = conn.query_row(
                "SELECT COUNT(*) FROM jobs
                 WHERE code = ?1 AND job_group = ?2 AND cluster = ?3
                   AND status = 'ACTIVE' AND id <> ?4",
                params![
                    definition.code,
                    definition.group,
                    definition.cluster,
                    definition.id
                ],
                |row| row.get::<_, i64>(0),
            )?;
            if clash > 0 {
                return Err(StoreError::Conflict {
                    code: definition.code,
                    group: definition.group,
                });
            }
        }

        definition.modified = Some(Utc::now());
        Self::write_row(&conn, &definition)?;
        Ok(Some(definition))
    }

    fn delete_by_id(&self, id: &str) -> Result<Option<JobDefinition>> {
        let conn = self.conn.lock().unwrap();
        let existing = match conn.query_row(
            "SELECT definition FROM jobs WHERE id = ?1",
            [id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StoreError::Database(e)),
        };
        conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        Ok(Some(existing))
    }

    fn delete_all(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM jobs", [])?;
        Ok(())
    }
}

/// SQLite-backed iteration store.
pub struct SqliteIterationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIterationStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        init_db(&conn.lock().unwrap())?;
        Ok(Self { conn })
    }
}

impl IterationStore for SqliteIterationStore {
    fn get_by_id(&self, id: &str) -> Result<Option<JobIteration>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT record FROM iterations WHERE id = ?1",
            [id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn get_all(&self) -> Result<Vec<JobIteration>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT record FROM iterations ORDER BY timestamp")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut iterations = Vec::with_capacity(rows.len());
        for json in rows {
            iterations.push(serde_json::from_str(&json)?);
        }
        Ok(iterations)
    }

    fn get_page_by_timestamp(
        &self,
        job_id: &str,
        statuses: Option<&[IterationStatus]>,
        page: usize,
        size: usize,
    ) -> Result<IterationPage> {
        let mut filter = String::from("WHERE job_id = ?");
        let mut args: Vec<String> = vec![job_id.to_string()];

        if let Some(statuses) = statuses {
            if statuses.is_empty() {
                return Ok(IterationPage {
                    iterations: Vec::new(),
                    total: 0,
                });
            }
            let placeholders = vec!["?"; statuses.len()].join(", ");
            filter.push_str(&format!(" AND status IN ({placeholders})"));
            args.extend(statuses.iter().map(|s| s.to_string()));
        }

        let conn = self.conn.lock().unwrap();

        let total = conn.query_row(
            &format!("SELECT COUNT(*) FROM iterations {filter}"),
            params_from_iter(args.iter()),
            |row| row.get::<_, i64>(0),
        )? as usize;

        let mut stmt = conn.prepare(&format!(
            "SELECT record FROM iterations {filter} ORDER BY timestamp DESC LIMIT {size} OFFSET {offset}",
            offset = page * size
        ))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut iterations = Vec::with_capacity(rows.len());
        for json in rows {
            iterations.push(serde_json::from_str(&json)?);
        }
        Ok(IterationPage { iterations, total })
    }

    fn insert(&self, mut iteration: JobIteration) -> Result<JobIteration> {
        iteration.id = Some(Uuid::new_v4().to_string());
        let json = serde_json::to_string(&iteration)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO iterations (id, job_id, status, timestamp, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                iteration.id,
                iteration.job_id,
                iteration.status.to_string(),
                iteration.timestamp.to_rfc3339(),
                json,
            ],
        )?;
        Ok(iteration)
    }

    fn delete_before(&self, upper: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM iterations WHERE timestamp < ?1",
            [upper.to_rfc3339()],
        )?;
        if removed > 0 {
            info!(removed, upper = %upper, "iterations cleaned up");
        }
        Ok(removed as u64)
    }

    fn delete_all(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM iterations", [])?;
        Ok(())
    }
}

/// SQLite-backed agent store.
pub struct SqliteAgentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAgentStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        init_db(&conn.lock().unwrap())?;
        Ok(Self { conn })
    }
}

impl AgentStore for SqliteAgentStore {
    fn get_by_id(&self, id: &str) -> Result<Option<AgentDefinition>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row("SELECT record FROM agents WHERE id = ?1", [id], |row| {
            row.get::<_, String>(0)
        }) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn get_all(&self) -> Result<Vec<AgentDefinition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT record FROM agents ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut agents = Vec::with_capacity(rows.len());
        for json in rows {
            agents.push(serde_json::from_str(&json)?);
        }
        Ok(agents)
    }

    fn upsert(&self, mut agent: AgentDefinition) -> Result<AgentDefinition> {
        if agent.id.is_empty() {
            agent.id = Uuid::new_v4().to_string();
        }
        let json = serde_json::to_string(&agent)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO agents (id, cluster, record) VALUES (?1, ?2, ?3)",
            params![agent.id, agent.cluster, json],
        )?;
        Ok(agent)
    }

    fn update(&self, agent: AgentDefinition) -> Result<Option<AgentDefinition>> {
        let json = serde_json::to_string(&agent)?;
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE agents SET cluster = ?1, record = ?2 WHERE id = ?3",
            params![agent.cluster, json, agent.id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(agent))
    }

    fn delete_by_id(&self, id: &str) -> Result<Option<AgentDefinition>> {
        let existing = self.get_by_id(id)?;
        if existing.is_some() {
            self.conn
                .lock()
                .unwrap()
                .execute("DELETE FROM agents WHERE id = ?1", [id])?;
        }
        Ok(existing)
    }

    fn delete_all(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM agents", [])?;
        Ok(())
    }
}
