use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use baton_core::error::{BatonError, Result};

use crate::context::AgentContext;
use crate::result::HandoffChainResult;

/// A chain waiting on user input.
#[derive(Debug, Clone)]
pub struct PausedChain {
    pub execution_id: String,
    /// Agent that asked; the default place to resume.
    pub agent_name: String,
    pub question: String,
    pub options: Option<Vec<String>>,
    pub context: AgentContext,
    pub paused_at: DateTime<Utc>,
}

impl PausedChain {
    /// Capture a paused chain. Returns `None` for any other outcome.
    pub fn from_chain_result(result: &HandoffChainResult) -> Option<Self> {
        match result {
            HandoffChainResult::NeedInput {
                agent_name,
                question,
                options,
                context,
                ..
            } => Some(Self {
                execution_id: context.execution_id().to_string(),
                agent_name: agent_name.clone(),
                question: question.clone(),
                options: options.clone(),
                context: context.clone(),
                paused_at: Utc::now(),
            }),
            _ => None,
        }
    }
}

/// Persistent store of paused chains, keyed by execution id.
pub struct PauseStore {
    conn: Mutex<Connection>,
}

fn db_err(what: &str) -> impl Fn(rusqlite::Error) -> BatonError + '_ {
    move |e| BatonError::Checkpoint(format!("{}: {}", what, e))
}

impl PauseStore {
    /// Open or create the pause database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("Failed to open pause store"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("Failed to open pause store"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS paused_chains (
                 execution_id TEXT PRIMARY KEY,
                 agent_name TEXT NOT NULL,
                 question TEXT NOT NULL,
                 options_json TEXT,
                 context_json TEXT NOT NULL,
                 paused_at TEXT NOT NULL
             );",
        )
        .map_err(db_err("Failed to initialize pause schema"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Save a paused chain, replacing an earlier pause of the same execution.
    pub fn save(&self, paused: &PausedChain) -> Result<()> {
        let context_json = serde_json::to_string(&paused.context)?;
        let options_json = paused
            .options
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| BatonError::Checkpoint(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO paused_chains
                 (execution_id, agent_name, question, options_json, context_json, paused_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                paused.execution_id,
                paused.agent_name,
                paused.question,
                options_json,
                context_json,
                paused.paused_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("Failed to save paused chain"))?;
        Ok(())
    }

    pub fn load(&self, execution_id: &str) -> Result<Option<PausedChain>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BatonError::Checkpoint(e.to_string()))?;
        let row = conn
            .query_row(
                "SELECT execution_id, agent_name, question, options_json, context_json, paused_at
                 FROM paused_chains WHERE execution_id = ?1",
                params![execution_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err("Failed to load paused chain"))?;

        row.map(Self::decode).transpose()
    }

    /// Remove a paused chain. Returns whether one existed.
    pub fn remove(&self, execution_id: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BatonError::Checkpoint(e.to_string()))?;
        let deleted = conn
            .execute(
                "DELETE FROM paused_chains WHERE execution_id = ?1",
                params![execution_id],
            )
            .map_err(db_err("Failed to remove paused chain"))?;
        Ok(deleted > 0)
    }

    /// All paused chains, oldest first.
    pub fn list(&self) -> Result<Vec<PausedChain>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BatonError::Checkpoint(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT execution_id, agent_name, question, options_json, context_json, paused_at
                 FROM paused_chains ORDER BY paused_at ASC",
            )
            .map_err(db_err("Failed to prepare query"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(db_err("Failed to list paused chains"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read paused chain"))?;

        rows.into_iter().map(Self::decode).collect()
    }

    fn decode(
        (execution_id, agent_name, question, options_json, context_json, paused_at): (
            String,
            String,
            String,
            Option<String>,
            String,
            String,
        ),
    ) -> Result<PausedChain> {
        let options = options_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        Ok(PausedChain {
            execution_id,
            agent_name,
            question,
            options,
            context: serde_json::from_str(&context_json)?,
            paused_at: DateTime::parse_from_rfc3339(&paused_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
