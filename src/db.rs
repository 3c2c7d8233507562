use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::diff::hash_diff;
use crate::errors::PatchworkError;
use crate::models::*;

/// Async-safe handle to the patch database.
///
/// Wraps `PatchworkDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<PatchworkDb>>,
}

impl DbHandle {
    pub fn new(db: PatchworkDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`). The lock is held
    /// for the whole closure, so a closure that reads then writes sees no
    /// interleaved writers.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PatchworkDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests only;
    /// never call this from a request handler.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, PatchworkDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

/// States shipped with a fresh installation, in display order.
pub const DEFAULT_STATES: &[(&str, bool)] = &[
    ("New", true),
    ("Under Review", true),
    ("Accepted", false),
    ("Rejected", false),
    ("RFC", false),
    ("Not Applicable", false),
    ("Changes Requested", false),
    ("Awaiting Upstream", false),
    ("Superseded", false),
    ("Deferred", false),
];

const PATCH_SELECT: &str = "
    SELECT p.id, p.msgid, p.name, p.date, p.archived, p.hash, p.commit_ref,
           p.pull_url, p.content, p.diff, p.headers,
           pr.id, pr.linkname, pr.name, pr.listid, pr.listemail, pr.web_url,
           pr.scm_url, pr.webscm_url,
           pe.id, pe.name, pe.email, pe.user_id,
           s.id, s.name, s.slug, s.ordering, s.action_required,
           d.id, d.username, d.email, d.first_name, d.last_name, d.is_superuser,
           se.id, se.project_id, se.name, se.date, se.version
    FROM patches p
    JOIN projects pr ON pr.id = p.project_id
    JOIN people pe ON pe.id = p.submitter_id
    JOIN states s ON s.id = p.state_id
    LEFT JOIN users d ON d.id = p.delegate_id
    LEFT JOIN series se ON se.id = p.series_id";

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, is_superuser";

pub struct PatchworkDb {
    conn: Connection,
}

impl PatchworkDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    linkname TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    listid TEXT NOT NULL DEFAULT '',
                    listemail TEXT NOT NULL DEFAULT '',
                    web_url TEXT NOT NULL DEFAULT '',
                    scm_url TEXT NOT NULL DEFAULT '',
                    webscm_url TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS states (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    slug TEXT NOT NULL UNIQUE,
                    ordering INTEGER NOT NULL DEFAULT 0,
                    action_required INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL DEFAULT '',
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    is_superuser INTEGER NOT NULL DEFAULT 0,
                    api_token TEXT UNIQUE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS people (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS project_maintainers (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    PRIMARY KEY (user_id, project_id)
                );

                CREATE TABLE IF NOT EXISTS series (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    name TEXT,
                    date TEXT NOT NULL,
                    version INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS patches (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    msgid TEXT NOT NULL,
                    name TEXT NOT NULL,
                    date TEXT NOT NULL,
                    submitter_id INTEGER NOT NULL REFERENCES people(id),
                    delegate_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    state_id INTEGER NOT NULL REFERENCES states(id),
                    archived INTEGER NOT NULL DEFAULT 0,
                    hash TEXT,
                    commit_ref TEXT,
                    pull_url TEXT,
                    series_id INTEGER REFERENCES series(id) ON DELETE SET NULL,
                    content TEXT NOT NULL DEFAULT '',
                    diff TEXT,
                    headers TEXT NOT NULL DEFAULT '',
                    UNIQUE (project_id, msgid)
                );

                CREATE INDEX IF NOT EXISTS idx_patches_project ON patches(project_id);
                CREATE INDEX IF NOT EXISTS idx_patches_state ON patches(state_id);
                CREATE INDEX IF NOT EXISTS idx_patches_submitter ON patches(submitter_id);
                CREATE INDEX IF NOT EXISTS idx_patches_delegate ON patches(delegate_id);
                CREATE INDEX IF NOT EXISTS idx_patches_series ON patches(series_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Projects ──────────────────────────────────────────────────────

    pub fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (linkname, name, listid, listemail, web_url, scm_url, webscm_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project.linkname,
                    project.name,
                    project.listid,
                    project.listemail,
                    project.web_url,
                    project.scm_url,
                    project.webscm_url
                ],
            )
            .with_context(|| format!("Failed to insert project '{}'", project.linkname))?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.find_project(&LookupKey::Id(id))
    }

    /// Look a project up by id or linkname.
    pub fn find_project(&self, key: &LookupKey) -> Result<Option<Project>> {
        let (clause, value) = match key.normalized() {
            LookupKey::Id(id) => ("id = ?1", Value::Integer(id)),
            LookupKey::Name(linkname) => ("linkname = ?1", Value::Text(linkname)),
        };
        self.conn
            .query_row(
                &format!(
                    "SELECT id, linkname, name, listid, listemail, web_url, scm_url, webscm_url
                     FROM projects WHERE {}",
                    clause
                ),
                [value],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        linkname: row.get(1)?,
                        name: row.get(2)?,
                        listid: row.get(3)?,
                        listemail: row.get(4)?,
                        web_url: row.get(5)?,
                        scm_url: row.get(6)?,
                        webscm_url: row.get(7)?,
                    })
                },
            )
            .optional()
            .context("Failed to query project")
    }

    // ── States ────────────────────────────────────────────────────────

    pub fn create_state(&self, name: &str, ordering: i32, action_required: bool) -> Result<State> {
        let slug = slugify(name);
        self.conn
            .execute(
                "INSERT INTO states (name, slug, ordering, action_required) VALUES (?1, ?2, ?3, ?4)",
                params![name, slug, ordering, action_required],
            )
            .with_context(|| format!("Failed to insert state '{}'", name))?;
        let id = self.conn.last_insert_rowid();
        self.get_state(id)?.context("State not found after insert")
    }

    /// Insert the stock states that are missing. Returns how many were added.
    pub fn seed_default_states(&self) -> Result<usize> {
        let mut added = 0;
        for (ordering, (name, action_required)) in DEFAULT_STATES.iter().enumerate() {
            let inserted = self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO states (name, slug, ordering, action_required)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![name, slugify(name), ordering as i32, action_required],
                )
                .with_context(|| format!("Failed to seed state '{}'", name))?;
            added += inserted;
        }
        Ok(added)
    }

    pub fn get_state(&self, id: i64) -> Result<Option<State>> {
        self.conn
            .query_row(
                "SELECT id, name, slug, ordering, action_required FROM states WHERE id = ?1",
                params![id],
                state_from_row,
            )
            .optional()
            .context("Failed to query state")
    }

    /// All states in display order.
    pub fn list_states(&self) -> Result<Vec<State>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, slug, ordering, action_required FROM states
                 ORDER BY ordering, id",
            )
            .context("Failed to prepare list_states")?;
        let rows = stmt
            .query_map([], state_from_row)
            .context("Failed to query states")?;
        let mut states = Vec::new();
        for row in rows {
            states.push(row.context("Failed to read state row")?);
        }
        Ok(states)
    }

    /// Resolve a state from its human-readable name (case-insensitive) or slug.
    pub fn find_state(&self, name: &str) -> Result<Option<State>> {
        let name = name.trim();
        self.conn
            .query_row(
                "SELECT id, name, slug, ordering, action_required FROM states
                 WHERE name = ?1 COLLATE NOCASE OR slug = ?1
                 ORDER BY ordering, id LIMIT 1",
                params![name],
                state_from_row,
            )
            .optional()
            .context("Failed to query state by name")
    }

    // ── People ────────────────────────────────────────────────────────

    pub fn create_person(&self, email: &str, name: Option<&str>) -> Result<Person> {
        self.conn
            .execute(
                "INSERT INTO people (email, name) VALUES (?1, ?2)",
                params![email, name],
            )
            .with_context(|| format!("Failed to insert person '{}'", email))?;
        let id = self.conn.last_insert_rowid();
        self.get_person(id)?.context("Person not found after insert")
    }

    pub fn get_person(&self, id: i64) -> Result<Option<Person>> {
        self.conn
            .query_row(
                "SELECT id, name, email, user_id FROM people WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Person {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        user_id: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query person")
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (username, email, first_name, last_name, is_superuser)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.username,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.is_superuser
                ],
            )
            .with_context(|| format!("Failed to insert user '{}'", user.username))?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.find_user(&LookupKey::Id(id))
    }

    /// Look a user up by id, username, or email (case-insensitive).
    pub fn find_user(&self, key: &LookupKey) -> Result<Option<User>> {
        match key.normalized() {
            LookupKey::Id(id) => self
                .conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    params![id],
                    user_from_row,
                )
                .optional()
                .context("Failed to query user"),
            LookupKey::Name(name) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {} FROM users WHERE username = ?1 OR email = ?1 COLLATE NOCASE
                         ORDER BY username = ?1 DESC, id LIMIT 1",
                        USER_COLUMNS
                    ),
                    params![name],
                    user_from_row,
                )
                .optional()
                .context("Failed to query user by name"),
        }
    }

    pub fn user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE api_token = ?1", USER_COLUMNS),
                params![token],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by token")
    }

    /// Replace the user's API token.
    pub fn set_user_token(&self, user_id: i64, token: &str) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE users SET api_token = ?1 WHERE id = ?2",
                params![token, user_id],
            )
            .context("Failed to update API token")?;
        if updated == 0 {
            return Err(PatchworkError::UserNotFound {
                user: user_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    // ── Maintainers ───────────────────────────────────────────────────

    pub fn add_maintainer(&self, user_id: i64, project_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO project_maintainers (user_id, project_id) VALUES (?1, ?2)",
                params![user_id, project_id],
            )
            .context("Failed to add maintainer")?;
        Ok(())
    }

    pub fn is_maintainer(&self, user_id: i64, project_id: i64) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM project_maintainers WHERE user_id = ?1 AND project_id = ?2",
                params![user_id, project_id],
                |row| row.get(0),
            )
            .context("Failed to query maintainers")?;
        Ok(count > 0)
    }

    // ── Series ────────────────────────────────────────────────────────

    pub fn create_series(&self, project_id: i64, name: Option<&str>, version: i32) -> Result<Series> {
        self.conn
            .execute(
                "INSERT INTO series (project_id, name, date, version) VALUES (?1, ?2, ?3, ?4)",
                params![project_id, name, now_timestamp(), version],
            )
            .context("Failed to insert series")?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, project_id, name, date, version FROM series WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Series {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        name: row.get(2)?,
                        date: row.get(3)?,
                        version: row.get(4)?,
                    })
                },
            )
            .context("Series not found after insert")
    }

    // ── Patches ───────────────────────────────────────────────────────

    /// Ingestion entry point: store a patch parsed from the mailing list.
    pub fn create_patch(&self, patch: &NewPatch) -> Result<PatchDetail> {
        let date = patch.date.clone().unwrap_or_else(now_timestamp);
        let hash = patch.diff.as_deref().map(hash_diff);
        self.conn
            .execute(
                "INSERT INTO patches (project_id, msgid, name, date, submitter_id, delegate_id,
                                      state_id, hash, series_id, content, diff, headers)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    patch.project_id,
                    patch.msgid,
                    patch.name,
                    date,
                    patch.submitter_id,
                    patch.delegate_id,
                    patch.state_id,
                    hash,
                    patch.series_id,
                    patch.content,
                    patch.diff,
                    patch.headers
                ],
            )
            .with_context(|| format!("Failed to insert patch '{}'", patch.msgid))?;
        let id = self.conn.last_insert_rowid();
        self.get_patch(id)?.context("Patch not found after insert")
    }

    pub fn get_patch(&self, id: i64) -> Result<Option<PatchDetail>> {
        self.conn
            .query_row(
                &format!("{} WHERE p.id = ?1", PATCH_SELECT),
                params![id],
                patch_detail_from_row,
            )
            .optional()
            .context("Failed to query patch")
    }

    /// List patches matching `filter`, at most `limit` rows starting at `offset`.
    pub fn list_patches(
        &self,
        filter: &PatchFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PatchDetail>> {
        let (clause, mut values) = where_clause(filter);
        let direction = if filter.order.descending { "DESC" } else { "ASC" };
        let order = match filter.order.field {
            OrderField::Id => format!("p.id {}", direction),
            OrderField::Name => format!("p.name COLLATE NOCASE {0}, p.id {0}", direction),
            OrderField::Date => format!("p.date {0}, p.id {0}", direction),
        };
        values.push(Value::Integer(limit));
        values.push(Value::Integer(offset));
        let sql = format!(
            "{} {} ORDER BY {} LIMIT ? OFFSET ?",
            PATCH_SELECT, clause, order
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_patches")?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), patch_detail_from_row)
            .context("Failed to query patches")?;
        let mut patches = Vec::new();
        for row in rows {
            patches.push(row.context("Failed to read patch row")?);
        }
        Ok(patches)
    }

    pub fn count_patches(&self, filter: &PatchFilter) -> Result<i64> {
        let (clause, values) = where_clause(filter);
        let sql = format!(
            "SELECT COUNT(*) FROM patches p
             JOIN projects pr ON pr.id = p.project_id
             JOIN people pe ON pe.id = p.submitter_id
             JOIN states s ON s.id = p.state_id
             LEFT JOIN users d ON d.id = p.delegate_id
             {}",
            clause
        );
        self.conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .context("Failed to count patches")
    }

    /// Validate and apply a partial update in one transaction.
    ///
    /// Every field is resolved before anything is written, so a rejected
    /// update leaves the row untouched.
    pub fn update_patch(&self, id: i64, update: &PatchUpdate) -> Result<PatchDetail> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let current = self
            .get_patch(id)?
            .ok_or(PatchworkError::PatchNotFound { id })?;

        let state_id = match &update.state {
            None => None,
            Some(None) => return Err(PatchworkError::NullField { field: "state" }.into()),
            Some(Some(value)) => Some(self.resolve_state(value)?.id),
        };

        let archived = match update.archived {
            None => None,
            Some(None) => return Err(PatchworkError::NullField { field: "archived" }.into()),
            Some(Some(archived)) => Some(archived),
        };

        let delegate_id = match &update.delegate {
            None => None,
            Some(None) => Some(None),
            Some(Some(key)) => Some(Some(self.resolve_delegate(key, &current.project)?.id)),
        };

        if let Some(state_id) = state_id {
            tx.execute(
                "UPDATE patches SET state_id = ?1 WHERE id = ?2",
                params![state_id, id],
            )
            .context("Failed to update patch state")?;
        }
        if let Some(delegate_id) = delegate_id {
            tx.execute(
                "UPDATE patches SET delegate_id = ?1 WHERE id = ?2",
                params![delegate_id, id],
            )
            .context("Failed to update patch delegate")?;
        }
        if let Some(archived) = archived {
            tx.execute(
                "UPDATE patches SET archived = ?1 WHERE id = ?2",
                params![archived, id],
            )
            .context("Failed to update patch archived flag")?;
        }
        if let Some(commit_ref) = &update.commit_ref {
            tx.execute(
                "UPDATE patches SET commit_ref = ?1 WHERE id = ?2",
                params![commit_ref.as_deref().filter(|s| !s.is_empty()), id],
            )
            .context("Failed to update patch commit_ref")?;
        }
        if let Some(pull_url) = &update.pull_url {
            tx.execute(
                "UPDATE patches SET pull_url = ?1 WHERE id = ?2",
                params![pull_url.as_deref().filter(|s| !s.is_empty()), id],
            )
            .context("Failed to update patch pull_url")?;
        }

        tx.commit().context("Failed to commit patch update")?;

        self.get_patch(id)?
            .context("Patch not found after update")
    }

    fn resolve_state(&self, value: &str) -> Result<State> {
        match self.find_state(value)? {
            Some(state) => Ok(state),
            None => {
                let choices = self
                    .list_states()?
                    .into_iter()
                    .map(|s| s.name)
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(PatchworkError::InvalidState {
                    value: value.to_string(),
                    choices,
                }
                .into())
            }
        }
    }

    fn resolve_delegate(&self, key: &LookupKey, project: &Project) -> Result<User> {
        let user = self
            .find_user(key)?
            .ok_or_else(|| PatchworkError::UnknownUser {
                value: key.to_string(),
            })?;
        if !self.is_maintainer(user.id, project.id)? {
            return Err(PatchworkError::NotMaintainer {
                user: user.username,
                project: project.name.clone(),
            }
            .into());
        }
        Ok(user)
    }
}

/// Build the `WHERE` clause for a filter over the joins in `PATCH_SELECT`.
fn where_clause(filter: &PatchFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if !filter.states.is_empty() {
        let mut alternatives = Vec::new();
        for state in &filter.states {
            match state.trim().parse::<i64>() {
                Ok(id) => {
                    alternatives.push("s.id = ?");
                    values.push(Value::Integer(id));
                }
                Err(_) => {
                    alternatives.push("s.slug = ?");
                    values.push(Value::Text(state.trim().to_string()));
                }
            }
        }
        conditions.push(format!("({})", alternatives.join(" OR ")));
    }

    if let Some(project) = &filter.project {
        match project.normalized() {
            LookupKey::Id(id) => {
                conditions.push("p.project_id = ?".into());
                values.push(Value::Integer(id));
            }
            LookupKey::Name(linkname) => {
                conditions.push("pr.linkname = ?".into());
                values.push(Value::Text(linkname));
            }
        }
    }

    if let Some(submitter) = &filter.submitter {
        match submitter.normalized() {
            LookupKey::Id(id) => {
                conditions.push("p.submitter_id = ?".into());
                values.push(Value::Integer(id));
            }
            LookupKey::Name(email) => {
                conditions.push("pe.email = ? COLLATE NOCASE".into());
                values.push(Value::Text(email));
            }
        }
    }

    if let Some(delegate) = &filter.delegate {
        match delegate.normalized() {
            LookupKey::Id(id) => {
                conditions.push("p.delegate_id = ?".into());
                values.push(Value::Integer(id));
            }
            LookupKey::Name(name) => {
                conditions.push("(d.username = ? OR d.email = ? COLLATE NOCASE)".into());
                values.push(Value::Text(name.clone()));
                values.push(Value::Text(name));
            }
        }
    }

    if let Some(archived) = filter.archived {
        conditions.push("p.archived = ?".into());
        values.push(Value::Integer(archived as i64));
    }

    if let Some(q) = &filter.q {
        conditions.push("p.name LIKE ? ESCAPE '\\'".into());
        values.push(Value::Text(format!("%{}%", escape_like(q))));
    }

    if let Some(since) = &filter.since {
        conditions.push("p.date >= ?".into());
        values.push(Value::Text(format_timestamp(since)));
    }

    if let Some(before) = &filter.before {
        conditions.push("p.date < ?".into());
        values.push(Value::Text(format_timestamp(before)));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), values)
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<State> {
    Ok(State {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        ordering: row.get(3)?,
        action_required: row.get(4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        is_superuser: row.get(5)?,
    })
}

/// Map a row produced by `PATCH_SELECT`. Column positions follow the
/// select list exactly.
fn patch_detail_from_row(row: &Row<'_>) -> rusqlite::Result<PatchDetail> {
    let project = Project {
        id: row.get(11)?,
        linkname: row.get(12)?,
        name: row.get(13)?,
        listid: row.get(14)?,
        listemail: row.get(15)?,
        web_url: row.get(16)?,
        scm_url: row.get(17)?,
        webscm_url: row.get(18)?,
    };
    let submitter = Person {
        id: row.get(19)?,
        name: row.get(20)?,
        email: row.get(21)?,
        user_id: row.get(22)?,
    };
    let state = State {
        id: row.get(23)?,
        name: row.get(24)?,
        slug: row.get(25)?,
        ordering: row.get(26)?,
        action_required: row.get(27)?,
    };
    let delegate = match row.get::<_, Option<i64>>(28)? {
        Some(id) => Some(User {
            id,
            username: row.get(29)?,
            email: row.get(30)?,
            first_name: row.get(31)?,
            last_name: row.get(32)?,
            is_superuser: row.get(33)?,
        }),
        None => None,
    };
    let series = match row.get::<_, Option<i64>>(34)? {
        Some(id) => Some(Series {
            id,
            project_id: row.get(35)?,
            name: row.get(36)?,
            date: row.get(37)?,
            version: row.get(38)?,
        }),
        None => None,
    };
    let patch = Patch {
        id: row.get(0)?,
        project_id: project.id,
        msgid: row.get(1)?,
        name: row.get(2)?,
        date: row.get(3)?,
        submitter_id: submitter.id,
        delegate_id: delegate.as_ref().map(|d| d.id),
        state_id: state.id,
        archived: row.get(4)?,
        hash: row.get(5)?,
        commit_ref: row.get(6)?,
        pull_url: row.get(7)?,
        series_id: series.as_ref().map(|s| s.id),
        content: row.get(8)?,
        diff: row.get(9)?,
        headers: row.get(10)?,
    };

    Ok(PatchDetail {
        patch,
        project,
        submitter,
        state,
        delegate,
        series,
    })
}
