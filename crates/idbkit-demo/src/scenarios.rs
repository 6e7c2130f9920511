//! Scripted todo and preferences sessions
//!
//! Each scenario drives a [`Binding`] through the same steps a user would
//! take on the matching demo page and writes every resulting snapshot to
//! `out`.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use clap::ValueEnum;
use idbkit_core::engine::StorageEngine;
use idbkit_core::{Binding, DbConfig, Snapshot, StoreConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

pub const TODO_DB: &str = "TodoDemoDB";
pub const PREFS_DB: &str = "UserPrefsDB";
pub const PREFS_ID: &str = "user-prefs";

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Store(#[from] idbkit_core::Error),

    #[error("failed to read config {path}: {source}")]
    Config {
        path: String,
        source: std::io::Error,
    },

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DemoError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    pub id: String,
    pub theme: Theme,
    pub language: String,
    pub notifications: bool,
    pub auto_save: bool,
    pub updated_at: String,
}

impl Default for UserPreference {
    fn default() -> Self {
        Self {
            id: PREFS_ID.to_string(),
            theme: Theme::Light,
            language: "en".to_string(),
            notifications: true,
            auto_save: true,
            updated_at: now(),
        }
    }
}

/// Preference fields to change; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PrefsChanges {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub notifications: Option<bool>,
    pub auto_save: Option<bool>,
}

pub fn todo_config() -> DbConfig {
    DbConfig::new(TODO_DB).store(StoreConfig::new("todos").key_path("id"))
}

pub fn prefs_config() -> DbConfig {
    DbConfig::new(PREFS_DB).store(StoreConfig::new("preferences").key_path("id"))
}

/// Load a JSON configuration from `path`, or fall back to `default`.
pub fn load_config(path: Option<&Path>, default: DbConfig) -> Result<DbConfig> {
    let Some(path) = path else {
        return Ok(default);
    };
    let text = fs::read_to_string(path).map_err(|source| DemoError::Config {
        path: path.display().to_string(),
        source,
    })?;
    Ok(DbConfig::from_json(&text)?)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Add one todo per non-blank entry of `texts`, toggle the first, and
/// delete the last when there is more than one.
pub async fn run_todos<E: StorageEngine>(
    todos: &Binding<Todo, E>,
    texts: &[String],
    out: &mut impl Write,
) -> Result<Vec<Todo>> {
    todos.initialize().await;
    write_todos(out, "loaded", &todos.snapshot())?;

    let stamp = Utc::now().timestamp_millis();
    for (n, text) in texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).enumerate() {
        let todo = Todo {
            id: format!("todo_{}_{}", stamp, n),
            text: text.to_string(),
            completed: false,
            created_at: now(),
        };
        todos.save(&todo).await?;
        write_todos(out, &format!("added '{}'", text), &todos.snapshot())?;
    }

    let current = todos.data();
    if let Some(first) = current.first() {
        todos
            .update(first.id.as_str(), json!({ "completed": !first.completed }))
            .await?;
        write_todos(out, &format!("toggled '{}'", first.text), &todos.snapshot())?;
    }
    if current.len() > 1 {
        if let Some(last) = current.last() {
            todos.remove(last.id.as_str()).await?;
            write_todos(out, &format!("deleted '{}'", last.text), &todos.snapshot())?;
        }
    }

    let remaining = todos.data();
    info!(total = remaining.len(), "todo session finished");
    Ok(remaining)
}

/// Load the stored preferences (or the defaults), apply `changes` and save.
pub async fn run_prefs<E: StorageEngine>(
    prefs: &Binding<UserPreference, E>,
    changes: PrefsChanges,
    out: &mut impl Write,
) -> Result<UserPreference> {
    prefs.initialize().await;
    let mut current = prefs.data().into_iter().next().unwrap_or_default();
    write_prefs(out, "loaded", &current)?;

    if let Some(theme) = changes.theme {
        current.theme = theme;
    }
    if let Some(language) = changes.language {
        current.language = language;
    }
    if let Some(notifications) = changes.notifications {
        current.notifications = notifications;
    }
    if let Some(auto_save) = changes.auto_save {
        current.auto_save = auto_save;
    }
    current.updated_at = now();

    prefs.save(&current).await?;
    let saved = prefs
        .find_by_id(current.id.as_str())
        .await
        .unwrap_or(current);
    write_prefs(out, "saved", &saved)?;
    Ok(saved)
}

/// Total, completed and pending counts.
pub fn todo_stats(todos: &[Todo]) -> (usize, usize, usize) {
    let completed = todos.iter().filter(|t| t.completed).count();
    (todos.len(), completed, todos.len() - completed)
}

fn write_todos(out: &mut impl Write, step: &str, snapshot: &Snapshot<Todo>) -> Result<()> {
    let (total, completed, pending) = todo_stats(snapshot.data());
    writeln!(
        out,
        "== {} (total {}, completed {}, pending {})",
        step, total, completed, pending
    )?;
    if let Some(err) = snapshot.error() {
        writeln!(out, "   error: {}", err)?;
    }
    for todo in snapshot.data() {
        let mark = if todo.completed { "x" } else { " " };
        writeln!(out, "   [{}] {}  ({})", mark, todo.text, todo.id)?;
    }
    Ok(())
}

fn write_prefs(out: &mut impl Write, step: &str, prefs: &UserPreference) -> Result<()> {
    writeln!(out, "== {}", step)?;
    writeln!(out, "   {}", serde_json::to_string(prefs).map_err(idbkit_core::Error::from)?)?;
    Ok(())
}
