use crate::catalog;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::{MAX_PAGE_SIZE, PAGE_SIZE_KEY};
use serde_json::json;
use std::path::{Path, PathBuf};

pub const INSTITUTION_KEY: &str = "reports.institutionName";

const KNOWN_SETTINGS: &[&str] = &[PAGE_SIZE_KEY, INSTITUTION_KEY];

/// Opens (or creates) the workspace database and seeds the built-in tests.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let seeded = catalog::seed_catalog(&conn)?;
    tracing::info!(workspace = %path.display(), seeded, "workspace opened");
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn validate_setting(key: &str, value: &serde_json::Value) -> Result<(), String> {
    match key {
        PAGE_SIZE_KEY => match value.as_i64() {
            Some(n) if (1..=MAX_PAGE_SIZE).contains(&n) => Ok(()),
            _ => Err(format!(
                "{} must be an integer between 1 and {}",
                key, MAX_PAGE_SIZE
            )),
        },
        INSTITUTION_KEY => {
            if value.is_string() || value.is_null() {
                Ok(())
            } else {
                Err(format!("{} must be a string or null", key))
            }
        }
        _ => Err(format!("unknown setting: {}", key)),
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let key = match required_str(req, "key") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !KNOWN_SETTINGS.contains(&key.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown setting: {}", key),
            Some(json!({ "known": KNOWN_SETTINGS })),
        );
    }

    match db::settings_get_json(conn, &key) {
        Ok(value) => ok(
            &req.id,
            json!({ "key": key, "value": value.unwrap_or(serde_json::Value::Null) }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_settings_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let key = match required_str(req, "key") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(value) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    if let Err(message) = validate_setting(&key, value) {
        return err(&req.id, "bad_params", message, Some(json!({ "key": key })));
    }

    match db::settings_set_json(conn, &key, value) {
        Ok(()) => ok(&req.id, json!({ "key": key, "value": value })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.set" => Some(handle_settings_set(state, req)),
        _ => None,
    }
}
