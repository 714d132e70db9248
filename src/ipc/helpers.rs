use crate::access::{self, AccessError, Actor, Role};
use crate::ipc::error::{err, forbidden};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StoreError, TestRow};
use rusqlite::Connection;

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

pub fn access_err(req: &Request, e: AccessError) -> serde_json::Value {
    match e {
        AccessError::Forbidden(message) => {
            tracing::warn!(method = %req.method, reason = %message, "access denied");
            forbidden(&req.id, message)
        }
        AccessError::NotFound(what) => {
            err(&req.id, "not_found", format!("{} not found", what), None)
        }
        AccessError::Db(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn store_err(req: &Request, e: StoreError) -> serde_json::Value {
    match e {
        StoreError::Db(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        StoreError::Corrupt { table, message } => err(
            &req.id,
            "db_query_failed",
            message,
            Some(serde_json::json!({ "table": table })),
        ),
    }
}

/// Loads the acting user from `params.actorId`.
pub fn actor(conn: &Connection, req: &Request) -> Result<Actor, serde_json::Value> {
    let actor_id = required_str(req, "actorId")?;
    access::load_actor(conn, &actor_id).map_err(|e| access_err(req, e))
}

pub fn actor_with_role(
    conn: &Connection,
    req: &Request,
    role: Role,
) -> Result<Actor, serde_json::Value> {
    let actor = actor(conn, req)?;
    access::require_role(&actor, role).map_err(|e| access_err(req, e))?;
    Ok(actor)
}

pub fn test_by_id(
    conn: &Connection,
    req: &Request,
    test_id: &str,
) -> Result<TestRow, serde_json::Value> {
    match store::load_test(conn, test_id) {
        Ok(Some(t)) => Ok(t),
        Ok(None) => Err(err(&req.id, "not_found", "test not found", None)),
        Err(e) => Err(store_err(req, e)),
    }
}

pub fn student_by_id(
    conn: &Connection,
    req: &Request,
    student_id: &str,
) -> Result<Actor, serde_json::Value> {
    match access::load_user(conn, student_id) {
        Ok(Some(u)) if u.role == Role::Student => Ok(u),
        Ok(_) => Err(err(&req.id, "not_found", "student not found", None)),
        Err(e) => Err(access_err(req, e)),
    }
}
