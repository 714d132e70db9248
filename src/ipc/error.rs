use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Authorization failure; carries the HTTP status the host should surface.
pub fn forbidden(id: &str, message: impl Into<String>) -> serde_json::Value {
    err(id, "forbidden", message, Some(json!({ "status": 403 })))
}

/// Field-level validation messages, keyed by the offending field.
pub fn validation_failed(id: &str, fields: serde_json::Value) -> serde_json::Value {
    err(
        id,
        "validation_failed",
        "validation failed",
        Some(json!({ "fields": fields })),
    )
}
