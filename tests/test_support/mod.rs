#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_workspace(None)
}

pub fn spawn_sidecar_with_workspace(
    workspace: Option<&Path>,
) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_tutord");
    let mut cmd = Command::new(exe);
    match workspace {
        Some(p) => cmd.env("TUTORD_WORKSPACE", p),
        None => cmd.env_remove("TUTORD_WORKSPACE"),
    };
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tutord");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

pub fn created_id(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

pub fn create_user(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    role: &str,
    email: &str,
    group_id: Option<&str>,
) -> String {
    let mut params = json!({ "role": role, "name": format!("{} {}", role, email), "email": email });
    if let Some(g) = group_id {
        params["groupId"] = json!(g);
    }
    let created = request_ok(stdin, reader, id, "users.create", params);
    created_id(&created, "userId")
}

/// Looks up a seeded test by its code, as seen by `student_id`.
pub fn test_id_by_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
    code: &str,
) -> String {
    let listed = request_ok(stdin, reader, id, "tests.list", json!({ "actorId": student_id }));
    let test = listed["tests"]
        .as_array()
        .and_then(|a| a.iter().find(|t| t["code"] == code))
        .unwrap_or_else(|| panic!("test {} not listed", code));
    created_id(test, "id")
}

/// Starts (or resumes) a session, reads every page and submits `value` for every question.
/// Returns the `tests.submit` result.
pub fn answer_all(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id_prefix: &str,
    student_id: &str,
    test_id: &str,
    value: f64,
) -> serde_json::Value {
    let started = request_ok(
        stdin,
        reader,
        &format!("{}-start", id_prefix),
        "tests.start",
        json!({ "actorId": student_id, "testId": test_id }),
    );
    let session_id = created_id(&started, "sessionId");
    let total_pages = started["totalPages"].as_i64().expect("totalPages");

    let mut answers = Vec::new();
    for page in 1..=total_pages {
        let shown = request_ok(
            stdin,
            reader,
            &format!("{}-show-{}", id_prefix, page),
            "tests.show",
            json!({
                "actorId": student_id,
                "testId": test_id,
                "sessionId": session_id,
                "page": page
            }),
        );
        for q in shown["questions"].as_array().expect("questions") {
            answers.push(json!({ "questionId": q["id"], "value": value }));
        }
    }

    request_ok(
        stdin,
        reader,
        &format!("{}-submit", id_prefix),
        "tests.submit",
        json!({
            "actorId": student_id,
            "testId": test_id,
            "sessionId": session_id,
            "answers": answers
        }),
    )
}
