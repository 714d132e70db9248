use crate::access::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    access_err, actor, actor_with_role, db_conn, optional_str, required_str, store_err,
    student_by_id, test_by_id,
};
use crate::ipc::types::{AppState, Request};
use crate::scoring::TestKind;
use crate::store::{self, GroupRow, StoredResult};
use serde_json::json;
use std::cmp::Ordering;

fn result_summary(r: &StoredResult) -> serde_json::Value {
    json!({
        "resultId": r.id,
        "level": r.level,
        "total": r.total,
        "percent": r.score.percent,
        "needsAttention": r.score.needs_attention,
        "submittedAt": r.submitted_at,
    })
}

fn group_json(g: &GroupRow) -> serde_json::Value {
    json!({
        "id": g.id,
        "name": g.name,
        "semester": g.semester,
        "program": g.program,
    })
}

fn handle_dashboard_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = match actor_with_role(conn, req, Role::Student) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group = match actor.group_id.as_deref() {
        None => None,
        Some(gid) => match store::load_group(conn, gid) {
            Ok(g) => g,
            Err(e) => return store_err(req, e),
        },
    };
    let tests = match store::list_tests(conn, true) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };

    let mut rows = Vec::with_capacity(tests.len());
    let mut completed = 0;
    for test in &tests {
        let (status, _, result) = match store::test_status(conn, &actor.id, &test.id) {
            Ok(v) => v,
            Err(e) => return store_err(req, e),
        };
        if result.is_some() {
            completed += 1;
        }
        rows.push(json!({
            "testId": test.id,
            "code": test.code,
            "name": test.name,
            "status": status,
            "result": result.as_ref().map(result_summary),
        }));
    }

    ok(
        &req.id,
        json!({
            "student": { "id": actor.id, "name": actor.name },
            "group": group.as_ref().map(group_json),
            "completedCount": completed,
            "testCount": tests.len(),
            "tests": rows,
        }),
    )
}

fn handle_dashboard_tutor(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = match actor_with_role(conn, req, Role::Tutor) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = optional_str(req, "semester");
    let group_ids = match access::staff_group_ids(conn, &actor, semester.as_deref()) {
        Ok(v) => v,
        Err(e) => return access_err(req, e),
    };
    let tests: Vec<_> = match store::list_tests(conn, true) {
        Ok(v) => v
            .into_iter()
            .filter(|t| access::can_view_kind(&actor, t.kind).is_ok())
            .collect(),
        Err(e) => return store_err(req, e),
    };

    let mut groups = Vec::with_capacity(group_ids.len());
    for gid in &group_ids {
        let group = match store::load_group(conn, gid) {
            Ok(Some(g)) => g,
            Ok(None) => continue,
            Err(e) => return store_err(req, e),
        };
        let students = match store::group_students(conn, gid) {
            Ok(v) => v,
            Err(e) => return store_err(req, e),
        };

        let mut completion = serde_json::Map::new();
        for t in &tests {
            completion.insert(t.code.clone(), json!(0));
        }
        let mut student_rows = Vec::with_capacity(students.len());
        for s in &students {
            let mut results = serde_json::Map::new();
            for t in &tests {
                let r = match store::load_result(conn, &s.id, &t.id) {
                    Ok(v) => v,
                    Err(e) => return store_err(req, e),
                };
                if r.is_some() {
                    let n = completion.get(&t.code).and_then(|v| v.as_i64()).unwrap_or(0);
                    completion.insert(t.code.clone(), json!(n + 1));
                }
                results.insert(t.code.clone(), json!(r.as_ref().map(result_summary)));
            }
            student_rows.push(json!({
                "id": s.id,
                "name": s.name,
                "email": s.email,
                "studentCode": s.student_code,
                "results": results,
            }));
        }

        let mut g = group_json(&group);
        g["studentCount"] = json!(students.len());
        g["completion"] = serde_json::Value::Object(completion);
        g["students"] = json!(student_rows);
        groups.push(g);
    }

    ok(
        &req.id,
        json!({
            "tutor": { "id": actor.id, "name": actor.name },
            "semester": semester,
            "tests": tests
                .iter()
                .map(|t| json!({ "id": t.id, "code": t.code, "name": t.name }))
                .collect::<Vec<_>>(),
            "groups": groups,
        }),
    )
}

fn handle_dashboard_psychologist(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = match actor_with_role(conn, req, Role::Psychologist) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = optional_str(req, "semester");
    let group_ids = match access::staff_group_ids(conn, &actor, semester.as_deref()) {
        Ok(v) => v,
        Err(e) => return access_err(req, e),
    };
    let screening = match store::list_tests(conn, false) {
        Ok(v) => v
            .into_iter()
            .find(|t| t.kind == TestKind::PsychologicalAssistance),
        Err(e) => return store_err(req, e),
    };
    let Some(screening) = screening else {
        return err(&req.id, "not_found", "screening test not found", None);
    };

    let mut rows: Vec<(bool, f64, serde_json::Value)> = Vec::new();
    let mut pending = Vec::new();
    let mut groups = Vec::with_capacity(group_ids.len());
    for gid in &group_ids {
        let group = match store::load_group(conn, gid) {
            Ok(Some(g)) => g,
            Ok(None) => continue,
            Err(e) => return store_err(req, e),
        };
        let students = match store::group_students(conn, gid) {
            Ok(v) => v,
            Err(e) => return store_err(req, e),
        };
        for s in &students {
            let r = match store::load_result(conn, &s.id, &screening.id) {
                Ok(v) => v,
                Err(e) => return store_err(req, e),
            };
            match r {
                Some(r) => rows.push((
                    r.score.needs_attention,
                    r.score.percent,
                    json!({
                        "studentId": s.id,
                        "name": s.name,
                        "email": s.email,
                        "groupId": group.id,
                        "groupName": group.name,
                        "level": r.level,
                        "percent": r.score.percent,
                        "needsAttention": r.score.needs_attention,
                        "categories": r.score.categories,
                        "submittedAt": r.submitted_at,
                    }),
                )),
                None => pending.push(json!({
                    "studentId": s.id,
                    "name": s.name,
                    "groupId": group.id,
                    "groupName": group.name,
                })),
            }
        }
        groups.push(group_json(&group));
    }

    // Flagged first, most severe first.
    rows.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
    });
    let attention_count = rows.iter().filter(|r| r.0).count();

    ok(
        &req.id,
        json!({
            "psychologist": { "id": actor.id, "name": actor.name },
            "semester": semester,
            "testId": screening.id,
            "groups": groups,
            "attentionCount": attention_count,
            "results": rows.into_iter().map(|r| r.2).collect::<Vec<_>>(),
            "pending": pending,
        }),
    )
}

fn handle_results_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = match actor(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_id = match required_str(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match student_by_id(conn, req, &student_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test = match test_by_id(conn, req, &test_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = access::can_view_student_result(conn, &actor, &student, test.kind) {
        return access_err(req, e);
    }

    match store::load_result(conn, &student.id, &test.id) {
        Ok(Some(r)) => ok(
            &req.id,
            json!({
                "resultId": r.id,
                "studentId": student.id,
                "testId": test.id,
                "testCode": test.code,
                "sessionId": r.session_id,
                "level": r.level,
                "total": r.total,
                "submittedAt": r.submitted_at,
                "score": r.score,
            }),
        ),
        Ok(None) => err(&req.id, "not_found", "no result for this test", None),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.student" => Some(handle_dashboard_student(state, req)),
        "dashboard.tutor" => Some(handle_dashboard_tutor(state, req)),
        "dashboard.psychologist" => Some(handle_dashboard_psychologist(state, req)),
        "results.get" => Some(handle_results_get(state, req)),
        _ => None,
    }
}
