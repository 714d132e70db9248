use crate::access;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::INSTITUTION_KEY;
use crate::ipc::helpers::{
    access_err, actor, db_conn, required_str, store_err, student_by_id, test_by_id,
};
use crate::ipc::types::{AppState, Request};
use crate::scoring::TestKind;
use crate::store::{self, TestRow};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn chart_type(kind: TestKind) -> &'static str {
    match kind {
        TestKind::Vak => "pie",
        TestKind::EmotionalIntelligence | TestKind::SoftSkills => "radar",
        TestKind::PsychologicalAssistance => "bar",
    }
}

fn institution_name(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    match db::settings_get_json(conn, INSTITUTION_KEY) {
        Ok(v) => Ok(v.unwrap_or(serde_json::Value::Null)),
        Err(e) => Err(err(
            &req.id,
            "db_query_failed",
            e.to_string(),
            Some(json!({ "table": "settings", "key": INSTITUTION_KEY })),
        )),
    }
}

fn test_header(test: &TestRow) -> serde_json::Value {
    json!({
        "id": test.id,
        "code": test.code,
        "name": test.name,
        "description": test.description,
        "kind": test.kind.as_str(),
    })
}

fn handle_reports_student_result(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let result = match store::load_result(conn, &student.id, &test.id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "no result for this test", None),
        Err(e) => return store_err(req, e),
    };
    let group = match student.group_id.as_deref() {
        None => None,
        Some(gid) => match store::load_group(conn, gid) {
            Ok(g) => g,
            Err(e) => return store_err(req, e),
        },
    };

    let institution = match institution_name(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let series: Vec<serde_json::Value> = result
        .score
        .categories
        .iter()
        .map(|c| {
            json!({
                "category": c.category,
                "label": c.label,
                "total": c.total,
                "max": c.max,
                "percent": c.percent,
                "level": c.level,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "institution": institution,
            "student": { "id": student.id, "name": student.name },
            "group": group.map(|g| json!({ "id": g.id, "name": g.name, "semester": g.semester })),
            "test": test_header(&test),
            "result": {
                "id": result.id,
                "level": result.level,
                "total": result.score.total,
                "max": result.score.max,
                "percent": result.score.percent,
                "dominant": result.score.dominant,
                "needsAttention": result.score.needs_attention,
                "submittedAt": result.submitted_at,
            },
            "chart": { "type": chart_type(test.kind), "series": series },
            "generatedAt": db::now_rfc3339(),
        }),
    )
}

fn handle_reports_group_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = match actor(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_id = match required_str(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test = match test_by_id(conn, req, &test_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group = match store::load_group(conn, &group_id) {
        Ok(Some(g)) => g,
        Ok(None) => return err(&req.id, "not_found", "group not found", None),
        Err(e) => return store_err(req, e),
    };
    if let Err(e) = access::can_view_group(conn, &actor, &group.id, test.kind) {
        return access_err(req, e);
    }
    let institution = match institution_name(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let students = match store::group_students(conn, &group.id) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };

    let profile = test.kind.profile();
    let levels = profile.levels();
    let mut distribution: HashMap<String, i64> = levels.iter().map(|l| (l.clone(), 0)).collect();
    let mut category_sums: Vec<f64> = vec![0.0; profile.categories.len()];
    let mut completed = 0usize;
    let mut rows = Vec::with_capacity(students.len());

    for s in &students {
        let r = match store::load_result(conn, &s.id, &test.id) {
            Ok(v) => v,
            Err(e) => return store_err(req, e),
        };
        if let Some(r) = &r {
            completed += 1;
            *distribution.entry(r.level.clone()).or_insert(0) += 1;
            for (i, def) in profile.categories.iter().enumerate() {
                if let Some(c) = r.score.categories.iter().find(|c| c.category == def.code) {
                    category_sums[i] += c.percent;
                }
            }
        }
        rows.push(json!({
            "studentId": s.id,
            "name": s.name,
            "studentCode": s.student_code,
            "level": r.as_ref().map(|r| r.level.clone()),
            "percent": r.as_ref().map(|r| r.score.percent),
            "needsAttention": r.as_ref().map(|r| r.score.needs_attention),
            "submittedAt": r.as_ref().map(|r| r.submitted_at.clone()),
        }));
    }

    let distribution: Vec<serde_json::Value> = levels
        .iter()
        .map(|l| json!({ "level": l, "count": distribution.get(l).copied().unwrap_or(0) }))
        .collect();
    let category_averages: Vec<serde_json::Value> = profile
        .categories
        .iter()
        .zip(category_sums.iter())
        .map(|(def, sum)| {
            let avg = if completed > 0 {
                crate::scoring::round_off_1_decimal(sum / completed as f64)
            } else {
                0.0
            };
            json!({ "category": def.code, "label": def.label, "averagePercent": avg })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "institution": institution,
            "group": {
                "id": group.id,
                "name": group.name,
                "semester": group.semester,
                "program": group.program,
            },
            "test": test_header(&test),
            "studentCount": students.len(),
            "completedCount": completed,
            "distribution": distribution,
            "categoryAverages": category_averages,
            "students": rows,
            "chart": { "type": chart_type(test.kind) },
            "generatedAt": db::now_rfc3339(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentResult" => Some(handle_reports_student_result(state, req)),
        "reports.groupSummary" => Some(handle_reports_group_summary(state, req)),
        _ => None,
    }
}
