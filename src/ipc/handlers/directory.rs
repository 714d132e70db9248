use crate::access::Role;
use crate::db;
use crate::ipc::error::{err, ok, validation_failed};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn group_exists(conn: &Connection, group_id: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM study_groups WHERE id = ?", [group_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn user_role(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| {
        r.get(0)
    })
    .optional()
}

fn user_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let role: String = row.get(1)?;
    let name: String = row.get(2)?;
    let email: String = row.get(3)?;
    let student_code: Option<String> = row.get(4)?;
    let group_id: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(json!({
        "id": id,
        "role": role,
        "name": name,
        "email": email,
        "studentCode": student_code,
        "groupId": group_id,
        "createdAt": created_at
    }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut fields = serde_json::Map::new();
    let role_raw = optional_str(req, "role");
    let role = role_raw.as_deref().and_then(Role::parse);
    if role.is_none() {
        fields.insert(
            "role".into(),
            json!("role must be one of: student, tutor, psychologist"),
        );
    }
    let name = optional_str(req, "name");
    if name.is_none() {
        fields.insert("name".into(), json!("name is required"));
    }
    let email = optional_str(req, "email").map(|e| e.to_ascii_lowercase());
    match email.as_deref() {
        None => {
            fields.insert("email".into(), json!("email is required"));
        }
        Some(e) if !e.contains('@') => {
            fields.insert("email".into(), json!("email is not valid"));
        }
        Some(e) => {
            let taken = conn
                .query_row("SELECT 1 FROM users WHERE email = ?", [e], |r| {
                    r.get::<_, i64>(0)
                })
                .optional();
            match taken {
                Ok(Some(_)) => {
                    fields.insert("email".into(), json!("email is already registered"));
                }
                Ok(None) => {}
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
    }
    let student_code = optional_str(req, "studentCode");
    let group_id = optional_str(req, "groupId");
    if let Some(gid) = group_id.as_deref() {
        if role.is_some() && role != Some(Role::Student) {
            fields.insert("groupId".into(), json!("only students belong to a group"));
        } else {
            match group_exists(conn, gid) {
                Ok(true) => {}
                Ok(false) => {
                    fields.insert("groupId".into(), json!("group not found"));
                }
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
    }
    if !fields.is_empty() {
        return validation_failed(&req.id, serde_json::Value::Object(fields));
    }
    let (Some(role), Some(name), Some(email)) = (role, name, email) else {
        return err(&req.id, "bad_params", "missing user fields", None);
    };

    let user_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, role, name, email, student_code, group_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            role.as_str(),
            &name,
            &email,
            &student_code,
            &group_id,
            db::now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    tracing::info!(user_id = %user_id, role = role.as_str(), "user created");
    ok(
        &req.id,
        json!({ "userId": user_id, "role": role.as_str(), "name": name, "email": email }),
    )
}

fn handle_users_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let user = conn
        .query_row(
            "SELECT id, role, name, email, student_code, group_id, created_at
             FROM users WHERE id = ?",
            [&user_id],
            |r| user_json(r),
        )
        .optional();
    match user {
        Ok(Some(u)) => ok(&req.id, json!({ "user": u })),
        Ok(None) => err(&req.id, "not_found", "user not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "users": [] }));
    };

    let role = match optional_str(req, "role") {
        None => None,
        Some(raw) => match Role::parse(&raw) {
            Some(r) => Some(r.as_str()),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "role must be one of: student, tutor, psychologist",
                    Some(json!({ "role": raw })),
                )
            }
        },
    };
    let group_id = optional_str(req, "groupId");

    let mut stmt = match conn.prepare(
        "SELECT id, role, name, email, student_code, group_id, created_at
         FROM users
         WHERE (?1 IS NULL OR role = ?1) AND (?2 IS NULL OR group_id = ?2)
         ORDER BY name, email",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((role, group_id.as_deref()), |r| user_json(r))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut fields = serde_json::Map::new();
    let name = optional_str(req, "name");
    if name.is_none() {
        fields.insert("name".into(), json!("name is required"));
    }
    let semester = optional_str(req, "semester");
    if semester.is_none() {
        fields.insert("semester".into(), json!("semester is required"));
    }
    let program = optional_str(req, "program");
    if let (Some(n), Some(s)) = (name.as_deref(), semester.as_deref()) {
        let dup = conn
            .query_row(
                "SELECT 1 FROM study_groups WHERE name = ? AND semester = ?",
                (n, s),
                |r| r.get::<_, i64>(0),
            )
            .optional();
        match dup {
            Ok(Some(_)) => {
                fields.insert(
                    "name".into(),
                    json!("a group with this name already exists for the semester"),
                );
            }
            Ok(None) => {}
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    if !fields.is_empty() {
        return validation_failed(&req.id, serde_json::Value::Object(fields));
    }
    let (Some(name), Some(semester)) = (name, semester) else {
        return err(&req.id, "bad_params", "missing group fields", None);
    };

    let group_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO study_groups(id, name, semester, program, created_at) VALUES(?, ?, ?, ?, ?)",
        (&group_id, &name, &semester, &program, db::now_rfc3339()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "groups" })),
        );
    }

    ok(
        &req.id,
        json!({ "groupId": group_id, "name": name, "semester": semester, "program": program }),
    )
}

fn handle_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "groups": [] }));
    };
    let semester = optional_str(req, "semester");

    let mut stmt = match conn.prepare(
        "SELECT
           g.id,
           g.name,
           g.semester,
           g.program,
           (SELECT COUNT(*) FROM users u WHERE u.group_id = g.id AND u.role = 'student') AS student_count,
           (SELECT COUNT(*) FROM tutor_groups tg WHERE tg.group_id = g.id) AS staff_count
         FROM study_groups g
         WHERE (?1 IS NULL OR g.semester = ?1)
         ORDER BY g.semester, g.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([semester.as_deref()], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let semester: String = row.get(2)?;
            let program: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let staff_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "semester": semester,
                "program": program,
                "studentCount": student_count,
                "staffCount": staff_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(groups) => ok(&req.id, json!({ "groups": groups })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_groups_add_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match group_exists(conn, &group_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "group not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match user_role(conn, &student_id) {
        Ok(Some(role)) if role == Role::Student.as_str() => {}
        Ok(Some(_)) => {
            return validation_failed(
                &req.id,
                json!({ "studentId": "only students belong to a group" }),
            )
        }
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if let Err(e) = conn.execute(
        "UPDATE users SET group_id = ? WHERE id = ?",
        (&group_id, &student_id),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }
    ok(&req.id, json!({ "groupId": group_id, "studentId": student_id }))
}

fn handle_tutor_groups_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let staff_role = match user_role(conn, &user_id) {
        Ok(Some(r)) => Role::parse(&r),
        Ok(None) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(staff_role) = staff_role.filter(|r| r.is_staff()) else {
        return validation_failed(
            &req.id,
            json!({ "userId": "only tutors and psychologists can be assigned to a group" }),
        );
    };
    let role = match optional_str(req, "role") {
        None => staff_role,
        Some(raw) => match Role::parse(&raw) {
            Some(r) if r == staff_role => r,
            _ => {
                let message = format!("role must match the user's role ({})", staff_role.as_str());
                return validation_failed(&req.id, json!({ "role": message }));
            }
        },
    };

    let group_semester: Option<String> = match conn
        .query_row("SELECT semester FROM study_groups WHERE id = ?", [&group_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(group_semester) = group_semester else {
        return err(&req.id, "not_found", "group not found", None);
    };
    let semester = optional_str(req, "semester").unwrap_or(group_semester);

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM tutor_groups WHERE user_id = ? AND group_id = ? AND semester = ?",
            (&user_id, &group_id, &semester),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(assignment_id) = existing {
        return ok(
            &req.id,
            json!({ "assignmentId": assignment_id, "created": false }),
        );
    }

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO tutor_groups(id, user_id, group_id, semester, role) VALUES(?, ?, ?, ?, ?)",
        (&assignment_id, &user_id, &group_id, &semester, role.as_str()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "tutor_groups" })),
        );
    }
    ok(
        &req.id,
        json!({ "assignmentId": assignment_id, "created": true, "semester": semester }),
    )
}

fn handle_tutor_groups_unassign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM tutor_groups WHERE id = ?", [&assignment_id]) {
        Ok(0) => err(&req.id, "not_found", "assignment not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "tutor_groups" })),
        ),
    }
}

fn handle_tutor_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "assignments": [] }));
    };
    let user_id = optional_str(req, "userId");
    let group_id = optional_str(req, "groupId");

    let mut stmt = match conn.prepare(
        "SELECT tg.id, tg.user_id, u.name, tg.group_id, g.name, tg.semester, tg.role
         FROM tutor_groups tg
         JOIN users u ON u.id = tg.user_id
         JOIN study_groups g ON g.id = tg.group_id
         WHERE (?1 IS NULL OR tg.user_id = ?1) AND (?2 IS NULL OR tg.group_id = ?2)
         ORDER BY tg.semester, g.name, u.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((user_id.as_deref(), group_id.as_deref()), |row| {
            let id: String = row.get(0)?;
            let user_id: String = row.get(1)?;
            let user_name: String = row.get(2)?;
            let group_id: String = row.get(3)?;
            let group_name: String = row.get(4)?;
            let semester: String = row.get(5)?;
            let role: String = row.get(6)?;
            Ok(json!({
                "id": id,
                "userId": user_id,
                "userName": user_name,
                "groupId": group_id,
                "groupName": group_name,
                "semester": semester,
                "role": role
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(handle_users_create(state, req)),
        "users.get" => Some(handle_users_get(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.list" => Some(handle_groups_list(state, req)),
        "groups.addStudent" => Some(handle_groups_add_student(state, req)),
        "tutorGroups.assign" => Some(handle_tutor_groups_assign(state, req)),
        "tutorGroups.unassign" => Some(handle_tutor_groups_unassign(state, req)),
        "tutorGroups.list" => Some(handle_tutor_groups_list(state, req)),
        _ => None,
    }
}
