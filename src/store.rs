use crate::catalog::{self, AnswerOption};
use crate::db;
use crate::scoring::{TestKind, TestScore};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

pub const PAGE_SIZE_KEY: &str = "tests.pageSize";
pub const MAX_PAGE_SIZE: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct TestRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub kind: TestKind,
    pub questions_per_page: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct QuestionRow {
    pub id: String,
    pub idx: i64,
    pub text: String,
    pub options: Vec<AnswerOption>,
    pub category: String,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub student_id: String,
    pub test_id: String,
    pub started_at: String,
    pub submitted_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredResult {
    pub id: String,
    pub session_id: String,
    pub score: TestScore,
    pub level: String,
    pub total: f64,
    pub submitted_at: String,
}

type TestTuple = (String, String, String, String, String, i64, i64);

fn test_from_row(
    (id, code, name, description, kind, questions_per_page, active): TestTuple,
) -> Result<TestRow, StoreError> {
    let Some(kind) = TestKind::parse(&kind) else {
        return Err(StoreError::Corrupt {
            table: "tests",
            message: format!("unknown kind {}", kind),
        });
    };
    Ok(TestRow {
        id,
        code,
        name,
        description,
        kind,
        questions_per_page,
        active: active != 0,
    })
}

pub fn load_test(conn: &Connection, test_id: &str) -> Result<Option<TestRow>, StoreError> {
    let row: Option<TestTuple> = conn
        .query_row(
            "SELECT id, code, name, description, kind, questions_per_page, active
             FROM tests WHERE id = ?",
            [test_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()?;
    row.map(test_from_row).transpose()
}

pub fn list_tests(conn: &Connection, active_only: bool) -> Result<Vec<TestRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, description, kind, questions_per_page, active
         FROM tests
         WHERE (? = 0 OR active = 1)
         ORDER BY rowid",
    )?;
    let rows: Vec<TestTuple> = stmt
        .query_map([active_only as i64], |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
                r.get(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(test_from_row).collect()
}

pub fn load_questions(conn: &Connection, test_id: &str) -> Result<Vec<QuestionRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, idx, text, options_json, category, weight
         FROM questions
         WHERE test_id = ?
         ORDER BY idx",
    )?;
    let rows = stmt
        .query_map([test_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, f64>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, idx, text, options_json, category, weight)| {
            let options =
                catalog::parse_options(&options_json).map_err(|e| StoreError::Corrupt {
                    table: "questions",
                    message: format!("options of {}: {}", id, e),
                })?;
            Ok(QuestionRow {
                id,
                idx,
                text,
                options,
                category,
                weight,
            })
        })
        .collect()
}

/// Questions per page for `test`; the workspace setting wins over the test row.
pub fn page_size(conn: &Connection, test: &TestRow) -> Result<i64, StoreError> {
    let configured = db::settings_get_json(conn, PAGE_SIZE_KEY)
        .map_err(|e| StoreError::Corrupt {
            table: "settings",
            message: format!("{}: {}", PAGE_SIZE_KEY, e),
        })?
        .and_then(|v| v.as_i64())
        .filter(|n| (1..=MAX_PAGE_SIZE).contains(n));
    Ok(configured.unwrap_or(test.questions_per_page).max(1))
}

pub fn page_count(question_count: usize, page_size: i64) -> i64 {
    let n = question_count as i64;
    if n == 0 {
        return 0;
    }
    (n + page_size - 1) / page_size
}

pub fn load_session(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, test_id, started_at, submitted_at
             FROM test_sessions WHERE id = ?",
            [session_id],
            |r| {
                Ok(SessionRow {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    test_id: r.get(2)?,
                    started_at: r.get(3)?,
                    submitted_at: r.get(4)?,
                })
            },
        )
        .optional()?)
}

pub fn open_session_for(
    conn: &Connection,
    student_id: &str,
    test_id: &str,
) -> Result<Option<SessionRow>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, test_id, started_at, submitted_at
             FROM test_sessions
             WHERE student_id = ? AND test_id = ? AND submitted_at IS NULL
             ORDER BY started_at DESC
             LIMIT 1",
            (student_id, test_id),
            |r| {
                Ok(SessionRow {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    test_id: r.get(2)?,
                    started_at: r.get(3)?,
                    submitted_at: r.get(4)?,
                })
            },
        )
        .optional()?)
}

/// question_id -> value for one answering session.
pub fn session_answers(
    conn: &Connection,
    student_id: &str,
    test_id: &str,
    session_id: &str,
) -> Result<HashMap<String, f64>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT question_id, value
         FROM student_answers
         WHERE student_id = ? AND test_id = ? AND session_id = ?",
    )?;
    let rows = stmt
        .query_map((student_id, test_id, session_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn upsert_answer(
    conn: &Connection,
    student_id: &str,
    test_id: &str,
    question_id: &str,
    session_id: &str,
    value: f64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO student_answers(student_id, test_id, question_id, session_id, value, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, test_id, question_id, session_id)
         DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        (
            student_id,
            test_id,
            question_id,
            session_id,
            value,
            db::now_rfc3339(),
        ),
    )?;
    Ok(())
}

/// Where a student stands on a test: `in_progress` while a session is open,
/// otherwise `completed` once a result exists, else `not_started`.
pub fn test_status(
    conn: &Connection,
    student_id: &str,
    test_id: &str,
) -> Result<(&'static str, Option<SessionRow>, Option<StoredResult>), StoreError> {
    let open = open_session_for(conn, student_id, test_id)?;
    let result = load_result(conn, student_id, test_id)?;
    let status = if open.is_some() {
        "in_progress"
    } else if result.is_some() {
        "completed"
    } else {
        "not_started"
    };
    Ok((status, open, result))
}

pub fn load_result(
    conn: &Connection,
    student_id: &str,
    test_id: &str,
) -> Result<Option<StoredResult>, StoreError> {
    let row: Option<(String, String, String, String, f64, String)> = conn
        .query_row(
            "SELECT id, session_id, scores_json, level, total, submitted_at
             FROM test_results
             WHERE student_id = ? AND test_id = ?",
            (student_id, test_id),
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()?;
    let Some((id, session_id, scores_json, level, total, submitted_at)) = row else {
        return Ok(None);
    };
    let score: TestScore =
        serde_json::from_str(&scores_json).map_err(|e| StoreError::Corrupt {
            table: "test_results",
            message: e.to_string(),
        })?;
    Ok(Some(StoredResult {
        id,
        session_id,
        score,
        level,
        total,
        submitted_at,
    }))
}

/// One row per (student, test): a later submission replaces the earlier one.
pub fn upsert_result(
    conn: &Connection,
    student_id: &str,
    test_id: &str,
    session_id: &str,
    score: &TestScore,
    submitted_at: &str,
) -> Result<String, StoreError> {
    let scores_json = serde_json::to_string(score).map_err(|e| StoreError::Corrupt {
        table: "test_results",
        message: e.to_string(),
    })?;
    let new_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO test_results(id, student_id, test_id, session_id, scores_json, level, total, submitted_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, test_id) DO UPDATE SET
           session_id = excluded.session_id,
           scores_json = excluded.scores_json,
           level = excluded.level,
           total = excluded.total,
           submitted_at = excluded.submitted_at",
        (
            &new_id,
            student_id,
            test_id,
            session_id,
            &scores_json,
            &score.level,
            score.total,
            submitted_at,
        ),
    )?;
    let id: String = conn.query_row(
        "SELECT id FROM test_results WHERE student_id = ? AND test_id = ?",
        (student_id, test_id),
        |r| r.get(0),
    )?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub semester: String,
    pub program: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub student_code: Option<String>,
}

pub fn load_group(conn: &Connection, group_id: &str) -> Result<Option<GroupRow>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, semester, program FROM study_groups WHERE id = ?",
            [group_id],
            |r| {
                Ok(GroupRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    semester: r.get(2)?,
                    program: r.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn group_students(conn: &Connection, group_id: &str) -> Result<Vec<StudentRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, student_code
         FROM users
         WHERE group_id = ? AND role = 'student'
         ORDER BY name, email",
    )?;
    let rows = stmt
        .query_map([group_id], |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                student_code: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
