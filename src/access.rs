use crate::scoring::TestKind;
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Tutor,
    Psychologist,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Psychologist => "psychologist",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "tutor" => Some(Role::Tutor),
            "psychologist" => Some(Role::Psychologist),
            _ => None,
        }
    }

    pub fn is_staff(self) -> bool {
        self != Role::Student
    }
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub group_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub fn load_user(conn: &Connection, user_id: &str) -> Result<Option<Actor>, AccessError> {
    let row: Option<(String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT id, role, name, group_id FROM users WHERE id = ?",
            [user_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    Ok(row.and_then(|(id, role, name, group_id)| {
        Role::parse(&role).map(|role| Actor {
            id,
            role,
            name,
            group_id,
        })
    }))
}

pub fn load_actor(conn: &Connection, actor_id: &str) -> Result<Actor, AccessError> {
    load_user(conn, actor_id)?.ok_or(AccessError::NotFound("actor"))
}

pub fn require_role(actor: &Actor, role: Role) -> Result<(), AccessError> {
    if actor.role == role {
        return Ok(());
    }
    Err(AccessError::Forbidden(format!(
        "{} access is not allowed for role {}",
        role.as_str(),
        actor.role.as_str()
    )))
}

/// Groups the staff member is assigned to in their own role, optionally for one semester.
pub fn staff_group_ids(
    conn: &Connection,
    actor: &Actor,
    semester: Option<&str>,
) -> Result<Vec<String>, AccessError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT tg.group_id
         FROM tutor_groups tg
         JOIN study_groups g ON g.id = tg.group_id
         WHERE tg.user_id = ? AND tg.role = ? AND (? IS NULL OR tg.semester = ?)
         ORDER BY g.semester, g.name",
    )?;
    let ids = stmt
        .query_map(
            (&actor.id, actor.role.as_str(), semester, semester),
            |r| r.get::<_, String>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn can_view_kind(actor: &Actor, kind: TestKind) -> Result<(), AccessError> {
    if actor.role == Role::Tutor && kind.is_confidential() {
        return Err(AccessError::Forbidden(format!(
            "{} results are restricted to psychologists",
            kind.as_str()
        )));
    }
    Ok(())
}

pub fn can_view_group(
    conn: &Connection,
    actor: &Actor,
    group_id: &str,
    kind: TestKind,
) -> Result<(), AccessError> {
    if !actor.role.is_staff() {
        return Err(AccessError::Forbidden(
            "group reports are for staff only".to_string(),
        ));
    }
    can_view_kind(actor, kind)?;
    if staff_group_ids(conn, actor, None)?
        .iter()
        .any(|g| g == group_id)
    {
        Ok(())
    } else {
        Err(AccessError::Forbidden(
            "group is not assigned to this user".to_string(),
        ))
    }
}

/// Students read their own results; staff read results of students in their groups.
pub fn can_view_student_result(
    conn: &Connection,
    actor: &Actor,
    student: &Actor,
    kind: TestKind,
) -> Result<(), AccessError> {
    if student.role != Role::Student {
        return Err(AccessError::NotFound("student"));
    }
    match actor.role {
        Role::Student => {
            if actor.id == student.id {
                Ok(())
            } else {
                Err(AccessError::Forbidden(
                    "students may only view their own results".to_string(),
                ))
            }
        }
        Role::Tutor | Role::Psychologist => {
            can_view_kind(actor, kind)?;
            let Some(group_id) = student.group_id.as_deref() else {
                return Err(AccessError::Forbidden(
                    "student has no group assigned".to_string(),
                ));
            };
            can_view_group(conn, actor, group_id, kind)
        }
    }
}
