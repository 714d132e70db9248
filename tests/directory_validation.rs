mod test_support;

use serde_json::json;
use test_support::{create_user, created_id, error_code, request, request_ok, spawn_sidecar};

#[test]
fn users_groups_and_assignments_validate_fields() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let group = created_id(
        &request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "groups.create",
            json!({ "name": "Civil 1", "semester": "2026-2" }),
        ),
        "groupId",
    );
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "groups.create",
        json!({ "name": "Civil 1", "semester": "2026-2" }),
    );
    assert_eq!(error_code(&dup), "validation_failed");

    let bad = request(
        &mut stdin,
        &mut reader,
        "4",
        "users.create",
        json!({ "role": "admin", "email": "nope" }),
    );
    assert_eq!(error_code(&bad), "validation_failed");
    let fields = &bad["error"]["details"]["fields"];
    assert!(fields["role"].is_string());
    assert!(fields["name"].is_string());
    assert!(fields["email"].is_string());

    let student = create_user(
        &mut stdin,
        &mut reader,
        "5",
        "student",
        "Mia@Uni.test",
        Some(&group),
    );
    let taken = request(
        &mut stdin,
        &mut reader,
        "6",
        "users.create",
        json!({ "role": "student", "name": "Mia Again", "email": "mia@uni.test" }),
    );
    assert_eq!(error_code(&taken), "validation_failed");
    assert!(taken["error"]["details"]["fields"]["email"].is_string());

    let tutor = create_user(&mut stdin, &mut reader, "7", "tutor", "tut@uni.test", None);
    let grouped_tutor = request(
        &mut stdin,
        &mut reader,
        "8",
        "users.create",
        json!({ "role": "tutor", "name": "T2", "email": "t2@uni.test", "groupId": group }),
    );
    assert!(grouped_tutor["error"]["details"]["fields"]["groupId"].is_string());

    let not_staff = request(
        &mut stdin,
        &mut reader,
        "9",
        "tutorGroups.assign",
        json!({ "userId": student, "groupId": group }),
    );
    assert_eq!(error_code(&not_staff), "validation_failed");
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "tutorGroups.assign",
        json!({ "userId": tutor, "groupId": group }),
    );
    assert_eq!(first["created"], true);
    assert_eq!(first["semester"], "2026-2");
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "tutorGroups.assign",
        json!({ "userId": tutor, "groupId": group }),
    );
    assert_eq!(again["created"], false);
    assert_eq!(again["assignmentId"], first["assignmentId"]);

    let groups = request_ok(&mut stdin, &mut reader, "12", "groups.list", json!({}));
    assert_eq!(groups["groups"][0]["studentCount"], 1);
    assert_eq!(groups["groups"][0]["staffCount"], 1);

    let students = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "users.list",
        json!({ "role": "student", "groupId": group }),
    );
    assert_eq!(students["users"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(students["users"][0]["email"], "mia@uni.test");

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "tutorGroups.unassign",
        json!({ "assignmentId": first["assignmentId"] }),
    );
    assert_eq!(removed["ok"], true);
    let gone = request(
        &mut stdin,
        &mut reader,
        "15",
        "tutorGroups.unassign",
        json!({ "assignmentId": first["assignmentId"] }),
    );
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
}
