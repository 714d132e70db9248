mod test_support;

use serde_json::json;
use test_support::{answer_all, create_user, request_ok, spawn_sidecar, test_id_by_code};

fn weight_sum(workspace: &std::path::Path, test_id: &str) -> f64 {
    let conn = rusqlite::Connection::open(workspace.join("tutoring.sqlite3")).expect("open db");
    conn.query_row(
        "SELECT SUM(weight) FROM questions WHERE test_id = ?",
        [test_id],
        |r| r.get(0),
    )
    .expect("weight sum")
}

fn result_rows(workspace: &std::path::Path, student_id: &str, test_id: &str) -> i64 {
    let conn = rusqlite::Connection::open(workspace.join("tutoring.sqlite3")).expect("open db");
    conn.query_row(
        "SELECT COUNT(*) FROM test_results WHERE student_id = ? AND test_id = ?",
        (student_id, test_id),
        |r| r.get(0),
    )
    .expect("result count")
}

#[test]
fn soft_skills_total_is_weighted_sum_of_answers() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let student = create_user(&mut stdin, &mut reader, "2", "student", "s1@uni.test", None);
    let test_id = test_id_by_code(&mut stdin, &mut reader, "3", &student, "soft_skills");

    let submitted = answer_all(&mut stdin, &mut reader, "4", &student, &test_id, 3.0);
    let weights = weight_sum(workspace.path(), &test_id);
    let total = submitted["total"].as_f64().expect("total");
    assert!((total - 3.0 * weights).abs() < 1e-9, "total {} weights {}", total, weights);
    assert_eq!(submitted["score"]["max"].as_f64(), Some(5.0 * weights));
    assert_eq!(submitted["percent"].as_f64(), Some(60.0));
    assert_eq!(submitted["level"], "Competent");

    let categories = submitted["score"]["categories"].as_array().expect("categories");
    assert_eq!(categories.len(), 5);
    for c in categories {
        assert_eq!(c["percent"].as_f64(), Some(60.0), "{}", c);
        assert_eq!(c["level"], "Competent");
    }
    let leadership = categories
        .iter()
        .find(|c| c["category"] == "leadership")
        .expect("leadership");
    // Two questions weighted 1 and one weighted 1.5.
    assert_eq!(leadership["total"].as_f64(), Some(10.5));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn resubmitting_overwrites_the_single_result() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let student = create_user(&mut stdin, &mut reader, "2", "student", "s2@uni.test", None);
    let test_id = test_id_by_code(&mut stdin, &mut reader, "3", &student, "soft_skills");

    let first = answer_all(&mut stdin, &mut reader, "4", &student, &test_id, 3.0);
    assert_eq!(first["level"], "Competent");
    assert_eq!(result_rows(workspace.path(), &student, &test_id), 1);

    let second = answer_all(&mut stdin, &mut reader, "5", &student, &test_id, 4.0);
    assert_eq!(second["level"], "Outstanding");
    assert_ne!(first["sessionId"], second["sessionId"]);
    assert_eq!(first["resultId"], second["resultId"]);
    assert_eq!(result_rows(workspace.path(), &student, &test_id), 1);

    let completed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "tests.completed",
        json!({ "actorId": student, "testId": test_id }),
    );
    assert_eq!(completed["level"], "Outstanding");
    assert_eq!(completed["submittedAt"], second["submittedAt"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn vak_reports_dominant_style_and_ties() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let student = create_user(&mut stdin, &mut reader, "2", "student", "s3@uni.test", None);
    let test_id = test_id_by_code(&mut stdin, &mut reader, "3", &student, "vak");

    let tied = answer_all(&mut stdin, &mut reader, "4", &student, &test_id, 2.0);
    assert_eq!(tied["level"], "Multimodal");
    assert_eq!(tied["score"]["dominant"].as_array().map(|a| a.len()), Some(3));

    drop(stdin);
    let _ = child.wait();
}
