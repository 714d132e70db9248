mod test_support;

use serde_json::json;
use test_support::{
    answer_all, create_user, created_id, error_code, request, request_ok, spawn_sidecar,
    test_id_by_code,
};

#[test]
fn group_summary_and_student_report_models() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "settings.set",
        json!({ "key": "reports.institutionName", "value": "Universidad Tecnica" }),
    );
    let group = created_id(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "groups.create",
            json!({
                "name": "Industrial 3",
                "semester": "2026-2",
                "program": "Industrial Engineering"
            }),
        ),
        "groupId",
    );
    let s1 = create_user(&mut stdin, &mut reader, "4", "student", "one@uni.test", Some(&group));
    let s2 = create_user(&mut stdin, &mut reader, "5", "student", "two@uni.test", Some(&group));
    let _s3 = create_user(&mut stdin, &mut reader, "6", "student", "three@uni.test", Some(&group));
    let tutor = create_user(&mut stdin, &mut reader, "7", "tutor", "tutor@uni.test", None);
    let psych = create_user(&mut stdin, &mut reader, "8", "psychologist", "psy@uni.test", None);
    for (i, staff) in [&tutor, &psych].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("9-{}", i),
            "tutorGroups.assign",
            json!({ "userId": staff, "groupId": group }),
        );
    }

    let soft = test_id_by_code(&mut stdin, &mut reader, "10", &s1, "soft_skills");
    let screening = test_id_by_code(&mut stdin, &mut reader, "11", &s1, "psychological_assistance");
    answer_all(&mut stdin, &mut reader, "12", &s1, &soft, 3.0);
    answer_all(&mut stdin, &mut reader, "13", &s2, &soft, 4.0);
    answer_all(&mut stdin, &mut reader, "14", &s1, &screening, 1.0);

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "reports.groupSummary",
        json!({ "actorId": tutor, "groupId": group, "testId": soft }),
    );
    assert_eq!(summary["institution"], "Universidad Tecnica");
    assert_eq!(summary["group"]["program"], "Industrial Engineering");
    assert_eq!(summary["studentCount"], 3);
    assert_eq!(summary["completedCount"], 2);
    assert_eq!(summary["chart"]["type"], "radar");
    assert_eq!(
        summary["distribution"],
        json!([
            { "level": "Needs development", "count": 0 },
            { "level": "Developing", "count": 0 },
            { "level": "Competent", "count": 1 },
            { "level": "Outstanding", "count": 1 }
        ])
    );
    let averages = summary["categoryAverages"].as_array().expect("averages");
    assert_eq!(averages.len(), 5);
    for a in averages {
        assert_eq!(a["averagePercent"].as_f64(), Some(70.0), "{}", a);
    }
    let pending: Vec<_> = summary["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter(|s| s["level"].is_null())
        .collect();
    assert_eq!(pending.len(), 1);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "reports.studentResult",
        json!({ "actorId": s2, "studentId": s2, "testId": soft }),
    );
    assert_eq!(report["test"]["code"], "soft_skills");
    assert_eq!(report["group"]["name"], "Industrial 3");
    assert_eq!(report["result"]["level"], "Outstanding");
    assert_eq!(report["chart"]["type"], "radar");
    let series = report["chart"]["series"].as_array().expect("series");
    assert_eq!(series.len(), 5);
    assert!(series.iter().all(|s| s["percent"].as_f64() == Some(80.0)));
    assert!(report["generatedAt"].is_string());

    // Screening reports stay with the psychologist.
    let r = request(
        &mut stdin,
        &mut reader,
        "17",
        "reports.groupSummary",
        json!({ "actorId": tutor, "groupId": group, "testId": screening }),
    );
    assert_eq!(error_code(&r), "forbidden");
    let r = request(
        &mut stdin,
        &mut reader,
        "18",
        "reports.groupSummary",
        json!({ "actorId": s1, "groupId": group, "testId": soft }),
    );
    assert_eq!(error_code(&r), "forbidden");

    let screening_summary = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "reports.groupSummary",
        json!({ "actorId": psych, "groupId": group, "testId": screening }),
    );
    assert_eq!(screening_summary["chart"]["type"], "bar");
    assert_eq!(screening_summary["completedCount"], 1);
    assert_eq!(
        screening_summary["distribution"][0],
        json!({ "level": "No intervention", "count": 1 })
    );

    let no_result = request(
        &mut stdin,
        &mut reader,
        "20",
        "reports.studentResult",
        json!({ "actorId": psych, "studentId": s2, "testId": screening }),
    );
    assert_eq!(error_code(&no_result), "not_found");

    drop(stdin);
    let _ = child.wait();
}
