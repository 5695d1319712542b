//! Integration tests for the attendance escalation API
//!
//! Every test runs against a fresh in-memory store.

use std::sync::Arc;
use std::time::Duration;

use attendance_escalation::engine::Engine;
use attendance_escalation::store::MemoryStore;
use attendance_escalation::{create_router, AppState};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

fn create_test_server() -> TestServer {
    let engine = Engine::new(Arc::new(MemoryStore::new()), Duration::from_millis(200));
    let router = create_router(AppState::new(engine));
    TestServer::new(router).unwrap()
}

/// Registers and approves a student, returning its id.
async fn enroll(server: &TestServer, name: &str) -> String {
    let email = format!("{}@example.edu", name.to_lowercase().replace(' ', "."));
    let response = server
        .post("/api/students")
        .json(&json!({
            "fullName": name,
            "email": email,
            "department": "Computer Technology",
            "semester": "4th"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], "pending");
    let id = body["id"].as_str().unwrap().to_string();

    server
        .put(&format!("/api/students/{id}/registration"))
        .json(&json!({ "status": "active" }))
        .await
        .assert_status_ok();
    id
}

async fn every_day_is_a_working_day(server: &TestServer) {
    server
        .put("/api/institute-settings/weekend_days")
        .json(&json!({ "setting_value": [] }))
        .await
        .assert_status_ok();
}

async fn mark(server: &TestServer, student_id: &str, date: &str, status: &str) -> Value {
    let response = server
        .post("/api/daily-attendance/mark")
        .json(&json!({ "studentId": student_id, "date": date, "status": status }))
        .await;
    response.assert_status_ok();
    response.json()
}

// ============ Health ============

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

// ============ Marking and escalation ============

#[tokio::test]
async fn test_three_absences_escalate_once() {
    let server = create_test_server();
    every_day_is_a_working_day(&server).await;
    let student = enroll(&server, "Nusrat Jahan").await;

    let first = mark(&server, &student, "2024-01-01", "Absent").await;
    assert_eq!(first["status"], "Absent");
    assert_eq!(first["escalation"]["events"][0]["event_type"], "1_day_absent_notification");

    let second = mark(&server, &student, "2024-01-02", "Absent").await;
    assert_eq!(second["escalation"]["events"].as_array().unwrap().len(), 0);

    let third = mark(&server, &student, "2024-01-03", "Absent").await;
    assert_eq!(third["escalation"]["events"][0]["event_type"], "3_day_escalation");
    assert_eq!(third["escalation"]["streak"]["count"], 3);

    // Re-marking the same day changes nothing.
    let again = mark(&server, &student, "2024-01-03", "Absent").await;
    assert_eq!(again["changed"], false);
    assert_eq!(again["escalation"]["events"].as_array().unwrap().len(), 0);

    let response = server
        .get(&format!("/api/daily-attendance/escalation/{student}"))
        .await;
    response.assert_status_ok();
    let history: Value = response.json();
    let events = history["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    let reports = history["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["escalation_level"], "3_day_consecutive");
    assert_eq!(reports[0]["report_date"], "2024-01-03");
    assert_eq!(reports[0]["status"], "pending");
}

#[tokio::test]
async fn test_streak_as_of_date() {
    let server = create_test_server();
    every_day_is_a_working_day(&server).await;
    let student = enroll(&server, "Tanvir Hasan").await;

    mark(&server, &student, "2024-02-05", "Present").await;
    mark(&server, &student, "2024-02-06", "Absent").await;
    mark(&server, &student, "2024-02-07", "Absent").await;

    let response = server
        .get(&format!("/api/daily-attendance/streak/{student}?asOf=2024-02-07"))
        .await;
    response.assert_status_ok();
    let streak: Value = response.json();
    assert_eq!(streak["count"], 2);
    assert_eq!(streak["streakStart"], "2024-02-06");
    assert_eq!(streak["lastAbsentDate"], "2024-02-07");
}

#[tokio::test]
async fn test_seven_absences_suspend_until_reinstated() {
    let server = create_test_server();
    every_day_is_a_working_day(&server).await;
    let student = enroll(&server, "Farhana Akter").await;

    for day in 1..=7 {
        mark(&server, &student, &format!("2024-01-0{day}"), "Absent").await;
    }

    let body: Value = server.get(&format!("/api/students/{student}")).await.json();
    assert_eq!(body["status"], "suspended");

    // A present mark does not lift the suspension.
    mark(&server, &student, "2024-01-08", "Present").await;
    let body: Value = server.get(&format!("/api/students/{student}")).await.json();
    assert_eq!(body["status"], "suspended");

    let response = server
        .put(&format!("/api/daily-attendance/reinstate/{student}"))
        .json(&json!({ "reason": "Medical certificate verified" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "active");

    server
        .put(&format!("/api/daily-attendance/reinstate/{student}"))
        .json(&json!({ "reason": "again" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_pending_student_cannot_be_marked() {
    let server = create_test_server();
    let response = server
        .post("/api/students")
        .json(&json!({
            "fullName": "Arif Hossain",
            "email": "arif.hossain@example.edu",
            "department": "Civil",
            "semester": "2nd"
        }))
        .await;
    let student: Value = response.json();
    let id = student["id"].as_str().unwrap();

    server
        .post("/api/daily-attendance/mark")
        .json(&json!({ "studentId": id, "date": "2024-01-01", "status": "Absent" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_version_conflicts() {
    let server = create_test_server();
    let student = enroll(&server, "Mehedi Hasan").await;
    let first = mark(&server, &student, "2024-03-04", "Present").await;
    let version = first["version"].as_i64().unwrap();

    server
        .post("/api/daily-attendance/mark")
        .json(&json!({
            "studentId": student,
            "date": "2024-03-04",
            "status": "Absent",
            "expectedVersion": version + 5
        }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

// ============ Validation and lookup errors ============

#[tokio::test]
async fn test_unknown_student_is_not_found() {
    let server = create_test_server();
    let missing = uuid::Uuid::new_v4();

    server
        .post("/api/daily-attendance/mark")
        .json(&json!({ "studentId": missing, "date": "2024-01-01", "status": "Absent" }))
        .await
        .assert_status_not_found();
    server
        .get(&format!("/api/daily-attendance/escalation/{missing}"))
        .await
        .assert_status_not_found();
    server
        .get(&format!("/api/daily-attendance/calendar/{missing}/2024/1"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_bad_input_is_rejected() {
    let server = create_test_server();
    let student = enroll(&server, "Rubina Yasmin").await;

    let response = server
        .post("/api/daily-attendance/mark")
        .json(&json!({ "studentId": student, "date": "01/02/2024", "status": "Absent" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("invalid date"));

    server
        .post("/api/daily-attendance/mark")
        .json(&json!({ "studentId": student, "date": "2024-01-02", "status": "Late" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/api/daily-attendance/mark")
        .text("not json")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .get("/api/daily-attendance/escalation/not-a-uuid")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// ============ Calendar ============

#[tokio::test]
async fn test_month_calendar_keyed_by_date() {
    let server = create_test_server();
    let student = enroll(&server, "Shirin Sultana").await;
    mark(&server, &student, "2024-01-02", "Present").await;
    mark(&server, &student, "2024-01-03", "Absent").await;
    mark(&server, &student, "2024-02-01", "Absent").await;

    let response = server
        .get(&format!("/api/daily-attendance/calendar/{student}/2024/1"))
        .await;
    response.assert_status_ok();
    let view: Value = response.json();
    let days = view.as_object().unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(view["2024-01-02"]["status"], "Present");
    assert_eq!(view["2024-01-03"]["status"], "Absent");
}

// ============ Holidays ============

#[tokio::test]
async fn test_month_view_merges_holidays_and_weekends() {
    let server = create_test_server();

    // 2024-01-05 is a Friday, already a weekend day by default.
    server
        .post("/api/holidays")
        .json(&json!({ "date": "2024-01-05", "name": "Founders Day" }))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/api/holidays")
        .json(&json!({ "date": "2024-01-10", "name": "Sports Day" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/api/holidays/month/2024/1").await;
    response.assert_status_ok();
    let days: Vec<Value> = response.json();
    // Eight Fridays and Saturdays plus one weekday holiday, no duplicates.
    assert_eq!(days.len(), 9);
    let founders: Vec<&Value> = days.iter().filter(|d| d["date"] == "2024-01-05").collect();
    assert_eq!(founders.len(), 1);
    assert_eq!(founders[0]["name"], "Founders Day");
}

#[tokio::test]
async fn test_holiday_range_and_delete() {
    let server = create_test_server();

    let response = server
        .post("/api/holidays/range")
        .json(&json!({
            "startDate": "2024-04-10",
            "endDate": "2024-04-14",
            "name": "Eid Vacation"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Vec<Value> = response.json();
    assert_eq!(created.len(), 5);

    let id = created[0]["id"].as_str().unwrap();
    server
        .delete(&format!("/api/holidays/{id}"))
        .await
        .assert_status_ok();
    server
        .delete(&format!("/api/holidays/{id}"))
        .await
        .assert_status_not_found();

    let all: Vec<Value> = server.get("/api/holidays").await.json();
    assert_eq!(all.len(), 4);

    server
        .post("/api/holidays/range")
        .json(&json!({ "startDate": "2024-04-14", "endDate": "2024-04-10", "name": "Backwards" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_holiday_month_alias_and_extreme_dates() {
    let server = create_test_server();
    server
        .post("/api/holidays")
        .json(&json!({ "date": "2024-01-10", "name": "Sports Day" }))
        .await
        .assert_status(StatusCode::CREATED);

    let canonical: Vec<Value> = server.get("/api/holidays/month/2024/1").await.json();
    let response = server.get("/api/daily-attendance/holidays/month/2024/1").await;
    response.assert_status_ok();
    let alias: Vec<Value> = response.json();
    assert_eq!(alias, canonical);

    let response = server
        .post("/api/holidays/range")
        .json(&json!({
            "startDate": "+262142-12-30",
            "endDate": "+262142-12-31",
            "name": "Far Future"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    server
        .post("/api/holidays")
        .json(&json!({ "date": "1899-12-31", "name": "Too Early" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/holidays/month/262143/1")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// ============ Settings ============

#[tokio::test]
async fn test_settings_are_validated() {
    let server = create_test_server();

    let settings: Vec<Value> = server.get("/api/institute-settings").await.json();
    assert!(settings.iter().any(|s| s["setting_name"] == "weekend_days"));

    server
        .put("/api/institute-settings/weekend_days")
        .json(&json!({ "setting_value": ["Funday"] }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .put("/api/institute-settings/seven_day_threshold")
        .json(&json!({ "setting_value": 2 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .put("/api/institute-settings/no_such_setting")
        .json(&json!({ "setting_value": "1" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .put("/api/institute-settings/weekend_days")
        .json(&json!({ "setting_value": ["Saturday", "Sunday"] }))
        .await;
    response.assert_status_ok();

    let setting: Value = server.get("/api/institute-settings/weekend_days").await.json();
    let days = setting["setting_value"].as_str().unwrap();
    assert!(days.contains("Saturday") && days.contains("Sunday"));

    server
        .get("/api/institute-settings/no_such_setting")
        .await
        .assert_status_not_found();
}

// ============ Absence reports ============

#[tokio::test]
async fn test_reason_and_review_flow() {
    let server = create_test_server();
    every_day_is_a_working_day(&server).await;
    let student = enroll(&server, "Sabbir Ahmed").await;
    for date in ["2024-05-01", "2024-05-02", "2024-05-03"] {
        mark(&server, &student, date, "Absent").await;
    }

    let response = server
        .post("/api/daily-attendance/reason")
        .json(&json!({ "studentId": student, "date": "2024-05-03", "reason": "Dengue fever" }))
        .await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["reason"], "Dengue fever");
    assert_eq!(report["escalation_level"], "3_day_consecutive");
    let report_id = report["id"].as_str().unwrap().to_string();

    let reports: Vec<Value> = server.get("/api/absence-reports").await.json();
    assert_eq!(reports.len(), 1);

    let response = server
        .put(&format!("/api/absence-reports/{report_id}/status"))
        .json(&json!({ "status": "approved" }))
        .await;
    response.assert_status_ok();
    let reviewed: Value = response.json();
    assert_eq!(reviewed["status"], "approved");
    assert!(!reviewed["reviewed_at"].is_null());

    server
        .put(&format!("/api/absence-reports/{report_id}/status"))
        .json(&json!({ "status": "rejected" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .post("/api/daily-attendance/reason")
        .json(&json!({ "studentId": student, "date": "2024-05-03", "reason": "   " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_events_feed_lists_all_students() {
    let server = create_test_server();
    every_day_is_a_working_day(&server).await;
    let first = enroll(&server, "Mim Akter").await;
    let second = enroll(&server, "Rakib Hossain").await;
    mark(&server, &first, "2024-06-02", "Absent").await;
    mark(&server, &second, "2024-06-02", "Absent").await;

    let events: Vec<Value> = server.get("/api/daily-attendance/events").await.json();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e["event_type"] == "1_day_absent_notification"));
    assert!(events.iter().all(|e| e["details"]["reasonConfirmed"] == false));
}

// ============ Teacher roster ============

#[tokio::test]
async fn test_teacher_students_lists_enrolled_assignees() {
    let server = create_test_server();
    let teacher = uuid::Uuid::new_v4();

    let mut ids = Vec::new();
    for (name, email) in [
        ("Zarin Tasnim", "zarin.tasnim@example.edu"),
        ("Anika Rahman", "anika.rahman@example.edu"),
        ("Jamal Uddin", "jamal.uddin@example.edu"),
    ] {
        let body: Value = server
            .post("/api/students")
            .json(&json!({
                "fullName": name,
                "email": email,
                "department": "Electrical",
                "semester": "5th",
                "teacherId": teacher
            }))
            .await
            .json();
        ids.push(body["id"].as_str().unwrap().to_string());
    }
    // Jamal stays pending.
    for id in &ids[..2] {
        server
            .put(&format!("/api/students/{id}/registration"))
            .json(&json!({ "status": "active" }))
            .await
            .assert_status_ok();
    }
    enroll(&server, "Other Teacher Student").await;

    let response = server
        .get(&format!("/api/daily-attendance/teacher/students?teacherId={teacher}"))
        .await;
    response.assert_status_ok();
    let students: Vec<Value> = response.json();
    let names: Vec<&str> = students
        .iter()
        .map(|s| s["fullName"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Anika Rahman", "Zarin Tasnim"]);

    server
        .get("/api/daily-attendance/teacher/students")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/daily-attendance/teacher/students?teacherId=nobody")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
