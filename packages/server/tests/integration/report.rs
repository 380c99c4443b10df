use ::common::ReportType;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

use server::entity::{report, user};

use crate::common::{TestApp, routes};

/// Insert a report row directly, as the outcome consumer would.
async fn insert_report(
    app: &TestApp,
    username: &str,
    execution_id: i32,
    report_type: ReportType,
    file_path: &str,
) -> i32 {
    let creator = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();

    let now = Utc::now();
    let model = report::ActiveModel {
        name: Set("Nightly report".into()),
        description: Set(None),
        execution_id: Set(execution_id),
        report_type: Set(report_type),
        file_path: Set(file_path.to_string()),
        is_public: Set(true),
        job_id: Set(Uuid::new_v4().to_string()),
        creator_id: Set(creator.id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(&app.db).await.unwrap().id
}

async fn seed_execution(app: &TestApp, token: &str) -> i32 {
    let project_id = app.create_project(token, "P").await;
    let plan_id = app.create_test_plan(project_id, token, "Plan", "ready").await;
    let case_id = app.create_test_case(project_id, token, "case").await;
    app.add_cases_to_plan(plan_id, &[case_id], token).await;
    app.create_execution(plan_id, token).await
}

mod generation {
    use super::*;

    #[tokio::test]
    async fn queue_disabled_is_service_unavailable() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("gen1", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let res = app
            .post_with_token(
                routes::REPORTS_GENERATE,
                &json!({"execution_id": execution_id, "report_type": "allure"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 503, "{}", res.text);
        assert_eq!(res.body["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("gen2", "password123").await;

        let res = app
            .post_with_token(
                routes::REPORTS_GENERATE,
                &json!({"execution_id": 999999}),
                &token,
            )
            .await;
        assert_eq!(res.status, 404);
    }
}

mod retrieval {
    use super::*;

    #[tokio::test]
    async fn download_streams_single_file() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("dl1", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.html");
        std::fs::write(&file, "<html>hello report</html>").unwrap();

        let id = insert_report(&app, "dl1", execution_id, ReportType::Html, file.to_str().unwrap())
            .await;

        let (status, bytes) = app
            .get_bytes_with_token(&routes::report_download(id), &token)
            .await;
        assert_eq!(status, 200);
        assert_eq!(bytes, b"<html>hello report</html>");
    }

    #[tokio::test]
    async fn download_archives_directory_as_zip() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("dl2", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().join("allure-report");
        std::fs::create_dir_all(report_dir.join("data")).unwrap();
        std::fs::write(report_dir.join("index.html"), "<html></html>").unwrap();
        std::fs::write(report_dir.join("data").join("suites.json"), "{}").unwrap();

        let id = insert_report(
            &app,
            "dl2",
            execution_id,
            ReportType::Allure,
            report_dir.to_str().unwrap(),
        )
        .await;

        let (status, bytes) = app
            .get_bytes_with_token(&routes::report_download(id), &token)
            .await;
        assert_eq!(status, 200);
        // Zip local file header magic.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn view_serves_html_file_inline() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("view1", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.html");
        std::fs::write(&file, "<html>inline</html>").unwrap();

        let id = insert_report(
            &app,
            "view1",
            execution_id,
            ReportType::Html,
            file.to_str().unwrap(),
        )
        .await;

        let res = app.get_with_token(&routes::report_view(id), &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.text, "<html>inline</html>");
    }

    #[tokio::test]
    async fn view_serves_allure_index() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("view2", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().join("allure-report");
        std::fs::create_dir_all(&report_dir).unwrap();
        std::fs::write(report_dir.join("index.html"), "<html>allure</html>").unwrap();

        let id = insert_report(
            &app,
            "view2",
            execution_id,
            ReportType::Allure,
            report_dir.to_str().unwrap(),
        )
        .await;

        let res = app.get_with_token(&routes::report_view(id), &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.text, "<html>allure</html>");
    }

    #[tokio::test]
    async fn view_without_index_falls_back_to_download() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("view3", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().join("allure-report");
        std::fs::create_dir_all(&report_dir).unwrap();
        std::fs::write(report_dir.join("other.txt"), "data").unwrap();

        let id = insert_report(
            &app,
            "view3",
            execution_id,
            ReportType::Allure,
            report_dir.to_str().unwrap(),
        )
        .await;

        let (status, bytes) = app
            .get_bytes_with_token(&routes::report_view(id), &token)
            .await;
        assert_eq!(status, 200);
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("view4", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let id = insert_report(
            &app,
            "view4",
            execution_id,
            ReportType::Html,
            "/nonexistent/report.html",
        )
        .await;

        let res = app.get_with_token(&routes::report_download(id), &token).await;
        assert_eq!(res.status, 404);
        let res = app.get_with_token(&routes::report_view(id), &token).await;
        assert_eq!(res.status, 404);
    }
}

mod metadata {
    use super::*;

    #[tokio::test]
    async fn metadata_can_be_edited_but_deletion_requires_staff() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("meta1", "password123").await;
        let staff = app.create_staff_user("meta_admin", "password123").await;
        let execution_id = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.html");
        std::fs::write(&file, "<html></html>").unwrap();

        let id = insert_report(
            &app,
            "meta1",
            execution_id,
            ReportType::Html,
            file.to_str().unwrap(),
        )
        .await;

        let patched = app
            .patch_with_token(
                &routes::report(id),
                &json!({"name": "Renamed", "is_public": false}),
                &token,
            )
            .await;
        assert_eq!(patched.status, 200, "{}", patched.text);
        assert_eq!(patched.body["name"], "Renamed");
        assert_eq!(patched.body["is_public"], false);

        let denied = app.delete_with_token(&routes::report(id), &token).await;
        assert_eq!(denied.status, 403);

        let deleted = app.delete_with_token(&routes::report(id), &staff).await;
        assert_eq!(deleted.status, 204);

        let gone = app.get_with_token(&routes::report(id), &token).await;
        assert_eq!(gone.status, 404);
    }

    #[tokio::test]
    async fn list_filters_by_execution() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("meta2", "password123").await;
        let e1 = seed_execution(&app, &token).await;
        let e2 = seed_execution(&app, &token).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.html");
        std::fs::write(&file, "<html></html>").unwrap();
        let path = file.to_str().unwrap();

        insert_report(&app, "meta2", e1, ReportType::Html, path).await;
        insert_report(&app, "meta2", e2, ReportType::Html, path).await;

        let res = app
            .get_with_token(&format!("{}?execution_id={e1}", routes::REPORTS), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["execution_id"], e1);
    }
}
