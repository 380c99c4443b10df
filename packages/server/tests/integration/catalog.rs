use serde_json::json;

use crate::common::{TestApp, routes};

mod projects {
    use super::*;

    #[tokio::test]
    async fn crud_roundtrip() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("pmlead", "password123").await;

        let project_id = app.create_project(&token, "Payments").await;

        let got = app.get_with_token(&routes::project(project_id), &token).await;
        assert_eq!(got.status, 200);
        assert_eq!(got.body["name"], "Payments");
        assert_eq!(got.body["status"], "active");

        let patched = app
            .patch_with_token(
                &routes::project(project_id),
                &json!({"status": "archived", "description": null}),
                &token,
            )
            .await;
        assert_eq!(patched.status, 200, "{}", patched.text);
        assert_eq!(patched.body["status"], "archived");
        assert!(patched.body["description"].is_null());
    }

    #[tokio::test]
    async fn list_filters_by_keyword() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("pm2", "password123").await;

        app.create_project(&token, "Payments backend").await;
        app.create_project(&token, "Mobile app").await;

        let res = app
            .get_with_token(&format!("{}?keyword=payments", routes::PROJECTS), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["name"], "Payments backend");
    }

    #[tokio::test]
    async fn delete_requires_staff_and_cascades() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("member", "password123").await;
        let staff = app.create_staff_user("boss", "password123").await;

        let project_id = app.create_project(&token, "Doomed").await;
        let case_id = app.create_test_case(project_id, &token, "TC1").await;
        let plan_id = app
            .create_test_plan(project_id, &token, "Plan", "ready")
            .await;
        app.add_cases_to_plan(plan_id, &[case_id], &token).await;
        let execution_id = app.create_execution(plan_id, &token).await;

        let denied = app.delete_with_token(&routes::project(project_id), &token).await;
        assert_eq!(denied.status, 403);

        let deleted = app.delete_with_token(&routes::project(project_id), &staff).await;
        assert_eq!(deleted.status, 204, "{}", deleted.text);

        for path in [
            routes::project(project_id),
            routes::test_case(case_id),
            routes::test_plan(plan_id),
            routes::execution(execution_id),
        ] {
            let res = app.get_with_token(&path, &token).await;
            assert_eq!(res.status, 404, "{path} should be gone: {}", res.text);
        }
    }
}

mod test_cases {
    use super::*;

    #[tokio::test]
    async fn create_requires_existing_project() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("qalead", "password123").await;

        let res = app
            .post_with_token(
                routes::TESTCASES,
                &json!({
                    "name": "Orphan",
                    "project_id": 424242,
                    "steps": "step",
                    "expected_results": "result",
                }),
                &token,
            )
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn defaults_and_filters() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("qa2", "password123").await;
        let project_id = app.create_project(&token, "Filters").await;

        let created = app
            .post_with_token(
                routes::TESTCASES,
                &json!({
                    "name": "Defaulted",
                    "project_id": project_id,
                    "steps": "step",
                    "expected_results": "result",
                }),
                &token,
            )
            .await;
        assert_eq!(created.status, 201);
        assert_eq!(created.body["priority"], "P2");
        assert_eq!(created.body["status"], "draft");

        app.create_test_case(project_id, &token, "Prioritized").await;

        let res = app
            .get_with_token(
                &format!("{}?project_id={project_id}&priority=P1", routes::TESTCASES),
                &token,
            )
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["name"], "Prioritized");
    }
}
