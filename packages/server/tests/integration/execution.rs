use serde_json::json;

use crate::common::{TestApp, routes};

/// Create a one-case execution and return (execution_id, result_id, case_id).
async fn seed_execution(app: &TestApp, token: &str) -> (i32, i32, i32) {
    let project_id = app.create_project(token, "P").await;
    let plan_id = app.create_test_plan(project_id, token, "Plan", "ready").await;
    let case_id = app.create_test_case(project_id, token, "case").await;
    app.add_cases_to_plan(plan_id, &[case_id], token).await;
    let execution_id = app.create_execution(plan_id, token).await;

    let results = app
        .get_with_token(&routes::execution_results(execution_id), token)
        .await;
    let result_id = results.body["data"][0]["id"].as_i64().unwrap() as i32;

    (execution_id, result_id, case_id)
}

mod transitions {
    use super::*;

    #[tokio::test]
    async fn start_sets_start_time_once() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("trans1", "password123").await;
        let (execution_id, _, _) = seed_execution(&app, &token).await;

        let res = app
            .post_with_token(&routes::execution_action(execution_id, "start"), &json!({}), &token)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let first = app.get_with_token(&routes::execution(execution_id), &token).await;
        assert_eq!(first.body["status"], "running");
        let start_time = first.body["start_time"].as_str().unwrap().to_string();

        // Pause, then start again: the original start time must survive.
        app.post_with_token(&routes::execution_action(execution_id, "pause"), &json!({}), &token)
            .await;
        app.post_with_token(&routes::execution_action(execution_id, "start"), &json!({}), &token)
            .await;

        let second = app.get_with_token(&routes::execution(execution_id), &token).await;
        assert_eq!(second.body["status"], "running");
        assert_eq!(second.body["start_time"], start_time.as_str());
    }

    #[tokio::test]
    async fn start_on_completed_is_invalid_operation() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("trans2", "password123").await;
        let (execution_id, _, _) = seed_execution(&app, &token).await;

        app.post_with_token(&routes::execution_action(execution_id, "start"), &json!({}), &token)
            .await;
        let done = app
            .post_with_token(
                &routes::execution_action(execution_id, "complete"),
                &json!({"auto_generate_report": false}),
                &token,
            )
            .await;
        assert_eq!(done.status, 200, "{}", done.text);

        let res = app
            .post_with_token(&routes::execution_action(execution_id, "start"), &json!({}), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "INVALID_OPERATION");
        assert!(res.body["message"].as_str().unwrap().contains("completed"));
    }

    #[tokio::test]
    async fn pause_requires_running() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("trans3", "password123").await;
        let (execution_id, _, _) = seed_execution(&app, &token).await;

        let res = app
            .post_with_token(&routes::execution_action(execution_id, "pause"), &json!({}), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "INVALID_OPERATION");
    }

    #[tokio::test]
    async fn complete_sets_end_time_and_skips_report_when_disabled() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("trans4", "password123").await;
        let (execution_id, _, _) = seed_execution(&app, &token).await;

        app.post_with_token(&routes::execution_action(execution_id, "start"), &json!({}), &token)
            .await;
        let res = app
            .post_with_token(
                &routes::execution_action(execution_id, "complete"),
                &json!({"auto_generate_report": false}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200);
        assert!(res.body["task_id"].is_null() || res.body.get("task_id").is_none());

        let got = app.get_with_token(&routes::execution(execution_id), &token).await;
        assert_eq!(got.body["status"], "completed");
        assert!(got.body["end_time"].is_string());
    }

    #[tokio::test]
    async fn complete_with_queue_down_still_completes() {
        // MQ is disabled in the test harness, so auto-generation cannot
        // enqueue; completion itself must not fail.
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("trans5", "password123").await;
        let (execution_id, _, _) = seed_execution(&app, &token).await;

        app.post_with_token(&routes::execution_action(execution_id, "start"), &json!({}), &token)
            .await;
        let res = app
            .post_with_token(
                &routes::execution_action(execution_id, "complete"),
                &json!({}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let got = app.get_with_token(&routes::execution(execution_id), &token).await;
        assert_eq!(got.body["status"], "completed");
    }

    #[tokio::test]
    async fn abort_works_from_pending_and_stamps_end_time() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("trans6", "password123").await;
        let (execution_id, _, _) = seed_execution(&app, &token).await;

        let res = app
            .post_with_token(&routes::execution_action(execution_id, "abort"), &json!({}), &token)
            .await;
        assert_eq!(res.status, 200);

        let got = app.get_with_token(&routes::execution(execution_id), &token).await;
        assert_eq!(got.body["status"], "aborted");
        assert!(got.body["end_time"].is_string());

        // Terminal: no further transitions.
        let res = app
            .post_with_token(&routes::execution_action(execution_id, "abort"), &json!({}), &token)
            .await;
        assert_eq!(res.status, 400);
    }
}

mod result_updates {
    use super::*;

    #[tokio::test]
    async fn leaving_pending_stamps_executor_and_execution_time() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("updater", "password123").await;
        let (_, result_id, _) = seed_execution(&app, &token).await;

        let res = app
            .patch_with_token(
                &routes::result(result_id),
                &json!({"status": "passed", "actual_result": "worked"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "passed");
        assert_eq!(res.body["executor_name"], "updater");
        assert!(res.body["execution_time"].is_string());
        let stamped = res.body["execution_time"].as_str().unwrap().to_string();

        // A second update does not re-stamp the first transition.
        let res = app
            .patch_with_token(
                &routes::result(result_id),
                &json!({"remarks": "second pass"}),
                &token,
            )
            .await;
        assert_eq!(res.body["execution_time"], stamped.as_str());
    }

    #[tokio::test]
    async fn batch_update_reports_partial_success() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("batcher", "password123").await;

        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "ready").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        let c2 = app.create_test_case(project_id, &token, "two").await;
        app.add_cases_to_plan(plan_id, &[c1, c2], &token).await;
        let execution_id = app.create_execution(plan_id, &token).await;

        let results = app
            .get_with_token(&routes::execution_results(execution_id), &token)
            .await;
        let ids: Vec<i64> = results.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();

        let res = app
            .post_with_token(
                routes::RESULTS_BATCH_UPDATE,
                &json!({"results": [
                    {"id": ids[0], "status": "passed"},
                    {"id": 987654, "status": "failed"},
                    {"id": ids[1], "status": "failed", "remarks": "broke"},
                ]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["updated_count"], 2);
        let errors = res.body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["id"], 987654);

        // Both present items were applied despite the bad one.
        let after = app
            .get_with_token(&routes::execution_results(execution_id), &token)
            .await;
        assert_eq!(after.body["stats"]["passed"], 1);
        assert_eq!(after.body["stats"]["failed"], 1);
        assert_eq!(after.body["stats"]["pending"], 0);
    }

    #[tokio::test]
    async fn empty_batch_is_a_validation_error() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("batcher2", "password123").await;

        let res = app
            .post_with_token(routes::RESULTS_BATCH_UPDATE, &json!({"results": []}), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod results_listing {
    use super::*;

    async fn seed_mixed_results(app: &TestApp, token: &str) -> i32 {
        let project_id = app.create_project(token, "P").await;
        let plan_id = app.create_test_plan(project_id, token, "Plan", "ready").await;

        let mut case_ids = Vec::new();
        for name in ["alpha login", "beta login", "gamma export"] {
            case_ids.push(app.create_test_case(project_id, token, name).await);
        }
        app.add_cases_to_plan(plan_id, &case_ids, token).await;
        let execution_id = app.create_execution(plan_id, token).await;

        let results = app
            .get_with_token(&routes::execution_results(execution_id), token)
            .await;
        let rows: Vec<(i64, i64)> = results.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| (r["id"].as_i64().unwrap(), r["case_id"].as_i64().unwrap()))
            .collect();
        let by_case = |case_id: i32| {
            rows.iter()
                .find(|(_, c)| *c == case_id as i64)
                .map(|(id, _)| *id)
                .unwrap()
        };

        // alpha passes, beta fails, gamma stays pending.
        app.post_with_token(
            routes::RESULTS_BATCH_UPDATE,
            &json!({"results": [
                {"id": by_case(case_ids[0]), "status": "passed"},
                {"id": by_case(case_ids[1]), "status": "failed"},
            ]}),
            token,
        )
        .await;

        execution_id
    }

    #[tokio::test]
    async fn stats_cover_full_filtered_set_not_just_the_page() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("lister", "password123").await;
        let execution_id = seed_mixed_results(&app, &token).await;

        let res = app
            .get_with_token(
                &format!("{}?per_page=1", routes::execution_results(execution_id)),
                &token,
            )
            .await;
        assert_eq!(res.status, 200);
        // One row on the page, but stats describe all three results.
        assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
        assert_eq!(res.body["stats"]["total"], 3);
        assert_eq!(res.body["stats"]["passed"], 1);
        assert_eq!(res.body["stats"]["failed"], 1);
        assert_eq!(res.body["stats"]["pending"], 1);
        assert_eq!(res.body["pagination"]["total_pages"], 3);
    }

    #[tokio::test]
    async fn case_name_filter_applies_to_stats_and_rows() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("lister2", "password123").await;
        let execution_id = seed_mixed_results(&app, &token).await;

        let res = app
            .get_with_token(
                &format!("{}?case_name=LOGIN", routes::execution_results(execution_id)),
                &token,
            )
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["stats"]["total"], 2);
        assert_eq!(res.body["stats"]["pending"], 0);
        for row in res.body["data"].as_array().unwrap() {
            assert!(row["case"]["name"].as_str().unwrap().contains("login"));
        }
    }

    #[tokio::test]
    async fn status_filter_narrows_both_rows_and_stats() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("lister3", "password123").await;
        let execution_id = seed_mixed_results(&app, &token).await;

        let res = app
            .get_with_token(
                &format!("{}?status=failed", routes::execution_results(execution_id)),
                &token,
            )
            .await;
        assert_eq!(res.body["stats"]["total"], 1);
        assert_eq!(res.body["stats"]["failed"], 1);
        assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
        assert_eq!(res.body["data"][0]["status"], "failed");
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("lister4", "password123").await;

        let res = app
            .get_with_token(&routes::execution_results(999999), &token)
            .await;
        assert_eq!(res.status, 404);
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn filters_by_plan_name_substring() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("exlister", "password123").await;

        let project_id = app.create_project(&token, "P").await;
        let c = app.create_test_case(project_id, &token, "case").await;

        let nightly = app
            .create_test_plan(project_id, &token, "Nightly regression", "ready")
            .await;
        app.add_cases_to_plan(nightly, &[c], &token).await;
        app.create_execution(nightly, &token).await;

        let smoke = app.create_test_plan(project_id, &token, "Smoke", "ready").await;
        app.add_cases_to_plan(smoke, &[c], &token).await;
        app.create_execution(smoke, &token).await;

        let res = app
            .get_with_token(&format!("{}?plan_name=nightly", routes::EXECUTIONS), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["plan_name"], "Nightly regression");
        assert_eq!(res.body["data"][0]["results_count"], 1);
    }
}
