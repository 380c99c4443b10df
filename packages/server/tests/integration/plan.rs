use serde_json::json;

use crate::common::{TestApp, routes};

async fn plan_case_orders(app: &TestApp, plan_id: i32, token: &str) -> Vec<(i64, i64)> {
    let res = app.get_with_token(&routes::test_plan(plan_id), token).await;
    assert_eq!(res.status, 200, "{}", res.text);
    res.body["test_cases"]
        .as_array()
        .expect("test_cases array")
        .iter()
        .map(|c| (c["case_id"].as_i64().unwrap(), c["order"].as_i64().unwrap()))
        .collect()
}

mod add_test_cases {
    use super::*;

    #[tokio::test]
    async fn assigns_sequential_orders_after_current_max() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("planner", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;

        let c1 = app.create_test_case(project_id, &token, "one").await;
        let c2 = app.create_test_case(project_id, &token, "two").await;
        let c3 = app.create_test_case(project_id, &token, "three").await;

        let res = app
            .post_with_token(
                &routes::plan_add_test_cases(plan_id),
                &json!({"case_ids": [c1, c2]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["added"], 2);

        let res = app
            .post_with_token(
                &routes::plan_add_test_cases(plan_id),
                &json!({"case_ids": [c3]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201);

        assert_eq!(
            plan_case_orders(&app, plan_id, &token).await,
            vec![(c1 as i64, 1), (c2 as i64, 2), (c3 as i64, 3)]
        );
    }

    #[tokio::test]
    async fn adding_twice_is_idempotent() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("planner2", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        let c2 = app.create_test_case(project_id, &token, "two").await;

        app.add_cases_to_plan(plan_id, &[c1, c2], &token).await;

        let repeat = app
            .post_with_token(
                &routes::plan_add_test_cases(plan_id),
                &json!({"case_ids": [c1, c2]}),
                &token,
            )
            .await;
        assert_eq!(repeat.status, 200, "{}", repeat.text);
        assert_eq!(repeat.body["added"], 0);
        assert!(
            repeat.body["message"]
                .as_str()
                .unwrap()
                .contains("already in the plan")
        );

        // No new associations, orders unchanged.
        assert_eq!(
            plan_case_orders(&app, plan_id, &token).await,
            vec![(c1 as i64, 1), (c2 as i64, 2)]
        );
    }

    #[tokio::test]
    async fn unknown_case_id_fails_with_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("planner3", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;

        let res = app
            .post_with_token(
                &routes::plan_add_test_cases(plan_id),
                &json!({"case_ids": [c1, 999999]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 404);
        assert!(res.body["message"].as_str().unwrap().contains("999999"));

        // Nothing was added.
        assert!(plan_case_orders(&app, plan_id, &token).await.is_empty());
    }
}

mod remove_test_case {
    use super::*;

    #[tokio::test]
    async fn removes_the_association() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("remover", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        app.add_cases_to_plan(plan_id, &[c1], &token).await;

        let res = app
            .delete_with_token(&routes::plan_remove_test_case(plan_id, c1), &token)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        assert!(plan_case_orders(&app, plan_id, &token).await.is_empty());
    }

    #[tokio::test]
    async fn absent_association_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("remover2", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;

        let res = app
            .delete_with_token(&routes::plan_remove_test_case(plan_id, c1), &token)
            .await;
        assert_eq!(res.status, 404);
    }
}

mod reorder_test_cases {
    use super::*;

    #[tokio::test]
    async fn applies_all_order_updates() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("orderer", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        let c2 = app.create_test_case(project_id, &token, "two").await;
        app.add_cases_to_plan(plan_id, &[c1, c2], &token).await;

        let res = app
            .put_with_token(
                &routes::plan_reorder_test_cases(plan_id),
                &json!({"case_orders": [
                    {"case_id": c1, "order": 20},
                    {"case_id": c2, "order": 10},
                ]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        // Returned in order; non-contiguous orders are fine.
        assert_eq!(
            plan_case_orders(&app, plan_id, &token).await,
            vec![(c2 as i64, 10), (c1 as i64, 20)]
        );
    }

    #[tokio::test]
    async fn unmatched_case_fails_entirely_and_reports_it() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("orderer2", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        let stray = app.create_test_case(project_id, &token, "stray").await;
        app.add_cases_to_plan(plan_id, &[c1], &token).await;

        let res = app
            .put_with_token(
                &routes::plan_reorder_test_cases(plan_id),
                &json!({"case_orders": [
                    {"case_id": c1, "order": 5},
                    {"case_id": stray, "order": 6},
                ]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert!(res.body["message"].as_str().unwrap().contains(&stray.to_string()));

        // Zero orders changed.
        assert_eq!(
            plan_case_orders(&app, plan_id, &token).await,
            vec![(c1 as i64, 1)]
        );
    }
}

mod create_execution {
    use super::*;

    #[tokio::test]
    async fn seeds_one_pending_result_per_case_in_order() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("runner", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "ready").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        let c2 = app.create_test_case(project_id, &token, "two").await;
        let c3 = app.create_test_case(project_id, &token, "three").await;
        app.add_cases_to_plan(plan_id, &[c1, c2, c3], &token).await;

        let execution_id = app.create_execution(plan_id, &token).await;

        let res = app
            .get_with_token(&routes::execution_results(execution_id), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["stats"]["total"], 3);
        assert_eq!(res.body["stats"]["pending"], 3);

        let mut case_ids: Vec<i64> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["case_id"].as_i64().unwrap())
            .collect();
        case_ids.sort();
        assert_eq!(case_ids, vec![c1 as i64, c2 as i64, c3 as i64]);
        for r in res.body["data"].as_array().unwrap() {
            assert_eq!(r["status"], "pending");
        }
    }

    #[tokio::test]
    async fn ready_plan_moves_to_in_progress() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("runner2", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "ready").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        app.add_cases_to_plan(plan_id, &[c1], &token).await;

        app.create_execution(plan_id, &token).await;

        let plan = app.get_with_token(&routes::test_plan(plan_id), &token).await;
        assert_eq!(plan.body["status"], "in_progress");

        // A second execution keeps the plan in_progress.
        app.create_execution(plan_id, &token).await;
        let plan = app.get_with_token(&routes::test_plan(plan_id), &token).await;
        assert_eq!(plan.body["status"], "in_progress");
    }

    #[tokio::test]
    async fn draft_plan_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("runner3", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "draft").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        app.add_cases_to_plan(plan_id, &[c1], &token).await;

        let res = app
            .post_with_token(&routes::plan_create_execution(plan_id), &json!({}), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "INVALID_OPERATION");
        assert!(res.body["message"].as_str().unwrap().contains("draft"));
    }

    #[tokio::test]
    async fn empty_plan_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("runner4", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "ready").await;

        let res = app
            .post_with_token(&routes::plan_create_execution(plan_id), &json!({}), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn seeding_is_a_snapshot_of_the_plan() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("runner5", "password123").await;
        let project_id = app.create_project(&token, "P").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan", "ready").await;
        let c1 = app.create_test_case(project_id, &token, "one").await;
        app.add_cases_to_plan(plan_id, &[c1], &token).await;

        let execution_id = app.create_execution(plan_id, &token).await;

        // Adding a case afterwards must not appear in the existing execution.
        let c2 = app.create_test_case(project_id, &token, "late").await;
        app.add_cases_to_plan(plan_id, &[c2], &token).await;

        let res = app
            .get_with_token(&routes::execution_results(execution_id), &token)
            .await;
        assert_eq!(res.body["stats"]["total"], 1);
        assert_eq!(res.body["data"][0]["case_id"], c1);
    }
}

mod end_to_end {
    use super::*;

    /// Full scenario: project → case → plan → add → execute.
    #[tokio::test]
    async fn project_to_execution_flow() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("e2e", "password123").await;

        let project_id = app.create_project(&token, "P1").await;
        let case_id = app.create_test_case(project_id, &token, "TC1").await;
        let plan_id = app.create_test_plan(project_id, &token, "Plan1", "ready").await;
        app.add_cases_to_plan(plan_id, &[case_id], &token).await;
        let execution_id = app.create_execution(plan_id, &token).await;

        let results = app
            .get_with_token(&routes::execution_results(execution_id), &token)
            .await;
        assert_eq!(results.body["stats"]["total"], 1);
        assert_eq!(results.body["data"][0]["case_id"], case_id);
        assert_eq!(results.body["data"][0]["status"], "pending");
        assert_eq!(results.body["data"][0]["case"]["priority"], "P1");

        let plan = app.get_with_token(&routes::test_plan(plan_id), &token).await;
        assert_eq!(plan.body["status"], "in_progress");
    }
}
