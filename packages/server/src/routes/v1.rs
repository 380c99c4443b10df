use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/projects", project_routes())
        .nest("/testcases", test_case_routes())
        .nest("/testplans", test_plan_routes())
        .nest("/executions", execution_routes())
        .nest("/results", result_routes())
        .nest("/reports", report_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn project_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::project::list_projects,
            handlers::project::create_project
        ))
        .routes(routes!(
            handlers::project::get_project,
            handlers::project::update_project,
            handlers::project::delete_project
        ))
}

fn test_case_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::test_case::list_test_cases,
            handlers::test_case::create_test_case
        ))
        .routes(routes!(
            handlers::test_case::get_test_case,
            handlers::test_case::update_test_case,
            handlers::test_case::delete_test_case
        ))
}

fn test_plan_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::test_plan::list_test_plans,
            handlers::test_plan::create_test_plan
        ))
        .routes(routes!(
            handlers::test_plan::get_test_plan,
            handlers::test_plan::update_test_plan,
            handlers::test_plan::delete_test_plan
        ))
        .routes(routes!(handlers::test_plan::add_test_cases))
        .routes(routes!(handlers::test_plan::remove_test_case))
        .routes(routes!(handlers::test_plan::reorder_test_cases))
        .routes(routes!(handlers::test_plan::create_execution))
}

fn execution_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::execution::list_executions))
        .routes(routes!(
            handlers::execution::get_execution,
            handlers::execution::delete_execution
        ))
        .routes(routes!(handlers::execution::start_execution))
        .routes(routes!(handlers::execution::pause_execution))
        .routes(routes!(handlers::execution::complete_execution))
        .routes(routes!(handlers::execution::abort_execution))
        .routes(routes!(handlers::execution::list_execution_results))
}

fn result_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::result::batch_update_results))
        .routes(routes!(
            handlers::result::get_result,
            handlers::result::update_result
        ))
}

fn report_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::report::generate_report))
        .routes(routes!(handlers::report::list_reports))
        .routes(routes!(
            handlers::report::get_report,
            handlers::report::update_report,
            handlers::report::delete_report
        ))
        .routes(routes!(handlers::report::download_report))
        .routes(routes!(handlers::report::view_report))
}
