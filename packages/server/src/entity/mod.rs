pub mod project;
pub mod report;
pub mod test_case;
pub mod test_execution;
pub mod test_plan;
pub mod test_plan_case;
pub mod test_result;
pub mod user;
