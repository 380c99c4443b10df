pub mod auth;
pub mod execution;
pub mod project;
pub mod report;
pub mod result;
pub mod shared;
pub mod test_case;
pub mod test_plan;
