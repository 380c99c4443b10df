pub mod allure;
pub mod config;
pub mod error;
pub mod handlers;
pub mod html;
pub mod renderer;
