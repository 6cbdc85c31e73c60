#[path = "../common/mod.rs"]
mod common;

mod flaky_store;
mod main_flow_tests;
