//! End-to-end tests for the link -> outdated -> execute flow.

mod common;
mod execute_tests;
mod link_tests;
mod session_tests;
