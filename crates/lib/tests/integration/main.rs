//! End-to-end tests: build file declarations through compilation, builds and
//! command assembly.

mod common;
mod compile_tests;
mod lifecycle_tests;
