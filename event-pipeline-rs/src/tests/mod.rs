//! Scenario and integration tests for the pipeline

pub mod support;

pub mod orchestrator_tests;
