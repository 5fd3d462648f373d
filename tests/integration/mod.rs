//! Integration Tests Module
//!
//! End-to-end tests for report narrative generation: scripted providers
//! drive the orchestrator, the polisher, and the configured pipeline.

// Scripted provider and fixtures
mod support;

// Resolution, rate-limit degradation, batch, and polishing scenarios
mod scenarios_test;

// Properties that hold for every run
mod properties_test;

// Config-driven pipeline runs
mod pipeline_test;
