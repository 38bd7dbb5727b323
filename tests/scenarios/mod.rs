//! Scenario-based tests for ci-agent

mod conditional_steps;
mod interpolation;
mod secret_rejection;
mod upload_retries;
