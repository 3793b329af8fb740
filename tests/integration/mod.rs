//! Integration test suite for gantry.
//!
//! These tests drive full workflow runs through the public crate API,
//! from registration through scheduling to the final run report.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Full runs over common graph shapes
//! - `failure_paths`: Failure containment, unknown deps, deadlock
//! - `human_gate`: Approval, denial, timeout, and cancellation

mod fixtures;

mod workflow_e2e;
mod human_gate;
