//! Execution integration tests.
//!
//! Scheduling, retries and resumption against scripted executors, risk
//! ranking from recorded history, and full runs through a real subprocess.

#[path = "../common/mod.rs"]
mod common;

mod end_to_end;
mod retries;
mod risk_ranking;
