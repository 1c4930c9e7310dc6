//! Agent loops and their shared capability set.
//!
//! Both agents follow the same cycle: a pluggable [`Planner`] chooses
//! among a fixed tool set one step at a time, the harness executes the
//! chosen tool against a [`ToolContext`], and the observation is fed
//! back into the transcript. The loops are explicitly step-bounded; no
//! hidden retries, no recursion.

pub mod browser;
pub mod chat;
pub mod discovery;
pub mod extraction;
pub mod planner;
pub mod tools;

pub use browser::{BrowserProvider, BrowserSession, RemoteBrowserProvider};
pub use chat::ChatPlanner;
pub use discovery::{run_discovery, validate_skill, ValidationReport};
pub use extraction::{run_extraction, ExtractionRun};
pub use planner::{AgentStep, Planner, PlannerAction, ToolSpec, Transcript};
pub use tools::ToolContext;
