// ABOUTME: Schema scripting module
// ABOUTME: Exports object categories, the provider capability, and the schema planner

pub mod category;
pub mod planner;
pub mod provider;

pub use category::Category;
pub use planner::{PlanSummary, SchemaScriptPlanner};
pub use provider::{ObjectRef, SchemaProvider, ScriptMode, ScriptOptions};
