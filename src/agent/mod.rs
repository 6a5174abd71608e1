//! Agent seam and the per-query session runner.

pub mod demo;
pub mod scripted;
pub mod session;
pub mod traits;

pub use demo::{demo_agent, run_demo, DemoOptions, DemoOutcome};
pub use scripted::ScriptedAgent;
pub use session::{AdvisorSession, MerchantSession};
pub use traits::{AdvisorAgent, AgentRequest};
