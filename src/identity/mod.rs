//! Identity core: certificate trust, agent presence, and remote tasks.

pub mod agents;
pub mod api;
pub mod certificates;
pub mod tasks;

pub use agents::{AgentPresence, AgentRegistry, AgentState, HeartbeatEvent, HeartbeatStore};
pub use certificates::{CertificateRecord, CertificateRegistry};
pub use tasks::{Task, TaskResult, TaskState, TaskStore};
