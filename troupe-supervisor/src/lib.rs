//! Troupe Supervisor - keeps a team of agent processes running
//!
//! The [`TeamDaemon`] owns the shared [`MessageQueue`](troupe_core::queue::MessageQueue),
//! spawns one [`AgentProcess`] per configured identity and polls them on a
//! fixed interval:
//!
//! - a dead agent is respawned immediately, its restart count carried over
//!   and incremented
//! - once an identity reaches `max_restarts` it is left down; the rest of
//!   the team is unaffected
//! - on SIGINT/SIGTERM (or a [`ShutdownHandle`]) every agent gets SIGTERM,
//!   then SIGKILL after `shutdown_timeout`, and the queue is cleared
//!
//! Agent children run [`run_agent`], which reaches the queue through the
//! child's stdin/stdout.

mod agent;
mod daemon;
mod error;
mod process;
mod signal;

pub use agent::{run_agent, run_agent_task};
pub use daemon::{HealthReport, ShutdownHandle, TeamDaemon};
pub use error::{Result, SupervisorError};
pub use process::{AgentProcess, AgentStatus, LaunchSpec, ProcessState};
pub use signal::shutdown_signal;
