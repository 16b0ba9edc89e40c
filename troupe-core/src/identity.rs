//! Agent identities

use crate::error::TroupeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role executed by exactly one agent process at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentIdentity {
    /// First demo role
    Agent1,
    /// Second demo role
    Agent2,
}

impl AgentIdentity {
    /// Every known identity, in spawn order
    pub fn all() -> [AgentIdentity; 2] {
        [AgentIdentity::Agent1, AgentIdentity::Agent2]
    }

    /// The identity this one exchanges heartbeats with
    pub fn peer(&self) -> AgentIdentity {
        match self {
            AgentIdentity::Agent1 => AgentIdentity::Agent2,
            AgentIdentity::Agent2 => AgentIdentity::Agent1,
        }
    }

    /// Stable lowercase name, as used on the command line and in config
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentIdentity::Agent1 => "agent1",
            AgentIdentity::Agent2 => "agent2",
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentIdentity {
    type Err = TroupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agent1" => Ok(AgentIdentity::Agent1),
            "agent2" => Ok(AgentIdentity::Agent2),
            other => Err(TroupeError::UnknownIdentity(other.to_string())),
        }
    }
}
