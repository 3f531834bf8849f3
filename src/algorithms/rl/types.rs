//! Core types for the RL timetabling algorithm.
//!
//! Defines the closed set of training methods and the agent partition
//! identifiers used throughout the multi-agent system.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Training method, selected once per run.
///
/// The document names are `Random`, `MultiAgentPPO` and
/// `RecurrentMultiAgentPPO`; the short names `PMAPPO` and `RPMAPPO` are
/// accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Single agent sampling uniformly among legal candidates.
    Random,
    /// One PPO agent per resource group.
    #[serde(rename = "MultiAgentPPO", alias = "PMAPPO")]
    MultiAgentPpo,
    /// PPO agents conditioned on a hidden state carried across their turns.
    #[serde(rename = "RecurrentMultiAgentPPO", alias = "RPMAPPO")]
    RecurrentMultiAgentPpo,
}

impl Method {
    /// Returns all methods in declaration order.
    pub fn all() -> [Method; 3] {
        [
            Method::Random,
            Method::MultiAgentPpo,
            Method::RecurrentMultiAgentPpo,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::Random => "Random",
            Method::MultiAgentPpo => "MultiAgentPPO",
            Method::RecurrentMultiAgentPpo => "RecurrentMultiAgentPPO",
        }
    }

    /// True for the learning methods, which partition lessons by group.
    pub fn is_multi_agent(&self) -> bool {
        !matches!(self, Method::Random)
    }

    /// The learning methods need the `rl-nn` feature.
    pub fn is_available(&self) -> bool {
        !self.is_multi_agent() || cfg!(feature = "rl-nn")
    }

    /// Methods this build can run, in declaration order.
    pub fn available() -> Vec<Method> {
        Self::all().into_iter().filter(Method::is_available).collect()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown method `{0}`, expected one of Random, MultiAgentPPO, RecurrentMultiAgentPPO")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Random" => Ok(Method::Random),
            "MultiAgentPPO" | "PMAPPO" => Ok(Method::MultiAgentPpo),
            "RecurrentMultiAgentPPO" | "RPMAPPO" => Ok(Method::RecurrentMultiAgentPpo),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// Index of an agent in the pool; turn order is ascending partition id.
pub type PartitionId = usize;

/// Where network tensors live.
///
/// `Gpu` selects CUDA when libtorch reports it available and CPU otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Gpu,
}
