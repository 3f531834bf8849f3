//! Agents and the turn order that drives them.

use super::config::{RLConfig, TrainingConfig};
use super::environment::RLEnvironment;
use super::policy::{Policy, RandomPolicy};
use super::training::buffer::RolloutBuffer;
use super::training::TrainingError;
use super::types::{ComputeDevice, Method, PartitionId};
use crate::problem::Problem;
use crate::Id;

/// One policy agent and the lessons it owns.
pub struct Agent {
    /// Position in the turn order.
    pub partition: PartitionId,
    /// Resource group this agent owns, `None` for the single-agent baseline.
    pub group: Option<Id>,
    /// Owned lessons, ascending by id.
    lessons: Vec<Id>,
    pub policy: Box<dyn Policy>,
    /// Transitions collected during the current epoch.
    pub buffer: RolloutBuffer,
}

impl Agent {
    fn new(partition: PartitionId, group: Option<Id>, mut lessons: Vec<Id>, policy: Box<dyn Policy>) -> Self {
        lessons.sort_unstable();
        Self {
            partition,
            group,
            lessons,
            policy,
            buffer: RolloutBuffer::new(),
        }
    }

    pub fn lessons(&self) -> &[Id] {
        &self.lessons
    }

    /// The lowest-id owned lesson not yet decided in `env`.
    pub fn next_lesson(&self, env: &RLEnvironment) -> Option<Id> {
        self.lessons.iter().copied().find(|&l| !env.is_decided(l))
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("partition", &self.partition)
            .field("group", &self.group)
            .field("lessons", &self.lessons.len())
            .field("policy", &self.policy.name())
            .finish()
    }
}

/// The agents of one run, in ascending partition order.
///
/// `Random` runs a single agent owning every lesson. The PPO methods run
/// one agent per resource group; agent `i` is seeded with `seed + i`.
#[derive(Debug)]
pub struct AgentPool {
    method: Method,
    agents: Vec<Agent>,
}

impl AgentPool {
    /// # Errors
    ///
    /// `MethodUnavailable` for a learning method in a build without the
    /// `rl-nn` feature; `Network` if a policy fails to initialize.
    pub fn new(
        problem: &Problem,
        method: Method,
        env_config: &RLConfig,
        training: &TrainingConfig,
        device: ComputeDevice,
        seed: u64,
    ) -> Result<Self, TrainingError> {
        if !method.is_available() {
            return Err(TrainingError::MethodUnavailable(method));
        }
        let agents = if method.is_multi_agent() {
            let mut agents = Vec::new();
            for (partition, (group, lessons)) in problem.lessons_by_group().into_iter().enumerate() {
                let agent_seed = seed.wrapping_add(partition as u64);
                let policy = learning_policy(method, env_config, training, device, agent_seed)?;
                agents.push(Agent::new(partition, Some(group), lessons, policy));
            }
            agents
        } else {
            let lessons = problem.lessons().iter().map(|l| l.id).collect();
            vec![Agent::new(0, None, lessons, Box::new(RandomPolicy::new()))]
        };
        Ok(Self { method, agents })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    /// Resets recurrent state of every policy.
    pub fn begin_episode(&mut self) {
        for agent in &mut self.agents {
            agent.policy.begin_episode();
        }
    }

    /// One round of the turn order: each agent with an undecided lesson,
    /// in ascending partition id, paired with that lesson.
    pub fn round(&self, env: &RLEnvironment) -> Vec<(PartitionId, Id)> {
        self.agents
            .iter()
            .filter_map(|a| a.next_lesson(env).map(|l| (a.partition, l)))
            .collect()
    }

    pub fn clear_buffers(&mut self) {
        for agent in &mut self.agents {
            agent.buffer.clear();
        }
    }
}

#[cfg(feature = "rl-nn")]
fn learning_policy(
    method: Method,
    env_config: &RLConfig,
    training: &TrainingConfig,
    device: ComputeDevice,
    seed: u64,
) -> Result<Box<dyn Policy>, TrainingError> {
    use super::network::tch_device;
    use super::policy::{PpoPolicy, RecurrentPpoPolicy};

    let device = tch_device(device);
    Ok(match method {
        Method::RecurrentMultiAgentPpo => Box::new(RecurrentPpoPolicy::new(
            env_config,
            training.clone(),
            device,
            seed,
        )?),
        _ => Box::new(PpoPolicy::new(env_config, training.clone(), device, seed)?),
    })
}

#[cfg(not(feature = "rl-nn"))]
fn learning_policy(
    method: Method,
    _env_config: &RLConfig,
    _training: &TrainingConfig,
    _device: ComputeDevice,
    _seed: u64,
) -> Result<Box<dyn Policy>, TrainingError> {
    Err(TrainingError::MethodUnavailable(method))
}
