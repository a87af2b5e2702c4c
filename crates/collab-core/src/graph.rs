//! Role dependency layering and execution planning.
//!
//! Roles form a directed graph: an edge `A -> B` means "B depends on A", so A
//! must finish before B may start. Layering repeatedly peels off every role
//! whose dependencies were all placed in earlier layers; each layer can then
//! run as one concurrent batch.
//!
//! Unlike a strict topological sort, a cycle is not an error here. When no
//! role can be peeled off, every remaining role is dumped into one final
//! layer and the cycle is reported. Callers relying on dependency order inside
//! such a layer get no guarantee.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::role::AgentRole;
use crate::domain::task::{CollaborationMode, CollaborationTask};
use crate::obs;

/// Result of layering a role set.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleLayers {
    pub layers: Vec<Vec<AgentRole>>,
    /// Ids that were flattened into the last layer because of a cycle.
    pub flattened: Vec<String>,
}

impl RoleLayers {
    pub fn has_cycle(&self) -> bool {
        !self.flattened.is_empty()
    }
}

/// The declared roles of one task and their static dependency edges.
#[derive(Debug, Clone)]
pub struct RoleGraph<'a> {
    roles: &'a [AgentRole],
}

impl<'a> RoleGraph<'a> {
    pub fn new(roles: &'a [AgentRole]) -> Self {
        Self { roles }
    }

    /// Layer the roles by dependency. O(n^2) in the worst case.
    pub fn layers(&self) -> RoleLayers {
        let mut layers: Vec<Vec<AgentRole>> = Vec::new();
        let mut remaining: Vec<&AgentRole> = self.roles.iter().collect();
        let mut placed: HashSet<&str> = HashSet::new();
        let mut flattened = Vec::new();

        while !remaining.is_empty() {
            // Readiness is judged against prior layers only.
            let (ready, blocked): (Vec<&AgentRole>, Vec<&AgentRole>) =
                remaining.into_iter().partition(|role| {
                    role.dependencies
                        .iter()
                        .all(|dep| placed.contains(dep.as_str()))
                });

            if ready.is_empty() {
                flattened = blocked.iter().map(|r| r.agent_id.clone()).collect();
                obs::emit_cycle_flattened(&flattened);
                layers.push(blocked.into_iter().cloned().collect());
                break;
            }

            placed.extend(ready.iter().map(|r| r.agent_id.as_str()));
            layers.push(ready.into_iter().cloned().collect());
            remaining = blocked;
        }

        RoleLayers { layers, flattened }
    }
}

/// Layer `roles` by dependency; see [`RoleGraph::layers`].
pub fn build_layers(roles: &[AgentRole]) -> Vec<Vec<AgentRole>> {
    RoleGraph::new(roles).layers().layers
}

/// Ordered batches a workflow engine will drive for one task.
///
/// Each batch runs concurrently; batches run one after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub task_id: String,
    pub mode: CollaborationMode,
    pub batches: Vec<Vec<AgentRole>>,
    /// Set when a dependency cycle had to be flattened.
    pub flattened_cycle: Vec<String>,
}

impl ExecutionPlan {
    /// Resolve the batches for `task` according to its mode.
    ///
    /// - sequential / pipeline: one singleton batch per role, declared order
    /// - parallel / consensus: a single batch holding every role
    /// - hierarchical: dependency layers
    pub fn resolve(task: &CollaborationTask) -> Self {
        let roles = &task.agent_roles;
        let (batches, flattened_cycle) = match task.mode {
            CollaborationMode::Sequential | CollaborationMode::Pipeline => {
                (roles.iter().map(|r| vec![r.clone()]).collect(), Vec::new())
            }
            CollaborationMode::Parallel | CollaborationMode::Consensus => {
                let batches = if roles.is_empty() {
                    Vec::new()
                } else {
                    vec![roles.clone()]
                };
                (batches, Vec::new())
            }
            CollaborationMode::Hierarchical => {
                let layered = RoleGraph::new(roles).layers();
                (layered.layers, layered.flattened)
            }
        };

        Self {
            task_id: task.task_id.clone(),
            mode: task.mode,
            batches,
            flattened_cycle,
        }
    }

    /// Roles in execution order, batches concatenated.
    pub fn roles(&self) -> impl Iterator<Item = &AgentRole> {
        self.batches.iter().flatten()
    }

    pub fn role_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskRequest;
    use chrono::Utc;

    fn ids(layers: &[Vec<AgentRole>]) -> Vec<Vec<&str>> {
        layers
            .iter()
            .map(|layer| layer.iter().map(|r| r.agent_id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_chain_produces_one_layer_per_role() {
        let roles = vec![
            AgentRole::new("a", "first"),
            AgentRole::new("b", "second").depends_on(["a"]),
            AgentRole::new("c", "third").depends_on(["a", "b"]),
        ];
        let layers = build_layers(&roles);
        assert_eq!(ids(&layers), vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_independent_roles_share_layer_zero() {
        let roles = vec![
            AgentRole::new("market", "m"),
            AgentRole::new("sales", "s"),
            AgentRole::new("crm", "c").depends_on(["market", "sales"]),
        ];
        let layers = build_layers(&roles);
        assert_eq!(ids(&layers), vec![vec!["market", "sales"], vec!["crm"]]);
    }

    #[test]
    fn test_diamond_resolves_in_three_layers() {
        let roles = vec![
            AgentRole::new("a", "x"),
            AgentRole::new("b", "x").depends_on(["a"]),
            AgentRole::new("c", "x").depends_on(["a"]),
            AgentRole::new("d", "x").depends_on(["b", "c"]),
        ];
        let layers = build_layers(&roles);
        assert_eq!(ids(&layers), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_mutual_dependency_is_flattened_into_one_layer() {
        // Cycles are flattened, not rejected. Dependency order inside the
        // flattened layer is not honoured.
        let roles = vec![
            AgentRole::new("a", "x").depends_on(["b"]),
            AgentRole::new("b", "y").depends_on(["a"]),
        ];
        let layered = RoleGraph::new(&roles).layers();
        assert_eq!(ids(&layered.layers), vec![vec!["a", "b"]]);
        assert!(layered.has_cycle());
        assert_eq!(layered.flattened, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_cycle_after_acyclic_prefix_keeps_earlier_layers() {
        let roles = vec![
            AgentRole::new("root", "x"),
            AgentRole::new("b", "x").depends_on(["root", "c"]),
            AgentRole::new("c", "x").depends_on(["b"]),
        ];
        let layers = build_layers(&roles);
        assert_eq!(ids(&layers), vec![vec!["root"], vec!["b", "c"]]);
    }

    #[test]
    fn test_self_dependency_is_flattened() {
        let roles = vec![AgentRole::new("loop", "x").depends_on(["loop"])];
        let layers = build_layers(&roles);
        assert_eq!(ids(&layers), vec![vec!["loop"]]);
    }

    #[test]
    fn test_empty_role_list_yields_no_layers() {
        assert!(build_layers(&[]).is_empty());
    }

    #[test]
    fn test_every_role_placed_exactly_once_after_its_dependencies() {
        let roles = vec![
            AgentRole::new("e", "x").depends_on(["d"]),
            AgentRole::new("d", "x").depends_on(["b", "c"]),
            AgentRole::new("c", "x").depends_on(["a"]),
            AgentRole::new("b", "x"),
            AgentRole::new("a", "x"),
        ];
        let layers = build_layers(&roles);
        let position = |id: &str| {
            layers
                .iter()
                .position(|l| l.iter().any(|r| r.agent_id == id))
                .unwrap()
        };
        let total: usize = layers.iter().map(Vec::len).sum();
        assert_eq!(total, roles.len());
        for role in &roles {
            for dep in &role.dependencies {
                assert!(position(dep) < position(&role.agent_id));
            }
        }
    }

    fn task(mode: CollaborationMode) -> CollaborationTask {
        CollaborationTask::from_request(
            TaskRequest::new(
                "plan",
                "d",
                mode,
                vec![
                    AgentRole::new("a", "x"),
                    AgentRole::new("b", "y").depends_on(["a"]),
                ],
            ),
            Utc::now(),
        )
    }

    #[test]
    fn test_plan_batches_follow_mode() {
        let seq = ExecutionPlan::resolve(&task(CollaborationMode::Sequential));
        assert_eq!(ids(&seq.batches), vec![vec!["a"], vec!["b"]]);

        let par = ExecutionPlan::resolve(&task(CollaborationMode::Parallel));
        assert_eq!(ids(&par.batches), vec![vec!["a", "b"]]);

        let hier = ExecutionPlan::resolve(&task(CollaborationMode::Hierarchical));
        assert_eq!(ids(&hier.batches), vec![vec!["a"], vec!["b"]]);
        assert_eq!(hier.role_count(), 2);
    }
}
