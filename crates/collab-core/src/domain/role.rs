//! Participant declarations for a collaboration task.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::{OrchestratorError, OrchestratorResult};

fn default_weight() -> f64 {
    1.0
}

fn default_required() -> bool {
    true
}

/// A declared participant in a collaboration task.
///
/// `required` is stored but does not change scheduling or failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRole {
    /// Unique within one task.
    pub agent_id: String,
    pub role_name: String,
    /// Descriptive only; forwarded to the agent in its request.
    #[serde(default)]
    pub responsibilities: Vec<String>,
    /// `agent_id`s that must complete before this role may start.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Consensus weight, `>= 0`.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl AgentRole {
    /// Create a role with no dependencies and weight `1.0`.
    pub fn new(agent_id: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role_name: role_name.into(),
            responsibilities: Vec::new(),
            dependencies: BTreeSet::new(),
            weight: default_weight(),
            required: default_required(),
        }
    }

    pub fn with_responsibilities<I, S>(mut self, responsibilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responsibilities = responsibilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Check the role-set invariants: unique ids, dependencies that resolve
/// inside the set, and finite non-negative weights.
///
/// Dependency cycles are not rejected here; layering flattens them.
pub fn validate_roles(roles: &[AgentRole]) -> OrchestratorResult<()> {
    let mut seen = HashSet::new();
    for role in roles {
        if !seen.insert(role.agent_id.as_str()) {
            return Err(OrchestratorError::DuplicateAgent(role.agent_id.clone()));
        }
        if !role.weight.is_finite() || role.weight < 0.0 {
            return Err(OrchestratorError::InvalidWeight {
                agent_id: role.agent_id.clone(),
                weight: role.weight,
            });
        }
    }

    for role in roles {
        if let Some(missing) = role
            .dependencies
            .iter()
            .find(|dep| !seen.contains(dep.as_str()))
        {
            return Err(OrchestratorError::UnknownDependency {
                agent_id: role.agent_id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_role_defaults() {
        let role = AgentRole::new("sales_agent", "sales");
        assert_eq!(role.weight, 1.0);
        assert!(role.required);
        assert!(role.dependencies.is_empty());
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let role: AgentRole =
            serde_json::from_str(r#"{"agent_id":"market","role_name":"analyst"}"#).unwrap();
        assert_eq!(role.weight, 1.0);
        assert!(role.required);
        assert!(role.responsibilities.is_empty());
    }

    #[test]
    fn test_validate_accepts_well_formed_set() {
        let roles = vec![
            AgentRole::new("a", "first"),
            AgentRole::new("b", "second").depends_on(["a"]),
        ];
        assert!(validate_roles(&roles).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_agent() {
        let roles = vec![AgentRole::new("a", "x"), AgentRole::new("a", "y")];
        assert!(matches!(
            validate_roles(&roles),
            Err(OrchestratorError::DuplicateAgent(id)) if id == "a"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let roles = vec![AgentRole::new("a", "x").depends_on(["missing"])];
        assert!(matches!(
            validate_roles(&roles),
            Err(OrchestratorError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let roles = vec![AgentRole::new("a", "x").with_weight(-0.5)];
        assert!(matches!(
            validate_roles(&roles),
            Err(OrchestratorError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_validate_allows_cycles() {
        let roles = vec![
            AgentRole::new("a", "x").depends_on(["b"]),
            AgentRole::new("b", "y").depends_on(["a"]),
        ];
        assert!(validate_roles(&roles).is_ok());
    }
}
