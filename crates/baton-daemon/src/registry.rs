use baton_core::traits::{AgentInfo, AgentRegistry};

/// Agent names the daemon can serve through its generic task.
///
/// Built from the built-in agent names plus the `agents` list in config.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredAgents {
    agents: Vec<AgentInfo>,
}

impl ConfiguredAgents {
    /// Registry of `names`, deduplicated, first occurrence kept.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut agents: Vec<AgentInfo> = Vec::new();
        for name in names {
            let name = name.into();
            if name.trim().is_empty() || agents.iter().any(|a| a.name == name) {
                continue;
            }
            agents.push(AgentInfo {
                name,
                description: "daemon task".to_string(),
            });
        }
        Self { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentRegistry for ConfiguredAgents {
    fn get_agent(&self, name: &str) -> Option<AgentInfo> {
        self.agents.iter().find(|a| a.name == name).cloned()
    }

    fn list(&self) -> Vec<AgentInfo> {
        self.agents.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_and_lookup() {
        let builtin = ["setup_agent", "diagnostic_agent"];
        let configured = vec!["lint_agent".to_string(), "setup_agent".to_string(), " ".to_string()];
        let registry = ConfiguredAgents::new(
            builtin
                .iter()
                .map(|s| s.to_string())
                .chain(configured),
        );

        assert_eq!(registry.len(), 3);
        assert!(registry.get_agent("lint_agent").is_some());
        assert!(registry.get_agent("ghost_agent").is_none());
        let names: Vec<String> = registry.list().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["setup_agent", "diagnostic_agent", "lint_agent"]);
    }
}
