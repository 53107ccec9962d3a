use baton_core::traits::{AgentInfo, AgentRegistry};

/// Fixed set of daemon-backed agent names.
#[derive(Default)]
pub struct StaticRegistry {
    agents: Vec<AgentInfo>,
}

impl StaticRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agents: names
                .into_iter()
                .map(|n| AgentInfo {
                    name: n.into(),
                    description: "scripted agent".to_string(),
                })
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl AgentRegistry for StaticRegistry {
    fn get_agent(&self, name: &str) -> Option<AgentInfo> {
        self.agents.iter().find(|a| a.name == name).cloned()
    }

    fn list(&self) -> Vec<AgentInfo> {
        self.agents.clone()
    }
}
