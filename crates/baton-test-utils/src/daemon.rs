use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;

use baton_core::traits::Daemon;
use baton_core::types::{DataMap, TaskResult};

/// One recorded `run_task` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCall {
    pub agent: String,
    pub skill: String,
    pub function: String,
    pub params: DataMap,
}

/// Daemon that replays scripted results per `skill.function`.
///
/// Results queued for the same function are returned in order; the last one
/// repeats once the queue is down to a single entry. Unscripted functions
/// return a `Failure`.
#[derive(Default)]
pub struct ScriptedDaemon {
    script: Mutex<HashMap<String, VecDeque<TaskResult>>>,
    calls: Mutex<Vec<TaskCall>>,
}

impl ScriptedDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for `skill.function`.
    pub fn on(self, skill: &str, function: &str, result: TaskResult) -> Self {
        self.push(skill, function, result);
        self
    }

    /// Queue a successful result for `skill.function`.
    pub fn ok(self, skill: &str, function: &str, data: serde_json::Value) -> Self {
        self.on(skill, function, TaskResult::success(crate::data(data)))
    }

    pub fn push(&self, skill: &str, function: &str, result: TaskResult) {
        let mut script = self.script.lock().unwrap();
        script
            .entry(format!("{}.{}", skill, function))
            .or_default()
            .push_back(result);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<TaskCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls made to a specific `skill.function`.
    pub fn calls_to(&self, skill: &str, function: &str) -> Vec<TaskCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.skill == skill && c.function == function)
            .collect()
    }

    fn next_result(&self, skill: &str, function: &str) -> TaskResult {
        let key = format!("{}.{}", skill, function);
        let mut script = self.script.lock().unwrap();
        match script.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => TaskResult::failure(format!("no scripted result for {}", key)),
        }
    }
}

impl Daemon for ScriptedDaemon {
    fn run_task<'a>(
        &'a self,
        agent: &'a str,
        skill: &'a str,
        function: &'a str,
        params: DataMap,
    ) -> BoxFuture<'a, TaskResult> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(TaskCall {
                agent: agent.to_string(),
                skill: skill.to_string(),
                function: function.to_string(),
                params,
            });
            self.next_result(skill, function)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_sticky_last() {
        let daemon = ScriptedDaemon::new()
            .ok("diagnostic", "find_issues", serde_json::json!({"count": 2}))
            .ok("diagnostic", "find_issues", serde_json::json!({"count": 0}));

        for expected in [2, 0, 0] {
            let result = daemon
                .run_task("a", "diagnostic", "find_issues", DataMap::new())
                .await;
            assert_eq!(result.data().unwrap()["count"], expected);
        }
        assert_eq!(daemon.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_fails() {
        let daemon = ScriptedDaemon::new();
        let result = daemon.run_task("a", "fs", "copy", DataMap::new()).await;
        assert!(matches!(result, TaskResult::Failure { .. }));
        assert_eq!(daemon.calls_to("fs", "copy").len(), 1);
    }
}
