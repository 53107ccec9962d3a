use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use baton_core::config::ChainConfig;
use baton_core::error::{BatonError, Result};
use baton_core::signal::{Signal, SignalType};
use baton_core::traits::{AgentRegistry, Daemon, SignalSink};
use baton_core::types::DataMap;

use crate::capable::HandoffCapable;
use crate::context::AgentContext;
use crate::keys;
use crate::result::{HandoffChainResult, HandoffResult, HandoffStep};

/// Source name used for signals the executor emits on its own behalf.
pub const EXECUTOR_NAME: &str = "handoff_executor";

/// Skill and function run for agents that only the daemon registry knows.
const FALLBACK_SKILL: &str = "diagnostic";
const FALLBACK_FUNCTION: &str = "run";

/// Runs handoff chains.
///
/// Starting from a named agent, the executor repeatedly runs the current
/// agent, applies its result to the shared context, and moves to the next
/// agent until one completes, fails terminally, asks for input, or the
/// context's depth ceiling is hit.
pub struct HandoffExecutor {
    agents: RwLock<HashMap<String, Arc<dyn HandoffCapable>>>,
    daemon: Arc<dyn Daemon>,
    registry: Arc<dyn AgentRegistry>,
    signals: Arc<dyn SignalSink>,
    warn_on_unhandled_target: bool,
}

impl HandoffExecutor {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        registry: Arc<dyn AgentRegistry>,
        signals: Arc<dyn SignalSink>,
    ) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            daemon,
            registry,
            signals,
            warn_on_unhandled_target: true,
        }
    }

    /// Apply chain settings from config.
    pub fn with_config(mut self, config: &ChainConfig) -> Self {
        self.warn_on_unhandled_target = config.warn_on_unhandled_target;
        self
    }

    pub fn daemon(&self) -> Arc<dyn Daemon> {
        self.daemon.clone()
    }

    /// Register an agent under its handoff name.
    ///
    /// A later registration under the same name replaces the earlier one,
    /// which is returned.
    pub fn register_handoff_agent(
        &self,
        agent: impl HandoffCapable,
    ) -> Option<Arc<dyn HandoffCapable>> {
        self.register_arc(Arc::new(agent))
    }

    pub fn register_arc(&self, agent: Arc<dyn HandoffCapable>) -> Option<Arc<dyn HandoffCapable>> {
        let name = agent.handoff_name().to_string();
        let previous = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), agent);
        if previous.is_some() {
            warn!(agent = %name, "Handoff agent re-registered, previous registration replaced");
        } else {
            debug!(agent = %name, "Handoff agent registered");
        }
        previous
    }

    pub fn unregister_handoff_agent(&self, name: &str) -> Option<Arc<dyn HandoffCapable>> {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HandoffCapable>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered agents, sorted by name.
    pub fn agents(&self) -> Vec<Arc<dyn HandoffCapable>> {
        let mut agents: Vec<_> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.handoff_name().cmp(b.handoff_name()));
        agents
    }

    /// Whether `name` resolves to a registered agent or a daemon-backed one.
    pub fn is_known(&self, name: &str) -> bool {
        self.get(name).is_some() || self.registry.get_agent(name).is_some()
    }

    /// Declared handoff targets that resolve to nothing, as `(agent, target)`.
    pub fn dangling_targets(&self) -> Vec<(String, String)> {
        let mut dangling = Vec::new();
        for agent in self.agents() {
            for target in agent.handoff_targets() {
                if !self.is_known(target) {
                    dangling.push((agent.handoff_name().to_string(), target.to_string()));
                }
            }
        }
        dangling
    }

    /// Fail if any registered agent declares a target nothing resolves.
    pub fn validate_graph(&self) -> Result<()> {
        let dangling = self.dangling_targets();
        if dangling.is_empty() {
            return Ok(());
        }
        let listed: Vec<String> = dangling
            .iter()
            .map(|(agent, target)| format!("{} -> {}", agent, target))
            .collect();
        Err(BatonError::AgentNotFound(listed.join(", ")))
    }

    /// Run a chain from `start_agent` until it reaches a terminal outcome.
    pub async fn execute(&self, start_agent: &str, mut context: AgentContext) -> HandoffChainResult {
        let execution_id = context.execution_id().to_string();
        let mut trace: Vec<HandoffStep> = Vec::new();
        let mut current = start_agent.to_string();

        info!(
            execution_id = %execution_id,
            start_agent = %current,
            max_depth = context.max_depth(),
            "Handoff chain started"
        );

        while !context.is_max_depth_reached() {
            let depth = context.increment_depth();
            let result = self.execute_agent(&current, &context).await;
            trace.push(HandoffStep::new(current.clone(), result.clone(), depth));

            debug!(
                execution_id = %execution_id,
                agent = %current,
                depth,
                kind = result.kind(),
                "Handoff step complete"
            );

            match result {
                HandoffResult::Complete {
                    agent_name,
                    result,
                    message,
                } => {
                    context.add_result(&agent_name, result.clone(), true);
                    self.emit(
                        SignalType::Success,
                        &agent_name,
                        &execution_id,
                        signal_data([
                            ("depth", serde_json::json!(depth)),
                            ("message", serde_json::json!(message)),
                        ]),
                    );
                    info!(execution_id = %execution_id, agent = %agent_name, depth, "Handoff chain completed");
                    return HandoffChainResult::Success {
                        agent_name,
                        result,
                        message,
                        trace,
                        context,
                    };
                }
                HandoffResult::Handoff {
                    from_agent,
                    to_agent,
                    reason,
                    context_updates,
                } => {
                    context.add_result(&from_agent, context_updates.clone(), true);
                    context.merge(context_updates);
                    self.check_target(&to_agent, &context);
                    self.emit(
                        SignalType::Working,
                        &from_agent,
                        &to_agent,
                        signal_data([
                            ("depth", serde_json::json!(depth)),
                            ("reason", serde_json::json!(reason)),
                            ("execution_id", serde_json::json!(execution_id)),
                        ]),
                    );
                    info!(
                        from = %from_agent,
                        to = %to_agent,
                        depth,
                        reason = reason.as_deref().unwrap_or(""),
                        "Handoff"
                    );
                    current = to_agent;
                }
                HandoffResult::Failure {
                    agent_name,
                    error,
                    recoverable,
                    suggested_agent,
                } => {
                    context.add_error(&agent_name, &error, recoverable);
                    match suggested_agent {
                        Some(next) if recoverable => {
                            warn!(
                                agent = %agent_name,
                                next = %next,
                                depth,
                                error = %error,
                                "Recoverable failure, rerouting"
                            );
                            current = next;
                        }
                        _ => {
                            self.emit(
                                SignalType::Failure,
                                &agent_name,
                                &execution_id,
                                signal_data([
                                    ("error", serde_json::json!(error)),
                                    ("recoverable", serde_json::json!(recoverable)),
                                    ("depth", serde_json::json!(depth)),
                                ]),
                            );
                            error!(
                                execution_id = %execution_id,
                                agent = %agent_name,
                                depth,
                                error = %error,
                                "Handoff chain failed"
                            );
                            return HandoffChainResult::Failure {
                                agent_name,
                                error,
                                trace,
                                context,
                            };
                        }
                    }
                }
                HandoffResult::NeedInput {
                    agent_name,
                    question,
                    options,
                } => {
                    info!(execution_id = %execution_id, agent = %agent_name, depth, "Handoff chain paused for input");
                    return HandoffChainResult::NeedInput {
                        agent_name,
                        question,
                        options,
                        trace,
                        context,
                    };
                }
            }
        }

        let depth = context.depth();
        self.emit(
            SignalType::Blocked,
            EXECUTOR_NAME,
            &current,
            signal_data([
                ("reason", serde_json::json!("max depth reached")),
                ("depth", serde_json::json!(depth)),
                ("max_depth", serde_json::json!(context.max_depth())),
                ("execution_id", serde_json::json!(execution_id)),
            ]),
        );
        warn!(execution_id = %execution_id, next_agent = %current, depth, "Handoff chain hit max depth");

        HandoffChainResult::MaxDepthReached {
            next_agent: current,
            depth,
            trace,
            context,
        }
    }

    /// Resume a paused chain: store `input` under `user_input` and continue
    /// at `continue_agent`. Depth carries over from before the pause.
    pub async fn resume_with_input(
        &self,
        mut context: AgentContext,
        input: &str,
        continue_agent: &str,
    ) -> HandoffChainResult {
        context.set_key(keys::USER_INPUT, input.to_string());
        self.execute(continue_agent, context).await
    }

    /// Run a single agent step, containing any error or panic as a failure
    /// of that agent.
    pub async fn execute_agent(&self, name: &str, context: &AgentContext) -> HandoffResult {
        if let Some(agent) = self.get(name) {
            let step = AssertUnwindSafe(async { agent.execute_with_context(context).await });
            return match step.catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(agent = %name, error = %e, "Agent returned an error");
                    HandoffResult::failure(name, e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(agent = %name, panic = %message, "Agent panicked");
                    HandoffResult::failure(name, format!("Agent panicked: {}", message))
                }
            };
        }

        match self.registry.get_agent(name) {
            Some(info) => {
                debug!(agent = %info.name, "No handoff agent registered, running daemon task");
                let mut params = DataMap::new();
                params.insert("task".into(), serde_json::json!(context.task_description()));
                params.insert(
                    "execution_id".into(),
                    serde_json::json!(context.execution_id().as_str()),
                );
                params.insert("context".into(), serde_json::json!(context.data()));
                let task = self
                    .daemon
                    .run_task(name, FALLBACK_SKILL, FALLBACK_FUNCTION, params)
                    .await;
                HandoffResult::from_task_result(name, task)
            }
            None => HandoffResult::failure(name, format!("Agent not found: {}", name)),
        }
    }

    fn check_target(&self, target: &str, context: &AgentContext) {
        if !self.warn_on_unhandled_target {
            return;
        }
        match self.get(target) {
            Some(agent) if !agent.can_handle(context) => {
                warn!(agent = %target, "Handoff target does not report it can handle this context");
            }
            Some(_) => {}
            None if self.registry.get_agent(target).is_none() => {
                warn!(agent = %target, "Handoff target is not registered");
            }
            None => {}
        }
    }

    fn emit(&self, signal_type: SignalType, source: &str, target: &str, data: DataMap) {
        if let Err(e) = self
            .signals
            .emit(Signal::new(signal_type, source, target, data))
        {
            warn!(signal = %signal_type, error = %e, "Signal emission failed");
        }
    }
}

fn signal_data<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> DataMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_core::types::TaskResult;
    use baton_test_utils::{FailingSink, RecordingSink, ScriptedDaemon, StaticRegistry};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Agent returning a fixed result and counting calls.
    struct Fixed {
        name: &'static str,
        result: HandoffResult,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, result: HandoffResult) -> Self {
            Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl HandoffCapable for Fixed {
        fn handoff_name(&self) -> &str {
            self.name
        }

        fn execute_with_context<'a>(
            &'a self,
            _ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.result.clone();
            Box::pin(async move { Ok(result) })
        }
    }

    /// Agent that records what it saw under a key, then hands off.
    struct Observer {
        name: &'static str,
        key: &'static str,
        next: Option<HandoffResult>,
        seen: std::sync::Mutex<Vec<Option<String>>>,
    }

    impl HandoffCapable for Observer {
        fn handoff_name(&self) -> &str {
            self.name
        }

        fn execute_with_context<'a>(
            &'a self,
            ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            Box::pin(async move {
                self.seen
                    .lock()
                    .unwrap()
                    .push(ctx.get::<String>(self.key));
                Ok(self
                    .next
                    .clone()
                    .unwrap_or_else(|| HandoffResult::complete(self.name, DataMap::new())))
            })
        }
    }

    struct Erroring;

    impl HandoffCapable for Erroring {
        fn handoff_name(&self) -> &str {
            "erroring_agent"
        }

        fn execute_with_context<'a>(
            &'a self,
            _ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            Box::pin(async move {
                Err(BatonError::MissingContext {
                    key: "source_path".into(),
                })
            })
        }
    }

    struct Panicking;

    impl HandoffCapable for Panicking {
        fn handoff_name(&self) -> &str {
            "panicking_agent"
        }

        fn execute_with_context<'a>(
            &'a self,
            _ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            Box::pin(async move { explode() })
        }
    }

    /// Completes, but never claims it can handle a context.
    struct Reluctant {
        runs: AtomicUsize,
        checks: AtomicUsize,
    }

    impl HandoffCapable for Reluctant {
        fn handoff_name(&self) -> &str {
            "reluctant"
        }

        fn can_handle(&self, _ctx: &AgentContext) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            false
        }

        fn execute_with_context<'a>(
            &'a self,
            _ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(HandoffResult::complete("reluctant", DataMap::new())) })
        }
    }

    /// Signals `entered`, waits for `release`, then hands off to `late`.
    struct Gate {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    impl HandoffCapable for Gate {
        fn handoff_name(&self) -> &str {
            "gate"
        }

        fn execute_with_context<'a>(
            &'a self,
            _ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            Box::pin(async move {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(HandoffResult::handoff("gate", "late", "go", DataMap::new()))
            })
        }
    }

    fn gate() -> (Gate, Arc<tokio::sync::Notify>, Arc<tokio::sync::Notify>) {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let gate = Gate {
            entered: entered.clone(),
            release: release.clone(),
        };
        (gate, entered, release)
    }

    fn explode() -> Result<HandoffResult> {
        panic!("index out of bounds")
    }

    fn executor_with(
        daemon: Arc<ScriptedDaemon>,
        registry: StaticRegistry,
        sink: Arc<RecordingSink>,
    ) -> HandoffExecutor {
        HandoffExecutor::new(daemon, Arc::new(registry), sink)
    }

    fn executor() -> (HandoffExecutor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let exec = executor_with(
            Arc::new(ScriptedDaemon::new()),
            StaticRegistry::empty(),
            sink.clone(),
        );
        (exec, sink)
    }

    fn data(pairs: &[(&str, &str)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_complete_ends_chain_with_single_step() {
        let (exec, sink) = executor();
        exec.register_handoff_agent(Fixed::new(
            "a",
            HandoffResult::complete("a", data(&[("done", "yes")])),
        ));

        let outcome = exec.execute("a", AgentContext::new("t")).await;
        match &outcome {
            HandoffChainResult::Success { agent_name, result, .. } => {
                assert_eq!(agent_name, "a");
                assert_eq!(result["done"], "yes");
            }
            other => panic!("expected success, got {}", other.outcome()),
        }
        assert_eq!(outcome.trace().len(), 1);
        assert_eq!(outcome.context().depth(), 1);
        assert_eq!(outcome.context().results().len(), 1);
        assert_eq!(sink.types(), vec![SignalType::Success]);
    }

    #[tokio::test]
    async fn test_self_handoff_hits_max_depth() {
        let (exec, sink) = executor();
        exec.register_handoff_agent(Fixed::new(
            "looper",
            HandoffResult::handoff("looper", "looper", "again", DataMap::new()),
        ));

        let outcome = exec
            .execute("looper", AgentContext::new("loop").with_max_depth(2))
            .await;
        match &outcome {
            HandoffChainResult::MaxDepthReached { next_agent, depth, .. } => {
                assert_eq!(next_agent, "looper");
                assert_eq!(*depth, 2);
            }
            other => panic!("expected max depth, got {}", other.outcome()),
        }
        assert_eq!(outcome.trace().len(), 2);
        let depths: Vec<u32> = outcome.trace().iter().map(|s| s.depth).collect();
        assert_eq!(depths, vec![1, 2]);
        assert_eq!(
            sink.types(),
            vec![SignalType::Working, SignalType::Working, SignalType::Blocked]
        );
    }

    #[tokio::test]
    async fn test_context_updates_visible_to_next_agent_only() {
        let (exec, _) = executor();
        let first = Arc::new(Observer {
            name: "first",
            key: "k",
            next: Some(HandoffResult::handoff("first", "second", "pass", data(&[("k", "v")]))),
            seen: Default::default(),
        });
        let second = Arc::new(Observer {
            name: "second",
            key: "k",
            next: None,
            seen: Default::default(),
        });
        exec.register_arc(first.clone());
        exec.register_arc(second.clone());

        let outcome = exec.execute("first", AgentContext::new("t")).await;
        assert!(outcome.is_success());
        assert_eq!(*first.seen.lock().unwrap(), vec![None]);
        assert_eq!(*second.seen.lock().unwrap(), vec![Some("v".to_string())]);
    }

    #[tokio::test]
    async fn test_recoverable_failures_consume_depth() {
        let (exec, _) = executor();
        exec.register_handoff_agent(Fixed::new(
            "r1",
            HandoffResult::recoverable("r1", "flaky", "r2"),
        ));
        exec.register_handoff_agent(Fixed::new(
            "r2",
            HandoffResult::recoverable("r2", "flaky", "r3"),
        ));
        exec.register_handoff_agent(Fixed::new(
            "r3",
            HandoffResult::recoverable("r3", "flaky", "done"),
        ));
        exec.register_handoff_agent(Fixed::new(
            "done",
            HandoffResult::complete("done", DataMap::new()),
        ));

        let outcome = exec.execute("r1", AgentContext::new("t")).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.trace().len(), 4);
        assert_eq!(outcome.context().depth(), 4);
        assert_eq!(outcome.context().error_history().len(), 3);
        assert_eq!(outcome.visited(), vec!["r1", "r2", "r3", "done"]);
    }

    #[tokio::test]
    async fn test_alternating_recovery_hits_max_depth() {
        let (exec, _) = executor();
        exec.register_handoff_agent(Fixed::new("x", HandoffResult::recoverable("x", "e", "y")));
        exec.register_handoff_agent(Fixed::new("y", HandoffResult::recoverable("y", "e", "x")));

        let outcome = exec.execute("x", AgentContext::new("t").with_max_depth(5)).await;
        assert!(matches!(outcome, HandoffChainResult::MaxDepthReached { depth: 5, .. }));
        assert_eq!(outcome.trace().len(), 5);
    }

    #[tokio::test]
    async fn test_non_recoverable_failure_is_terminal() {
        let (exec, sink) = executor();
        let next = Arc::new(Fixed::new("next", HandoffResult::complete("next", DataMap::new())));
        exec.register_handoff_agent(Fixed::new(
            "bad",
            HandoffResult::Failure {
                agent_name: "bad".into(),
                error: "disk full".into(),
                recoverable: false,
                suggested_agent: Some("next".into()),
            },
        ));
        exec.register_arc(next.clone());

        let outcome = exec.execute("bad", AgentContext::new("t")).await;
        match &outcome {
            HandoffChainResult::Failure { agent_name, error, .. } => {
                assert_eq!(agent_name, "bad");
                assert_eq!(error, "disk full");
            }
            other => panic!("expected failure, got {}", other.outcome()),
        }
        assert_eq!(next.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.context().error_history().len(), 1);
        assert_eq!(sink.types(), vec![SignalType::Failure]);
    }

    #[tokio::test]
    async fn test_recoverable_without_suggestion_is_terminal() {
        let (exec, _) = executor();
        exec.register_handoff_agent(Fixed::new(
            "a",
            HandoffResult::Failure {
                agent_name: "a".into(),
                error: "timeout".into(),
                recoverable: true,
                suggested_agent: None,
            },
        ));
        let outcome = exec.execute("a", AgentContext::new("t")).await;
        assert!(matches!(outcome, HandoffChainResult::Failure { .. }));
        assert!(outcome.context().error_history()[0].recoverable);
    }

    #[tokio::test]
    async fn test_need_input_pauses_without_terminal_signal() {
        let (exec, sink) = executor();
        exec.register_handoff_agent(Fixed::new(
            "ask",
            HandoffResult::need_choice("ask", "Which one?", &["a", "b"]),
        ));
        let outcome = exec.execute("ask", AgentContext::new("t")).await;
        match &outcome {
            HandoffChainResult::NeedInput { question, options, .. } => {
                assert_eq!(question, "Which one?");
                assert_eq!(options.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
            }
            other => panic!("expected need input, got {}", other.outcome()),
        }
        assert!(sink.signals().is_empty());
    }

    #[tokio::test]
    async fn test_resume_sets_user_input_and_keeps_depth() {
        let (exec, _) = executor();
        let observer = Arc::new(Observer {
            name: "answer",
            key: "user_input",
            next: None,
            seen: Default::default(),
        });
        exec.register_arc(observer.clone());
        exec.register_handoff_agent(Fixed::new("ask", HandoffResult::need_input("ask", "Path?")));

        let paused = exec.execute("ask", AgentContext::new("t")).await;
        let ctx = paused.into_context();
        assert_eq!(ctx.depth(), 1);

        let resumed = exec.resume_with_input(ctx, "/sdcard", "answer").await;
        assert!(resumed.is_success());
        assert_eq!(resumed.context().depth(), 2);
        assert_eq!(*observer.seen.lock().unwrap(), vec![Some("/sdcard".to_string())]);
        assert_eq!(resumed.context().get_str("user_input"), Some("/sdcard"));
    }

    #[tokio::test]
    async fn test_error_is_contained_as_failure() {
        let (exec, _) = executor();
        exec.register_handoff_agent(Erroring);
        let result = exec.execute_agent("erroring_agent", &AgentContext::new("t")).await;
        match result {
            HandoffResult::Failure { agent_name, recoverable, suggested_agent, error } => {
                assert_eq!(agent_name, "erroring_agent");
                assert!(!recoverable);
                assert!(suggested_agent.is_none());
                assert!(error.contains("source_path"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained_as_failure() {
        let (exec, _) = executor();
        exec.register_handoff_agent(Panicking);
        let outcome = exec.execute("panicking_agent", AgentContext::new("t")).await;
        match &outcome {
            HandoffChainResult::Failure { agent_name, error, .. } => {
                assert_eq!(agent_name, "panicking_agent");
                assert!(error.contains("index out of bounds"));
            }
            other => panic!("expected failure, got {}", other.outcome()),
        }
        assert_eq!(outcome.trace().len(), 1);
    }

    #[tokio::test]
    async fn test_handoff_ignores_can_handle() {
        for warn_on_unhandled_target in [true, false] {
            let sink = Arc::new(RecordingSink::new());
            let exec = executor_with(Arc::new(ScriptedDaemon::new()), StaticRegistry::empty(), sink)
                .with_config(&ChainConfig {
                    max_depth: 10,
                    warn_on_unhandled_target,
                });
            let reluctant = Arc::new(Reluctant {
                runs: AtomicUsize::new(0),
                checks: AtomicUsize::new(0),
            });
            exec.register_arc(reluctant.clone());
            exec.register_handoff_agent(Fixed::new(
                "router",
                HandoffResult::handoff("router", "reluctant", "pass", DataMap::new()),
            ));

            let outcome = exec.execute("router", AgentContext::new("t")).await;

            assert!(outcome.is_success(), "got {}", outcome.outcome());
            assert_eq!(outcome.visited(), vec!["router", "reluctant"]);
            assert_eq!(reluctant.runs.load(Ordering::SeqCst), 1);
            let expected_checks = usize::from(warn_on_unhandled_target);
            assert_eq!(reluctant.checks.load(Ordering::SeqCst), expected_checks);
        }
    }

    #[tokio::test]
    async fn test_agent_registered_mid_chain_is_dispatched() {
        let (exec, _) = executor();
        let (gate, entered, release) = gate();
        exec.register_handoff_agent(gate);

        let (outcome, _) = tokio::join!(exec.execute("gate", AgentContext::new("t")), async {
            entered.notified().await;
            exec.register_handoff_agent(Fixed::new(
                "late",
                HandoffResult::complete("late", DataMap::new()),
            ));
            release.notify_one();
        });

        assert!(outcome.is_success(), "got {}", outcome.outcome());
        assert_eq!(outcome.visited(), vec!["gate", "late"]);
    }

    #[tokio::test]
    async fn test_agent_unregistered_mid_chain_is_not_found() {
        let (exec, _) = executor();
        let (gate, entered, release) = gate();
        exec.register_handoff_agent(gate);
        exec.register_handoff_agent(Fixed::new(
            "late",
            HandoffResult::complete("late", DataMap::new()),
        ));

        let (outcome, removed) = tokio::join!(exec.execute("gate", AgentContext::new("t")), async {
            entered.notified().await;
            let removed = exec.unregister_handoff_agent("late");
            release.notify_one();
            removed
        });

        assert!(removed.is_some());
        match &outcome {
            HandoffChainResult::Failure { agent_name, error, .. } => {
                assert_eq!(agent_name, "late");
                assert!(error.contains("Agent not found"));
            }
            other => panic!("expected failure, got {}", other.outcome()),
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_fails() {
        let (exec, _) = executor();
        let outcome = exec.execute("ghost_agent", AgentContext::new("t")).await;
        match &outcome {
            HandoffChainResult::Failure { agent_name, error, .. } => {
                assert_eq!(agent_name, "ghost_agent");
                assert!(error.contains("Agent not found"));
            }
            other => panic!("expected failure, got {}", other.outcome()),
        }
    }

    #[tokio::test]
    async fn test_registry_fallback_runs_daemon_task() {
        let daemon = Arc::new(
            ScriptedDaemon::new().ok("diagnostic", "run", serde_json::json!({"status": "ok"})),
        );
        let sink = Arc::new(RecordingSink::new());
        let exec = executor_with(daemon.clone(), StaticRegistry::new(["lint_agent"]), sink);

        let outcome = exec
            .execute("lint_agent", AgentContext::new("lint the tree"))
            .await;
        assert!(outcome.is_success());
        let calls = daemon.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].agent, "lint_agent");
        assert_eq!(calls[0].params["task"], "lint the tree");
    }

    #[tokio::test]
    async fn test_registered_agent_preferred_over_fallback() {
        let daemon = Arc::new(ScriptedDaemon::new());
        let sink = Arc::new(RecordingSink::new());
        let exec = executor_with(daemon.clone(), StaticRegistry::new(["a"]), sink);
        exec.register_handoff_agent(Fixed::new("a", HandoffResult::complete("a", DataMap::new())));

        assert!(exec.execute("a", AgentContext::new("t")).await.is_success());
        assert_eq!(daemon.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_failure_maps_task_error() {
        let daemon = Arc::new(ScriptedDaemon::new().on(
            "diagnostic",
            "run",
            TaskResult::failure("exit code 1: boom"),
        ));
        let sink = Arc::new(RecordingSink::new());
        let exec = executor_with(daemon, StaticRegistry::new(["lint_agent"]), sink);
        let outcome = exec.execute("lint_agent", AgentContext::new("t")).await;
        assert!(matches!(
            outcome,
            HandoffChainResult::Failure { ref error, .. } if error == "exit code 1: boom"
        ));
    }

    #[tokio::test]
    async fn test_signal_failure_does_not_change_outcome() {
        let exec = HandoffExecutor::new(
            Arc::new(ScriptedDaemon::new()),
            Arc::new(StaticRegistry::empty()),
            Arc::new(FailingSink),
        );
        exec.register_handoff_agent(Fixed::new(
            "a",
            HandoffResult::handoff("a", "b", "next", DataMap::new()),
        ));
        exec.register_handoff_agent(Fixed::new("b", HandoffResult::complete("b", DataMap::new())));

        let outcome = exec.execute("a", AgentContext::new("t")).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.trace().len(), 2);
    }

    #[test]
    fn test_registration_last_wins() {
        let (exec, _) = executor();
        assert!(exec
            .register_handoff_agent(Fixed::new("a", HandoffResult::complete("a", DataMap::new())))
            .is_none());
        assert!(exec
            .register_handoff_agent(Fixed::new("a", HandoffResult::need_input("a", "?")))
            .is_some());
        assert_eq!(exec.agents().len(), 1);
        assert!(exec.unregister_handoff_agent("a").is_some());
        assert!(exec.get("a").is_none());
        assert!(exec.unregister_handoff_agent("a").is_none());
    }

    #[test]
    fn test_dangling_targets() {
        struct Pointer;
        impl HandoffCapable for Pointer {
            fn handoff_name(&self) -> &str {
                "pointer"
            }
            fn handoff_targets(&self) -> &[&str] {
                &["present", "absent"]
            }
            fn execute_with_context<'a>(
                &'a self,
                _ctx: &'a AgentContext,
            ) -> BoxFuture<'a, Result<HandoffResult>> {
                Box::pin(async move { Ok(HandoffResult::need_input("pointer", "?")) })
            }
        }

        let (exec, _) = executor();
        exec.register_handoff_agent(Pointer);
        exec.register_handoff_agent(Fixed::new(
            "present",
            HandoffResult::complete("present", DataMap::new()),
        ));
        assert_eq!(
            exec.dangling_targets(),
            vec![("pointer".to_string(), "absent".to_string())]
        );
        let err = exec.validate_graph().unwrap_err();
        assert!(err.to_string().contains("pointer -> absent"));

        exec.register_handoff_agent(Fixed::new(
            "absent",
            HandoffResult::complete("absent", DataMap::new()),
        ));
        assert!(exec.validate_graph().is_ok());
    }
}
