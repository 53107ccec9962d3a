use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use baton_core::config::AppConfig;
use baton_core::event::SignalBus;

use baton_agent::agents::BUILTIN_AGENTS;
use baton_agent::{
    register_builtin_agents, AgentContext, HandoffChainResult, HandoffExecutor, HandoffResult,
    PauseStore, PausedChain, SignalLogger,
};
use baton_daemon::{ConfiguredAgents, ShellDaemon};

#[derive(Parser)]
#[command(name = "baton", version, about = "Agent handoff chains over a local daemon")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "baton.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a chain from a starting agent
    Run {
        /// Agent that takes the first step
        start_agent: String,
        /// Task description
        #[arg(trailing_var_arg = true)]
        task: Vec<String>,
        /// Seed a context value (repeatable). Values are parsed as JSON when possible.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Override chain.max_depth
        #[arg(long)]
        max_depth: Option<u32>,
    },
    /// Answer a paused chain and continue it
    Resume {
        execution_id: String,
        /// The answer
        #[arg(trailing_var_arg = true, required = true)]
        input: Vec<String>,
        /// Continue at this agent instead of the one that asked
        #[arg(long)]
        agent: Option<String>,
    },
    /// List paused chains
    Paused,
    /// List registered agents and check the handoff graph
    Agents,
    /// List skill functions the daemon can run
    Skills,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("baton=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Skills => {
            let daemon = ShellDaemon::from_config(&config.daemon);
            for function in daemon.catalog().functions() {
                println!("{}", function);
            }
        }
        Commands::Agents => {
            let engine = Engine::build(&config);
            for agent in engine.executor.agents() {
                let targets = agent.handoff_targets();
                if targets.is_empty() {
                    println!("{:<22} {}", agent.handoff_name(), agent.description());
                } else {
                    println!(
                        "{:<22} {} -> {}",
                        agent.handoff_name(),
                        agent.description(),
                        targets.join(", ")
                    );
                }
            }
            if let Err(e) = engine.executor.validate_graph() {
                println!("\nDangling handoff targets: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Paused => {
            let store = PauseStore::open(&config.storage.checkpoint_path())?;
            let paused = store.list()?;
            if paused.is_empty() {
                println!("No paused chains.");
            }
            for p in paused {
                println!(
                    "{}  {}  {}  \"{}\"",
                    p.execution_id,
                    p.paused_at.format("%Y-%m-%d %H:%M:%S"),
                    p.agent_name,
                    p.question
                );
            }
        }
        Commands::Run {
            start_agent,
            task,
            set,
            max_depth,
        } => {
            let mut context = AgentContext::new(task.join(" "))
                .with_max_depth(max_depth.unwrap_or(config.chain.max_depth));
            for pair in &set {
                let (key, value) = parse_assignment(pair)?;
                context.set(key, value);
            }

            let engine = Engine::build(&config);
            let result = engine.run(&config, &start_agent, context, None).await?;
            finish(&config, &result)?;
        }
        Commands::Resume {
            execution_id,
            input,
            agent,
        } => {
            let store = PauseStore::open(&config.storage.checkpoint_path())?;
            let engine = Engine::build(&config);
            let result =
                resume_paused(&engine, &config, &store, &execution_id, input.join(" "), agent)
                    .await?;
            finish(&config, &result)?;
        }
    }

    Ok(())
}

/// Executor wired to the shell daemon and signal bus.
struct Engine {
    executor: HandoffExecutor,
    bus: Arc<SignalBus>,
    shutdown: CancellationToken,
}

impl Engine {
    fn build(config: &AppConfig) -> Self {
        let shutdown = CancellationToken::new();
        let bus = Arc::new(SignalBus::new(config.signals.capacity));
        let daemon = Arc::new(ShellDaemon::from_config(&config.daemon).with_cancel(shutdown.clone()));
        let registry = Arc::new(ConfiguredAgents::new(
            BUILTIN_AGENTS
                .iter()
                .map(|s| s.to_string())
                .chain(config.agents.iter().cloned()),
        ));

        let executor =
            HandoffExecutor::new(daemon.clone(), registry, bus.clone()).with_config(&config.chain);
        register_builtin_agents(&executor, daemon);

        Self {
            executor,
            bus,
            shutdown,
        }
    }

    async fn run(
        &self,
        config: &AppConfig,
        start_agent: &str,
        context: AgentContext,
        input: Option<String>,
    ) -> anyhow::Result<HandoffChainResult> {
        let execution_id = context.execution_id().to_string();

        let log_cancel = CancellationToken::new();
        let logger = config.signals.log_dir().map(|dir| {
            let logger = SignalLogger::new(dir);
            tokio::spawn(logger.run_with(self.bus.subscribe(), execution_id.clone(), log_cancel.clone()))
        });

        let shutdown = self.shutdown.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running skill");
                shutdown.cancel();
            }
        });

        let result = match input {
            Some(answer) => {
                self.executor
                    .resume_with_input(context, &answer, start_agent)
                    .await
            }
            None => self.executor.execute(start_agent, context).await,
        };

        ctrl_c.abort();
        log_cancel.cancel();
        if let Some(handle) = logger {
            handle.await.ok();
        }
        Ok(result)
    }
}

/// Continue a stored pause. The entry is removed only after the resumed run
/// returns, so an interrupted resume can be retried.
async fn resume_paused(
    engine: &Engine,
    config: &AppConfig,
    store: &PauseStore,
    execution_id: &str,
    answer: String,
    agent: Option<String>,
) -> anyhow::Result<HandoffChainResult> {
    let Some(paused) = store.load(execution_id)? else {
        anyhow::bail!("No paused chain with execution id {}", execution_id);
    };

    let continue_agent = agent.unwrap_or_else(|| paused.agent_name.clone());
    info!(
        execution_id = %execution_id,
        agent = %continue_agent,
        depth = paused.context.depth(),
        "Resuming paused chain"
    );

    let result = engine
        .run(config, &continue_agent, paused.context, Some(answer))
        .await?;
    // `finish` saves any new pause from this run under the same id.
    store.remove(execution_id)?;
    Ok(result)
}

/// Print the outcome and trace, persist a pause, and exit non-zero on failure.
fn finish(config: &AppConfig, result: &HandoffChainResult) -> anyhow::Result<()> {
    let execution_id = result.context().execution_id();
    println!("Execution {}", execution_id);
    for (i, step) in result.trace().iter().enumerate() {
        println!("  {:>2}. {:<22} {}", i + 1, step.agent_name, describe_step(&step.result));
    }
    println!();

    match result {
        HandoffChainResult::Success {
            agent_name,
            result,
            message,
            ..
        } => {
            println!(
                "Completed by {}: {}",
                agent_name,
                message.as_deref().unwrap_or("done")
            );
            if !result.is_empty() {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }
        HandoffChainResult::Failure {
            agent_name, error, ..
        } => {
            println!("Failed at {}: {}", agent_name, error);
        }
        HandoffChainResult::NeedInput {
            agent_name,
            question,
            options,
            ..
        } => {
            if let Some(paused) = PausedChain::from_chain_result(result) {
                let store = PauseStore::open(&config.storage.checkpoint_path())?;
                store.save(&paused)?;
            }
            println!("{} asks: {}", agent_name, question);
            if let Some(options) = options {
                for option in options {
                    println!("  - {}", option);
                }
            }
            println!("\nAnswer with: baton resume {} <answer>", execution_id);
        }
        HandoffChainResult::MaxDepthReached {
            next_agent, depth, ..
        } => {
            println!(
                "Stopped at depth {} before running {} (max depth reached)",
                depth, next_agent
            );
        }
    }

    match result {
        HandoffChainResult::Success { .. } | HandoffChainResult::NeedInput { .. } => Ok(()),
        _ => std::process::exit(1),
    }
}

fn describe_step(result: &HandoffResult) -> String {
    match result {
        HandoffResult::Complete { message, .. } => {
            format!("complete{}", message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())
        }
        HandoffResult::Handoff {
            to_agent, reason, ..
        } => match reason {
            Some(reason) => format!("-> {} ({})", to_agent, reason),
            None => format!("-> {}", to_agent),
        },
        HandoffResult::Failure {
            error,
            recoverable,
            suggested_agent,
            ..
        } => match (recoverable, suggested_agent) {
            (true, Some(next)) => format!("failed, rerouting to {}: {}", next, error),
            _ => format!("failed: {}", error),
        },
        HandoffResult::NeedInput { question, .. } => format!("asks: {}", question),
    }
}

/// `key=value`, where `value` is JSON if it parses and a string otherwise.
fn parse_assignment(pair: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        anyhow::bail!("expected KEY=VALUE, got '{}'", pair);
    };
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in '{}'", pair);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use baton_agent::HandoffCapable;
    use baton_core::error::Result;
    use baton_test_utils::{RecordingSink, ScriptedDaemon, StaticRegistry};
    use futures::future::BoxFuture;

    /// Asks once, then never finishes once answered.
    struct Asker;

    impl HandoffCapable for Asker {
        fn handoff_name(&self) -> &str {
            "asker"
        }

        fn execute_with_context<'a>(
            &'a self,
            ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            Box::pin(async move {
                if ctx.has("user_input") {
                    futures::future::pending::<()>().await;
                }
                Ok(HandoffResult::need_input("asker", "Proceed?"))
            })
        }
    }

    struct Finisher;

    impl HandoffCapable for Finisher {
        fn handoff_name(&self) -> &str {
            "finisher"
        }

        fn execute_with_context<'a>(
            &'a self,
            _ctx: &'a AgentContext,
        ) -> BoxFuture<'a, Result<HandoffResult>> {
            Box::pin(async { Ok(HandoffResult::complete("finisher", Default::default())) })
        }
    }

    async fn paused_engine() -> (Engine, PauseStore, String) {
        let daemon = Arc::new(ScriptedDaemon::new());
        let bus = Arc::new(SignalBus::new(16));
        let executor = HandoffExecutor::new(daemon, Arc::new(StaticRegistry::empty()), Arc::new(RecordingSink::new()));
        executor.register_handoff_agent(Asker);
        executor.register_handoff_agent(Finisher);
        let engine = Engine {
            executor,
            bus,
            shutdown: CancellationToken::new(),
        };

        let first = engine
            .executor
            .execute("asker", AgentContext::new("confirm"))
            .await;
        let paused = PausedChain::from_chain_result(&first).unwrap();
        let execution_id = paused.execution_id.clone();
        let store = PauseStore::open_in_memory().unwrap();
        store.save(&paused).unwrap();
        (engine, store, execution_id)
    }

    #[tokio::test]
    async fn test_interrupted_resume_keeps_pause() {
        let (engine, store, execution_id) = paused_engine().await;
        let config = AppConfig::default();

        let resumed = tokio::time::timeout(
            Duration::from_millis(50),
            resume_paused(&engine, &config, &store, &execution_id, "yes".into(), None),
        )
        .await;

        assert!(resumed.is_err());
        assert!(store.load(&execution_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_finished_resume_removes_pause() {
        let (engine, store, execution_id) = paused_engine().await;
        let config = AppConfig::default();

        let result = resume_paused(
            &engine,
            &config,
            &store,
            &execution_id,
            "yes".into(),
            Some("finisher".into()),
        )
        .await
        .unwrap();

        assert!(result.is_success());
        assert!(store.load(&execution_id).unwrap().is_none());
        assert!(resume_paused(&engine, &config, &store, &execution_id, "yes".into(), None)
            .await
            .is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("source=/sdcard/a.txt").unwrap(),
            ("source".to_string(), serde_json::json!("/sdcard/a.txt"))
        );
        assert_eq!(
            parse_assignment("issues=[\"x\"]").unwrap(),
            ("issues".to_string(), serde_json::json!(["x"]))
        );
        assert_eq!(
            parse_assignment("index_refreshed=true").unwrap().1,
            serde_json::json!(true)
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }
}
