//! Boot-time wiring.
//!
//! Everything shared between loops is built here once: safety policy,
//! executor, tool registry, scheduler, supervisor and the agent loop. The
//! registry is frozen before the first turn runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::{AgentLoop, HeartbeatRunner, Router, SubagentSupervisor, spawn_heartbeat};
use crate::channels::{ChannelManager, IncomingMessage, MessageStream};
use crate::config::Config;
use crate::llm::{LlmProvider, Reasoning, UsageTracker};
use crate::safety::SafetyPolicy;
use crate::sandbox::CommandExecutor;
use crate::scheduler::{JobStore, JsonFileStore, Scheduler, SystemClock};
use crate::tools::builtin::{
    CronTool, EditFileTool, ExecTool, HttpTool, ListDirTool, MessageTool, ReadFileTool,
    SpawnTool, WriteFileTool,
};
use crate::tools::{ToolDispatcher, ToolError, ToolRegistry};
use crate::workspace::Workspace;

/// Depth of the internal inbound queue (subagent reports).
const INBOUND_QUEUE: usize = 64;

/// The assembled runtime.
pub struct App {
    pub config: Config,
    pub workspace: Workspace,
    pub channels: Arc<ChannelManager>,
    pub scheduler: Arc<Scheduler>,
    pub supervisor: SubagentSupervisor,
    pub agent: Arc<AgentLoop>,
    inbound: mpsc::Receiver<IncomingMessage>,
}

/// Build the scheduler over the configured durable store.
pub fn build_scheduler(config: &Config) -> Arc<Scheduler> {
    let store: Arc<dyn JobStore> = Arc::new(JsonFileStore::new(&config.scheduler.store_path));
    Arc::new(Scheduler::new(store, Arc::new(SystemClock)))
}

/// Register every built-in tool.
pub fn builtin_registry(
    policy: &Arc<SafetyPolicy>,
    channels: &Arc<ChannelManager>,
    scheduler: &Arc<Scheduler>,
    supervisor: &SubagentSupervisor,
) -> Result<ToolRegistry, ToolError> {
    let executor = Arc::new(CommandExecutor::new(policy.clone()));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ExecTool::new(executor)))?;
    registry.register(Arc::new(ReadFileTool::new(policy.clone())))?;
    registry.register(Arc::new(WriteFileTool::new(policy.clone())))?;
    registry.register(Arc::new(EditFileTool::new(policy.clone())))?;
    registry.register(Arc::new(ListDirTool::new(policy.clone())))?;
    registry.register(Arc::new(HttpTool::new()))?;
    registry.register(Arc::new(MessageTool::new(channels.clone())))?;
    registry.register(Arc::new(SpawnTool::new(supervisor.clone())))?;
    registry.register(Arc::new(CronTool::new(scheduler.clone())))?;
    Ok(registry)
}

impl App {
    /// Wire the runtime. `channels` must already hold every adapter.
    pub fn build(
        config: Config,
        llm: Arc<dyn LlmProvider>,
        channels: ChannelManager,
    ) -> anyhow::Result<Self> {
        let workspace = Workspace::new(&config.workspace.root);
        std::fs::create_dir_all(workspace.root())?;

        let policy = Arc::new(SafetyPolicy::new(
            &config.exec.deny_patterns,
            &config.exec.allow_patterns,
        )?);
        let channels = Arc::new(channels);
        let scheduler = build_scheduler(&config);

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let supervisor = SubagentSupervisor::new(
            inbound_tx,
            config.subagent.max_concurrent_per_owner,
            config.subagent_budget(),
        );

        let registry = builtin_registry(&policy, &channels, &scheduler, &supervisor)?.freeze();
        tracing::info!(tools = registry.count(), "Tool registry ready");

        let mut reasoning = Reasoning::new(llm);
        if let Some(ref path) = config.agent.usage_log {
            reasoning = reasoning.with_usage_tracker(UsageTracker::new(path));
        }

        let agent = Arc::new(
            AgentLoop::new(
                Arc::new(reasoning),
                ToolDispatcher::new(registry),
                config.execution_defaults(),
            )
            .with_workspace(workspace.clone()),
        );
        supervisor.attach(&agent);

        Ok(Self {
            config,
            workspace,
            channels,
            scheduler,
            supervisor,
            agent,
            inbound,
        })
    }

    /// Start the scheduler and heartbeat, then route messages until every
    /// inbound source has closed.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            config,
            workspace,
            channels,
            scheduler,
            supervisor,
            agent,
            inbound,
        } = self;

        let mut background: Vec<JoinHandle<()>> = Vec::new();
        background.push(scheduler.spawn(
            Arc::new(supervisor),
            Duration::from_secs(config.scheduler.tick_secs),
        ));
        let heartbeat = HeartbeatRunner::new(
            config.heartbeat_config(),
            workspace,
            agent.clone(),
            channels.clone(),
        );
        background.extend(spawn_heartbeat(heartbeat));

        let external = channels.start_all().await;
        let stream: MessageStream =
            Box::pin(futures::stream::select(external, ReceiverStream::new(inbound)));

        let router = Router::new(agent, channels.clone(), config.worker_config());
        tokio::select! {
            _ = router.run(stream) => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
        }

        for handle in background {
            handle.abort();
        }
        channels.shutdown_all().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
