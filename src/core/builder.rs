//! 编排器构建器：统一的组件初始化
//!
//! Reasoner 统一包一层 RetryingReasoner；Planner / 工具循环能力 / Summary 共享同一个 Reasoner 与工具分发器。

use std::path::PathBuf;
use std::sync::Arc;

use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use crate::config::{load_config, AppConfig};
use crate::core::orchestrator::Orchestrator;
use crate::core::scheduler::Scheduler;
use crate::core::session_supervisor::SessionRegistry;
use crate::core::OrchestratorError;
use crate::llm::{Reasoner, RetryingReasoner};
use crate::react::{Capability, CapabilityRegistry, Planner, Summarizer, ToolLoopCapability};
use crate::tools::{ToolDispatcher, ToolProvider, ToolRegistry};

pub struct OrchestratorBuilder {
    config: AppConfig,
    reasoner: Option<Arc<dyn Reasoner>>,
    tools: Option<Arc<dyn ToolProvider>>,
    dispatcher: Option<Arc<ToolDispatcher>>,
    tool_catalog: String,
    store: Option<Arc<dyn CheckpointStore>>,
    registry: Option<Arc<SessionRegistry>>,
    capabilities: CapabilityRegistry,
    /// (能力名, 指令) 的工具循环能力，build 时用共享 Reasoner 与分发器创建
    tool_loops: Vec<(String, String)>,
    planner_instructions: Option<String>,
    summary_instructions: Option<String>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            reasoner: None,
            tools: None,
            dispatcher: None,
            tool_catalog: String::new(),
            store: None,
            registry: None,
            capabilities: CapabilityRegistry::new(),
            tool_loops: Vec::new(),
            planner_instructions: None,
            summary_instructions: None,
        }
    }

    /// 从 config/default.toml（及可选文件）与 HIVE__* 环境变量加载配置
    pub fn from_config_file(config_path: Option<PathBuf>) -> Result<Self, OrchestratorError> {
        Ok(Self::new(load_config(config_path)?))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 必需：Planner / 能力 / Summary 使用的 Reasoner
    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// 工具提供方；按 [dispatcher] 配置创建分发器
    pub fn tools(mut self, tools: Arc<dyn ToolProvider>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// 使用已创建的分发器（例如自定义依赖判定），优先于 tools
    pub fn dispatcher(mut self, dispatcher: Arc<ToolDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// 工具说明，拼入工具循环能力的 prompt
    pub fn tool_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.tool_catalog = catalog.into();
        self
    }

    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn capability(mut self, capability: impl Capability + 'static) -> Self {
        self.capabilities.register(capability);
        self
    }

    /// 注册一个由工具循环实现的能力
    pub fn tool_loop_capability(mut self, name: impl Into<String>, instructions: impl Into<String>) -> Self {
        self.tool_loops.push((name.into(), instructions.into()));
        self
    }

    pub fn planner_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.planner_instructions = Some(instructions.into());
        self
    }

    pub fn summary_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.summary_instructions = Some(instructions.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let cfg = self.config;
        let base = self.reasoner.ok_or_else(|| {
            OrchestratorError::Config(config::ConfigError::Message("a reasoner is required".to_string()))
        })?;
        let reasoner: Arc<dyn Reasoner> = Arc::new(RetryingReasoner::new(base, cfg.reasoner.retry_config()));

        let dispatcher = match (self.dispatcher, self.tools) {
            (Some(d), _) => d,
            (None, Some(tools)) => Arc::new(ToolDispatcher::new(tools, cfg.dispatcher.clone())),
            (None, None) => Arc::new(ToolDispatcher::new(
                Arc::new(ToolRegistry::new()),
                cfg.dispatcher.clone(),
            )),
        };

        let mut capabilities = self.capabilities;
        for (name, instructions) in self.tool_loops {
            capabilities.register(
                ToolLoopCapability::new(name, instructions, Arc::clone(&reasoner), Arc::clone(&dispatcher))
                    .with_tool_catalog(self.tool_catalog.clone())
                    .with_max_iterations(cfg.session.max_tool_iterations),
            );
        }
        if capabilities.is_empty() {
            tracing::warn!("orchestrator built without capabilities, every task will fail");
        }

        let mut planner = Planner::new(Arc::clone(&reasoner), capabilities.names())
            .with_correction_attempts(cfg.orchestrator.planner_correction_attempts);
        if let Some(instructions) = self.planner_instructions {
            planner = planner.with_instructions(instructions);
        }
        let mut summarizer = Summarizer::new(Arc::clone(&reasoner));
        if let Some(instructions) = self.summary_instructions {
            summarizer = summarizer.with_instructions(instructions);
        }

        let store: Arc<dyn CheckpointStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryCheckpointStore::new(cfg.session.retention())),
        };
        let registry = self.registry.unwrap_or_default();

        tracing::info!(
            capabilities = ?capabilities.names(),
            max_steps = cfg.orchestrator.max_steps,
            retry_limit = cfg.scheduler.retry_limit,
            "orchestrator built"
        );
        Ok(Orchestrator {
            scheduler: Scheduler::new(&cfg.scheduler),
            config: cfg.orchestrator,
            session: cfg.session,
            planner,
            summarizer,
            capabilities,
            store,
            registry,
        })
    }
}
