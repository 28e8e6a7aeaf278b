//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SCHEDULER__RETRY_LIMIT=5`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorSection,
    pub scheduler: SchedulerSection,
    pub reasoner: ReasonerSection,
    pub dispatcher: DispatcherSection,
    pub session: SessionSection,
}

/// [orchestrator] 段：全局步数预算、重新规划上限、Planner 自我纠错次数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 单次运行最多执行的步数，防止 Planner / Scheduler 死循环
    pub max_steps: usize,
    pub max_replans: u32,
    /// Planner 输出无法解析时的纠错重试次数
    pub planner_correction_attempts: u32,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_steps: 64,
            max_replans: 3,
            planner_correction_attempts: 3,
        }
    }
}

/// [scheduler] 段：任务重试阈值与线性退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// failure_count 达到该值即升级为重新规划
    pub retry_limit: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// 列表整体失败率达到该比例时，可恢复失败也直接重新规划（<= 0 关闭，默认关闭）
    pub max_failure_ratio: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 5000,
            max_failure_ratio: 0.0,
        }
    }
}

impl SchedulerSection {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

/// [reasoner] 段：Reasoner 不可用时的重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasonerSection {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ReasonerSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 8000,
        }
    }
}

impl ReasonerSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

/// [dispatcher] 段：工具并行执行
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherSection {
    pub parallel_enabled: bool,
    pub min_tools_for_parallel: usize,
    /// 共享工作池的并发上限
    pub max_workers: usize,
    /// 工作池排队容量，满时整批回退串行
    pub queue_capacity: usize,
    pub batch_timeout_secs: u64,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            parallel_enabled: true,
            min_tools_for_parallel: 2,
            max_workers: 8,
            queue_capacity: 100,
            batch_timeout_secs: 120,
            tool_timeout_secs: 30,
        }
    }
}

/// [session] 段：会话保留时长、工具历史、能力循环轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 空闲会话保留时长（秒），默认 45 分钟
    pub retention_secs: u64,
    pub tool_history_limit: usize,
    /// 单个任务内推理 / 工具调用的最大轮数
    pub max_tool_iterations: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            retention_secs: 45 * 60,
            tool_history_limit: 20,
            max_tool_iterations: 10,
        }
    }
}

impl SessionSection {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
