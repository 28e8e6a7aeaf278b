//! 工具批次分发：串行 / 并行
//!
//! 并行条件：调用方允许、配置开启、批次大小 >= min_tools_for_parallel、批次内无依赖。
//! 并行执行使用所有会话共享的有界工作池（max_workers 个执行许可 + queue_capacity 个排队名额）。
//! 批次超时、排队名额不足或任务异常时整批回退为串行重新执行，不返回部分结果。
//! 结果总是按请求顺序返回。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::dependency::{AlwaysIndependent, DependencyPredicate};
use super::executor::{ToolCall, ToolExecutor, ToolResult};
use super::registry::ToolProvider;
use crate::config::DispatcherSection;

/// 一次分发的上下文
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: String,
    pub task_id: Option<String>,
    /// 调用方是否允许并行
    pub allow_parallel: bool,
}

impl ExecutionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            task_id: None,
            allow_parallel: true,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn sequential(mut self) -> Self {
        self.allow_parallel = false;
        self
    }
}

/// 工作池层面的失败（触发串行回退）
#[derive(Error, Debug)]
enum PoolError {
    #[error("worker pool saturated")]
    Saturated,
    #[error("batch timed out after {0:?}")]
    Timeout(Duration),
    #[error("worker pool closed")]
    Closed,
    #[error("worker task failed: {0}")]
    Join(String),
}

pub struct ToolDispatcher {
    executor: Arc<ToolExecutor>,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    dependency: Arc<dyn DependencyPredicate>,
    config: DispatcherSection,
}

impl ToolDispatcher {
    pub fn new(provider: Arc<dyn ToolProvider>, config: DispatcherSection) -> Self {
        let executor = ToolExecutor::new(provider, Duration::from_secs(config.tool_timeout_secs));
        let max_workers = config.max_workers.max(1);
        Self {
            executor: Arc::new(executor),
            workers: Arc::new(Semaphore::new(max_workers)),
            admission: Arc::new(Semaphore::new(max_workers + config.queue_capacity)),
            dependency: Arc::new(AlwaysIndependent),
            config,
        }
    }

    /// 替换依赖判定
    pub fn with_dependency_predicate(mut self, predicate: impl DependencyPredicate + 'static) -> Self {
        self.dependency = Arc::new(predicate);
        self
    }

    pub fn config(&self) -> &DispatcherSection {
        &self.config
    }

    pub fn should_parallelize(&self, requests: &[ToolCall], ctx: &ExecutionContext) -> bool {
        ctx.allow_parallel
            && self.config.parallel_enabled
            && requests.len() >= self.config.min_tools_for_parallel.max(2)
            && !self.dependency.has_dependencies(requests)
    }

    pub async fn dispatch(&self, requests: &[ToolCall], ctx: &ExecutionContext) -> Vec<ToolResult> {
        if requests.is_empty() {
            return Vec::new();
        }
        if self.should_parallelize(requests, ctx) {
            tracing::info!(
                session_id = %ctx.session_id,
                tools = requests.len(),
                "dispatching tool batch in parallel"
            );
            match self.dispatch_parallel(requests).await {
                Ok(results) => return results,
                Err(e) => {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        "parallel dispatch failed ({e}), re-executing batch sequentially"
                    );
                }
            }
        } else {
            tracing::info!(
                session_id = %ctx.session_id,
                tools = requests.len(),
                "dispatching tool batch sequentially"
            );
        }
        self.dispatch_sequential(requests).await
    }

    async fn dispatch_sequential(&self, requests: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(requests.len());
        for call in requests {
            results.push(self.executor.execute(call).await);
        }
        results
    }

    async fn dispatch_parallel(&self, requests: &[ToolCall]) -> Result<Vec<ToolResult>, PoolError> {
        // 先占排队名额，不足则整批拒绝
        let mut tickets = Vec::with_capacity(requests.len());
        for _ in requests {
            let ticket = self
                .admission
                .clone()
                .try_acquire_owned()
                .map_err(|_| PoolError::Saturated)?;
            tickets.push(ticket);
        }

        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .zip(tickets)
            .map(|(call, ticket)| {
                let workers = Arc::clone(&self.workers);
                let executor = Arc::clone(&self.executor);
                tokio::spawn(async move {
                    let _ticket = ticket;
                    let _permit = workers.acquire_owned().await.map_err(|_| PoolError::Closed)?;
                    Ok::<_, PoolError>(executor.execute(&call).await)
                })
            })
            .collect();

        let batch_timeout = Duration::from_secs(self.config.batch_timeout_secs);
        // 超时后已启动的调用继续在后台跑完，不做中途取消
        let joined = timeout(batch_timeout, join_all(handles))
            .await
            .map_err(|_| PoolError::Timeout(batch_timeout))?;

        joined
            .into_iter()
            .map(|j| j.map_err(|e| PoolError::Join(e.to_string())).and_then(|r| r))
            .collect()
    }
}
