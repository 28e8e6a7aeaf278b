//! 会话监管：按会话的互斥与取消
//!
//! 同一会话的步骤必须串行执行：Orchestrator 在整个运行期间持有该会话的互斥锁。
//! 不同会话互不阻塞。取消通过 CancellationToken 传递，在每一步开始前检查。
//! 注册表只在持有会话锁时移除条目，lock() 拿到锁后会确认监管对象仍是注册的那一个。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// 单个会话的生命周期控制
#[derive(Debug)]
pub struct SessionSupervisor {
    /// 运行锁，保证同一会话不会并发执行两个步骤
    run_lock: Arc<Mutex<()>>,
    /// 用户取消时触发；每次新的运行开始前重置
    cancel_token: RwLock<CancellationToken>,
    /// 最近一次拿到运行锁的时间
    last_active: std::sync::RwLock<Instant>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            run_lock: Arc::new(Mutex::new(())),
            cancel_token: RwLock::new(CancellationToken::new()),
            last_active: std::sync::RwLock::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut at) = self.last_active.write() {
            *at = Instant::now();
        }
    }

    /// 距最近一次运行的时长
    pub fn idle_for(&self) -> Duration {
        self.last_active
            .read()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    /// 获取运行锁（持有期间其它调用方等待）
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.run_lock).lock_owned().await
    }

    pub async fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.read().await.clone()
    }

    pub async fn cancel(&self) {
        self.cancel_token.read().await.cancel();
    }

    pub async fn is_cancelled(&self) -> bool {
        self.cancel_token.read().await.is_cancelled()
    }

    /// 换一个新的令牌，返回其克隆
    pub async fn reset(&self) -> CancellationToken {
        let mut token = self.cancel_token.write().await;
        *token = CancellationToken::new();
        token.clone()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 显式的会话注册表，由 Orchestrator 持有并共享
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionSupervisor>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建会话的监管对象
    pub async fn supervisor(&self, session_id: &str) -> Arc<SessionSupervisor> {
        if let Some(s) = self.sessions.read().await.get(session_id) {
            return Arc::clone(s);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionSupervisor::new())),
        )
    }

    /// 获取会话锁；等待期间条目被移除时换用新的监管对象重新获取
    pub async fn lock(&self, session_id: &str) -> (Arc<SessionSupervisor>, OwnedMutexGuard<()>) {
        loop {
            let supervisor = self.supervisor(session_id).await;
            let guard = supervisor.acquire().await;
            if self.is_current(session_id, &supervisor).await {
                supervisor.touch();
                return (supervisor, guard);
            }
            tracing::debug!(session_id, "session supervisor replaced while waiting, retrying");
        }
    }

    async fn is_current(&self, session_id: &str, supervisor: &Arc<SessionSupervisor>) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| Arc::ptr_eq(s, supervisor))
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionSupervisor>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// 取消会话的当前运行；会话未注册时返回 false
    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.get(session_id).await {
            Some(s) => {
                s.cancel().await;
                tracing::info!(session_id, "session cancellation requested");
                true
            }
            None => false,
        }
    }

    /// 移除调用方已持有锁的监管对象
    pub async fn remove_locked(&self, session_id: &str, supervisor: &Arc<SessionSupervisor>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session_id) {
            Some(s) if Arc::ptr_eq(s, supervisor) => sessions.remove(session_id).is_some(),
            _ => false,
        }
    }

    /// 移除空闲超过 idle 且没有运行中的会话，返回移除数量
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| match Arc::clone(&s.run_lock).try_lock_owned() {
            Ok(_guard) => s.idle_for() <= idle,
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "idle session supervisors evicted");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
