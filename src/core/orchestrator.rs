//! 编排器：驱动一个会话从用户输入到终态
//!
//! Plan -> Schedule -> Execute -> Schedule ... -> Summary。每一步执行后先保存检查点再继续，
//! 进程在两步之间崩溃最多丢失一步，不会破坏之前的检查点。
//! 同一会话的运行由 SessionRegistry 的会话锁串行化；取消在每一步开始前检查。
//! 除 SessionNotFound 与检查点存储错误外，所有失败都会变成面向用户的失败总结。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointStore, Phase, SessionState, SubgraphState};
use crate::config::{OrchestratorSection, SessionSection};
use crate::core::recovery::duration_millis;
use crate::core::scheduler::{Decision, Scheduler, TaskOutcome};
use crate::core::session_supervisor::SessionRegistry;
use crate::core::OrchestratorError;
use crate::memory::Message;
use crate::react::{
    failure_summary, CapabilityContext, CapabilityOutcome, CapabilityRegistry, Planner, StepEvent,
    StepStatus, Summarizer,
};
use crate::todo::TodoError;

/// 运行结束时的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    AwaitingInput,
    Cancelled,
}

/// 一次 start / resume / run 的结果；response 总是可直接展示给用户的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub session_id: String,
    pub status: RunStatus,
    pub response: String,
}

type EventSink<'a> = Option<&'a mpsc::UnboundedSender<StepEvent>>;

pub struct Orchestrator {
    pub(super) config: OrchestratorSection,
    pub(super) session: SessionSection,
    pub(super) planner: Planner,
    pub(super) scheduler: Scheduler,
    pub(super) summarizer: Summarizer,
    pub(super) capabilities: CapabilityRegistry,
    pub(super) store: Arc<dyn CheckpointStore>,
    pub(super) registry: Arc<SessionRegistry>,
}

impl Orchestrator {
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// 以用户输入开始一个会话并运行到终态或暂停点；已存在的同名会话被替换
    pub async fn start(&self, session_id: &str, input: &str) -> Result<RunOutcome, OrchestratorError> {
        self.start_with_events(session_id, input, None).await
    }

    /// 向会话追加外部输入后继续运行
    ///
    /// 暂停中的会话回到暂停的能力继续执行；已结束的会话以该输入开始新一轮规划。
    pub async fn resume(&self, session_id: &str, input: &str) -> Result<RunOutcome, OrchestratorError> {
        self.resume_with_events(session_id, input, None).await
    }

    /// 从检查点继续运行（进程重启后的恢复入口），不追加输入
    pub async fn run(&self, session_id: &str) -> Result<RunOutcome, OrchestratorError> {
        let (supervisor, _guard) = self.registry.lock(session_id).await;
        let token = supervisor.reset().await;
        let state = self.load(session_id).await?;
        tracing::info!(session_id, phase = state.phase.name(), step = state.steps, "session run resumed from checkpoint");
        self.drive(state, &token, None).await
    }

    /// 只执行并保存一步；已结束或暂停中的会话原样返回
    pub async fn step(&self, session_id: &str) -> Result<StepEvent, OrchestratorError> {
        let (_supervisor, _guard) = self.registry.lock(session_id).await;
        let mut state = self.load(session_id).await?;
        if let Some(outcome) = terminal_outcome(&state) {
            return Ok(StepEvent::new(state.steps, state.phase.name(), status_of(outcome.status))
                .with_text(outcome.response));
        }
        let event = self.advance(&mut state).await;
        self.store.save(session_id, &state).await?;
        Ok(event)
    }

    /// 请求取消会话的当前运行，在下一步开始前生效
    pub async fn cancel(&self, session_id: &str) -> bool {
        self.registry.cancel(session_id).await
    }

    /// 删除会话检查点与监管对象
    ///
    /// 先取消正在进行的运行并等待它在步骤边界释放会话锁，持锁期间删除检查点，
    /// 运行中的步骤不会再把检查点写回。
    pub async fn clear(&self, session_id: &str) -> Result<bool, OrchestratorError> {
        self.registry.cancel(session_id).await;
        let (supervisor, _guard) = self.registry.lock(session_id).await;
        let existed = self.store.delete(session_id).await?;
        self.registry.remove_locked(session_id, &supervisor).await;
        tracing::info!(session_id, existed, "session cleared");
        Ok(existed)
    }

    /// 释放空闲超过会话保留时长的监管对象，返回释放数量
    pub async fn evict_idle_sessions(&self) -> usize {
        self.registry.evict_idle(self.session.retention()).await
    }

    /// start 的流式版本：每完成一步推送一个事件，最后一个事件的 status 不为 Ok
    pub fn start_stream(
        self: Arc<Self>,
        session_id: impl Into<String>,
        input: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<StepEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (session_id, input) = (session_id.into(), input.into());
        tokio::spawn(async move {
            if let Err(e) = self.start_with_events(&session_id, &input, Some(&tx)).await {
                let _ = tx.send(StepEvent::new(0, "error", StepStatus::Failed).with_text(e.to_string()));
            }
        });
        rx
    }

    /// resume 的流式版本
    pub fn resume_stream(
        self: Arc<Self>,
        session_id: impl Into<String>,
        input: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<StepEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (session_id, input) = (session_id.into(), input.into());
        tokio::spawn(async move {
            if let Err(e) = self.resume_with_events(&session_id, &input, Some(&tx)).await {
                let _ = tx.send(StepEvent::new(0, "error", StepStatus::Failed).with_text(e.to_string()));
            }
        });
        rx
    }

    async fn start_with_events(
        &self,
        session_id: &str,
        input: &str,
        events: EventSink<'_>,
    ) -> Result<RunOutcome, OrchestratorError> {
        self.evict_idle_sessions().await;
        let (supervisor, _guard) = self.registry.lock(session_id).await;
        let token = supervisor.reset().await;
        if self.store.load(session_id).await?.is_some() {
            tracing::warn!(session_id, "start on existing session, previous state replaced");
        }
        let state = SessionState::new(session_id, input);
        self.store.save(session_id, &state).await?;
        tracing::info!(session_id, "session started");
        self.drive(state, &token, events).await
    }

    async fn resume_with_events(
        &self,
        session_id: &str,
        input: &str,
        events: EventSink<'_>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let (supervisor, _guard) = self.registry.lock(session_id).await;
        let token = supervisor.reset().await;
        let mut state = self.load(session_id).await?;
        accept_input(&mut state, input);
        state.touch();
        self.store.save(session_id, &state).await?;
        tracing::info!(session_id, phase = state.phase.name(), "session resumed with external input");
        self.drive(state, &token, events).await
    }

    async fn load(&self, session_id: &str) -> Result<SessionState, OrchestratorError> {
        self.store
            .load(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }

    /// 主循环：逐步执行并保存，直到终态、暂停或取消
    async fn drive(
        &self,
        mut state: SessionState,
        token: &CancellationToken,
        events: EventSink<'_>,
    ) -> Result<RunOutcome, OrchestratorError> {
        loop {
            if let Some(outcome) = terminal_outcome(&state) {
                tracing::info!(
                    session_id = %state.session_id,
                    status = ?outcome.status,
                    steps = state.steps,
                    "session run finished"
                );
                return Ok(outcome);
            }
            if token.is_cancelled() {
                tracing::info!(session_id = %state.session_id, phase = state.phase.name(), "session run cancelled");
                let response = "The request was cancelled.".to_string();
                if let Some(tx) = events {
                    let _ = tx.send(
                        StepEvent::new(state.steps, "cancelled", StepStatus::Cancelled).with_text(response.clone()),
                    );
                }
                return Ok(RunOutcome {
                    session_id: state.session_id,
                    status: RunStatus::Cancelled,
                    response,
                });
            }

            let event = self.advance(&mut state).await;
            self.store.save(&state.session_id, &state).await?;
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        }
    }

    /// 执行当前阶段的一步；错误转为失败终态与失败总结
    async fn advance(&self, state: &mut SessionState) -> StepEvent {
        let step_name = state.phase.name();
        let result = if state.turn_steps >= self.config.max_steps {
            Err(OrchestratorError::StepBudgetExceeded(self.config.max_steps))
        } else {
            self.execute_phase(state).await
        };
        state.steps += 1;
        state.turn_steps += 1;
        state.touch();

        match result {
            Ok(text) => {
                let status = match &state.phase {
                    Phase::Done => StepStatus::Completed,
                    Phase::Failed => StepStatus::Failed,
                    Phase::AwaitingInput { .. } => StepStatus::AwaitingInput,
                    _ => StepStatus::Ok,
                };
                tracing::debug!(session_id = %state.session_id, step = state.steps, step_name, next = state.phase.name(), "step finished");
                let event = StepEvent::new(state.steps, step_name, status);
                match text {
                    Some(text) => event.with_text(text),
                    None => event,
                }
            }
            Err(e) => {
                tracing::error!(session_id = %state.session_id, step = state.steps, step_name, "session run failed: {e}");
                let response = failure_summary(&state.todo, &e.to_string());
                state.messages.push(Message::assistant(response.clone()));
                state.fail(response.clone());
                StepEvent::new(state.steps, step_name, StepStatus::Failed).with_text(response)
            }
        }
    }

    async fn execute_phase(&self, state: &mut SessionState) -> Result<Option<String>, OrchestratorError> {
        match state.phase.clone() {
            Phase::Plan => {
                let replan = state.replan_request.take();
                if replan.is_some() {
                    if state.replan_count >= self.config.max_replans {
                        return Err(OrchestratorError::ReplanLimitExceeded(self.config.max_replans));
                    }
                    state.replan_count += 1;
                }
                state.todo = self
                    .planner
                    .plan(&state.todo, &state.messages, replan.as_ref())
                    .await?;
                state.phase = Phase::Schedule;
                Ok(Some(state.todo.summary()))
            }
            Phase::Schedule => {
                let outcome = state.pending_outcome.take();
                match self.scheduler.decide(&mut state.todo, outcome)? {
                    Decision::Dispatch(d) => {
                        let text = format!("{} -> {} (attempt {})", d.task_id, d.capability, d.attempt);
                        state.phase = Phase::Execute {
                            task_id: d.task_id,
                            capability: d.capability,
                            backoff_ms: duration_millis(d.backoff),
                        };
                        Ok(Some(text))
                    }
                    Decision::Replan(req) => {
                        let text = format!("replanning after {}: {}", req.failed_task_id, req.reason);
                        state.replan_request = Some(req);
                        state.phase = Phase::Plan;
                        Ok(Some(text))
                    }
                    Decision::Summarize => {
                        state.phase = Phase::Summary;
                        Ok(None)
                    }
                }
            }
            Phase::Execute {
                task_id,
                capability,
                backoff_ms,
            } => self.execute_task(state, task_id, capability, backoff_ms).await,
            Phase::Summary => {
                let answer = self.summarizer.summarize(&state.todo, &state.messages).await?;
                state.messages.push(Message::assistant(answer.clone()));
                state.final_response = Some(answer.clone());
                state.phase = Phase::Done;
                Ok(Some(answer))
            }
            Phase::AwaitingInput { question, .. } => Ok(Some(question)),
            Phase::Done | Phase::Failed => Ok(state.final_response.clone()),
        }
    }

    async fn execute_task(
        &self,
        state: &mut SessionState,
        task_id: String,
        capability: String,
        backoff_ms: u64,
    ) -> Result<Option<String>, OrchestratorError> {
        if backoff_ms > 0 {
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        let task = state
            .todo
            .get(&task_id)
            .cloned()
            .ok_or_else(|| TodoError::TaskNotFound(task_id.clone()))?;
        let mut subgraph = match state.active_subgraph.take() {
            Some(paused) if paused.task_id == task_id => paused,
            _ => match state.subgraph_states.get(&capability) {
                Some(previous) => SubgraphState::continue_from(previous, task_id.clone()),
                None => SubgraphState::new(task_id.clone(), self.session.tool_history_limit),
            },
        };
        let ctx = CapabilityContext {
            session_id: state.session_id.clone(),
            task,
            messages: state.messages.clone(),
            plan_summary: state.todo.summary(),
        };

        let result = match self.capabilities.get(&capability) {
            Some(cap) => cap.execute(&ctx, &mut subgraph).await,
            None => Err(OrchestratorError::UnknownCapability(capability.clone())),
        };
        let outcome = match result {
            Ok(CapabilityOutcome::NeedsInput(question)) => {
                tracing::info!(session_id = %state.session_id, task_id = %task_id, "capability paused for human input");
                state.active_subgraph = Some(subgraph);
                state.messages.push(Message::assistant(question.clone()));
                state.final_response = Some(question.clone());
                state.phase = Phase::AwaitingInput {
                    task_id,
                    capability,
                    question: question.clone(),
                };
                return Ok(Some(question));
            }
            Ok(CapabilityOutcome::Success(output)) => TaskOutcome::Success {
                task_id: task_id.clone(),
                output,
            },
            Ok(CapabilityOutcome::Failure { kind, reason }) => TaskOutcome::Failure {
                task_id: task_id.clone(),
                failure: kind,
                reason,
            },
            Err(e) => match e.task_failure_kind() {
                Some(kind) => TaskOutcome::Failure {
                    task_id: task_id.clone(),
                    failure: kind,
                    reason: e.to_string(),
                },
                None => return Err(e),
            },
        };

        state.subgraph_states.insert(capability, subgraph);
        let text = match &outcome {
            TaskOutcome::Success { output, .. } => {
                state
                    .messages
                    .push(Message::assistant(format!("[{task_id}] {output}")));
                output.clone()
            }
            TaskOutcome::Failure { reason, .. } => format!("{task_id} failed: {reason}"),
        };
        state.pending_outcome = Some(outcome);
        state.phase = Phase::Schedule;
        Ok(Some(text))
    }
}

/// 处理外部输入：暂停中的会话回到暂停的能力，已结束的会话开始新一轮规划
fn accept_input(state: &mut SessionState, input: &str) {
    state.messages.push(Message::user(input));
    state.turn_steps = 0;
    match std::mem::replace(&mut state.phase, Phase::Plan) {
        Phase::AwaitingInput {
            task_id, capability, ..
        } => {
            if let Some(sub) = state.active_subgraph.as_mut() {
                sub.transcript.push(Message::user(input));
            }
            state.final_response = None;
            state.phase = Phase::Execute {
                task_id,
                capability,
                backoff_ms: 0,
            };
        }
        Phase::Done | Phase::Failed => {
            state.final_response = None;
            state.replan_count = 0;
        }
        other => state.phase = other,
    }
}

fn terminal_outcome(state: &SessionState) -> Option<RunOutcome> {
    let status = match &state.phase {
        Phase::Done => RunStatus::Completed,
        Phase::Failed => RunStatus::Failed,
        Phase::AwaitingInput { .. } => RunStatus::AwaitingInput,
        _ => return None,
    };
    Some(RunOutcome {
        session_id: state.session_id.clone(),
        status,
        response: state.final_response.clone().unwrap_or_default(),
    })
}

fn status_of(status: RunStatus) -> StepStatus {
    match status {
        RunStatus::Completed => StepStatus::Completed,
        RunStatus::Failed => StepStatus::Failed,
        RunStatus::AwaitingInput => StepStatus::AwaitingInput,
        RunStatus::Cancelled => StepStatus::Cancelled,
    }
}
