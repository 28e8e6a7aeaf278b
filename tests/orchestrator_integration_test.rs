//! 编排器集成测试：完整会话、失败升级与重新规划、检查点恢复、人工暂停、取消与流式事件

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hive::checkpoint::{Phase, SubgraphState};
use hive::config::AppConfig;
use hive::core::SessionRegistry;
use hive::llm::{FnReasoner, Reasoner, ReasonerError};
use hive::memory::{last_user_message, Message};
use hive::todo::TaskStatus;
use hive::{
    Capability, CapabilityContext, CapabilityOutcome, CheckpointStore, MemoryCheckpointStore, Orchestrator,
    OrchestratorBuilder, OrchestratorError, RunStatus, SessionState, StepStatus,
};

const PLAN_AB: &str = r#"{"add": [
  {"id": "A", "description": "collect data", "assignedCapability": "alpha", "order": 1},
  {"id": "B", "description": "write report", "assignedCapability": "beta", "order": 3}
]}"#;

const REPLAN_C: &str = r#"```json
{"add": [{"id": "C", "description": "collect data from the mirror", "assignedCapability": "gamma", "order": 2}]}
```"#;

const PLAN_A: &str = r#"{"add": [{"id": "A", "description": "collect data", "assignedCapability": "alpha", "order": 1}]}"#;

const FOLLOW_UP: &str = r#"{"add": [{"id": "D", "description": "send the report", "assignedCapability": "beta"}]}"#;

/// 每次调用按脚本返回结果，脚本耗尽后返回成功
#[derive(Clone)]
struct ScriptedCapability {
    name: String,
    calls: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Result<CapabilityOutcome, OrchestratorError>>>>,
}

impl ScriptedCapability {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn then(self, outcome: CapabilityOutcome) -> Self {
        self.script.lock().unwrap().push_back(Ok(outcome));
        self
    }

    fn then_err(self, err: OrchestratorError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &CapabilityContext,
        _subgraph: &mut SubgraphState,
    ) -> Result<CapabilityOutcome, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(CapabilityOutcome::Success(format!("{} done", ctx.task.id))))
    }
}

/// 按 prompt 区分 Planner / Summary 的 Reasoner，并统计 Planner 调用次数
fn reasoner(plan: &'static str, replan: &'static str, planner_calls: Arc<AtomicUsize>) -> Arc<dyn Reasoner> {
    Arc::new(FnReasoner(move |prompt: &str, _ctx: &[Message]| {
        if prompt.contains("## Available capabilities") {
            planner_calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("## Replan request") {
                return Ok(replan.to_string());
            }
            if prompt.contains("[B]") {
                return Ok(FOLLOW_UP.to_string());
            }
            return Ok(plan.to_string());
        }
        Ok("All done: the report is ready.".to_string())
    }))
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.retry_base_delay_ms = 1;
    config.scheduler.retry_max_delay_ms = 5;
    config.reasoner.backoff_base_ms = 1;
    config.reasoner.backoff_max_ms = 2;
    config
}

struct World {
    alpha: ScriptedCapability,
    beta: ScriptedCapability,
    gamma: ScriptedCapability,
    planner_calls: Arc<AtomicUsize>,
    store: Arc<MemoryCheckpointStore>,
}

impl World {
    fn new() -> Self {
        Self {
            alpha: ScriptedCapability::new("alpha"),
            beta: ScriptedCapability::new("beta"),
            gamma: ScriptedCapability::new("gamma"),
            planner_calls: Arc::new(AtomicUsize::new(0)),
            store: Arc::new(MemoryCheckpointStore::default()),
        }
    }

    fn builder(&self, config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
            .reasoner(reasoner(PLAN_AB, REPLAN_C, Arc::clone(&self.planner_calls)))
            .capability(self.alpha.clone())
            .capability(self.beta.clone())
            .capability(self.gamma.clone())
            .checkpoint_store(self.store.clone())
    }

    fn orchestrator(&self) -> Orchestrator {
        self.builder(fast_config()).build().unwrap()
    }

    async fn state(&self, session_id: &str) -> SessionState {
        self.store.load(session_id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_happy_path_runs_tasks_in_order_and_summarizes() {
    let world = World::new();
    let orchestrator = world.orchestrator();

    let outcome = orchestrator.start("s1", "prepare the quarterly report").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.response, "All done: the report is ready.");
    assert_eq!(world.alpha.calls(), 1);
    assert_eq!(world.beta.calls(), 1);

    let state = world.state("s1").await;
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.steps, 7);
    let a = state.todo.get("A").unwrap();
    assert_eq!(a.status, TaskStatus::Completed);
    assert_eq!(a.result.as_deref(), Some("A done"));
    assert_eq!(state.todo.get("B").unwrap().status, TaskStatus::Completed);
    assert!(state.todo.in_progress().is_none());
}

#[tokio::test]
async fn test_transient_failures_escalate_to_replan() {
    let world = World::new();
    let alpha = world
        .alpha
        .clone()
        .then(CapabilityOutcome::recoverable("timeout"))
        .then(CapabilityOutcome::recoverable("timeout"))
        .then(CapabilityOutcome::structural("source removed"));
    let orchestrator = OrchestratorBuilder::new(fast_config())
        .reasoner(reasoner(PLAN_AB, REPLAN_C, Arc::clone(&world.planner_calls)))
        .capability(alpha)
        .capability(world.beta.clone())
        .capability(world.gamma.clone())
        .checkpoint_store(world.store.clone())
        .build()
        .unwrap();

    let outcome = orchestrator.start("s2", "prepare the quarterly report").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(world.alpha.calls(), 3);
    assert_eq!(world.gamma.calls(), 1);
    assert_eq!(world.beta.calls(), 1);
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 2);

    let state = world.state("s2").await;
    let a = state.todo.get("A").unwrap();
    assert_eq!(a.status, TaskStatus::Failed);
    assert_eq!(a.failure_count, 3);
    assert_eq!(a.last_error.as_deref(), Some("source removed"));
    assert_eq!(state.todo.get("C").unwrap().status, TaskStatus::Completed);
    assert_eq!(state.todo.len(), 3);
    assert_eq!(state.replan_count, 1);
    let order: Vec<_> = state.todo.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(order, vec!["A", "C", "B"]);
}

#[tokio::test]
async fn test_resume_after_crash_does_not_repeat_finished_steps() {
    let world = World::new();
    world
        .store
        .save("s3", &SessionState::new("s3", "prepare the quarterly report"))
        .await
        .unwrap();

    let first = world.orchestrator();
    for expected in ["plan", "schedule", "execute"] {
        let event = first.step("s3").await.unwrap();
        assert_eq!(event.step_name, expected);
        assert_eq!(event.status, StepStatus::Ok);
    }
    drop(first);
    assert_eq!(world.alpha.calls(), 1);
    assert_eq!(world.beta.calls(), 0);

    let second = world.orchestrator();
    let outcome = second.run("s3").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(world.alpha.calls(), 1);
    assert_eq!(world.beta.calls(), 1);
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 1);
    assert_eq!(world.state("s3").await.steps, 7);
}

#[tokio::test]
async fn test_step_on_finished_session_is_a_no_op() {
    let world = World::new();
    let orchestrator = world.orchestrator();
    orchestrator.start("s4", "prepare the quarterly report").await.unwrap();

    let event = orchestrator.step("s4").await.unwrap();
    assert_eq!(event.status, StepStatus::Completed);
    assert_eq!(event.partial_text.as_deref(), Some("All done: the report is ready."));
    assert_eq!(world.state("s4").await.steps, 7);
}

/// 第一次调用时提问，之后用最近一次人工回复作为结果
struct AskingCapability {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for AskingCapability {
    fn name(&self) -> &str {
        "alpha"
    }

    async fn execute(
        &self,
        ctx: &CapabilityContext,
        subgraph: &mut SubgraphState,
    ) -> Result<CapabilityOutcome, OrchestratorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            subgraph.iterations += 1;
            return Ok(CapabilityOutcome::NeedsInput("Which quarter?".to_string()));
        }
        assert_eq!(subgraph.iterations, 1, "paused subgraph should be restored");
        let answer = subgraph
            .transcript
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        assert_eq!(last_user_message(&ctx.messages), Some(answer.as_str()));
        Ok(CapabilityOutcome::Success(format!("data for {answer}")))
    }
}

#[tokio::test]
async fn test_pause_for_human_input_and_resume() {
    let world = World::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = OrchestratorBuilder::new(fast_config())
        .reasoner(reasoner(PLAN_AB, REPLAN_C, Arc::clone(&world.planner_calls)))
        .capability(AskingCapability {
            calls: Arc::clone(&calls),
        })
        .capability(world.beta.clone())
        .checkpoint_store(world.store.clone())
        .build()
        .unwrap();

    let paused = orchestrator.start("s5", "prepare the quarterly report").await.unwrap();
    assert_eq!(paused.status, RunStatus::AwaitingInput);
    assert_eq!(paused.response, "Which quarter?");
    let state = world.state("s5").await;
    assert!(matches!(state.phase, Phase::AwaitingInput { ref task_id, .. } if task_id == "A"));
    assert!(state.active_subgraph.is_some());
    assert_eq!(state.todo.get("A").unwrap().status, TaskStatus::InProgress);

    let done = orchestrator.resume("s5", "Q3").await.unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let state = world.state("s5").await;
    assert_eq!(state.todo.get("A").unwrap().result.as_deref(), Some("data for Q3"));
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resume_finished_session_starts_new_turn() {
    let world = World::new();
    let orchestrator = world.orchestrator();
    orchestrator.start("s6", "prepare the quarterly report").await.unwrap();

    let outcome = orchestrator.resume("s6", "and send it to the board").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 2);
    assert_eq!(world.alpha.calls(), 1);
    assert_eq!(world.beta.calls(), 2);
    let state = world.state("s6").await;
    assert_eq!(state.todo.len(), 3);
    assert_eq!(state.todo.get("D").unwrap().status, TaskStatus::Completed);
    assert_eq!(last_user_message(&state.messages), Some("and send it to the board"));
}

#[tokio::test]
async fn test_unknown_session() {
    let world = World::new();
    let orchestrator = world.orchestrator();
    assert!(matches!(
        orchestrator.resume("missing", "hello").await,
        Err(OrchestratorError::SessionNotFound(id)) if id == "missing"
    ));
    assert!(matches!(
        orchestrator.run("missing").await,
        Err(OrchestratorError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.step("missing").await,
        Err(OrchestratorError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_reasoner_outage_produces_failure_summary() {
    let store = Arc::new(MemoryCheckpointStore::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let orchestrator = OrchestratorBuilder::new(fast_config())
        .reasoner(Arc::new(FnReasoner(move |_: &str, _: &[Message]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ReasonerError::Unavailable("503".to_string()))
        })))
        .capability(ScriptedCapability::new("alpha"))
        .checkpoint_store(store.clone())
        .build()
        .unwrap();

    let outcome = orchestrator.start("s7", "prepare the quarterly report").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.response.starts_with("Sorry, I could not finish this request"));
    assert!(outcome.response.contains("503"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let state = store.load("s7").await.unwrap().unwrap();
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.final_response.as_deref(), Some(outcome.response.as_str()));
}

#[tokio::test]
async fn test_step_budget_stops_runaway_session() {
    let world = World::new();
    let mut config = fast_config();
    config.orchestrator.max_steps = 3;
    let orchestrator = world.builder(config).build().unwrap();

    let outcome = orchestrator.start("s8", "prepare the quarterly report").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.response.contains("A done"), "completed work is reported: {}", outcome.response);
    assert_eq!(world.beta.calls(), 0);
    assert_eq!(world.state("s8").await.steps, 4);
}

#[tokio::test]
async fn test_replan_limit() {
    let world = World::new();
    let alpha = world.alpha.clone().then(CapabilityOutcome::structural("gone"));
    let mut config = fast_config();
    config.orchestrator.max_replans = 0;
    let orchestrator = OrchestratorBuilder::new(config)
        .reasoner(reasoner(PLAN_AB, REPLAN_C, Arc::clone(&world.planner_calls)))
        .capability(alpha)
        .capability(world.beta.clone())
        .checkpoint_store(world.store.clone())
        .build()
        .unwrap();

    let outcome = orchestrator.start("s9", "prepare the quarterly report").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.response.contains("1 task(s) failed."));
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_capability_is_a_structural_task_failure() {
    let world = World::new();
    let orchestrator = OrchestratorBuilder::new(fast_config())
        .reasoner(reasoner(
            r#"{"add": [{"id": "A", "description": "fly", "assignedCapability": "wings"}]}"#,
            r#"{"add": [{"id": "C", "description": "walk", "assignedCapability": "gamma"}]}"#,
            Arc::clone(&world.planner_calls),
        ))
        .capability(world.gamma.clone())
        .checkpoint_store(world.store.clone())
        .build()
        .unwrap();

    let outcome = orchestrator.start("s10", "get there").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    let state = world.state("s10").await;
    assert_eq!(state.todo.get("A").unwrap().status, TaskStatus::Failed);
    assert_eq!(state.todo.get("C").unwrap().status, TaskStatus::Completed);
}

/// 执行时取消自己所在的会话
struct CancellingCapability {
    registry: Arc<SessionRegistry>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for CancellingCapability {
    fn name(&self) -> &str {
        "alpha"
    }

    async fn execute(
        &self,
        ctx: &CapabilityContext,
        _subgraph: &mut SubgraphState,
    ) -> Result<CapabilityOutcome, OrchestratorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            assert!(self.registry.cancel(&ctx.session_id).await);
        }
        Ok(CapabilityOutcome::Success("collected".to_string()))
    }
}

#[tokio::test]
async fn test_cancel_keeps_checkpoint_and_run_continues() {
    let world = World::new();
    let registry = Arc::new(SessionRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = OrchestratorBuilder::new(fast_config())
        .reasoner(reasoner(PLAN_AB, REPLAN_C, Arc::clone(&world.planner_calls)))
        .capability(CancellingCapability {
            registry: Arc::clone(&registry),
            calls: Arc::clone(&calls),
        })
        .capability(world.beta.clone())
        .checkpoint_store(world.store.clone())
        .session_registry(registry)
        .build()
        .unwrap();

    let cancelled = orchestrator.start("s11", "prepare the quarterly report").await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert_eq!(world.beta.calls(), 0);
    assert_eq!(world.state("s11").await.phase, Phase::Schedule);

    let outcome = orchestrator.run("s11").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(world.beta.calls(), 1);
}

#[tokio::test]
async fn test_stream_emits_one_event_per_step() {
    let world = World::new();
    let orchestrator = Arc::new(world.orchestrator());

    let mut rx = orchestrator.start_stream("s12", "prepare the quarterly report");
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let last = event.is_final();
        events.push(event);
        if last {
            break;
        }
    }

    let names: Vec<_> = events.iter().map(|e| e.step_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["plan", "schedule", "execute", "schedule", "execute", "schedule", "summary"]
    );
    let steps: Vec<_> = events.iter().map(|e| e.step).collect();
    assert_eq!(steps, (1..=7).collect::<Vec<_>>());
    let last = events.last().unwrap();
    assert_eq!(last.status, StepStatus::Completed);
    assert_eq!(last.partial_text.as_deref(), Some("All done: the report is ready."));
}

#[tokio::test]
async fn test_stream_reports_unknown_session() {
    let world = World::new();
    let orchestrator = Arc::new(world.orchestrator());

    let mut rx = orchestrator.resume_stream("nobody", "hi");
    let event = rx.recv().await.unwrap();
    assert_eq!(event.status, StepStatus::Failed);
    assert!(event.partial_text.unwrap().contains("nobody"));
}

#[tokio::test]
async fn test_clear_removes_checkpoint() {
    let world = World::new();
    let orchestrator = world.orchestrator();
    orchestrator.start("s13", "prepare the quarterly report").await.unwrap();

    assert!(orchestrator.clear("s13").await.unwrap());
    assert!(world.store.load("s13").await.unwrap().is_none());
    assert!(!orchestrator.clear("s13").await.unwrap());
}

#[tokio::test]
async fn test_capability_errors_are_absorbed_as_retries() {
    let world = World::new();
    let _alpha = world
        .alpha
        .clone()
        .then_err(OrchestratorError::RecoverableTaskFailure {
            task_id: "A".to_string(),
            reason: "rate limited".to_string(),
        })
        .then_err(OrchestratorError::ToolExecution("connection reset".to_string()));
    let orchestrator = world.orchestrator();

    let outcome = orchestrator.start("r1", "prepare the quarterly report").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(world.alpha.calls(), 3);
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 1);

    let state = world.state("r1").await;
    let a = state.todo.get("A").unwrap();
    assert_eq!(a.status, TaskStatus::Completed);
    assert_eq!(a.failure_count, 2);
    assert!(a.last_error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(state.replan_count, 0);
}

#[tokio::test]
async fn test_replacement_task_retries_its_own_transient_failure() {
    let world = World::new();
    let _alpha = world.alpha.clone().then(CapabilityOutcome::structural("source removed"));
    let _gamma = world
        .gamma
        .clone()
        .then_err(OrchestratorError::ToolExecution("mirror timed out".to_string()));
    let orchestrator = OrchestratorBuilder::new(fast_config())
        .reasoner(reasoner(PLAN_A, REPLAN_C, Arc::clone(&world.planner_calls)))
        .capability(world.alpha.clone())
        .capability(world.gamma.clone())
        .checkpoint_store(world.store.clone())
        .build()
        .unwrap();

    let outcome = orchestrator.start("r2", "collect the data").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(world.gamma.calls(), 2);
    assert_eq!(world.planner_calls.load(Ordering::SeqCst), 2);

    let state = world.state("r2").await;
    assert_eq!(state.todo.get("A").unwrap().status, TaskStatus::Failed);
    let c = state.todo.get("C").unwrap();
    assert_eq!(c.status, TaskStatus::Completed);
    assert_eq!(c.failure_count, 1);
    assert_eq!(state.replan_count, 1);
}

/// 执行较慢的能力，记录同时执行的最大数量
#[derive(Clone, Default)]
struct SlowCapability {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for SlowCapability {
    fn name(&self) -> &str {
        "alpha"
    }

    async fn execute(
        &self,
        _ctx: &CapabilityContext,
        _subgraph: &mut SubgraphState,
    ) -> Result<CapabilityOutcome, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(CapabilityOutcome::Success("collected".to_string()))
    }
}

fn slow_orchestrator(world: &World, slow: &SlowCapability) -> Arc<Orchestrator> {
    Arc::new(
        OrchestratorBuilder::new(fast_config())
            .reasoner(reasoner(PLAN_AB, REPLAN_C, Arc::clone(&world.planner_calls)))
            .capability(slow.clone())
            .capability(world.beta.clone())
            .checkpoint_store(world.store.clone())
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_clear_waits_for_in_flight_run() {
    let world = World::new();
    let slow = SlowCapability::default();
    let orchestrator = slow_orchestrator(&world, &slow);

    let first = {
        let o = Arc::clone(&orchestrator);
        tokio::spawn(async move { o.start("c1", "prepare the quarterly report").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(orchestrator.clear("c1").await.unwrap());
    assert!(world.store.load("c1").await.unwrap().is_none());

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(world.store.load("c1").await.unwrap().is_none());
    assert_eq!(world.beta.calls(), 0);
}

#[tokio::test]
async fn test_start_during_clear_never_runs_session_twice() {
    let world = World::new();
    let slow = SlowCapability::default();
    let orchestrator = slow_orchestrator(&world, &slow);

    let first = {
        let o = Arc::clone(&orchestrator);
        tokio::spawn(async move { o.start("c2", "prepare the quarterly report").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let clear = {
        let o = Arc::clone(&orchestrator);
        tokio::spawn(async move { o.clear("c2").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let o = Arc::clone(&orchestrator);
        tokio::spawn(async move { o.start("c2", "prepare the quarterly report").await })
    };

    assert_eq!(first.await.unwrap().unwrap().status, RunStatus::Cancelled);
    assert!(clear.await.unwrap().unwrap());
    assert_eq!(second.await.unwrap().unwrap().status, RunStatus::Completed);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    assert_eq!(world.state("c2").await.phase, Phase::Done);
    assert_eq!(orchestrator.registry().len().await, 1);
}

#[tokio::test]
async fn test_idle_supervisors_are_evicted() {
    let world = World::new();
    let mut config = fast_config();
    config.session.retention_secs = 0;
    let orchestrator = world.builder(config).build().unwrap();

    orchestrator.start("e1", "prepare the quarterly report").await.unwrap();
    assert_eq!(orchestrator.registry().len().await, 1);
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(orchestrator.evict_idle_sessions().await, 1);
    assert!(orchestrator.registry().is_empty().await);

    // 检查点仍在，新的运行会重新注册监管对象
    let outcome = orchestrator.resume("e1", "and send it to the board").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(orchestrator.registry().len().await, 1);
}
