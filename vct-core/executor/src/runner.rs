//! 流程执行器
//!
//! 在一个工作任务上按固定顺序执行部分中的步骤，维护运行状态，
//! 并把操作员取消转换为唯一一条 ABORT 结果。
//!
//! 状态机: `Idle → Running → {Completed, Aborted, Failed}`，终止状态不可再运行，
//! 新的运行需要 [`ProcedureRunner::reset`] 生成新的运行状态。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use vct_transport::Transport;

use crate::listener::{StepStart, TestListener};
use crate::report::{PartReport, PartStatus, ProcedureReport, StepReport};
use crate::step::{Part, Procedure};
use crate::wait::{EngineStateMonitor, SharedEngineState};
use crate::{Clock, EngineConfig, ExecutorError, Result, Session, SystemClock};

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Aborted | RunStatus::Failed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RunStatus::Idle => "Idle",
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Aborted => "Aborted",
            RunStatus::Failed => "Failed",
        };
        f.write_str(text)
    }
}

/// 单次运行的位置与状态
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,

    /// 当前部分编号
    pub part: u8,

    /// 当前步骤编号
    pub step: u8,

    pub status: RunStatus,

    /// 开始时间（墙上时间）
    pub started_at: DateTime<Utc>,

    /// 开始时间（运行时钟）
    pub started_ms: u64,
}

impl RunState {
    pub fn new(now_ms: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            part: 0,
            step: 0,
            status: RunStatus::Idle,
            started_at: Utc::now(),
            started_ms: now_ms,
        }
    }

    /// 前进到指定位置
    pub(crate) fn enter(&mut self, part: u8, step: u8) {
        self.part = part;
        self.step = step;
    }
}

/// 流程执行器
pub struct ProcedureRunner {
    config: Arc<EngineConfig>,
    transport: Arc<dyn Transport>,
    listener: Arc<dyn TestListener>,
    clock: Arc<dyn Clock>,
    engine: Arc<dyn EngineStateMonitor>,
    cancel: CancellationToken,
    session: Session,

    /// 已执行部分的报告（含失败的部分）
    reports: Vec<PartReport>,
}

impl ProcedureRunner {
    /// 创建执行器，默认使用系统时钟与未知的钥匙状态
    pub fn new(transport: Arc<dyn Transport>, listener: Arc<dyn TestListener>) -> Self {
        let config = Arc::new(EngineConfig::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let engine: Arc<dyn EngineStateMonitor> = Arc::new(SharedEngineState::default());
        let cancel = CancellationToken::new();
        let session = Session::new(
            Arc::clone(&config),
            Arc::clone(&transport),
            Arc::clone(&listener),
            Arc::clone(&clock),
            Arc::clone(&engine),
            cancel.clone(),
        );
        Self {
            config,
            transport,
            listener,
            clock,
            engine,
            cancel,
            session,
            reports: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self.rebuild_session();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebuild_session();
        self
    }

    pub fn with_engine_monitor(mut self, engine: Arc<dyn EngineStateMonitor>) -> Self {
        self.engine = engine;
        self.rebuild_session();
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self.rebuild_session();
        self
    }

    fn rebuild_session(&mut self) {
        self.session = Session::new(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            Arc::clone(&self.listener),
            Arc::clone(&self.clock),
            Arc::clone(&self.engine),
            self.cancel.clone(),
        );
    }

    /// 丢弃当前运行的全部状态，准备新的运行
    ///
    /// 已被设置的取消标志不会带入新的运行。
    pub fn reset(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.reports.clear();
        self.rebuild_session();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn status(&self) -> RunStatus {
        self.session.state.status
    }

    pub fn reports(&self) -> &[PartReport] {
        &self.reports
    }

    /// 外壳的 `Stop()` 使用的取消句柄
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 执行一个部分
    ///
    /// 操作员取消时返回 `Ok`，报告状态为 `Aborted`；步骤的其他错误对部分是致命的，
    /// 运行状态变为 `Failed` 并返回 `ExecutorError::StepFailed`。
    pub async fn run_part(&mut self, part: &Part) -> Result<PartReport> {
        let status = self.session.state.status;
        if status.is_terminal() {
            return Err(ExecutorError::RunFinished(status.to_string()));
        }
        self.session.state.status = RunStatus::Running;

        let run_id = self.session.state.run_id.to_string();
        let mut report = PartReport::new(&run_id, part.number(), part.name());
        let part_start = self.clock.now_ms();
        info!("开始执行 Part {}: {}", part.number(), part.name());

        let total = part.len();
        let mut fatal = None;

        for (index, step) in part.steps().iter().enumerate() {
            let step_number = (index + 1) as u8;
            self.session.state.enter(part.number(), step_number);

            if self.session.is_cancelled() {
                self.abort(&mut report, step_number, step.description(), 0);
                break;
            }

            let start = StepStart {
                part: part.number(),
                step: step_number,
                total_steps: total,
                display_name: part.display_name(step_number),
                description: step.description().to_string(),
            };
            self.listener.on_step_started(&start);
            info!("执行步骤 {}/{}: {}", step_number, total, step.description());

            let before = self.session.outcomes().len();
            let step_start = self.clock.now_ms();
            let result = step.run(&mut self.session).await;
            let duration = self.clock.now_ms().saturating_sub(step_start);

            match result {
                Ok(()) => {
                    let produced = &self.session.outcomes().all()[before..];
                    report.add_step(StepReport::finished(
                        part.number(),
                        step_number,
                        step.description(),
                        produced,
                        duration,
                    ));
                }
                Err(ExecutorError::Cancelled { .. }) => {
                    self.abort(&mut report, step_number, step.description(), duration);
                    break;
                }
                Err(e) => {
                    error!("{} 失败: {}", part.display_name(step_number), e);
                    let produced = &self.session.outcomes().all()[before..];
                    report.add_step(StepReport::errored(
                        part.number(),
                        step_number,
                        step.description(),
                        produced,
                        duration,
                        &e.to_string(),
                    ));
                    report.status = PartStatus::Failed;
                    self.session.state.status = RunStatus::Failed;
                    fatal = Some(ExecutorError::StepFailed {
                        part: part.number(),
                        step: step_number,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        report.duration_ms = self.clock.now_ms().saturating_sub(part_start);
        report.outcomes = self.session.outcomes().for_part(part.number());
        info!(
            "Part {} 结束: {:?}, 执行 {}/{} 步骤, {} FAIL, {} WARN",
            part.number(),
            report.status,
            report.steps_executed,
            total,
            report.fail_count(),
            report.warn_count()
        );
        self.reports.push(report.clone());

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn abort(&mut self, report: &mut PartReport, step: u8, description: &str, duration: u64) {
        let part = self.session.part();
        warn!("操作员取消: Part {} Step {}", part, step);
        let before = self.session.outcomes().len();
        self.session.add_abort(format!(
            "User cancelled testing at Part {} Step {}",
            part, step
        ));
        let produced = &self.session.outcomes().all()[before..];
        report.add_step(StepReport::aborted(part, step, description, produced, duration));
        report.status = PartStatus::Aborted;
        self.session.state.status = RunStatus::Aborted;
    }

    /// 按顺序执行全部部分，遇到 `Aborted` 或 `Failed` 的部分即停止
    pub async fn run(&mut self, procedure: &Procedure) -> Result<ProcedureReport> {
        procedure.validate()?;
        let status = self.session.state.status;
        if status != RunStatus::Idle {
            return Err(ExecutorError::RunFinished(status.to_string()));
        }

        let run_id = self.session.state.run_id.to_string();
        info!("开始运行 {} ({} 个部分)", run_id, procedure.parts().len());
        let mut report = ProcedureReport::new(&run_id);

        for part in procedure.parts() {
            let part_report = self.run_part(part).await?;
            let finished = part_report.status;
            report.parts.push(part_report);
            if finished != PartStatus::Completed {
                break;
            }
        }

        if !self.session.state.status.is_terminal() {
            self.session.state.status = RunStatus::Completed;
        }
        report.status = self.session.state.status;
        info!(
            "运行 {} 结束: {}, {} FAIL, {} WARN",
            run_id,
            report.status,
            report.fail_count(),
            report.warn_count()
        );
        Ok(report)
    }

    /// 在专用工作任务上运行整个流程
    pub fn spawn(self, procedure: Procedure) -> RunHandle {
        let cancel = self.cancel.clone();
        let mut runner = self;
        let handle = tokio::spawn(async move { runner.run(&procedure).await });
        RunHandle { cancel, handle }
    }
}

/// 后台运行的句柄
pub struct RunHandle {
    cancel: CancellationToken,
    handle: JoinHandle<Result<ProcedureReport>>,
}

impl RunHandle {
    /// 请求取消；工作任务在下一个挂起点退出
    pub fn stop(&self) {
        info!("收到停止请求");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 等待工作任务结束
    pub async fn join(self) -> Result<ProcedureReport> {
        self.handle
            .await
            .map_err(|e| ExecutorError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use crate::step::Step;
    use crate::{Severity, SimulatedClock, StepStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vct_transport::SimulatedBus;

    struct Counting {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step for Counting {
        fn description(&self) -> &str {
            "counting step"
        }

        async fn run(&self, session: &mut Session) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            session.sleep(Duration::from_secs(1)).await
        }
    }

    struct Warns;

    #[async_trait]
    impl Step for Warns {
        fn description(&self) -> &str {
            "warning step"
        }

        async fn run(&self, session: &mut Session) -> Result<()> {
            session.add_warning("6.1.2.1.a", "odd value");
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Step for Broken {
        fn description(&self) -> &str {
            "broken step"
        }

        async fn run(&self, _session: &mut Session) -> Result<()> {
            Err(ExecutorError::Step("decoder failed".to_string()))
        }
    }

    fn runner(listener: Arc<RecordingListener>) -> ProcedureRunner {
        ProcedureRunner::new(Arc::new(SimulatedBus::new()), listener)
            .with_clock(Arc::new(SimulatedClock::new()))
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_start_events() {
        let listener = Arc::new(RecordingListener::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let part = Part::new(1, "Part 1")
            .with_step(Counting { runs: runs.clone() })
            .with_step(Warns)
            .with_step(Counting { runs: runs.clone() });

        let mut runner = runner(listener.clone());
        let report = runner.run_part(&part).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(report.status, PartStatus::Completed);
        assert_eq!(report.steps[1].status, StepStatus::Warned);
        assert_eq!(report.duration_ms, 2000);

        let steps = listener.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].display_name, "Part 1 Step 3");
        assert_eq!(steps[2].total_steps, 3);
        assert_eq!(runner.session().step(), 3);
        assert_eq!(runner.status(), RunStatus::Running);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_part() {
        let listener = Arc::new(RecordingListener::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let part = Part::new(2, "Part 2")
            .with_step(Broken)
            .with_step(Counting { runs: runs.clone() });

        let mut runner = runner(listener.clone());
        let err = runner.run_part(&part).await.unwrap_err();

        assert!(matches!(err, ExecutorError::StepFailed { part: 2, step: 1, .. }));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(runner.status(), RunStatus::Failed);
        assert_eq!(runner.reports()[0].steps[0].status, StepStatus::Errored);
        assert!(listener.outcomes().is_empty());

        let again = runner.run_part(&part).await.unwrap_err();
        assert!(matches!(again, ExecutorError::RunFinished(_)));
    }

    #[tokio::test]
    async fn test_cancel_before_step_aborts_once() {
        let listener = Arc::new(RecordingListener::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let part = Part::new(1, "Part 1").with_step(Counting { runs: runs.clone() });

        let mut runner = runner(listener.clone());
        runner.cancel_token().cancel();
        let report = runner.run_part(&part).await.unwrap();

        assert_eq!(report.status, PartStatus::Aborted);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let outcomes = listener.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].severity, Severity::Abort);
        assert_eq!(outcomes[0].message, "User cancelled testing at Part 1 Step 1");
    }

    #[tokio::test]
    async fn test_run_completes_and_rejects_second_run() {
        let listener = Arc::new(RecordingListener::new());
        let procedure = Procedure::new()
            .with_part(Part::new(1, "Part 1").with_step(Warns))
            .with_part(Part::new(2, "Part 2").with_step(Warns));

        let mut runner = runner(listener.clone());
        let report = runner.run(&procedure).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.parts.len(), 2);
        assert_eq!(report.warn_count(), 2);
        assert!(runner.run(&procedure).await.is_err());

        runner.reset();
        assert_eq!(runner.status(), RunStatus::Idle);
        assert!(runner.session().outcomes().is_empty());
        assert!(runner.run(&procedure).await.is_ok());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Idle.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Aborted.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
