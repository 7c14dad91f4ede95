//! 单次运行的上下文
//!
//! [`Session`] 在运行开始时创建一次，显式传入每个步骤。它持有协作者
//! (传输、监听、时钟、发动机状态)、取消标志、数据仓库、结果日志与运行状态。
//! 重复或并发的运行各自拥有独立的 `Session`，互不干扰。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vct_transport::Transport;

use crate::background::KeepAlive;
use crate::listener::{Prompt, TestListener};
use crate::outcome::{Finding, Outcome, OutcomeFilter, OutcomeLog, Severity};
use crate::retry::RetryPolicy;
use crate::runner::RunState;
use crate::store::{DataRepository, EcuRecord, VehicleInformation};
use crate::wait::EngineStateMonitor;
use crate::{Clock, EngineConfig, ExecutorError, Result};

pub struct Session {
    config: Arc<EngineConfig>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) listener: Arc<dyn TestListener>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) engine: Arc<dyn EngineStateMonitor>,
    cancel: CancellationToken,
    repository: DataRepository,
    outcomes: OutcomeLog,
    pub(crate) state: RunState,
}

impl Session {
    pub fn new(
        config: Arc<EngineConfig>,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn TestListener>,
        clock: Arc<dyn Clock>,
        engine: Arc<dyn EngineStateMonitor>,
        cancel: CancellationToken,
    ) -> Self {
        let vehicle = VehicleInformation::from(&config.vehicle);
        let state = RunState::new(clock.now_ms());
        Self {
            config,
            transport,
            listener,
            clock,
            engine,
            cancel,
            repository: DataRepository::new(vehicle),
            outcomes: OutcomeLog::new(),
            state,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &DataRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut DataRepository {
        &mut self.repository
    }

    /// 当前部分中访问 ECU 记录，首次访问时创建
    pub fn ecu_mut(&mut self, address: u8) -> &mut EcuRecord {
        let part = self.state.part;
        self.repository.get_ecu(address, part)
    }

    pub fn outcomes(&self) -> &OutcomeLog {
        &self.outcomes
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 当前部分编号
    pub fn part(&self) -> u8 {
        self.state.part
    }

    /// 当前步骤编号
    pub fn step(&self) -> u8 {
        self.state.step
    }

    /// 取消标志的句柄，交给外壳的 `Stop()` 使用
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 按配置生成重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    // ========================================
    // 挂起点
    // ========================================

    pub(crate) fn cancelled_error(&self) -> ExecutorError {
        ExecutorError::Cancelled {
            part: self.state.part,
            step: self.state.step,
        }
    }

    /// 检查取消标志
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(self.cancelled_error())
        } else {
            Ok(())
        }
    }

    /// 在取消标志被设置前等待 `future` 完成
    pub(crate) async fn until_cancelled<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future,
    {
        self.check_cancelled()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            output = future => Ok(output),
        }
    }

    /// 可取消的睡眠
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.until_cancelled(self.clock.sleep(duration)).await?;
        self.check_cancelled()
    }

    /// 向操作员提出是/否问题，挂起直到得到回答
    ///
    /// 回答通道在未回答时被丢弃视为 "否"。
    pub async fn prompt_yes_no(&self, message: &str, title: &str) -> Result<bool> {
        self.check_cancelled()?;

        let (prompt, rx) = Prompt::new(title, message);
        info!("等待操作员确认: {}", message);
        self.listener.on_prompt(prompt);

        let answer = self.until_cancelled(rx).await?.unwrap_or(false);

        info!("操作员回答: {}", if answer { "Yes" } else { "No" });
        Ok(answer)
    }

    /// 启动保活任务，返回的守卫被丢弃时任务停止
    pub fn keep_alive(&self) -> Result<KeepAlive> {
        KeepAlive::start(
            Arc::clone(&self.transport),
            self.config.bus.keep_alive_interval(),
        )
    }

    // ========================================
    // 输出
    // ========================================

    pub fn progress(&self, message: impl AsRef<str>) {
        debug!("{}", message.as_ref());
        self.listener.on_progress(message.as_ref());
    }

    pub fn milestone(&self, message: impl AsRef<str>) {
        info!("{}", message.as_ref());
        self.listener.on_milestone(message.as_ref());
    }

    pub fn result(&self, line: impl AsRef<str>) {
        debug!("{}", line.as_ref());
        self.listener.on_result(line.as_ref());
    }

    // ========================================
    // 结果上报
    // ========================================

    /// 记录 FAIL
    pub fn add_failure(&mut self, rule_id: &str, message: impl Into<String>) {
        self.report(Finding::fail(rule_id, message));
    }

    /// 记录 WARN
    pub fn add_warning(&mut self, rule_id: &str, message: impl Into<String>) {
        self.report(Finding::warn(rule_id, message));
    }

    /// 记录一条判定，绑定当前部分/步骤
    pub fn report(&mut self, finding: Finding) {
        let outcome = Outcome::from_finding(self.state.part, self.state.step, finding);
        self.record(outcome);
    }

    /// 同一 (规则编号, 内容) 在 `filter` 的生命周期内只上报一次，返回是否上报
    pub fn report_once(&mut self, filter: &mut OutcomeFilter, finding: Finding) -> bool {
        let admitted = filter.admit(&finding.rule_id, &finding.message);
        if admitted {
            self.report(finding);
        }
        admitted
    }

    pub fn report_all(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.report(finding);
        }
    }

    /// 记录 ABORT，只用于操作员取消
    pub(crate) fn add_abort(&mut self, message: impl Into<String>) {
        let outcome = Outcome::abort(self.state.part, self.state.step, message);
        self.record(outcome);
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome.severity {
            Severity::Fail | Severity::Warn => warn!("{}", outcome),
            Severity::Abort => error!("{}", outcome),
        }
        self.listener.on_outcome(&outcome);
        self.outcomes.push(outcome);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::listener::RecordingListener;

    #[tokio::test]
    async fn test_outcomes_are_tagged_with_position() {
        let harness = Harness::new(RecordingListener::new());
        let mut session = harness.session(EngineConfig::default());
        session.state.part = 2;
        session.state.step = 7;

        session.add_failure("6.2.7.2.a", "bad value");
        session.add_warning("6.2.7.3.a", "odd value");

        let outcomes = harness.listener.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].part, 2);
        assert_eq!(outcomes[0].step, 7);
        assert_eq!(outcomes[0].severity, Severity::Fail);
        assert_eq!(outcomes[1].severity, Severity::Warn);
        assert_eq!(session.outcomes().len(), 2);
    }

    #[tokio::test]
    async fn test_report_once_suppresses_repeats() {
        let harness = Harness::new(RecordingListener::new());
        let mut session = harness.session(EngineConfig::default());
        let mut filter = OutcomeFilter::new();

        assert!(session.report_once(&mut filter, Finding::warn("6.4.2.2.c", "malformed")));
        assert!(!session.report_once(&mut filter, Finding::warn("6.4.2.2.c", "malformed")));
        assert!(session.report_once(&mut filter, Finding::warn("6.4.2.2.c", "other")));

        assert_eq!(harness.listener.outcomes().len(), 2);
    }

    #[tokio::test]
    async fn test_ecu_record_created_in_current_part() {
        let harness = Harness::new(RecordingListener::new());
        let mut session = harness.session(EngineConfig::default());
        session.state.part = 3;

        session.ecu_mut(0x17).ignition_cycle_counter = Some(4);

        let ecu = session.repository().ecu(0x17).unwrap();
        assert_eq!(ecu.first_seen_part, 3);
        assert_eq!(ecu.ignition_cycle_counter, Some(4));
    }

    #[tokio::test]
    async fn test_sleep_observes_cancellation() {
        let harness = Harness::new(RecordingListener::new());
        let session = harness.session(EngineConfig::default());

        session.sleep(Duration::from_secs(1)).await.unwrap();
        harness.cancel.cancel();
        let err = session.sleep(Duration::from_secs(1)).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(harness.clock.now_ms(), 1000);
    }

    #[tokio::test]
    async fn test_prompt_uses_listener_answer() {
        let harness = Harness::new(RecordingListener::with_answers([true, false]));
        let session = harness.session(EngineConfig::default());

        assert!(session.prompt_yes_no("Continue?", "Question").await.unwrap());
        assert!(!session.prompt_yes_no("Continue?", "Question").await.unwrap());
        assert_eq!(harness.listener.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_prompt_after_cancel_is_not_asked() {
        let harness = Harness::new(RecordingListener::with_answers([true]));
        let session = harness.session(EngineConfig::default());
        harness.cancel.cancel();

        assert!(session.prompt_yes_no("Continue?", "Question").await.is_err());
        assert!(harness.listener.prompts().is_empty());
    }
}
