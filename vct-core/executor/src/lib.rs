//! VCT 执行器
//!
//! 合规测试流程的执行引擎：按固定顺序逐个执行部分 (Part) 中的步骤 (Step)，
//! 管理请求/重试/确认协议、跨部分数据存储、结果上报以及环境等待。

pub mod background;
pub mod clock;
pub mod config;
pub mod listener;
pub mod outcome;
pub mod report;
pub mod request;
pub mod retry;
pub mod runner;
pub mod session;
pub mod step;
pub mod steps;
pub mod store;
pub mod wait;

pub use background::{KeepAlive, PeriodicTask, StatusTicker};
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::{EngineConfig, RetryConfig, VehicleConfig, WaitConfig};
pub use listener::{Prompt, RecordingListener, StepStart, TestListener};
pub use outcome::{Finding, Outcome, OutcomeFilter, OutcomeLog, Severity};
pub use report::{PartReport, PartStatus, ProcedureReport, StepReport, StepStatus};
pub use request::{
    check_nack_completeness, ds_ack_addresses, ds_data_addresses, DsResult, GlobalResult,
};
pub use retry::{RetryOutcome, RetryPolicy, RetryUntil};
pub use runner::{ProcedureRunner, RunHandle, RunState, RunStatus};
pub use session::Session;
pub use step::{Part, Procedure, Step};
pub use store::{DataRepository, EcuRecord, TestIdentifier, VehicleInformation};
pub use wait::{EngineStateMonitor, KeyState, SharedEngineState};

pub use tokio_util::sync::CancellationToken;

use thiserror::Error;
use vct_protocol::ProtocolError;
use vct_transport::TransportError;

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// 操作员取消；由生命周期转换为唯一一条 ABORT 结果
    #[error("User cancelled testing at Part {part} Step {step}")]
    Cancelled { part: u8, step: u8 },

    #[error("Part {part} Step {step} 执行失败: {message}")]
    StepFailed { part: u8, step: u8, message: String },

    #[error("运行已处于终止状态: {0}")]
    RunFinished(String),

    #[error("步骤错误: {0}")]
    Step(String),

    #[error("传输错误: {0}")]
    Transport(#[from] TransportError),

    #[error("协议错误: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("工作任务异常退出: {0}")]
    Worker(String),
}

impl ExecutorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutorError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
