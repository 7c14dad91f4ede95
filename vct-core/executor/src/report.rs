//! 执行报告

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::{Outcome, Severity};
use crate::runner::RunStatus;

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Passed,
    Warned,
    Failed,
    Aborted,
    Errored,
}

/// 步骤报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub part: u8,
    pub step: u8,

    /// `Part <p> Step <s>`
    pub display_name: String,

    /// 步骤描述
    pub description: String,

    /// 步骤状态
    pub status: StepStatus,

    /// 耗时（毫秒，取自运行时钟）
    pub duration_ms: u64,

    /// 本步骤产生的 FAIL 数
    pub fail_count: usize,

    /// 本步骤产生的 WARN 数
    pub warn_count: usize,

    /// 致命错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    /// 正常结束的步骤，状态由本步骤产生的结果决定
    pub fn finished(
        part: u8,
        step: u8,
        description: &str,
        outcomes: &[Outcome],
        duration_ms: u64,
    ) -> Self {
        let fail_count = count(outcomes, Severity::Fail);
        let warn_count = count(outcomes, Severity::Warn);
        let status = if fail_count > 0 {
            StepStatus::Failed
        } else if warn_count > 0 {
            StepStatus::Warned
        } else {
            StepStatus::Passed
        };
        Self {
            part,
            step,
            display_name: format!("Part {} Step {}", part, step),
            description: description.to_string(),
            status,
            duration_ms,
            fail_count,
            warn_count,
            error: None,
        }
    }

    pub fn aborted(
        part: u8,
        step: u8,
        description: &str,
        outcomes: &[Outcome],
        duration_ms: u64,
    ) -> Self {
        Self {
            status: StepStatus::Aborted,
            ..Self::finished(part, step, description, outcomes, duration_ms)
        }
    }

    pub fn errored(
        part: u8,
        step: u8,
        description: &str,
        outcomes: &[Outcome],
        duration_ms: u64,
        error: &str,
    ) -> Self {
        Self {
            status: StepStatus::Errored,
            error: Some(error.to_string()),
            ..Self::finished(part, step, description, outcomes, duration_ms)
        }
    }
}

fn count(outcomes: &[Outcome], severity: Severity) -> usize {
    outcomes.iter().filter(|o| o.severity == severity).count()
}

/// 部分的结束状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    Completed,
    Aborted,
    Failed,
}

/// 部分报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartReport {
    /// 运行标识
    pub run_id: String,

    pub part_number: u8,
    pub part_name: String,
    pub status: PartStatus,

    /// 开始时间
    pub started_at: DateTime<Utc>,

    /// 总耗时（毫秒，取自运行时钟）
    pub duration_ms: u64,

    /// 执行的步骤数
    pub steps_executed: usize,

    /// 步骤报告列表
    pub steps: Vec<StepReport>,

    /// 本部分产生的全部结果
    pub outcomes: Vec<Outcome>,
}

impl PartReport {
    pub fn new(run_id: &str, part_number: u8, part_name: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            part_number,
            part_name: part_name.to_string(),
            status: PartStatus::Completed,
            started_at: Utc::now(),
            duration_ms: 0,
            steps_executed: 0,
            steps: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn add_step(&mut self, step: StepReport) {
        self.steps_executed += 1;
        self.steps.push(step);
    }

    pub fn fail_count(&self) -> usize {
        count(&self.outcomes, Severity::Fail)
    }

    pub fn warn_count(&self) -> usize {
        count(&self.outcomes, Severity::Warn)
    }

    /// 正常完成且没有 FAIL
    pub fn passed(&self) -> bool {
        self.status == PartStatus::Completed && self.fail_count() == 0
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

/// 整个流程的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureReport {
    pub run_id: String,
    pub status: RunStatus,
    pub parts: Vec<PartReport>,
}

impl ProcedureReport {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            parts: Vec::new(),
        }
    }

    /// 全部结果
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.parts.iter().flat_map(|p| p.outcomes.iter())
    }

    pub fn fail_count(&self) -> usize {
        self.parts.iter().map(PartReport::fail_count).sum()
    }

    pub fn warn_count(&self) -> usize {
        self.parts.iter().map(PartReport::warn_count).sum()
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}
