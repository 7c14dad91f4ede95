//! 有界重试直到条件成立
//!
//! 两阶段形状：
//!
//! 1. 静默重试：每隔固定间隔尝试一次，直到条件成立或达到尝试上限；
//!    第一次尝试之前不睡眠，最后一次尝试之后也不睡眠。
//! 2. 到达上限且条件仍未成立时，只向操作员提问一次；
//!    回答 "是" 则再给一轮上限（编号继续递增，不再提问），回答 "否" 立即停止。
//!
//! 调用方以 `while let Some(attempt) = retry.next_attempt(session).await? { ... }`
//! 驱动循环，并在条件成立时调用 [`RetryUntil::satisfy`]。

use std::time::Duration;
use tracing::{debug, info};

use crate::config::RetryConfig;
use crate::outcome::Finding;
use crate::{Result, Session};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 单阶段最大尝试次数
    pub max_attempts: u32,

    /// 两次尝试之间的间隔
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 300,
            interval: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: config.interval(),
        }
    }
}

/// 重试结束时的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    /// 实际尝试次数
    pub attempts: u32,

    /// 条件是否成立
    pub satisfied: bool,

    /// 操作员是否在检查点选择停止
    pub operator_stopped: bool,
}

/// 有界重试循环
#[derive(Debug)]
pub struct RetryUntil {
    policy: RetryPolicy,
    label: String,
    checkpoint_message: String,
    title: String,
    attempt: u32,
    ceiling: u32,
    satisfied: bool,
    operator_stopped: bool,
    checkpoint_asked: bool,
}

impl RetryUntil {
    /// `label` 用于进度行 `"<label>... Attempt N"`，
    /// `checkpoint_message` 是到达上限时的提问
    pub fn new(
        policy: RetryPolicy,
        label: impl Into<String>,
        checkpoint_message: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            label: label.into(),
            checkpoint_message: checkpoint_message.into(),
            title: "Question".to_string(),
            attempt: 0,
            ceiling: policy.max_attempts,
            satisfied: false,
            operator_stopped: false,
            checkpoint_asked: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// 开始下一次尝试，返回尝试编号；循环应结束时返回 `None`
    pub async fn next_attempt(&mut self, session: &Session) -> Result<Option<u32>> {
        session.check_cancelled()?;

        if self.satisfied || self.operator_stopped {
            return Ok(None);
        }

        if self.attempt >= self.ceiling {
            if self.checkpoint_asked {
                debug!("{}: 第二阶段达到上限 {}", self.label, self.ceiling);
                return Ok(None);
            }
            self.checkpoint_asked = true;

            let resume = session
                .prompt_yes_no(&self.checkpoint_message, &self.title)
                .await?;
            if !resume {
                info!("{}: 操作员在第 {} 次尝试后停止", self.label, self.attempt);
                self.operator_stopped = true;
                return Ok(None);
            }
            self.ceiling = self.ceiling.saturating_add(self.policy.max_attempts);
            info!("{}: 操作员选择继续，上限提高到 {}", self.label, self.ceiling);
        }

        if self.attempt > 0 {
            session.sleep(self.policy.interval).await?;
        }

        self.attempt += 1;
        session.progress(format!("{}... Attempt {}", self.label, self.attempt));
        session.result(format!("Attempt {}", self.attempt));
        Ok(Some(self.attempt))
    }

    /// 标记条件成立，下一次 `next_attempt` 返回 `None`
    pub fn satisfy(&mut self) {
        self.satisfied = true;
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn operator_stopped(&self) -> bool {
        self.operator_stopped
    }

    pub fn outcome(&self) -> RetryOutcome {
        RetryOutcome {
            attempts: self.attempt,
            satisfied: self.satisfied,
            operator_stopped: self.operator_stopped,
        }
    }

    /// 结束循环；条件从未成立时上报 `unmet` 给出的 FAIL
    pub fn finish<F>(self, session: &mut Session, unmet: F) -> RetryOutcome
    where
        F: FnOnce(&RetryOutcome) -> Vec<Finding>,
    {
        let outcome = self.outcome();
        if !outcome.satisfied {
            session.report_all(unmet(&outcome));
        }
        outcome
    }
}
