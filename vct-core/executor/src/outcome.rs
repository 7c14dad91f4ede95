//! 测试结果 (FAIL/WARN/ABORT)
//!
//! 结果只追加不去重。需要抑制重复上报的步骤自行使用 [`OutcomeFilter`]。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Fail,
    Warn,
    Abort,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Severity::Fail => "FAIL",
            Severity::Warn => "WARN",
            Severity::Abort => "ABORT",
        };
        f.write_str(text)
    }
}

/// 尚未绑定部分/步骤的判定，纯函数检查的返回值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub rule_id: String,
    pub message: String,
}

impl Finding {
    pub fn fail(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fail,
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }

    pub fn warn(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }
}

/// 一条测试结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub part: u8,
    pub step: u8,
    pub severity: Severity,

    /// 规则编号，ABORT 没有规则编号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    pub message: String,
}

impl Outcome {
    pub fn from_finding(part: u8, step: u8, finding: Finding) -> Self {
        Self {
            part,
            step,
            severity: finding.severity,
            rule_id: Some(finding.rule_id),
            message: finding.message,
        }
    }

    pub fn abort(part: u8, step: u8, message: impl Into<String>) -> Self {
        Self {
            part,
            step,
            severity: Severity::Abort,
            rule_id: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rule_id {
            Some(rule_id) => write!(f, "{}: {} - {}", self.severity, rule_id, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// 单次运行的结果日志
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeLog {
    outcomes: Vec<Outcome>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn all(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.severity == severity)
            .count()
    }

    /// 某部分某步骤产生的结果
    pub fn for_step(&self, part: u8, step: u8) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.part == part && o.step == step)
    }

    /// 某部分产生的结果
    pub fn for_part(&self, part: u8) -> Vec<Outcome> {
        self.outcomes
            .iter()
            .filter(|o| o.part == part)
            .cloned()
            .collect()
    }
}

/// 步骤内的去重过滤器
///
/// 周期性检查在同一次步骤调用中对同一违规只上报一次。
#[derive(Debug, Default)]
pub struct OutcomeFilter {
    seen: HashSet<(String, String)>,
}

impl OutcomeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 首次出现返回 true
    pub fn admit(&mut self, rule_id: &str, message: &str) -> bool {
        self.seen.insert((rule_id.to_string(), message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        let fail = Outcome::from_finding(4, 2, Finding::fail("6.4.2.2.b", "No ECU reported MIL on"));
        assert_eq!(fail.to_string(), "FAIL: 6.4.2.2.b - No ECU reported MIL on");

        let abort = Outcome::abort(1, 3, "User cancelled testing at Part 1 Step 3");
        assert_eq!(abort.to_string(), "ABORT: User cancelled testing at Part 1 Step 3");
    }

    #[test]
    fn test_log_counts_and_filters() {
        let mut log = OutcomeLog::new();
        log.push(Outcome::from_finding(1, 1, Finding::fail("a", "x")));
        log.push(Outcome::from_finding(1, 2, Finding::warn("b", "y")));
        log.push(Outcome::from_finding(2, 1, Finding::fail("a", "x")));

        assert_eq!(log.len(), 3);
        assert_eq!(log.count(Severity::Fail), 2);
        assert_eq!(log.count(Severity::Warn), 1);
        assert_eq!(log.for_step(1, 2).count(), 1);
        assert_eq!(log.for_part(1).len(), 2);
    }

    #[test]
    fn test_log_does_not_deduplicate() {
        let mut log = OutcomeLog::new();
        log.push(Outcome::from_finding(1, 1, Finding::fail("a", "x")));
        log.push(Outcome::from_finding(1, 1, Finding::fail("a", "x")));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_filter_admits_once() {
        let mut filter = OutcomeFilter::new();
        assert!(filter.admit("6.1.4.2.a", "MIL on"));
        assert!(!filter.admit("6.1.4.2.a", "MIL on"));
        assert!(filter.admit("6.1.4.2.a", "MIL flashing"));
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Fail).unwrap();
        assert_eq!(json, "\"FAIL\"");
    }
}
