//! 测试流程定义
//!
//! 流程 (Procedure) 是按编号排列的部分 (Part)，部分是按顺序排列的步骤 (Step)。
//! 编号由位置决定，编译进流程定义后不再改变。

use async_trait::async_trait;

use crate::{ExecutorError, Result, Session};

/// 步骤
///
/// 步骤自行把可恢复的情况转换为测试结果；返回的 `Err` 对所在部分是致命的，
/// 只有 `ExecutorError::Cancelled` 会被生命周期转换为 ABORT。
#[async_trait]
pub trait Step: Send + Sync {
    /// 步骤描述
    fn description(&self) -> &str;

    /// 执行步骤
    async fn run(&self, session: &mut Session) -> Result<()>;
}

/// 测试部分
pub struct Part {
    number: u8,
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl Part {
    pub fn new(number: u8, name: impl Into<String>) -> Self {
        Self {
            number,
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// 追加步骤，步骤编号为追加后的位置
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 步骤显示名 `Part <p> Step <s>`
    pub fn display_name(&self, step: u8) -> String {
        format!("Part {} Step {}", self.number, step)
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("number", &self.number)
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// 完整测试流程
#[derive(Debug, Default)]
pub struct Procedure {
    parts: Vec<Part>,
}

impl Procedure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// 按编号查找部分
    pub fn part(&self, number: u8) -> Option<&Part> {
        self.parts.iter().find(|p| p.number == number)
    }

    /// 检查部分编号为 1..N 连续递增，步骤数不超过编号上限
    pub fn validate(&self) -> Result<()> {
        for (index, part) in self.parts.iter().enumerate() {
            let expected = index + 1;
            if usize::from(part.number) != expected {
                return Err(ExecutorError::ConfigError(format!(
                    "部分编号不连续: 位置 {} 的部分编号为 {}",
                    expected, part.number
                )));
            }
            if part.len() > usize::from(u8::MAX) {
                return Err(ExecutorError::ConfigError(format!(
                    "Part {} 步骤过多: {}",
                    part.number,
                    part.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl Step for Noop {
        fn description(&self) -> &str {
            self.0
        }

        async fn run(&self, _session: &mut Session) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_part_positions() {
        let part = Part::new(3, "Part three")
            .with_step(Noop("first"))
            .with_step(Noop("second"));

        assert_eq!(part.len(), 2);
        assert_eq!(part.steps()[1].description(), "second");
        assert_eq!(part.display_name(2), "Part 3 Step 2");
    }

    #[test]
    fn test_procedure_validation() {
        let ok = Procedure::new()
            .with_part(Part::new(1, "one"))
            .with_part(Part::new(2, "two"));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.part(2).unwrap().name(), "two");

        let gap = Procedure::new()
            .with_part(Part::new(1, "one"))
            .with_part(Part::new(3, "three"));
        assert!(gap.validate().is_err());
    }
}
