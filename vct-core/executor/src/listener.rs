//! 交互外壳 (shell) 的监听接口
//!
//! 引擎通过 [`TestListener`] 输出进度行、里程碑行、结果行和测试结果，
//! 并通过 [`Prompt`] 向操作员提出是/否问题。提问时工作任务挂起，
//! 直到操作员经由 `Prompt::answer` 给出回答。

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::Outcome;

/// 步骤开始事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStart {
    pub part: u8,
    pub step: u8,
    pub total_steps: usize,

    /// `Part <p> Step <s>`
    pub display_name: String,

    /// 步骤自身的描述
    pub description: String,
}

/// 是/否提问
#[derive(Debug)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    reply: oneshot::Sender<bool>,
}

impl Prompt {
    /// 创建提问与对应的应答接收端
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                title: title.into(),
                message: message.into(),
                reply,
            },
            rx,
        )
    }

    /// 回答提问，`true` 表示继续
    pub fn answer(self, yes: bool) {
        // 工作任务已退出（例如被取消）时接收端已经关闭，回答直接丢弃
        let _ = self.reply.send(yes);
    }
}

/// 监听接口
pub trait TestListener: Send + Sync {
    /// 步骤开始
    fn on_step_started(&self, start: &StepStart);

    /// 进度行（覆盖式显示，例如 "Attempt N"）
    fn on_progress(&self, message: &str);

    /// 里程碑行
    fn on_milestone(&self, _message: &str) {}

    /// 结果行
    fn on_result(&self, line: &str);

    /// 测试结果
    fn on_outcome(&self, outcome: &Outcome);

    /// 是/否提问；实现必须最终调用 `Prompt::answer` 或丢弃 `Prompt`
    fn on_prompt(&self, prompt: Prompt);
}

#[derive(Debug, Default)]
struct Recorded {
    steps: Vec<StepStart>,
    progress: Vec<String>,
    milestones: Vec<String>,
    results: Vec<String>,
    outcomes: Vec<Outcome>,
    prompts: Vec<(String, String)>,
    answers: VecDeque<bool>,
}

/// 记录所有事件的监听器
///
/// 提问按脚本顺序回答，脚本用完后回答 "否"。
#[derive(Debug, Default)]
pub struct RecordingListener {
    inner: Mutex<Recorded>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置提问的回答
    pub fn with_answers(answers: impl IntoIterator<Item = bool>) -> Self {
        let listener = Self::default();
        listener.lock().answers = answers.into_iter().collect();
        listener
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn steps(&self) -> Vec<StepStart> {
        self.lock().steps.clone()
    }

    pub fn progress(&self) -> Vec<String> {
        self.lock().progress.clone()
    }

    pub fn milestones(&self) -> Vec<String> {
        self.lock().milestones.clone()
    }

    pub fn results(&self) -> Vec<String> {
        self.lock().results.clone()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.lock().outcomes.clone()
    }

    /// 收到的提问 (标题, 内容)
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.lock().prompts.clone()
    }
}

impl TestListener for RecordingListener {
    fn on_step_started(&self, start: &StepStart) {
        self.lock().steps.push(start.clone());
    }

    fn on_progress(&self, message: &str) {
        self.lock().progress.push(message.to_string());
    }

    fn on_milestone(&self, message: &str) {
        self.lock().milestones.push(message.to_string());
    }

    fn on_result(&self, line: &str) {
        self.lock().results.push(line.to_string());
    }

    fn on_outcome(&self, outcome: &Outcome) {
        self.lock().outcomes.push(outcome.clone());
    }

    fn on_prompt(&self, prompt: Prompt) {
        let answer = {
            let mut inner = self.lock();
            inner
                .prompts
                .push((prompt.title.clone(), prompt.message.clone()));
            inner.answers.pop_front().unwrap_or(false)
        };
        prompt.answer(answer);
    }
}
