//! 控制台监听器
//!
//! 把引擎事件渲染到终端：进度行用 spinner 覆盖式显示，结果按严重程度着色，
//! 是/否提问在独立线程上读取标准输入，不阻塞执行任务。

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::warn;

use vct_executor::{Outcome, Prompt, Severity, StepStart, TestListener};

pub struct ConsoleListener {
    spinner: ProgressBar,
}

impl ConsoleListener {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self { spinner }
    }

    /// 结束 spinner，运行完成后调用
    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    fn line(&self, text: String) {
        self.spinner.println(text);
    }
}

impl Default for ConsoleListener {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析操作员输入，只接受 y/yes/n/no
fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn ask(prompt: Prompt) {
    let stdin = io::stdin();
    loop {
        print!("{} ", "[y/n]".yellow().bold());
        let _ = io::stdout().flush();

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            // 标准输入关闭，按 "否" 处理
            Ok(0) => {
                prompt.answer(false);
                return;
            }
            Ok(_) => {
                if let Some(answer) = parse_answer(&input) {
                    prompt.answer(answer);
                    return;
                }
                println!("请输入 y 或 n");
            }
            Err(e) => {
                warn!("读取标准输入失败: {}", e);
                return;
            }
        }
    }
}

impl TestListener for ConsoleListener {
    fn on_step_started(&self, start: &StepStart) {
        self.line(format!(
            "{} {}",
            format!("[{}/{}] {}", start.step, start.total_steps, start.display_name)
                .cyan()
                .bold(),
            start.description
        ));
    }

    fn on_progress(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    fn on_milestone(&self, message: &str) {
        self.line(format!("{} {}", "▶".blue().bold(), message));
    }

    fn on_result(&self, line: &str) {
        self.line(format!("  {}", line.bright_black()));
    }

    fn on_outcome(&self, outcome: &Outcome) {
        let text = outcome.to_string();
        let colored = match outcome.severity {
            Severity::Fail => text.red().bold(),
            Severity::Warn => text.yellow(),
            Severity::Abort => text.magenta().bold(),
        };
        self.line(format!("  {}", colored));
    }

    fn on_prompt(&self, prompt: Prompt) {
        self.line(String::new());
        self.line(format!("{}", prompt.title.yellow().bold()));
        self.line(prompt.message.clone());

        // 读取标准输入会阻塞，放到独立线程
        std::thread::spawn(move || ask(prompt));
    }
}
