//! 环境条件等待
//!
//! 阻塞工作任务直到钥匙/发动机状态满足条件，或者固定时长过去。
//! 所有等待都在每个轮询点检查取消标志。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::background::StatusTicker;
use crate::{Result, Session};

/// 钥匙与发动机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    KeyOff,
    KeyOnEngineOff,
    KeyOnEngineRunning,
    Unknown,
}

impl KeyState {
    pub fn is_key_on(&self) -> bool {
        matches!(self, KeyState::KeyOnEngineOff | KeyState::KeyOnEngineRunning)
    }

    pub fn is_engine_running(&self) -> bool {
        matches!(self, KeyState::KeyOnEngineRunning)
    }

    fn to_u8(self) -> u8 {
        match self {
            KeyState::KeyOff => 0,
            KeyState::KeyOnEngineOff => 1,
            KeyState::KeyOnEngineRunning => 2,
            KeyState::Unknown => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => KeyState::KeyOff,
            1 => KeyState::KeyOnEngineOff,
            2 => KeyState::KeyOnEngineRunning,
            _ => KeyState::Unknown,
        }
    }
}

impl std::fmt::Display for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            KeyState::KeyOff => "Key Off",
            KeyState::KeyOnEngineOff => "Key On, Engine Off",
            KeyState::KeyOnEngineRunning => "Key On, Engine Running",
            KeyState::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

/// 钥匙/发动机状态来源，由外部异步更新
pub trait EngineStateMonitor: Send + Sync {
    fn key_state(&self) -> KeyState;
}

/// 可由任意任务写入的共享状态
#[derive(Debug)]
pub struct SharedEngineState {
    state: AtomicU8,
}

impl SharedEngineState {
    pub fn new(state: KeyState) -> Self {
        Self {
            state: AtomicU8::new(state.to_u8()),
        }
    }

    pub fn set(&self, state: KeyState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    pub fn get(&self) -> KeyState {
        KeyState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Default for SharedEngineState {
    fn default() -> Self {
        Self::new(KeyState::Unknown)
    }
}

impl EngineStateMonitor for SharedEngineState {
    fn key_state(&self) -> KeyState {
        self.get()
    }
}

impl Session {
    /// 当前钥匙/发动机状态
    pub fn key_state(&self) -> KeyState {
        self.engine.key_state()
    }

    /// 轮询直到 `predicate` 成立，每次轮询输出一条进度行
    pub async fn wait_for_state<P>(&self, predicate: P, prompt_text: &str) -> Result<KeyState>
    where
        P: Fn(KeyState) -> bool + Send + Sync,
    {
        let poll = self.config().wait.poll_interval();
        loop {
            self.check_cancelled()?;
            let state = self.engine.key_state();
            if predicate(state) {
                info!("钥匙状态满足条件: {}", state);
                return Ok(state);
            }
            self.progress(prompt_text);
            self.sleep(poll).await?;
        }
    }

    pub async fn ensure_key_off(&self) -> Result<()> {
        if self.key_state() != KeyState::KeyOff {
            self.milestone("Please turn the Key OFF");
            self.wait_for_state(|s| s == KeyState::KeyOff, "Waiting for Key OFF...")
                .await?;
        }
        Ok(())
    }

    pub async fn ensure_key_on_engine_off(&self) -> Result<()> {
        if self.key_state() != KeyState::KeyOnEngineOff {
            self.milestone("Please turn the Key ON with the Engine OFF");
            self.wait_for_state(
                |s| s == KeyState::KeyOnEngineOff,
                "Waiting for Key ON, Engine OFF...",
            )
            .await?;
        }
        Ok(())
    }

    pub async fn ensure_key_on_engine_running(&self) -> Result<()> {
        if self.key_state() != KeyState::KeyOnEngineRunning {
            self.milestone("Please start the Engine");
            self.wait_for_state(
                |s| s == KeyState::KeyOnEngineRunning,
                "Waiting for Key ON, Engine RUNNING...",
            )
            .await?;
        }
        Ok(())
    }

    /// 倒计时，每剩余一秒输出一条进度行；模板中的 `{}` 替换为剩余秒数
    ///
    /// 等待期间保持总线保活。
    pub async fn pause(&self, seconds: u64, template: &str) -> Result<()> {
        let _keep_alive = self.keep_alive()?;
        for remaining in (1..=seconds).rev() {
            self.progress(template.replace("{}", &remaining.to_string()));
            self.sleep(Duration::from_secs(1)).await?;
        }
        Ok(())
    }

    /// 熄火后等待制造商声明的时长
    pub async fn wait_mfg_interval_with_key_off(&self) -> Result<()> {
        let seconds = self.repository().vehicle().key_off_interval_secs;
        self.ensure_key_off().await?;

        self.milestone(format!(
            "Waiting manufacturer's recommended interval with the key off ({} seconds)",
            seconds
        ));
        let _ticker = StatusTicker::start(
            Arc::clone(&self.listener),
            self.config().wait.status_period(),
            move |elapsed| {
                format!(
                    "Key off interval: {} of {} seconds elapsed",
                    elapsed.as_secs().min(seconds),
                    seconds
                )
            },
        )?;

        self.pause(
            seconds,
            "Waiting manufacturer's recommended interval with the key off... {} seconds remaining",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use crate::session::test_support::Harness;
    use crate::{Clock, EngineConfig, SystemClock};
    use std::sync::atomic::AtomicUsize;
    use tokio_util::sync::CancellationToken;
    use vct_transport::SimulatedBus;

    /// 使用真实 tokio 时间的会话，后台保活与等待走同一时间轴
    fn realtime_session(
        bus: Arc<SimulatedBus>,
        listener: Arc<RecordingListener>,
        engine: KeyState,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Session {
        Session::new(
            Arc::new(config),
            bus,
            listener,
            Arc::new(SystemClock::new()),
            Arc::new(SharedEngineState::new(engine)),
            cancel,
        )
    }

    fn cancel_after(cancel: &CancellationToken, after: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            cancel.cancel();
        });
    }

    /// 第 N 次查询后切换状态
    struct FlipAfter {
        polls: AtomicUsize,
        after: usize,
        to: KeyState,
    }

    impl EngineStateMonitor for FlipAfter {
        fn key_state(&self) -> KeyState {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.after {
                self.to
            } else {
                KeyState::KeyOnEngineRunning
            }
        }
    }

    #[test]
    fn test_shared_state_roundtrip() {
        let shared = SharedEngineState::default();
        assert_eq!(shared.key_state(), KeyState::Unknown);
        shared.set(KeyState::KeyOnEngineOff);
        assert_eq!(shared.get(), KeyState::KeyOnEngineOff);
        assert!(shared.get().is_key_on());
        assert!(!shared.get().is_engine_running());
    }

    #[tokio::test]
    async fn test_wait_for_state_polls_until_true() {
        let harness = Harness::new(RecordingListener::new());
        let mut session = harness.session(EngineConfig::default());
        session.engine = Arc::new(FlipAfter {
            polls: AtomicUsize::new(0),
            after: 3,
            to: KeyState::KeyOff,
        });

        let state = session
            .wait_for_state(|s| s == KeyState::KeyOff, "Waiting for Key OFF...")
            .await
            .unwrap();

        assert_eq!(state, KeyState::KeyOff);
        assert_eq!(harness.listener.progress().len(), 3);
        assert_eq!(harness.clock.now_ms(), 1500);
    }

    #[tokio::test]
    async fn test_ensure_is_noop_when_already_satisfied() {
        let harness = Harness::new(RecordingListener::new());
        harness.engine.set(KeyState::KeyOnEngineOff);
        let session = harness.session(EngineConfig::default());

        session.ensure_key_on_engine_off().await.unwrap();

        assert!(harness.listener.milestones().is_empty());
        assert_eq!(harness.clock.now_ms(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_state_cancelled() {
        let harness = Harness::new(RecordingListener::new());
        harness.engine.set(KeyState::KeyOnEngineRunning);
        let session = harness.session(EngineConfig::default());
        harness.cancel.cancel();

        let err = session.ensure_key_off().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_pause_counts_down() {
        let harness = Harness::new(RecordingListener::new());
        let session = harness.session(EngineConfig::default());

        session.pause(3, "Waiting {} seconds").await.unwrap();

        assert_eq!(
            harness.listener.progress(),
            vec!["Waiting 3 seconds", "Waiting 2 seconds", "Waiting 1 seconds"]
        );
        assert_eq!(harness.clock.now_ms(), 3000);
    }

    #[tokio::test]
    async fn test_mfg_interval_uses_vehicle_setting() {
        let harness = Harness::new(RecordingListener::new());
        harness.engine.set(KeyState::KeyOff);
        let mut config = EngineConfig::default();
        config.vehicle.key_off_interval_secs = 5;
        let session = harness.session(config);

        session.wait_mfg_interval_with_key_off().await.unwrap();

        assert_eq!(harness.listener.progress().len(), 5);
        assert_eq!(harness.clock.now_ms(), 5000);
        assert_eq!(harness.listener.milestones().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pause_stops_keep_alive() {
        let bus = Arc::new(SimulatedBus::new());
        let listener = Arc::new(RecordingListener::new());
        let cancel = CancellationToken::new();
        let session = realtime_session(
            bus.clone(),
            listener.clone(),
            KeyState::KeyOff,
            EngineConfig::default(),
            cancel.clone(),
        );

        cancel_after(&cancel, Duration::from_millis(3500));
        let err = session.pause(60, "Waiting {} seconds").await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(listener.progress().len(), 4);
        let sent = bus.keep_alive_count();
        assert_eq!(sent, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bus.keep_alive_count(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_mfg_interval_stops_background_tasks() {
        let bus = Arc::new(SimulatedBus::new());
        let listener = Arc::new(RecordingListener::new());
        let cancel = CancellationToken::new();
        let mut config = EngineConfig::default();
        config.vehicle.key_off_interval_secs = 600;
        config.wait.status_period_secs = 60;
        let session = realtime_session(
            bus.clone(),
            listener.clone(),
            KeyState::KeyOff,
            config,
            cancel.clone(),
        );

        cancel_after(&cancel, Duration::from_millis(90_500));
        let err = session.wait_mfg_interval_with_key_off().await.unwrap_err();

        assert!(err.is_cancelled());
        // 开始提示 + 60 秒状态行
        assert_eq!(listener.milestones().len(), 2);
        let sent = bus.keep_alive_count();
        assert_eq!(sent, 90);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(bus.keep_alive_count(), sent);
        assert_eq!(listener.milestones().len(), 2);
    }
}
