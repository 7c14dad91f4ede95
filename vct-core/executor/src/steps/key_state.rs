//! 钥匙/发动机状态步骤

use async_trait::async_trait;

use crate::step::Step;
use crate::wait::KeyState;
use crate::{ExecutorError, Result, Session};

/// 等待操作员把车辆置于指定状态
#[derive(Debug, Clone)]
pub struct KeyStateStep {
    target: KeyState,
    description: String,
}

impl KeyStateStep {
    pub fn new(target: KeyState) -> Self {
        Self {
            target,
            description: format!("Ensure {}", target),
        }
    }

    pub fn key_off() -> Self {
        Self::new(KeyState::KeyOff)
    }

    pub fn key_on_engine_off() -> Self {
        Self::new(KeyState::KeyOnEngineOff)
    }

    pub fn key_on_engine_running() -> Self {
        Self::new(KeyState::KeyOnEngineRunning)
    }
}

#[async_trait]
impl Step for KeyStateStep {
    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, session: &mut Session) -> Result<()> {
        match self.target {
            KeyState::KeyOff => session.ensure_key_off().await,
            KeyState::KeyOnEngineOff => session.ensure_key_on_engine_off().await,
            KeyState::KeyOnEngineRunning => session.ensure_key_on_engine_running().await,
            KeyState::Unknown => Err(ExecutorError::Step(
                "无法等待未知的钥匙状态".to_string(),
            )),
        }
    }
}

/// 熄火并等待制造商声明的时长
#[derive(Debug, Clone, Default)]
pub struct KeyOffIntervalStep;

#[async_trait]
impl Step for KeyOffIntervalStep {
    fn description(&self) -> &str {
        "Wait manufacturer's recommended interval with the key off"
    }

    async fn run(&self, session: &mut Session) -> Result<()> {
        session.wait_mfg_interval_with_key_off().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use crate::session::test_support::Harness;
    use crate::EngineConfig;

    #[tokio::test]
    async fn test_key_state_step_waits_for_target() {
        let harness = Harness::new(RecordingListener::new());
        harness.engine.set(KeyState::KeyOnEngineRunning);
        let mut session = harness.session(EngineConfig::default());

        KeyStateStep::key_on_engine_running()
            .run(&mut session)
            .await
            .unwrap();
        assert!(harness.listener.progress().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target_is_an_error() {
        let harness = Harness::new(RecordingListener::new());
        let mut session = harness.session(EngineConfig::default());

        let err = KeyStateStep::new(KeyState::Unknown)
            .run(&mut session)
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_description() {
        assert_eq!(KeyStateStep::key_off().description(), "Ensure Key Off");
    }
}
