//! 后台周期任务
//!
//! 长时间等待期间与工作任务并行运行的两类任务：总线保活与状态行输出。
//! 它们不访问数据仓库、不产生测试结果，由守卫对象持有，守卫被丢弃时
//! (正常返回、取消、错误) 任务立即停止。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use vct_transport::Transport;

use crate::listener::TestListener;
use crate::{ExecutorError, Result};

/// 周期任务守卫
///
/// 每隔 `period` 执行一次 `tick`，第一次在一个周期之后。周期必须大于 0。
pub struct PeriodicTask {
    name: String,
    stop: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn start<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(ExecutorError::ConfigError(format!(
                "后台任务 {} 的周期必须大于 0",
                name
            )));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = oneshot::channel::<()>();

        let task_name = name.clone();
        let task_stop = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if task_stop.load(Ordering::Acquire) {
                            break;
                        }
                        tick().await;
                    }
                    _ = &mut rx => break,
                }
            }
            debug!("后台任务 {} 已停止", task_name);
        });

        debug!("后台任务 {} 已启动, 周期 {:?}", name, period);
        Ok(Self {
            name,
            stop,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// 停止任务；重复调用无副作用
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 总线保活守卫
pub struct KeepAlive {
    task: PeriodicTask,
}

impl KeepAlive {
    pub fn start(transport: Arc<dyn Transport>, interval: Duration) -> Result<Self> {
        let task = PeriodicTask::start("keep-alive", interval, move || {
            let transport = Arc::clone(&transport);
            async move {
                if let Err(e) = transport.send_keep_alive().await {
                    warn!("发送保活报文失败: {}", e);
                }
            }
        })?;
        Ok(Self { task })
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(mut self) {
        self.task.stop();
    }
}

/// 状态行守卫，每个周期输出一条里程碑行
pub struct StatusTicker {
    task: PeriodicTask,
}

impl StatusTicker {
    /// `message` 接收已经过的时长
    pub fn start<M>(
        listener: Arc<dyn TestListener>,
        period: Duration,
        message: M,
    ) -> Result<Self>
    where
        M: Fn(Duration) -> String + Send + Sync + 'static,
    {
        let mut ticks: u32 = 0;
        let task = PeriodicTask::start("status-ticker", period, move || {
            ticks += 1;
            let line = message(period * ticks);
            let listener = Arc::clone(&listener);
            async move {
                listener.on_milestone(&line);
            }
        })?;
        Ok(Self { task })
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(mut self) {
        self.task.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use std::sync::atomic::AtomicUsize;
    use vct_transport::SimulatedBus;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_stops_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let task = PeriodicTask::start("counter", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(task.is_running());

        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_sends_until_stopped() {
        let bus = Arc::new(SimulatedBus::new());
        let keep_alive = KeepAlive::start(bus.clone(), Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        keep_alive.stop();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(bus.keep_alive_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_survives_transport_errors() {
        let bus = Arc::new(SimulatedBus::new());
        bus.disconnect();
        let keep_alive = KeepAlive::start(bus.clone(), Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(keep_alive.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_ticker_reports_elapsed() {
        let listener = Arc::new(RecordingListener::new());
        let ticker = StatusTicker::start(listener.clone(), Duration::from_secs(60), |elapsed| {
            format!("{} seconds elapsed", elapsed.as_secs())
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(150)).await;
        drop(ticker);

        assert_eq!(
            listener.milestones(),
            vec!["60 seconds elapsed", "120 seconds elapsed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_refused() {
        let bus = Arc::new(SimulatedBus::new());
        let err = KeepAlive::start(bus.clone(), Duration::ZERO).err().unwrap();
        assert!(matches!(err, ExecutorError::ConfigError(_)));

        let listener = Arc::new(RecordingListener::new());
        let ticker = StatusTicker::start(listener, Duration::ZERO, |_| String::new());
        assert!(ticker.is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(bus.keep_alive_count(), 0);
    }
}
