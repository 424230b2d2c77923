use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

/// How countdown ticks reach a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerMode {
    /// A background task ticks once per `period` while the session is active.
    Automatic { period: Duration },
    /// Ticks are delivered by the caller through `QuizSessionController::tick`.
    Manual,
}

impl TickerMode {
    #[must_use]
    pub fn every_second() -> Self {
        Self::Automatic {
            period: Duration::from_secs(1),
        }
    }
}

impl Default for TickerMode {
    fn default() -> Self {
        Self::every_second()
    }
}

/// Owns a running ticker task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Spawns a task calling `on_tick` every `period`, first after one full period.
    ///
    /// The task stops when `on_tick` breaks or the handle is dropped.
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        });
        Self { task }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
