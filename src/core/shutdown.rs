use reqwest::Url;
use tokio::sync::watch;

#[derive(Debug, Default)]
enum RunState {
    #[default]
    Idle,
    Running,
    Finished {
        farewell: Option<Url>,
    },
}

/// One-shot stop request plus completion tracking for a channel's stream task.
///
/// The stream task holds a [`RunGuard`] for its lifetime; `close` flips the
/// stop flag and waits for the guard to drop. The task may leave behind a
/// farewell request for the closer to send once the loop has exited.
#[derive(Debug)]
pub struct ShutdownSignal {
    stop: watch::Sender<bool>,
    state: watch::Sender<RunState>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            stop: watch::Sender::new(false),
            state: watch::Sender::new(RunState::Idle),
        }
    }

    /// Non-blocking check, used at loop boundaries
    pub fn is_stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Mark the stream task as running until the returned guard drops
    pub fn begin(&self) -> RunGuard<'_> {
        self.state.send_replace(RunState::Running);
        RunGuard {
            signal: self,
            farewell: None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), RunState::Running)
    }

    /// Request a stop and wait for the stream task to leave its loop.
    ///
    /// Returns the farewell request left by the task, at most once.
    pub async fn stop_and_wait(&self) -> Option<Url> {
        self.stop.send_replace(true);

        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = state
            .wait_for(|s| !matches!(s, RunState::Running))
            .await;

        let mut farewell = None;
        self.state.send_modify(|s| {
            if let RunState::Finished { farewell: f } = s {
                farewell = f.take();
            }
        });
        farewell
    }
}

/// Held by the stream task; dropping it signals completion
#[derive(Debug)]
pub struct RunGuard<'a> {
    signal: &'a ShutdownSignal,
    farewell: Option<Url>,
}

impl RunGuard<'_> {
    /// Leave a request for `close` to issue after the loop has exited
    pub fn set_farewell(&mut self, url: Url) {
        self.farewell = Some(url);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let farewell = self.farewell.take();
        self.signal
            .state
            .send_replace(RunState::Finished { farewell });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_without_running_task_returns_immediately() {
        let signal = ShutdownSignal::new();
        assert!(signal.stop_and_wait().await.is_none());
        assert!(signal.is_stop_requested());
        // second close is a no-op
        assert!(signal.stop_and_wait().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_guard_and_hands_over_farewell() {
        let signal = Arc::new(ShutdownSignal::new());
        let task_signal = Arc::clone(&signal);

        let started = tokio::time::Instant::now();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            let mut guard = task_signal.begin();
            let _ = ready_tx.send(());
            while !task_signal.is_stop_requested() {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            guard.set_farewell(Url::parse("https://example.com/bye").unwrap());
        });

        ready_rx.await.unwrap();
        assert!(signal.is_running());

        let farewell = signal.stop_and_wait().await;
        assert_eq!(farewell.unwrap().path(), "/bye");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(!signal.is_running());
        assert!(signal.stop_and_wait().await.is_none());
        task.await.unwrap();
    }
}
