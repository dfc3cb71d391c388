//! Periodic task scheduler.
//!
//! Owns every background task of a running world. A failed or panicking
//! iteration is logged and the schedule carries on. [`Scheduler::shutdown`]
//! stops all tasks as a unit; dropping the scheduler aborts them.

use std::{future::Future, panic::AssertUnwindSafe, time::Duration};

use futures_util::FutureExt;
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, warn};

pub struct Scheduler {
    tasks: JoinSet<()>,
    stop: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            tasks: JoinSet::new(),
            stop,
        }
    }

    /// Number of tasks still owned.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs `job` every `period`, first run one period from now.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut stop = self.stop.subscribe();
        self.tasks.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        match AssertUnwindSafe(job()).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!(task = name, error = %e, "Periodic iteration failed"),
                            Err(_) => error!(task = name, "Periodic iteration panicked"),
                        }
                    }
                }
            }
            debug!(task = name, "Periodic task stopped");
        });
    }

    /// Runs a long-lived task that should return once `stop` changes.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = task(self.stop.subscribe());
        self.tasks.spawn(async move {
            fut.await;
            debug!(task = name, "Task stopped");
        });
    }

    /// Signals every task to stop and waits for all of them.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "Task ended abnormally");
            }
        }
    }
}
