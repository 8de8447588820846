use std::future::{pending, Future};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct RunContext {
    trace_id: String,
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl RunContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        let (_, cancel) = watch::channel(false);
        Self {
            trace_id: trace_id.into(),
            deadline: None,
            cancel,
        }
    }

    pub fn cancellable(trace_id: impl Into<String>) -> (Self, CancelHandle) {
        let (tx, cancel) = watch::channel(false);
        let ctx = Self {
            trace_id: trace_id.into(),
            deadline: None,
            cancel,
        };
        (ctx, CancelHandle { tx })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // an unrepresentable deadline means no deadline
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    pub fn check(&self, operation: &str) -> Result<(), AppError> {
        if self.is_cancelled() {
            return Err(cancelled(operation));
        }
        if self.is_expired() {
            return Err(deadline_exceeded(operation));
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the run is cancelled, or the deadline
    /// passes; the latter two drop `fut` and yield `Timeout`.
    pub async fn guard<F, T>(&self, operation: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        self.check(operation)?;
        let mut cancel = self.cancel.clone();
        let deadline = self.deadline;
        tokio::select! {
            res = fut => res,
            _ = wait_cancelled(&mut cancel) => Err(cancelled(operation)),
            _ = sleep_until(deadline) => Err(deadline_exceeded(operation)),
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone without cancelling: never fires
            pending::<()>().await;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

fn cancelled(operation: &str) -> AppError {
    AppError::timeout(format!("{} cancelled", operation))
        .with_detail("operation", operation)
        .with_detail("reason", "cancelled")
}

fn deadline_exceeded(operation: &str) -> AppError {
    AppError::timeout(format!("{} exceeded the run deadline", operation))
        .with_detail("operation", operation)
        .with_detail("reason", "deadline")
}
