//! Execution completion callbacks

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{TransitionError, TransitionResult};
use crate::transition::Transition;

/// Receives the outcome of [`Transition::execute`].
///
/// `on_validate` always fires before `on_execute` and each fires at most once.
/// When validation fails `on_execute` does not fire. Both run on a Tokio
/// blocking worker, never on the caller's task.
pub trait TransitionCallback: Send + Sync {
    fn on_validate(&self, transition: &Transition, result: TransitionResult<()>);
    fn on_execute(&self, transition: &Transition, result: TransitionResult<()>);
}

/// Callback that forwards both outcomes to an [`ExecutionWaiter`].
pub struct ChannelCallback {
    validated: Mutex<Option<oneshot::Sender<TransitionResult<()>>>>,
    executed: Mutex<Option<oneshot::Sender<TransitionResult<()>>>>,
}

impl ChannelCallback {
    pub fn new() -> (std::sync::Arc<Self>, ExecutionWaiter) {
        let (validated_tx, validated_rx) = oneshot::channel();
        let (executed_tx, executed_rx) = oneshot::channel();
        let callback = std::sync::Arc::new(Self {
            validated: Mutex::new(Some(validated_tx)),
            executed: Mutex::new(Some(executed_tx)),
        });
        let waiter = ExecutionWaiter {
            validated: Some(validated_rx),
            executed: executed_rx,
        };
        (callback, waiter)
    }
}

impl TransitionCallback for ChannelCallback {
    fn on_validate(&self, _transition: &Transition, result: TransitionResult<()>) {
        if let Some(tx) = self.validated.lock().take() {
            let _ = tx.send(result);
        }
    }

    fn on_execute(&self, _transition: &Transition, result: TransitionResult<()>) {
        if let Some(tx) = self.executed.lock().take() {
            let _ = tx.send(result);
        }
    }
}

pub struct ExecutionWaiter {
    validated: Option<oneshot::Receiver<TransitionResult<()>>>,
    executed: oneshot::Receiver<TransitionResult<()>>,
}

impl ExecutionWaiter {
    /// Wait for the validation outcome only.
    pub async fn validated(&mut self) -> TransitionResult<()> {
        match self.validated.take() {
            Some(rx) => rx.await.unwrap_or(Err(TransitionError::Discarded)),
            None => Ok(()),
        }
    }

    /// Wait for validation and execution. A callback dropped without
    /// reporting counts as a discarded transition.
    pub async fn wait(mut self) -> TransitionResult<()> {
        self.validated().await?;
        self.executed.await.unwrap_or(Err(TransitionError::Discarded))
    }
}
