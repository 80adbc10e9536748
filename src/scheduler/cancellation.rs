//! A single cancellation token shared by the scheduler and the dead-code
//! analyzer (spec §5 "Cancellation"). Polled at batch boundaries and at every
//! yield point; in-flight parser tasks are not interrupted, but their results
//! are dropped if the token was signalled before application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
