//! Individual clipboard write strategies.
//!
//! Every backend call runs on a blocking worker under a timeout: a worker
//! that does not answer within the bound counts as
//! [`ClipboardError::TimedOut`], and a worker that panics counts as
//! [`ClipboardError::Unavailable`]. Nothing a backend does can propagate
//! out of a strategy as anything other than a `ClipboardError`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use scancatch_core::backoff::Backoff;
use scancatch_core::ClipboardError;

use super::framework::FrameworkClipboard;
use super::native::NativeClipboard;

/// One technique for getting a payload onto the clipboard.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    /// Identifier used in config and logs.
    fn name(&self) -> &'static str;

    async fn attempt(&self, payload: &str) -> Result<(), ClipboardError>;
}

/// Run a blocking clipboard call off the async runtime, bounded by `bound`.
pub async fn run_bounded<F>(bound: Duration, call: F) -> Result<(), ClipboardError>
where
    F: FnOnce() -> Result<(), ClipboardError> + Send + 'static,
{
    match tokio::time::timeout(bound, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ClipboardError::Unavailable(format!(
            "clipboard worker failed: {}",
            join_err
        ))),
        Err(_) => Err(ClipboardError::TimedOut(bound)),
    }
}

/// Direct OS-level write. Atomic, so never retried.
pub struct NativeWrite {
    native: Arc<dyn NativeClipboard>,
    bound: Duration,
}

impl NativeWrite {
    pub fn new(native: Arc<dyn NativeClipboard>, bound: Duration) -> Self {
        Self { native, bound }
    }
}

#[async_trait]
impl DeliveryStrategy for NativeWrite {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn attempt(&self, payload: &str) -> Result<(), ClipboardError> {
        let native = self.native.clone();
        let text = payload.to_string();
        run_bounded(self.bound, move || native.write_text(&text)).await
    }
}

/// Multi-format (HTML plus plain-text alternative) framework write.
pub struct StructuredWrite {
    framework: Arc<dyn FrameworkClipboard>,
    bound: Duration,
}

impl StructuredWrite {
    pub fn new(framework: Arc<dyn FrameworkClipboard>, bound: Duration) -> Self {
        Self { framework, bound }
    }
}

#[async_trait]
impl DeliveryStrategy for StructuredWrite {
    fn name(&self) -> &'static str {
        "structured"
    }

    async fn attempt(&self, payload: &str) -> Result<(), ClipboardError> {
        let framework = self.framework.clone();
        let text = payload.to_string();
        run_bounded(self.bound, move || framework.set_rich(&text)).await
    }
}

/// Wait once for the current owner to let go, then a plain write.
pub struct DelayedWrite {
    framework: Arc<dyn FrameworkClipboard>,
    delay: Duration,
    bound: Duration,
}

impl DelayedWrite {
    pub fn new(framework: Arc<dyn FrameworkClipboard>, delay: Duration, bound: Duration) -> Self {
        Self {
            framework,
            delay,
            bound,
        }
    }
}

#[async_trait]
impl DeliveryStrategy for DelayedWrite {
    fn name(&self) -> &'static str {
        "delayed"
    }

    async fn attempt(&self, payload: &str) -> Result<(), ClipboardError> {
        tokio::time::sleep(self.delay).await;
        let framework = self.framework.clone();
        let text = payload.to_string();
        run_bounded(self.bound, move || framework.set_text(&text)).await
    }
}

/// Plain write on a background worker with a hard time bound.
pub struct TimedWrite {
    framework: Arc<dyn FrameworkClipboard>,
    bound: Duration,
}

impl TimedWrite {
    pub fn new(framework: Arc<dyn FrameworkClipboard>, bound: Duration) -> Self {
        Self { framework, bound }
    }
}

#[async_trait]
impl DeliveryStrategy for TimedWrite {
    fn name(&self) -> &'static str {
        "timed"
    }

    async fn attempt(&self, payload: &str) -> Result<(), ClipboardError> {
        let framework = self.framework.clone();
        let text = payload.to_string();
        run_bounded(self.bound, move || framework.set_text(&text)).await
    }
}

/// Plain write retried with exponential backoff while the clipboard is busy.
///
/// Any failure other than [`ClipboardError::Busy`] ends the attempt at once.
pub struct RetryingWrite {
    framework: Arc<dyn FrameworkClipboard>,
    backoff: Backoff,
    bound: Duration,
}

impl RetryingWrite {
    pub fn new(framework: Arc<dyn FrameworkClipboard>, backoff: Backoff, bound: Duration) -> Self {
        Self {
            framework,
            backoff,
            bound,
        }
    }
}

#[async_trait]
impl DeliveryStrategy for RetryingWrite {
    fn name(&self) -> &'static str {
        "retrying"
    }

    async fn attempt(&self, payload: &str) -> Result<(), ClipboardError> {
        let mut attempt = 0;
        loop {
            let framework = self.framework.clone();
            let text = payload.to_string();
            match run_bounded(self.bound, move || framework.set_text(&text)).await {
                Ok(()) => return Ok(()),
                Err(ClipboardError::Busy(reason)) if self.backoff.should_retry(attempt) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        max = self.backoff.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "clipboard busy, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
