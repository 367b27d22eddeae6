//! Clipboard delivery.
//!
//! The clipboard is a single-owner, OS-global resource that other processes
//! (and our own UI toolkit) may be holding at any moment, so one write
//! attempt is not reliable. A [`Deliverer`] runs an ordered chain of
//! [`DeliveryStrategy`] values:
//!
//! ```text
//!  payload ─▶ strategy 1 ──Busy/TimedOut──▶ strategy 2 ──▶ … ──▶ manual fallback
//!                │                              │                    (temp file + viewer)
//!                └── Ok ─▶ Copied               └── Unavailable ─────────▶┘
//! ```
//!
//! - Success short-circuits the chain.
//! - [`ClipboardError::Busy`] and [`ClipboardError::TimedOut`] move on to the
//!   next strategy.
//! - [`ClipboardError::Unavailable`] abandons the chain at once.
//!
//! When the chain fails, the payload is handed to a [`ManualFallback`]
//! so the user can finish the copy by hand. That outcome is reported as
//! [`DeliveryOutcome::ManualFallback`], never as success.
//!
//! # Strategies
//!
//! | Name | Strategy |
//! |------|----------|
//! | `native` | Direct OS write through [`NativeClipboard`] |
//! | `structured` | Multi-format (HTML + text) framework write |
//! | `delayed` | Wait `settle_delay_ms`, then a plain framework write |
//! | `timed` | Plain framework write bounded by `background_timeout_ms` |
//! | `retrying` | Plain framework write with exponential backoff on `Busy` |

pub mod fallback;
pub mod framework;
pub mod native;
pub mod strategy;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use scancatch_core::models::CapturedRequest;
use scancatch_core::store::RequestStore;
use scancatch_core::ClipboardError;

use crate::config::DeliveryConfig;

pub use fallback::{ManualFallback, TextViewerFallback};
pub use framework::{ArboardClipboard, FrameworkClipboard};
pub use native::{platform_clipboard, NativeClipboard};
pub use strategy::{
    DelayedWrite, DeliveryStrategy, NativeWrite, RetryingWrite, StructuredWrite, TimedWrite,
};

/// Strategy identifiers accepted in `[delivery].strategies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Native,
    Structured,
    Delayed,
    Timed,
    Retrying,
}

impl StrategyKind {
    /// Default chain: OS write first, toolkit writes after.
    pub const PRIMARY: [StrategyKind; 3] = [
        StrategyKind::Native,
        StrategyKind::Structured,
        StrategyKind::Delayed,
    ];

    /// Toolkit writes first, OS write as the last resort.
    pub const EXTENDED: [StrategyKind; 4] = [
        StrategyKind::Structured,
        StrategyKind::Delayed,
        StrategyKind::Timed,
        StrategyKind::Native,
    ];
}

/// On X11 and Wayland the selection is served by the process that set it,
/// so a toolkit write is lost as soon as that process exits.
pub const SELECTION_DIES_WITH_PROCESS: bool = cfg!(all(unix, not(target_os = "macos")));

/// Strategies whose result outlives a process that exits right after the
/// copy. Where the selection dies with its owner only the native write
/// qualifies, since the helper tools keep serving it after we are gone.
pub fn one_shot_strategies(
    kinds: &[StrategyKind],
    dies_with_process: bool,
) -> Vec<StrategyKind> {
    if dies_with_process {
        vec![StrategyKind::Native]
    } else {
        kinds.to_vec()
    }
}

/// How a delivery ended, when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The clipboard now holds the payload.
    Copied { strategy: &'static str },
    /// Every strategy failed; the payload was exposed for manual copying.
    ManualFallback {
        artifact: PathBuf,
        cause: ClipboardError,
    },
}

impl DeliveryOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, DeliveryOutcome::Copied { .. })
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no capture with id {0} in the live feed")]
    UnknownRecord(i64),
    #[error("all clipboard strategies failed: {last}")]
    Exhausted { last: ClipboardError },
    #[error("clipboard delivery failed ({cause}) and the manual fallback failed too")]
    Fallback {
        cause: ClipboardError,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered strategy chain plus manual fallback and copied-flag persistence.
pub struct Deliverer {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
    fallback: Option<Arc<dyn ManualFallback>>,
    store: Option<Arc<dyn RequestStore>>,
}

impl Deliverer {
    pub fn new(strategies: Vec<Box<dyn DeliveryStrategy>>) -> Self {
        Self {
            strategies,
            fallback: None,
            store: None,
        }
    }

    /// Deliverer wired to the real OS clipboard, as configured.
    pub fn from_config(config: &DeliveryConfig, store: Arc<dyn RequestStore>) -> Self {
        let framework: Arc<dyn FrameworkClipboard> = Arc::new(ArboardClipboard::new());
        let chain = build_chain(config, framework, platform_clipboard());
        let deliverer = Self::new(chain).with_store(store);
        if config.manual_fallback {
            deliverer.with_fallback(Arc::new(TextViewerFallback::new()))
        } else {
            deliverer
        }
    }

    /// Deliverer for a process that exits right after copying
    /// (`scancatch copy`).
    pub fn one_shot(config: &DeliveryConfig, store: Arc<dyn RequestStore>) -> Self {
        let config = DeliveryConfig {
            strategies: one_shot_strategies(&config.strategies, SELECTION_DIES_WITH_PROCESS),
            ..config.clone()
        };
        Self::from_config(&config, store)
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ManualFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RequestStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Names of the configured strategies, in order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Place `payload` on the clipboard, falling back to manual copy.
    pub async fn deliver(&self, payload: &str) -> Result<DeliveryOutcome, DeliveryError> {
        let cause = match self.run_chain(payload).await {
            Ok(strategy) => return Ok(DeliveryOutcome::Copied { strategy }),
            Err(cause) => cause,
        };

        let Some(fallback) = &self.fallback else {
            tracing::error!(error = %cause, "clipboard delivery exhausted");
            return Err(DeliveryError::Exhausted { last: cause });
        };

        match fallback.present(payload) {
            Ok(artifact) => {
                tracing::warn!(
                    error = %cause,
                    artifact = %artifact.display(),
                    "clipboard delivery failed; payload opened for manual copy"
                );
                Ok(DeliveryOutcome::ManualFallback { artifact, cause })
            }
            Err(source) => {
                tracing::error!(error = %cause, fallback_error = %source, "manual fallback failed");
                Err(DeliveryError::Fallback { cause, source })
            }
        }
    }

    /// Deliver a record's body and, on success, mark it copied in memory
    /// and then in the store.
    pub async fn deliver_record(
        &self,
        record: &mut CapturedRequest,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let outcome = self.deliver(&record.body).await?;
        if outcome.is_copied() {
            record.mark_copied();
            self.persist_copied(record.id).await;
        }
        Ok(outcome)
    }

    /// Persist the copied flag. The clipboard already holds the value, so
    /// failures here are logged and dropped.
    pub async fn persist_copied(&self, id: i64) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.mark_copied(id).await {
            tracing::warn!(id, error = %e, "failed to persist copied flag");
        }
    }

    async fn run_chain(&self, payload: &str) -> Result<&'static str, ClipboardError> {
        let mut last = ClipboardError::Unavailable("no clipboard strategies configured".into());

        for strategy in &self.strategies {
            match strategy.attempt(payload).await {
                Ok(()) => {
                    tracing::debug!(strategy = strategy.name(), "clipboard write succeeded");
                    return Ok(strategy.name());
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "clipboard strategy failed, trying next");
                    last = e;
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "clipboard unavailable, abandoning chain");
                    return Err(e);
                }
            }
        }

        Err(last)
    }
}

/// Build the configured strategy chain over the given backends.
pub fn build_chain(
    config: &DeliveryConfig,
    framework: Arc<dyn FrameworkClipboard>,
    native: Arc<dyn NativeClipboard>,
) -> Vec<Box<dyn DeliveryStrategy>> {
    let bound = config.background_timeout();
    config
        .strategies
        .iter()
        .map(|kind| -> Box<dyn DeliveryStrategy> {
            match kind {
                StrategyKind::Native => Box::new(NativeWrite::new(native.clone(), bound)),
                StrategyKind::Structured => {
                    Box::new(StructuredWrite::new(framework.clone(), bound))
                }
                StrategyKind::Delayed => Box::new(DelayedWrite::new(
                    framework.clone(),
                    config.settle_delay(),
                    bound,
                )),
                StrategyKind::Timed => Box::new(TimedWrite::new(framework.clone(), bound)),
                StrategyKind::Retrying => Box::new(RetryingWrite::new(
                    framework.clone(),
                    config.backoff(),
                    bound,
                )),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted clipboard backends for tests.

    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use scancatch_core::ClipboardError;

    use super::{FrameworkClipboard, ManualFallback, NativeClipboard};

    /// Replays scripted results, then repeats the last one.
    pub struct ScriptedClipboard {
        script: Mutex<VecDeque<Result<(), ClipboardError>>>,
        last: Mutex<Result<(), ClipboardError>>,
        pub calls: AtomicUsize,
        pub written: Mutex<Vec<String>>,
    }

    impl ScriptedClipboard {
        pub fn new(script: Vec<Result<(), ClipboardError>>) -> Self {
            let last = script.last().cloned().unwrap_or(Ok(()));
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(last),
                calls: AtomicUsize::new(0),
                written: Mutex::new(Vec::new()),
            }
        }

        pub fn always(result: Result<(), ClipboardError>) -> Self {
            Self::new(vec![result])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self, text: &str) -> Result<(), ClipboardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.last.lock().unwrap().clone());
            if result.is_ok() {
                self.written.lock().unwrap().push(text.to_string());
            }
            result
        }
    }

    impl FrameworkClipboard for ScriptedClipboard {
        fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
            self.next(text)
        }

        fn set_rich(&self, text: &str) -> Result<(), ClipboardError> {
            self.next(text)
        }
    }

    impl NativeClipboard for ScriptedClipboard {
        fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
            self.next(text)
        }
    }

    #[derive(Default)]
    pub struct RecordingFallback {
        pub payloads: Mutex<Vec<String>>,
    }

    impl ManualFallback for RecordingFallback {
        fn present(&self, payload: &str) -> std::io::Result<PathBuf> {
            self.payloads.lock().unwrap().push(payload.to_string());
            Ok(PathBuf::from("/tmp/scancatch-manual.txt"))
        }
    }

    pub struct BrokenFallback;

    impl ManualFallback for BrokenFallback {
        fn present(&self, _payload: &str) -> std::io::Result<PathBuf> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no text viewer",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use chrono::Local;
    use scancatch_core::models::NewCapturedRequest;
    use scancatch_core::store::memory::InMemoryStore;

    fn fast_config(strategies: Vec<StrategyKind>) -> DeliveryConfig {
        DeliveryConfig {
            strategies,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
            settle_delay_ms: 1,
            background_timeout_ms: 500,
            ..DeliveryConfig::default()
        }
    }

    fn busy() -> Result<(), ClipboardError> {
        Err(ClipboardError::Busy("held by another process".into()))
    }

    fn unavailable() -> Result<(), ClipboardError> {
        Err(ClipboardError::Unavailable("no display".into()))
    }

    async fn stored_record(store: &Arc<InMemoryStore>, body: &str) -> CapturedRequest {
        let new = NewCapturedRequest {
            method: "POST".to_string(),
            path: "/".to_string(),
            headers: String::new(),
            body: body.to_string(),
            timestamp: Local::now(),
            client_ip: "127.0.0.1".to_string(),
            kind: String::new(),
        };
        let id = store.insert(&new).await.unwrap();
        store.get(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_native_success_short_circuits() {
        let framework = Arc::new(ScriptedClipboard::always(Ok(())));
        let native = Arc::new(ScriptedClipboard::always(Ok(())));
        let chain = build_chain(
            &fast_config(StrategyKind::PRIMARY.to_vec()),
            framework.clone(),
            native.clone(),
        );
        let deliverer = Deliverer::new(chain);

        let outcome = deliverer.deliver("print(1)").await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Copied { strategy: "native" });
        assert_eq!(native.calls(), 1);
        assert_eq!(framework.calls(), 0);
        assert_eq!(native.written.lock().unwrap().as_slice(), ["print(1)"]);
    }

    #[tokio::test]
    async fn test_busy_native_falls_through_to_structured() {
        let framework = Arc::new(ScriptedClipboard::always(Ok(())));
        let native = Arc::new(ScriptedClipboard::always(busy()));
        let chain = build_chain(
            &fast_config(StrategyKind::PRIMARY.to_vec()),
            framework.clone(),
            native.clone(),
        );

        let outcome = Deliverer::new(chain).deliver("x").await.unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Copied {
                strategy: "structured"
            }
        );
    }

    #[tokio::test]
    async fn test_unavailable_aborts_chain_into_fallback() {
        let framework = Arc::new(ScriptedClipboard::always(Ok(())));
        let native = Arc::new(ScriptedClipboard::always(unavailable()));
        let fallback = Arc::new(RecordingFallback::default());
        let chain = build_chain(
            &fast_config(StrategyKind::PRIMARY.to_vec()),
            framework.clone(),
            native,
        );

        let outcome = Deliverer::new(chain)
            .with_fallback(fallback.clone())
            .deliver("payload")
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DeliveryOutcome::ManualFallback {
                cause: ClipboardError::Unavailable(_),
                ..
            }
        ));
        assert_eq!(framework.calls(), 0, "chain must stop at Unavailable");
        assert_eq!(fallback.payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_busy_invokes_fallback_once_without_marking() {
        let store = Arc::new(InMemoryStore::new());
        let mut record = stored_record(&store, "print(1)").await;

        let framework = Arc::new(ScriptedClipboard::always(busy()));
        let native = Arc::new(ScriptedClipboard::always(busy()));
        let fallback = Arc::new(RecordingFallback::default());
        let mut all = StrategyKind::EXTENDED.to_vec();
        all.push(StrategyKind::Retrying);
        let chain = build_chain(&fast_config(all), framework.clone(), native.clone());

        let deliverer = Deliverer::new(chain)
            .with_fallback(fallback.clone())
            .with_store(store.clone());
        let outcome = deliverer.deliver_record(&mut record).await.unwrap();

        assert!(!outcome.is_copied());
        assert!(matches!(outcome, DeliveryOutcome::ManualFallback { .. }));
        assert_eq!(
            fallback.payloads.lock().unwrap().as_slice(),
            ["print(1)".to_string()]
        );
        assert!(!record.is_copied);
        assert!(!store.get(record.id).await.unwrap().unwrap().is_copied);
        assert_eq!(native.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_without_fallback() {
        let framework = Arc::new(ScriptedClipboard::always(busy()));
        let native = Arc::new(ScriptedClipboard::always(busy()));
        let chain = build_chain(
            &fast_config(StrategyKind::PRIMARY.to_vec()),
            framework,
            native,
        );

        let err = Deliverer::new(chain).deliver("x").await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Exhausted {
                last: ClipboardError::Busy(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_broken_fallback_is_reported() {
        let framework = Arc::new(ScriptedClipboard::always(busy()));
        let native = Arc::new(ScriptedClipboard::always(busy()));
        let chain = build_chain(
            &fast_config(StrategyKind::PRIMARY.to_vec()),
            framework,
            native,
        );

        let err = Deliverer::new(chain)
            .with_fallback(Arc::new(BrokenFallback))
            .deliver("x")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Fallback { .. }));
    }

    #[tokio::test]
    async fn test_successful_delivery_marks_record_and_store() {
        let store = Arc::new(InMemoryStore::new());
        let mut record = stored_record(&store, "ABC").await;
        let native = Arc::new(ScriptedClipboard::always(Ok(())));
        let framework = Arc::new(ScriptedClipboard::always(Ok(())));
        let chain = build_chain(
            &fast_config(StrategyKind::PRIMARY.to_vec()),
            framework,
            native,
        );
        let deliverer = Deliverer::new(chain).with_store(store.clone());

        deliverer.deliver_record(&mut record).await.unwrap();
        assert!(record.is_copied);
        assert!(store.get(record.id).await.unwrap().unwrap().is_copied);

        // A second delivery leaves the flag set.
        let outcome = deliverer.deliver_record(&mut record).await.unwrap();
        assert!(outcome.is_copied());
        assert!(record.is_copied);
        assert!(store.get(record.id).await.unwrap().unwrap().is_copied);
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl RequestStore for FailingStore {
        async fn insert(
            &self,
            _record: &NewCapturedRequest,
        ) -> Result<i64, scancatch_core::StorageError> {
            Err(scancatch_core::StorageError::Constraint("read-only".into()))
        }
        async fn mark_copied(&self, _id: i64) -> Result<(), scancatch_core::StorageError> {
            Err(scancatch_core::StorageError::Constraint("read-only".into()))
        }
        async fn recent(
            &self,
            _limit: usize,
        ) -> Result<Vec<CapturedRequest>, scancatch_core::StorageError> {
            Ok(Vec::new())
        }
        async fn get(
            &self,
            _id: i64,
        ) -> Result<Option<CapturedRequest>, scancatch_core::StorageError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_store_failure_after_copy_is_swallowed() {
        let mem = Arc::new(InMemoryStore::new());
        let mut record = stored_record(&mem, "keep").await;
        let chain = build_chain(
            &fast_config(vec![StrategyKind::Native]),
            Arc::new(ScriptedClipboard::always(Ok(()))),
            Arc::new(ScriptedClipboard::always(Ok(()))),
        );
        let deliverer = Deliverer::new(chain).with_store(Arc::new(FailingStore));

        let outcome = deliverer.deliver_record(&mut record).await.unwrap();
        assert!(outcome.is_copied());
        assert!(record.is_copied);
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let err = Deliverer::new(Vec::new()).deliver("x").await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Exhausted {
                last: ClipboardError::Unavailable(_)
            }
        ));
    }

    #[test]
    fn test_one_shot_keeps_only_native_when_selection_dies() {
        let configured = StrategyKind::EXTENDED.to_vec();
        assert_eq!(
            one_shot_strategies(&configured, true),
            vec![StrategyKind::Native]
        );
        assert_eq!(
            one_shot_strategies(&[StrategyKind::Structured], true),
            vec![StrategyKind::Native]
        );
        assert_eq!(one_shot_strategies(&configured, false), configured);
    }

    #[test]
    fn test_chain_follows_config_order() {
        let chain = build_chain(
            &fast_config(StrategyKind::EXTENDED.to_vec()),
            Arc::new(ScriptedClipboard::always(Ok(()))),
            Arc::new(ScriptedClipboard::always(Ok(()))),
        );
        let names: Vec<&str> = Deliverer::new(chain).strategy_names();
        assert_eq!(names, vec!["structured", "delayed", "timed", "native"]);
    }
}
