//! Per-invocation context: enabled experiments and cancellation

use std::collections::BTreeSet;
use tokio::sync::watch;
use tracing::warn;

/// Runtime environment values win over pipeline `env:` during interpolation
pub const INTERPOLATION_PREFERS_RUNTIME_ENV: &str = "interpolation-prefers-runtime-env";

const KNOWN_EXPERIMENTS: &[&str] = &[INTERPOLATION_PREFERS_RUNTIME_ENV];

/// Set of enabled experiment names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Experiments {
    enabled: BTreeSet<String>,
}

impl Experiments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable an experiment. Unknown names are kept but logged.
    pub fn enable(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !KNOWN_EXPERIMENTS.contains(&name.as_str()) {
            warn!(experiment = %name, "Unknown experiment enabled");
        }
        self.enabled.insert(name);
    }

    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.enable(name);
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Experiments {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut experiments = Self::new();
        for name in iter {
            experiments.enable(name);
        }
        experiments
    }
}

/// Trigger side of a cancellation signal
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation signal, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a linked canceller/signal pair
    pub fn pair() -> (Canceller, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Canceller { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> CancelSignal {
        let (tx, rx) = watch::channel(false);
        // With the sender gone the value stays `false` for good
        drop(tx);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. Pends forever if the
    /// canceller is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Context threaded through parsing, scanning and upload
#[derive(Debug, Clone)]
pub struct RunContext {
    pub experiments: Experiments,
    pub cancel: CancelSignal,
}

impl RunContext {
    pub fn new(experiments: Experiments, cancel: CancelSignal) -> Self {
        Self { experiments, cancel }
    }

    pub fn prefers_runtime_env(&self) -> bool {
        self.experiments.is_enabled(INTERPOLATION_PREFERS_RUNTIME_ENV)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Experiments::new(), CancelSignal::never())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_experiments() {
        let experiments: Experiments = vec![INTERPOLATION_PREFERS_RUNTIME_ENV].into_iter().collect();
        assert!(experiments.is_enabled(INTERPOLATION_PREFERS_RUNTIME_ENV));
        assert!(!experiments.is_enabled("something-else"));

        let ctx = RunContext::new(experiments, CancelSignal::never());
        assert!(ctx.prefers_runtime_env());
        assert!(!RunContext::default().prefers_runtime_env());
    }

    #[tokio::test]
    async fn test_cancel_signal_resolves() {
        let (canceller, signal) = CancelSignal::pair();
        assert!(!signal.is_cancelled());

        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        canceller.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation should resolve promptly")
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_pends() {
        let signal = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
    }
}
