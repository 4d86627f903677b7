//! Device authentication boundary — the biometric gate.
//!
//! The gate converts platform authentication outcomes into the three-way
//! [`AuthOutcome`] the unlock state machine consumes, and enforces that
//! only one ceremony is in flight at a time: a second call while one is
//! pending is rejected (not queued) so overlapping prompts never appear.
//!
//! The underlying [`DeviceAuthenticator`] call blocks until the
//! OS-mediated ceremony resolves; abandonment (app backgrounded, prompt
//! dismissed) is reported by the provider as [`AuthOutcome::Canceled`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why the platform denied authentication.
///
/// The core logs causes but never interprets them beyond that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialCause {
    /// Authentication is unavailable or unconfigured on this device.
    /// Reported without ever presenting a prompt.
    Unavailable,
    /// Hardware exists but nothing is enrolled.
    NotEnrolled,
    /// The ceremony ran and failed (wrong biometric, lockout, platform
    /// error). Carries the platform's cause string.
    Failed(String),
}

impl fmt::Display for DenialCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "device authentication unavailable"),
            Self::NotEnrolled => write!(f, "device authentication not enrolled"),
            Self::Failed(cause) => write!(f, "{cause}"),
        }
    }
}

/// Three-way result of one authentication ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The user passed device authentication.
    Granted,
    /// The platform denied authentication.
    Denied(DenialCause),
    /// The user dismissed the ceremony.
    Canceled,
}

// ---------------------------------------------------------------------------
// Boundary trait
// ---------------------------------------------------------------------------

/// Platform device-authentication boundary.
///
/// `authenticate` blocks the calling thread until the ceremony resolves.
/// Implementations map every platform-specific error into
/// [`AuthOutcome::Denied`] with a cause string.
pub trait DeviceAuthenticator: Send + Sync {
    /// Run the platform authentication ceremony with a human-readable
    /// reason shown in the prompt.
    fn authenticate(&self, reason: &str) -> AuthOutcome;
}

/// Authenticator for devices without any authentication capability.
/// Always denies with [`DenialCause::Unavailable`], never prompting.
pub struct UnavailableAuthenticator;

impl DeviceAuthenticator for UnavailableAuthenticator {
    fn authenticate(&self, _reason: &str) -> AuthOutcome {
        AuthOutcome::Denied(DenialCause::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// BiometricGate
// ---------------------------------------------------------------------------

/// Releases the in-flight flag on every exit path, including unwind.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Serializing wrapper over a [`DeviceAuthenticator`].
pub struct BiometricGate {
    provider: Arc<dyn DeviceAuthenticator>,
    in_progress: AtomicBool,
}

impl BiometricGate {
    /// Wrap a platform authenticator.
    #[must_use]
    pub fn new(provider: Arc<dyn DeviceAuthenticator>) -> Self {
        Self {
            provider,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Run one authentication ceremony.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AuthenticationInProgress`] when another
    /// ceremony is pending; the caller should not retry immediately.
    pub fn authenticate(&self, reason: &str) -> Result<AuthOutcome, VaultError> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return Err(VaultError::AuthenticationInProgress);
        }
        let _guard = InFlight(&self.in_progress);

        let outcome = self.provider.authenticate(reason);
        match &outcome {
            AuthOutcome::Granted => debug!("device authentication granted"),
            AuthOutcome::Denied(cause) => warn!(%cause, "device authentication denied"),
            AuthOutcome::Canceled => debug!("device authentication canceled"),
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    /// Scripted authenticator returning a fixed outcome.
    struct Scripted(AuthOutcome);

    impl DeviceAuthenticator for Scripted {
        fn authenticate(&self, _reason: &str) -> AuthOutcome {
            self.0.clone()
        }
    }

    /// Authenticator that blocks until released through a channel.
    struct Blocking {
        release: std::sync::Mutex<mpsc::Receiver<()>>,
        started: mpsc::Sender<()>,
    }

    impl DeviceAuthenticator for Blocking {
        fn authenticate(&self, _reason: &str) -> AuthOutcome {
            let _ = self.started.send(());
            let rx = self.release.lock().expect("receiver lock");
            let _ = rx.recv();
            AuthOutcome::Granted
        }
    }

    #[test]
    fn granted_passes_through() {
        let gate = BiometricGate::new(Arc::new(Scripted(AuthOutcome::Granted)));
        let outcome = gate.authenticate("unlock test").expect("no reentrancy");
        assert_eq!(outcome, AuthOutcome::Granted);
    }

    #[test]
    fn denial_cause_passes_through() {
        let gate = BiometricGate::new(Arc::new(Scripted(AuthOutcome::Denied(
            DenialCause::Failed("lockout".into()),
        ))));
        let outcome = gate.authenticate("unlock test").expect("no reentrancy");
        assert_eq!(outcome, AuthOutcome::Denied(DenialCause::Failed("lockout".into())));
    }

    #[test]
    fn unavailable_authenticator_denies_without_prompt() {
        let gate = BiometricGate::new(Arc::new(UnavailableAuthenticator));
        let outcome = gate.authenticate("unlock test").expect("no reentrancy");
        assert_eq!(outcome, AuthOutcome::Denied(DenialCause::Unavailable));
    }

    #[test]
    fn second_call_while_pending_is_rejected() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(BiometricGate::new(Arc::new(Blocking {
            release: std::sync::Mutex::new(release_rx),
            started: started_tx,
        })));

        let pending = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.authenticate("first"))
        };
        started_rx.recv().expect("first ceremony should start");

        // Second caller is rejected while the first is pending.
        assert!(matches!(
            gate.authenticate("second"),
            Err(VaultError::AuthenticationInProgress)
        ));

        release_tx.send(()).expect("release first ceremony");
        let outcome = pending
            .join()
            .expect("thread should not panic")
            .expect("first call is not reentrant");
        assert_eq!(outcome, AuthOutcome::Granted);

        // The gate is usable again once the ceremony resolved. Pre-arm
        // the release so the third ceremony resolves without blocking.
        release_tx.send(()).expect("release third ceremony");
        assert_eq!(
            gate.authenticate("third").expect("gate is idle again"),
            AuthOutcome::Granted
        );
    }

    #[test]
    fn gate_recovers_after_each_outcome() {
        let gate = BiometricGate::new(Arc::new(Scripted(AuthOutcome::Canceled)));
        assert_eq!(gate.authenticate("a").expect("ok"), AuthOutcome::Canceled);
        assert_eq!(gate.authenticate("b").expect("ok"), AuthOutcome::Canceled);
    }
}
