//! Session lock state machine — the sole authority over decryption.
//!
//! The machine owns the session's master-key handle: while `Locked` no
//! key handle exists in the process, so repository operations cannot
//! decrypt anything. Unlocking runs the biometric gate, then fetches (or
//! first-creates) the key from the keystore; locking drops the handle,
//! which zeroizes the in-process copy.
//!
//! States: `Locked`, `Unlocked`. No terminal state — after a wipe the
//! machine is `Locked` over an empty vault ("new vault"), not
//! "re-authenticate into existing data".

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use coffre_crypto_core::MasterKey;
use tracing::{debug, info};

use crate::error::VaultError;
use crate::gate::{AuthOutcome, BiometricGate};
use crate::keystore::SecureKeyStore;
use crate::preferences::Preferences;

/// Session lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    /// No session key in the process; repository operations fail.
    Locked,
    /// Session key present; decryption is authorized.
    Unlocked,
}

/// The unlock/lock state machine.
pub struct UnlockStateMachine {
    keystore: Arc<SecureKeyStore>,
    gate: BiometricGate,
    data_dir: PathBuf,
    prefs: Mutex<Preferences>,
    session: Mutex<Option<Arc<MasterKey>>>,
}

impl UnlockStateMachine {
    /// Build the machine in `Locked` with preferences loaded from
    /// `data_dir`. Call [`resume`](Self::resume) afterwards to honor a
    /// persisted `auto_unlock` opt-in.
    #[must_use]
    pub fn new(keystore: Arc<SecureKeyStore>, gate: BiometricGate, data_dir: PathBuf) -> Self {
        let prefs = Preferences::load(&data_dir);
        Self {
            keystore,
            gate,
            data_dir,
            prefs: Mutex::new(prefs),
            session: Mutex::new(None),
        }
    }

    fn poisoned() -> VaultError {
        VaultError::Storage("state mutex poisoned".into())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> UnlockState {
        let unlocked = self.session.lock().is_ok_and(|s| s.is_some());
        if unlocked {
            UnlockState::Unlocked
        } else {
            UnlockState::Locked
        }
    }

    /// Whether repository operations are currently authorized.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.state() == UnlockState::Unlocked
    }

    /// Honor the persisted `auto_unlock` opt-in on launch.
    ///
    /// With the flag set, transitions directly to `Unlocked` without
    /// invoking the biometric gate (trusting the prior session's
    /// explicit opt-in). Without it, stays `Locked`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyStoreUnavailable`] when the key cannot
    /// be fetched; the machine stays `Locked` and the caller decides
    /// whether to retry explicitly.
    pub fn resume(&self) -> Result<UnlockState, VaultError> {
        if !self.auto_unlock() {
            return Ok(UnlockState::Locked);
        }
        let key = self.keystore.ensure_key()?;
        *self.session.lock().map_err(|_| Self::poisoned())? = Some(key);
        info!("session restored via auto-unlock");
        Ok(UnlockState::Unlocked)
    }

    /// Run the authentication ceremony and unlock on success.
    ///
    /// Already-unlocked sessions return `Unlocked` without prompting.
    ///
    /// # Errors
    ///
    /// - [`VaultError::AuthenticationInProgress`] — another ceremony is
    ///   pending (rejected, not queued).
    /// - [`VaultError::AuthenticationFailed`] — denied; state unchanged.
    /// - [`VaultError::AuthenticationCanceled`] — dismissed; state
    ///   unchanged.
    /// - [`VaultError::KeyStoreUnavailable`] — passed authentication but
    ///   the key could not be fetched; state stays `Locked`.
    pub fn unlock(&self, reason: &str) -> Result<UnlockState, VaultError> {
        if self.is_unlocked() {
            return Ok(UnlockState::Unlocked);
        }
        match self.gate.authenticate(reason)? {
            AuthOutcome::Granted => {
                let key = self.keystore.ensure_key()?;
                *self.session.lock().map_err(|_| Self::poisoned())? = Some(key);
                info!("vault unlocked");
                Ok(UnlockState::Unlocked)
            }
            AuthOutcome::Denied(cause) => Err(VaultError::AuthenticationFailed(cause)),
            AuthOutcome::Canceled => Err(VaultError::AuthenticationCanceled),
        }
    }

    /// Relock the session: drop (and thereby zeroize) the key handle and
    /// clear the `auto_unlock` opt-in, so the next launch prompts again.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the preference cannot be persisted;
    /// the session is locked regardless.
    pub fn lock(&self) -> Result<(), VaultError> {
        *self.session.lock().map_err(|_| Self::poisoned())? = None;
        debug!("vault locked");
        self.set_auto_unlock(false)
    }

    /// Wipe the key material: delete the master key from the keystore,
    /// drop the session, reset `auto_unlock`, re-enter `Locked`.
    ///
    /// Record deletion is the caller's independent, explicitly paired
    /// call (`CredentialRepository::delete_all`); neither implies the
    /// other.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyStoreUnavailable`] if the keystore
    /// cannot be reached; the session is still dropped.
    pub fn wipe(&self) -> Result<(), VaultError> {
        *self.session.lock().map_err(|_| Self::poisoned())? = None;
        self.keystore.delete_key()?;
        info!("vault wiped");
        self.set_auto_unlock(false)
    }

    /// Read the persisted `auto_unlock` preference.
    #[must_use]
    pub fn auto_unlock(&self) -> bool {
        self.prefs.lock().is_ok_and(|p| p.auto_unlock)
    }

    /// Mutate and persist the `auto_unlock` preference. Does not change
    /// the lock state.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the preference file cannot be
    /// written.
    pub fn set_auto_unlock(&self, value: bool) -> Result<(), VaultError> {
        let mut prefs = self.prefs.lock().map_err(|_| Self::poisoned())?;
        prefs.auto_unlock = value;
        prefs.save(&self.data_dir)?;
        Ok(())
    }

    /// The session's master-key handle, shared read-only.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] while no session is active.
    pub(crate) fn session_key(&self) -> Result<Arc<MasterKey>, VaultError> {
        self.session
            .lock()
            .map_err(|_| Self::poisoned())?
            .as_ref()
            .map(Arc::clone)
            .ok_or(VaultError::Locked)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{DenialCause, DeviceAuthenticator};
    use crate::keystore::MemoryKeyring;
    use tempfile::TempDir;

    struct Scripted(AuthOutcome);

    impl DeviceAuthenticator for Scripted {
        fn authenticate(&self, _reason: &str) -> AuthOutcome {
            self.0.clone()
        }
    }

    /// Backend for a device whose secure keystore cannot be reached.
    struct UnreachableKeyring;

    impl crate::keystore::KeystoreBackend for UnreachableKeyring {
        fn put(&self, _service: &str, _account: &str, _secret: &[u8]) -> Result<(), VaultError> {
            Err(VaultError::KeyStoreUnavailable("device not provisioned".into()))
        }

        fn get(&self, _service: &str, _account: &str) -> Result<Option<Vec<u8>>, VaultError> {
            Err(VaultError::KeyStoreUnavailable("device not provisioned".into()))
        }

        fn delete(&self, _service: &str, _account: &str) -> Result<(), VaultError> {
            Err(VaultError::KeyStoreUnavailable("device not provisioned".into()))
        }
    }

    fn machine(dir: &TempDir, outcome: AuthOutcome) -> UnlockStateMachine {
        let keystore = Arc::new(SecureKeyStore::new(Arc::new(MemoryKeyring::new())));
        UnlockStateMachine::new(
            keystore,
            BiometricGate::new(Arc::new(Scripted(outcome))),
            dir.path().to_path_buf(),
        )
    }

    #[test]
    fn starts_locked() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Granted);
        assert_eq!(machine.state(), UnlockState::Locked);
        assert!(!machine.is_unlocked());
    }

    #[test]
    fn successful_authentication_unlocks() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Granted);
        assert_eq!(machine.unlock("test").expect("unlock"), UnlockState::Unlocked);
        assert!(machine.is_unlocked());
        assert!(machine.session_key().is_ok());
    }

    #[test]
    fn denied_authentication_stays_locked() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Denied(DenialCause::Failed("nope".into())));
        assert!(matches!(
            machine.unlock("test"),
            Err(VaultError::AuthenticationFailed(_))
        ));
        assert_eq!(machine.state(), UnlockState::Locked);
        assert!(matches!(machine.session_key(), Err(VaultError::Locked)));
    }

    #[test]
    fn canceled_authentication_stays_locked() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Canceled);
        assert!(matches!(
            machine.unlock("test"),
            Err(VaultError::AuthenticationCanceled)
        ));
        assert_eq!(machine.state(), UnlockState::Locked);
    }

    #[test]
    fn unlock_when_already_unlocked_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Granted);
        machine.unlock("first").expect("unlock");
        assert_eq!(machine.unlock("second").expect("unlock"), UnlockState::Unlocked);
    }

    #[test]
    fn lock_drops_session_and_clears_auto_unlock() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Granted);
        machine.unlock("test").expect("unlock");
        machine.set_auto_unlock(true).expect("persist");

        machine.lock().expect("lock");
        assert_eq!(machine.state(), UnlockState::Locked);
        assert!(!machine.auto_unlock());
        assert!(!Preferences::load(dir.path()).auto_unlock);
    }

    #[test]
    fn set_auto_unlock_does_not_change_state() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Granted);
        machine.set_auto_unlock(true).expect("persist");
        assert_eq!(machine.state(), UnlockState::Locked);
        assert!(Preferences::load(dir.path()).auto_unlock);
    }

    #[test]
    fn resume_without_opt_in_stays_locked() {
        let dir = TempDir::new().expect("tempdir");
        let machine = machine(&dir, AuthOutcome::Canceled);
        assert_eq!(machine.resume().expect("resume"), UnlockState::Locked);
    }

    #[test]
    fn resume_with_opt_in_skips_the_gate() {
        let dir = TempDir::new().expect("tempdir");
        Preferences { auto_unlock: true }
            .save(dir.path())
            .expect("seed prefs");
        // The gate would cancel if it were consulted; resume must not ask.
        let machine = machine(&dir, AuthOutcome::Canceled);
        assert_eq!(machine.resume().expect("resume"), UnlockState::Unlocked);
        assert!(machine.is_unlocked());
    }

    #[test]
    fn unreachable_keystore_fails_unlock_and_stays_locked() {
        let dir = TempDir::new().expect("tempdir");
        let keystore = Arc::new(SecureKeyStore::new(Arc::new(UnreachableKeyring)));
        let machine = UnlockStateMachine::new(
            keystore,
            BiometricGate::new(Arc::new(Scripted(AuthOutcome::Granted))),
            dir.path().to_path_buf(),
        );

        // Authentication passes, but the key cannot be fetched.
        assert!(matches!(
            machine.unlock("test"),
            Err(VaultError::KeyStoreUnavailable(_))
        ));
        assert_eq!(machine.state(), UnlockState::Locked);
        assert!(matches!(machine.session_key(), Err(VaultError::Locked)));
    }

    #[test]
    fn unreachable_keystore_fails_resume_and_stays_locked() {
        let dir = TempDir::new().expect("tempdir");
        Preferences { auto_unlock: true }
            .save(dir.path())
            .expect("seed prefs");
        let keystore = Arc::new(SecureKeyStore::new(Arc::new(UnreachableKeyring)));
        let machine = UnlockStateMachine::new(
            keystore,
            BiometricGate::new(Arc::new(Scripted(AuthOutcome::Granted))),
            dir.path().to_path_buf(),
        );

        assert!(matches!(
            machine.resume(),
            Err(VaultError::KeyStoreUnavailable(_))
        ));
        assert_eq!(machine.state(), UnlockState::Locked);
    }

    #[test]
    fn wipe_locks_and_discards_the_key() {
        let dir = TempDir::new().expect("tempdir");
        let keystore = Arc::new(SecureKeyStore::new(Arc::new(MemoryKeyring::new())));
        let machine = UnlockStateMachine::new(
            Arc::clone(&keystore),
            BiometricGate::new(Arc::new(Scripted(AuthOutcome::Granted))),
            dir.path().to_path_buf(),
        );
        machine.unlock("test").expect("unlock");
        let old_key = *machine.session_key().expect("key").expose();

        machine.wipe().expect("wipe");
        assert_eq!(machine.state(), UnlockState::Locked);
        assert!(!machine.auto_unlock());

        // Unlocking again mints a fresh key; the wiped one never returns.
        machine.unlock("again").expect("unlock");
        assert_ne!(*machine.session_key().expect("key").expose(), old_key);
    }
}
