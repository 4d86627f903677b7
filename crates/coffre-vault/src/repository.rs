//! Credential CRUD and search over the sealed record store.
//!
//! Every operation is gated on the unlock state machine: the session key
//! is fetched through it first, so a locked vault fails with
//! [`VaultError::Locked`] before anything is read, validated, encrypted,
//! or written. Mutations hold a single mutex over the store connection,
//! so no caller observes the collection mid-mutation, and SQLite commits
//! before each call returns — a successful return is durable.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use coffre_crypto_core::{MasterKey, SecretBuffer};

use crate::credential::{generate_id, AccountCredential, CredentialDraft, FieldTag};
use crate::error::VaultError;
use crate::store::RecordStore;
use crate::unlock::UnlockStateMachine;

/// The vault's credential collection — ciphertext at rest, plaintext
/// only through the `reveal_*` operations.
pub struct CredentialRepository {
    unlock: Arc<UnlockStateMachine>,
    store: Mutex<RecordStore>,
}

impl CredentialRepository {
    /// Wrap an opened record store, gated by the given state machine.
    #[must_use]
    pub fn new(store: RecordStore, unlock: Arc<UnlockStateMachine>) -> Self {
        Self {
            unlock,
            store: Mutex::new(store),
        }
    }

    /// Open (or create) the store at `path` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store cannot be opened.
    pub fn open(path: &Path, unlock: Arc<UnlockStateMachine>) -> Result<Self, VaultError> {
        Ok(Self::new(RecordStore::open(path)?, unlock))
    }

    /// Authorize the operation and take the store lock.
    ///
    /// The session key is fetched first so `Locked` is reported with
    /// zero side effects.
    fn authorized(
        &self,
    ) -> Result<(MutexGuard<'_, RecordStore>, Arc<MasterKey>), VaultError> {
        let key = self.unlock.session_key()?;
        let store = self
            .store
            .lock()
            .map_err(|_| VaultError::Storage("store mutex poisoned".into()))?;
        Ok((store, key))
    }

    /// The full collection in canonical (insertion) order. Ciphertext
    /// fields are populated; nothing is decrypted.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] while locked; [`VaultError::Storage`] on
    /// store failure.
    pub fn list(&self) -> Result<Vec<AccountCredential>, VaultError> {
        let (store, _key) = self.authorized()?;
        store.load_all()
    }

    /// Case-insensitive containment search against `title`, preserving
    /// insertion order. An empty substring means "search inactive" and
    /// yields an empty result, not the full collection.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] while locked; [`VaultError::Storage`] on
    /// store failure.
    pub fn find(&self, substring: &str) -> Result<Vec<AccountCredential>, VaultError> {
        let (store, _key) = self.authorized()?;
        if substring.is_empty() {
            return Ok(Vec::new());
        }
        let needle = substring.to_lowercase();
        let mut records = store.load_all()?;
        records.retain(|r| r.title.to_lowercase().contains(&needle));
        Ok(records)
    }

    /// Create a credential: validate, seal both secret fields, assign a
    /// fresh id, append at the end of the canonical order, persist.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] while locked (before validation).
    /// - [`VaultError::Validation`] for an empty trimmed title,
    ///   username, or password — rejected before any encryption or
    ///   persistence.
    /// - [`VaultError::Crypto`] / [`VaultError::Storage`] downstream.
    pub fn create(
        &self,
        title: &str,
        identifier: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<AccountCredential, VaultError> {
        let (store, key) = self.authorized()?;
        let draft = CredentialDraft::new(title, identifier, username, password)?;
        let record = draft.seal(generate_id(), &key)?;
        store.insert(&record)?;
        Ok(record)
    }

    /// Replace the record matching `id` in place, preserving its
    /// position and identity. Secret fields are re-sealed under the
    /// session key.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create), plus [`VaultError::NotFound`]
    /// when no record has that id (the collection is left unchanged).
    pub fn update(
        &self,
        id: &str,
        title: &str,
        identifier: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<AccountCredential, VaultError> {
        let (store, key) = self.authorized()?;
        let draft = CredentialDraft::new(title, identifier, username, password)?;
        let record = draft.seal(id.to_string(), &key)?;
        if !store.replace(&record)? {
            return Err(VaultError::NotFound(id.to_string()));
        }
        Ok(record)
    }

    /// Remove the record matching `id`.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] when absent; [`VaultError::Locked`]
    /// while locked.
    pub fn delete(&self, id: &str) -> Result<(), VaultError> {
        let (store, _key) = self.authorized()?;
        if !store.delete(id)? {
            return Err(VaultError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Clear the entire collection. Intended to be paired with
    /// `SecureKeyStore::delete_key` for a full wipe, but the two calls
    /// are independent and neither implies the other.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] while locked; [`VaultError::Storage`] on
    /// store failure.
    pub fn delete_all(&self) -> Result<(), VaultError> {
        let (store, _key) = self.authorized()?;
        store.clear()
    }

    /// Decrypt the username of the record matching `id`.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] when absent; `CryptoError::Decryption`
    /// (via [`VaultError::Crypto`]) when the blob fails its integrity
    /// check — the record is unreadable, never silently blank.
    pub fn reveal_username(&self, id: &str) -> Result<SecretBuffer, VaultError> {
        self.reveal(id, FieldTag::Username)
    }

    /// Decrypt the password of the record matching `id`.
    ///
    /// # Errors
    ///
    /// Same as [`reveal_username`](Self::reveal_username).
    pub fn reveal_password(&self, id: &str) -> Result<SecretBuffer, VaultError> {
        self.reveal(id, FieldTag::Password)
    }

    fn reveal(&self, id: &str, field: FieldTag) -> Result<SecretBuffer, VaultError> {
        let (store, key) = self.authorized()?;
        let record = store
            .find_by_id(id)?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        record.reveal(&key, field)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{AuthOutcome, BiometricGate, DeviceAuthenticator};
    use crate::keystore::{MemoryKeyring, SecureKeyStore};
    use tempfile::TempDir;

    struct AlwaysGranted;

    impl DeviceAuthenticator for AlwaysGranted {
        fn authenticate(&self, _reason: &str) -> AuthOutcome {
            AuthOutcome::Granted
        }
    }

    fn unlocked_repo(dir: &TempDir) -> (CredentialRepository, Arc<UnlockStateMachine>) {
        let keystore = Arc::new(SecureKeyStore::new(Arc::new(MemoryKeyring::new())));
        let machine = Arc::new(UnlockStateMachine::new(
            keystore,
            BiometricGate::new(Arc::new(AlwaysGranted)),
            dir.path().to_path_buf(),
        ));
        machine.unlock("test").expect("unlock");
        let store = RecordStore::open_in_memory().expect("open store");
        (
            CredentialRepository::new(store, Arc::clone(&machine)),
            machine,
        )
    }

    #[test]
    fn locked_repository_rejects_every_operation() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, machine) = unlocked_repo(&dir);
        machine.lock().expect("lock");

        assert!(matches!(repo.list(), Err(VaultError::Locked)));
        assert!(matches!(repo.find("bank"), Err(VaultError::Locked)));
        assert!(matches!(
            repo.create("Bank", None, "alice", "pw"),
            Err(VaultError::Locked)
        ));
        assert!(matches!(
            repo.update("x", "Bank", None, "alice", "pw"),
            Err(VaultError::Locked)
        ));
        assert!(matches!(repo.delete("x"), Err(VaultError::Locked)));
        assert!(matches!(repo.delete_all(), Err(VaultError::Locked)));
        assert!(matches!(repo.reveal_password("x"), Err(VaultError::Locked)));

        // Zero side effects: unlocking shows an untouched collection.
        machine.unlock("again").expect("unlock");
        assert!(repo.list().expect("list").is_empty());
    }

    #[test]
    fn create_appends_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        repo.create("Bank", None, "alice", "pw1").expect("create");
        repo.create("Email", None, "bob", "pw2").expect("create");

        let titles: Vec<String> = repo
            .list()
            .expect("list")
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["Bank", "Email"]);
    }

    #[test]
    fn create_validation_happens_before_persistence() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        assert!(matches!(
            repo.create("  ", None, "alice", "pw"),
            Err(VaultError::Validation("title"))
        ));
        assert!(repo.list().expect("list").is_empty());
    }

    #[test]
    fn update_preserves_id_and_position() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        repo.create("First", None, "a", "1").expect("create");
        let target = repo.create("Second", None, "b", "2").expect("create");
        repo.create("Third", None, "c", "3").expect("create");

        let updated = repo
            .update(&target.id, "Second Renamed", None, "b2", "22")
            .expect("update");
        assert_eq!(updated.id, target.id);

        let all = repo.list().expect("list");
        assert_eq!(all[1].id, target.id);
        assert_eq!(all[1].title, "Second Renamed");
        assert_eq!(
            repo.reveal_username(&target.id).expect("reveal").expose(),
            b"b2"
        );
    }

    #[test]
    fn update_missing_id_leaves_collection_unchanged() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        repo.create("Bank", None, "alice", "pw").expect("create");

        assert!(matches!(
            repo.update("no-such-id", "X", None, "u", "p"),
            Err(VaultError::NotFound(_))
        ));
        let all = repo.list().expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Bank");
    }

    #[test]
    fn delete_removes_and_reports_missing() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        let record = repo.create("Bank", None, "alice", "pw").expect("create");

        repo.delete(&record.id).expect("delete");
        assert!(repo.list().expect("list").is_empty());
        assert!(matches!(
            repo.delete(&record.id),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn find_empty_substring_is_inactive_search() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        repo.create("Bank", None, "alice", "pw").expect("create");
        assert!(repo.find("").expect("find").is_empty());
    }

    #[test]
    fn find_is_case_insensitive_and_order_preserving() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        repo.create("My Bank", None, "a", "1").expect("create");
        repo.create("Email", None, "b", "2").expect("create");
        repo.create("bankrupt notes", None, "c", "3").expect("create");

        let titles: Vec<String> = repo
            .find("BANK")
            .expect("find")
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["My Bank", "bankrupt notes"]);
    }

    #[test]
    fn reveal_missing_id_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        assert!(matches!(
            repo.reveal_password("ghost"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn delete_all_clears_the_collection() {
        let dir = TempDir::new().expect("tempdir");
        let (repo, _machine) = unlocked_repo(&dir);
        repo.create("Bank", None, "alice", "pw").expect("create");
        repo.create("Email", None, "bob", "pw").expect("create");

        repo.delete_all().expect("delete_all");
        assert!(repo.list().expect("list").is_empty());
    }
}
