use std::path::PathBuf;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use crate::{
    account::Account,
    checkpoint::JsonCheckpoint,
    source::{load_record, load_record_sync},
};

/// Durable pointer to one processed export record: where it came from and what
/// the migration learned about it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    pub id: String,
    #[serde(default)]
    pub provider_user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub account_file_path: Option<PathBuf>,
}

impl JsonCheckpoint for AccountRef {
    const PROPERTIES: &'static [&'static str] = &[
        "id",
        "providerUserId",
        "username",
        "email",
        "accountFilePath",
    ];

    fn checkpoint_path(&self) -> String {
        format!("account-refs/{}", self.id)
    }
}

impl AccountRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            provider_user_id: account.provider_user_id.clone(),
            username: Some(account.username.clone()),
            email: Some(account.email.clone()),
            account_file_path: account.file_path.clone(),
        }
    }

    fn account_file_path(&self) -> Result<&PathBuf, Error> {
        self.account_file_path
            .as_ref()
            .with_context(|| format!("Account ref {} has no account file path", self.id))
    }

    /// Reloads the export record this ref points at.
    pub fn get_account(&self) -> Result<Account, Error> {
        Ok(load_record_sync(self.account_file_path()?)?)
    }

    pub async fn get_account_async(&self) -> Result<Account, Error> {
        Ok(load_record(self.account_file_path()?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointStore;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_restore() {
        let checkpoints = TempDir::new().unwrap();
        let store = CheckpointStore::new(checkpoints.path());

        let mut account = Account::new("acc-1", "susan@example.com", "susan@example.com");
        account.file_path = Some(PathBuf::from("/export/accounts/acc-1.json"));
        account.provider_user_id = Some("00u1".to_string());
        let path = AccountRef::from_account(&account).save(&store).unwrap();
        assert_eq!(path, checkpoints.path().join("account-refs/acc-1.json"));

        let mut restored = AccountRef::new("acc-1");
        restored.restore(&store).unwrap();
        assert_eq!(restored, AccountRef::from_account(&account));
    }

    #[test]
    fn test_restore_unknown_ref_keeps_only_the_id() {
        let checkpoints = TempDir::new().unwrap();
        let store = CheckpointStore::new(checkpoints.path());
        let mut restored = AccountRef::new("never-saved");
        restored.restore(&store).unwrap();
        assert_eq!(restored, AccountRef::new("never-saved"));
    }

    #[tokio::test]
    async fn test_get_account_reloads_the_export_record() {
        let export = TempDir::new().unwrap();
        let file = export.path().join("acc-1.json");
        fs::write(
            &file,
            r#"{"id": "acc-1", "email": "susan@example.com", "username": "susan"}"#,
        )
        .unwrap();

        let mut account_ref = AccountRef::new("acc-1");
        account_ref.account_file_path = Some(file.clone());

        let account = account_ref.get_account_async().await.unwrap();
        assert_eq!(account.username, "susan");
        assert_eq!(account.file_path, Some(file));
        assert_eq!(account_ref.get_account().unwrap(), account);
    }

    #[test]
    fn test_get_account_without_path_fails() {
        let result = AccountRef::new("acc-1").get_account();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("has no account file path"));
    }
}
