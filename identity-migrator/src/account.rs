use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{checkpoint::Properties, source::ExportRecord};

/// Domain appended to logins that are not email-shaped, since the downstream
/// provider requires an email-formatted login.
pub const PLACEHOLDER_LOGIN_DOMAIN: &str = "emailnotprovided.local";

/// One exported identity. Once registered with the unification engine it becomes
/// the canonical identity for its email, and later linked records merge into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub custom_data: Properties,
    // Assigned by the downstream provider once the identity is provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_account_ids: Vec<String>,
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
    // Provider specific fields we carry but never interpret
    #[serde(flatten)]
    pub extra: Properties,
}

impl Account {
    pub fn new(id: impl Into<String>, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            username: username.into(),
            given_name: None,
            surname: None,
            status: None,
            custom_data: Properties::new(),
            provider_user_id: None,
            linked_account_ids: Vec::new(),
            file_path: None,
            extra: Properties::new(),
        }
    }

    pub fn has_email_login(&self) -> bool {
        self.username.contains('@')
    }

    /// The part of the login before its `@`, or the whole login if it has none.
    pub fn login_prefix(&self) -> &str {
        login_prefix(&self.username)
    }

    pub fn provider_user_id(&self) -> Option<&str> {
        self.provider_user_id.as_deref()
    }

    /// Folds a linked record into this identity. Values already present here win;
    /// the other record only fills gaps. The other record's id is remembered.
    pub fn merge(&mut self, other: Account) {
        fill(&mut self.given_name, other.given_name);
        fill(&mut self.surname, other.surname);
        fill(&mut self.status, other.status);
        fill(&mut self.provider_user_id, other.provider_user_id);
        union(&mut self.custom_data, other.custom_data);
        union(&mut self.extra, other.extra);

        for id in std::iter::once(other.id).chain(other.linked_account_ids) {
            if id != self.id && !self.linked_account_ids.contains(&id) {
                self.linked_account_ids.push(id);
            }
        }
    }

    /// Every raw id this identity stands for, its own first.
    pub fn account_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.linked_account_ids.iter().map(String::as_str))
    }
}

pub fn login_prefix(login: &str) -> &str {
    match login.find('@') {
        Some(at) => &login[..at],
        None => login,
    }
}

fn fill(target: &mut Option<String>, value: Option<String>) {
    let empty = target.as_deref().map_or(true, str::is_empty);
    if empty && value.as_deref().is_some_and(|v| !v.is_empty()) {
        *target = value;
    }
}

fn union(target: &mut Properties, other: Properties) {
    for (key, value) in other {
        if !target.contains_key(&key) {
            target.insert(key, value);
        }
    }
}

impl ExportRecord for Account {
    fn from_export(path: &Path, props: Properties) -> Result<Self, serde_json::Error> {
        let mut account: Account = serde_json::from_value(Value::Object(props))?;
        account.file_path = Some(path.to_path_buf());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_prefix() {
        assert_eq!(login_prefix("susan@example.com"), "susan");
        assert_eq!(login_prefix("susan"), "susan");
        assert_eq!(login_prefix("@example.com"), "");
    }

    #[test]
    fn test_from_export_keeps_opaque_fields() {
        let props = json!({
            "id": "acc-1",
            "email": "susan@example.com",
            "username": "susan",
            "givenName": "Susan",
            "href": "https://api.example.com/v1/accounts/acc-1",
            "customData": {"plan": "pro"}
        });
        let Value::Object(props) = props else {
            unreachable!()
        };
        let account =
            Account::from_export(Path::new("/export/accounts/acc-1.json"), props).unwrap();

        assert_eq!(account.id, "acc-1");
        assert_eq!(account.given_name.as_deref(), Some("Susan"));
        assert_eq!(account.custom_data["plan"], "pro");
        assert_eq!(
            account.extra["href"],
            "https://api.example.com/v1/accounts/acc-1"
        );
        assert_eq!(
            account.file_path,
            Some(PathBuf::from("/export/accounts/acc-1.json"))
        );
    }

    #[test]
    fn test_from_export_requires_identity_fields() {
        let Value::Object(props) = json!({"id": "acc-1"}) else {
            unreachable!()
        };
        assert!(Account::from_export(Path::new("x.json"), props).is_err());
    }

    #[test]
    fn test_merge_fills_gaps_and_keeps_existing_values() {
        let mut existing = Account::new("a", "susan@example.com", "susan@example.com");
        existing.given_name = Some("Susan".to_string());
        existing.custom_data.insert("plan".to_string(), json!("pro"));

        let mut other = Account::new("b", "susan@example.com", "susan2");
        other.given_name = Some("Sue".to_string());
        other.surname = Some("Smith".to_string());
        other.custom_data.insert("plan".to_string(), json!("free"));
        other.custom_data.insert("team".to_string(), json!("ops"));

        existing.merge(other);

        assert_eq!(existing.id, "a");
        assert_eq!(existing.username, "susan@example.com");
        assert_eq!(existing.given_name.as_deref(), Some("Susan"));
        assert_eq!(existing.surname.as_deref(), Some("Smith"));
        assert_eq!(existing.custom_data["plan"], "pro");
        assert_eq!(existing.custom_data["team"], "ops");
        assert_eq!(existing.linked_account_ids, vec!["b"]);
        assert_eq!(existing.account_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_merge_does_not_duplicate_linked_ids() {
        let mut existing = Account::new("a", "x@example.com", "x@example.com");
        existing.merge(Account::new("b", "x@example.com", "x"));
        existing.merge(Account::new("b", "x@example.com", "x"));
        existing.merge(Account::new("a", "x@example.com", "x"));
        assert_eq!(existing.linked_account_ids, vec!["b"]);
    }
}
