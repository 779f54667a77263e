use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    account::{login_prefix, Account, PLACEHOLDER_LOGIN_DOMAIN},
    links::AccountLinks,
};

const ACCOUNTS_COUNTER: &str = "identity_migrator_accounts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RejectReason {
    /// The same raw account id was already folded in.
    DuplicateAccountId,
    /// Linked to an identity that carries a different email.
    LinkedEmailMismatch {
        linked_account_id: String,
        linked_email: String,
    },
    /// Shares an email with an identity it is not linked to.
    UnlinkedDuplicateEmail { existing_account_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub account_id: String,
    pub email: String,
    pub reason: RejectReason,
}

#[derive(Debug)]
pub enum AddOutcome<'a> {
    /// A new canonical identity.
    Created(&'a Account),
    /// Folded into the existing identity, which is returned.
    Merged(&'a Account),
    Rejected(Rejection),
}

impl<'a> AddOutcome<'a> {
    pub fn account(&self) -> Option<&'a Account> {
        match self {
            AddOutcome::Created(account) | AddOutcome::Merged(account) => Some(account),
            AddOutcome::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, AddOutcome::Rejected(_))
    }
}

/// An identity whose login was synthesized, together with the identities that
/// share its login prefix. Those users would collide when logging in by prefix.
#[derive(Debug)]
pub struct ProblemUsername<'a> {
    pub account: &'a Account,
    pub conflicts: Vec<&'a Account>,
}

/// Folds exported accounts into unified identities.
///
/// Order matters: the first account to claim an email becomes the canonical
/// identity, and later linked accounts with that email merge into it. Rejected
/// accounts are left out of the unified set and kept for reporting.
pub struct UnifiedAccounts {
    links: Arc<dyn AccountLinks>,
    accounts: Vec<Account>,
    by_email: HashMap<String, usize>,
    by_account_id: HashMap<String, usize>,
    by_login_prefix: HashMap<String, Vec<usize>>,
    converted_logins: Vec<usize>,
    rejections: Vec<Rejection>,
}

impl UnifiedAccounts {
    pub fn new(links: Arc<dyn AccountLinks>) -> Self {
        Self {
            links,
            accounts: Vec::new(),
            by_email: HashMap::new(),
            by_account_id: HashMap::new(),
            by_login_prefix: HashMap::new(),
            converted_logins: Vec::new(),
            rejections: Vec::new(),
        }
    }

    pub fn add_account(&mut self, mut account: Account) -> AddOutcome<'_> {
        if self.by_account_id.contains_key(&account.id) {
            warn!(
                "Account id={} email={} was already processed. Skipping.",
                account.id, account.email
            );
            return AddOutcome::Rejected(self.reject(&account, RejectReason::DuplicateAccountId));
        }

        let linked_ids = self.links.linked_accounts(&account.id);

        // A link to an identity with another email is a data problem, not something to resolve here
        let mismatch = linked_ids
            .iter()
            .filter_map(|id| self.by_account_id.get(id))
            .map(|&idx| &self.accounts[idx])
            .find(|linked| linked.email != account.email)
            .map(|linked| RejectReason::LinkedEmailMismatch {
                linked_account_id: linked.id.clone(),
                linked_email: linked.email.clone(),
            });
        if let Some(reason) = mismatch {
            if let RejectReason::LinkedEmailMismatch {
                linked_account_id,
                linked_email,
            } = &reason
            {
                warn!(
                    "Account id={} email={} is linked to id={} email={}, but email is different. Skipping.",
                    account.id, account.email, linked_account_id, linked_email
                );
            }
            return AddOutcome::Rejected(self.reject(&account, reason));
        }

        if let Some(&idx) = self.by_email.get(&account.email) {
            let existing_id = self.accounts[idx].id.clone();
            if !linked_ids.contains(&existing_id) {
                warn!(
                    "Account id={} email={} has same email address as id={}, but is not linked. Skipping.",
                    account.id, account.email, existing_id
                );
                return AddOutcome::Rejected(self.reject(
                    &account,
                    RejectReason::UnlinkedDuplicateEmail {
                        existing_account_id: existing_id,
                    },
                ));
            }

            info!(
                "Merged account id={} email={} into linked account id={}",
                account.id, account.email, existing_id
            );
            let account_id = account.id.clone();
            self.accounts[idx].merge(account);
            self.by_account_id.insert(account_id, idx);
            metrics::counter!(ACCOUNTS_COUNTER, "outcome" => "merged").increment(1);
            return AddOutcome::Merged(&self.accounts[idx]);
        }

        let idx = self.accounts.len();

        // The downstream login must be email-shaped. Prefix lookups still work for most
        // users; the ones that collide are surfaced by problem_username_accounts.
        if !account.has_email_login() {
            let updated = format!("{}@{}", account.username, PLACEHOLDER_LOGIN_DOMAIN);
            warn!(
                "Account id={} username={} username is not an email. Using username={}.",
                account.id, account.username, updated
            );
            account.username = updated;
            self.converted_logins.push(idx);
        }

        debug!("Adding new account id={}", account.id);
        self.by_email.insert(account.email.clone(), idx);
        self.by_account_id.insert(account.id.clone(), idx);
        self.by_login_prefix
            .entry(account.login_prefix().to_string())
            .or_default()
            .push(idx);
        self.accounts.push(account);
        metrics::counter!(ACCOUNTS_COUNTER, "outcome" => "created").increment(1);

        AddOutcome::Created(&self.accounts[idx])
    }

    fn reject(&mut self, account: &Account, reason: RejectReason) -> Rejection {
        metrics::counter!(ACCOUNTS_COUNTER, "outcome" => "rejected").increment(1);
        let rejection = Rejection {
            account_id: account.id.clone(),
            email: account.email.clone(),
            reason,
        };
        self.rejections.push(rejection.clone());
        rejection
    }

    /// Unified identities, in the order they were first created.
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn accounts_by_email(&self) -> HashMap<&str, &Account> {
        self.by_email
            .iter()
            .map(|(email, &idx)| (email.as_str(), &self.accounts[idx]))
            .collect()
    }

    pub fn account_by_email(&self, email: &str) -> Option<&Account> {
        self.by_email.get(email).map(|&idx| &self.accounts[idx])
    }

    /// The unified identity a raw account id was folded into.
    pub fn account_by_id(&self, account_id: &str) -> Option<&Account> {
        self.by_account_id
            .get(account_id)
            .map(|&idx| &self.accounts[idx])
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Records the downstream identifier for the identity `account_id` belongs to.
    /// Returns false if the account is unknown.
    pub fn set_provider_user_id(&mut self, account_id: &str, user_id: impl Into<String>) -> bool {
        match self.by_account_id.get(account_id) {
            Some(&idx) => {
                self.accounts[idx].provider_user_id = Some(user_id.into());
                true
            }
            None => false,
        }
    }

    pub fn user_id_by_account_id(&self, account_id: &str) -> Option<&str> {
        self.account_by_id(account_id)
            .and_then(Account::provider_user_id)
    }

    pub fn user_ids_by_account_ids<S: AsRef<str>>(&self, account_ids: &[S]) -> Vec<String> {
        account_ids
            .iter()
            .filter_map(|id| self.user_id_by_account_id(id.as_ref()))
            .map(String::from)
            .collect()
    }

    /// Account ids that have no downstream identifier yet.
    pub fn missing_accounts<S: AsRef<str>>(&self, account_ids: &[S]) -> Vec<String> {
        account_ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| self.user_id_by_account_id(id).is_none())
            .map(String::from)
            .collect()
    }

    /// Synthesized logins that share a prefix with another identity's login.
    ///
    /// With `susan` rewritten to `susan@emailnotprovided.local` and another user
    /// holding `susan@example.com`, a login attempt as `susan` is ambiguous. Without
    /// the second user the prefix alone still resolves, so nothing is reported.
    pub fn problem_username_accounts(&self) -> Vec<ProblemUsername<'_>> {
        self.converted_logins
            .iter()
            .filter_map(|&idx| {
                let account = &self.accounts[idx];
                let conflicts: Vec<_> = self
                    .by_login_prefix
                    .get(login_prefix(&account.username))
                    .into_iter()
                    .flatten()
                    .filter(|&&other| other != idx)
                    .map(|&other| &self.accounts[other])
                    .collect();
                (!conflicts.is_empty()).then_some(ProblemUsername { account, conflicts })
            })
            .collect()
    }

    pub fn converted_login_count(&self) -> usize {
        self.converted_logins.len()
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }
}
