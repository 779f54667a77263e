use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    checkpoint::JsonCheckpoint,
    unify::{Rejection, UnifiedAccounts},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemUsernameEntry {
    pub account_id: String,
    pub username: String,
    pub conflicting_account_ids: Vec<String>,
    pub conflicting_usernames: Vec<String>,
}

/// End of run summary. Everything an operator needs to act on before handing the
/// unified set downstream or re-running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub replayed: usize,
    pub processed: usize,
    pub unified: usize,
    pub converted_logins: usize,
    #[serde(default)]
    pub rejections: Vec<Rejection>,
    #[serde(default)]
    pub problem_usernames: Vec<ProblemUsernameEntry>,
}

impl JsonCheckpoint for MigrationReport {
    const PROPERTIES: &'static [&'static str] = &[
        "replayed",
        "processed",
        "unified",
        "convertedLogins",
        "rejections",
        "problemUsernames",
    ];

    fn checkpoint_path(&self) -> String {
        "reports/unification".to_string()
    }
}

impl MigrationReport {
    pub fn build(unified: &UnifiedAccounts, replayed: usize, processed: usize) -> Self {
        let problem_usernames = unified
            .problem_username_accounts()
            .into_iter()
            .map(|problem| ProblemUsernameEntry {
                account_id: problem.account.id.clone(),
                username: problem.account.username.clone(),
                conflicting_account_ids: problem.conflicts.iter().map(|a| a.id.clone()).collect(),
                conflicting_usernames: problem
                    .conflicts
                    .iter()
                    .map(|a| a.username.clone())
                    .collect(),
            })
            .collect();

        Self {
            replayed,
            processed,
            unified: unified.len(),
            converted_logins: unified.converted_login_count(),
            rejections: unified.rejections().to_vec(),
            problem_usernames,
        }
    }

    pub fn has_problems(&self) -> bool {
        !self.rejections.is_empty() || !self.problem_usernames.is_empty()
    }

    pub fn log(&self) {
        info!(
            replayed = self.replayed,
            processed = self.processed,
            unified = self.unified,
            converted_logins = self.converted_logins,
            rejected = self.rejections.len(),
            problem_usernames = self.problem_usernames.len(),
            "Unification finished"
        );
        for rejection in &self.rejections {
            warn!(
                "Rejected account id={} email={}: {:?}",
                rejection.account_id, rejection.email, rejection.reason
            );
        }
        for problem in &self.problem_usernames {
            warn!(
                "Account id={} username={} shares its login prefix with {}",
                problem.account_id,
                problem.username,
                problem.conflicting_usernames.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::Account, checkpoint::CheckpointStore, links::InMemoryAccountLinks,
        unify::RejectReason,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn unified() -> UnifiedAccounts {
        let mut unified = UnifiedAccounts::new(Arc::new(InMemoryAccountLinks::new()));
        unified.add_account(Account::new("a", "susan@corp.example.com", "susan"));
        unified.add_account(Account::new("b", "susan@example.com", "susan@example.com"));
        unified.add_account(Account::new("c", "susan@example.com", "susan.c@example.com"));
        unified
    }

    #[test]
    fn test_build_aggregates_diagnostics() {
        let report = MigrationReport::build(&unified(), 0, 3);

        assert_eq!(report.processed, 3);
        assert_eq!(report.unified, 2);
        assert_eq!(report.converted_logins, 1);
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].account_id, "c");
        assert_eq!(
            report.rejections[0].reason,
            RejectReason::UnlinkedDuplicateEmail {
                existing_account_id: "b".to_string()
            }
        );
        assert_eq!(
            report.problem_usernames,
            vec![ProblemUsernameEntry {
                account_id: "a".to_string(),
                username: "susan@emailnotprovided.local".to_string(),
                conflicting_account_ids: vec!["b".to_string()],
                conflicting_usernames: vec!["susan@example.com".to_string()],
            }]
        );
        assert!(report.has_problems());
    }

    #[test]
    fn test_report_is_persisted_as_snapshot() {
        let checkpoints = TempDir::new().unwrap();
        let store = CheckpointStore::new(checkpoints.path());
        let report = MigrationReport::build(&unified(), 1, 2);
        report.save(&store).unwrap();

        let mut restored = MigrationReport::default();
        restored.restore(&store).unwrap();
        assert_eq!(restored, report);
    }
}
