use std::{
    collections::{BTreeSet, HashMap, HashSet},
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{
    checkpoint::Properties,
    error::LoadError,
    source::{ExportRecord, RecordDirectory},
};

/// Source of explicit "these records are the same person" declarations.
pub trait AccountLinks: Send + Sync {
    /// Every other account id explicitly linked to `account_id`. Links are not
    /// followed transitively. Never contains `account_id` itself.
    fn linked_accounts(&self, account_id: &str) -> Vec<String>;
}

/// One exported link between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLink {
    pub id: String,
    pub left_account_id: String,
    pub right_account_id: String,
}

impl ExportRecord for AccountLink {
    fn from_export(_path: &Path, props: Properties) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(props))
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountLinks {
    edges: HashMap<String, BTreeSet<String>>,
    link_count: usize,
}

impl InMemoryAccountLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut links = Self::new();
        for (left, right) in pairs {
            links.link(left, right);
        }
        links
    }

    pub fn link(&mut self, left: impl Into<String>, right: impl Into<String>) {
        let (left, right) = (left.into(), right.into());
        if left == right {
            return;
        }
        self.edges
            .entry(left.clone())
            .or_default()
            .insert(right.clone());
        self.edges.entry(right).or_default().insert(left);
        self.link_count += 1;
    }

    pub fn link_count(&self) -> usize {
        self.link_count
    }

    /// Loads every link file in `dir`. A missing directory means no links.
    pub async fn load(dir: &Path, limit: usize, max_files: Option<usize>) -> Result<Self, anyhow::Error> {
        let records = RecordDirectory::<AccountLink>::new(dir, &HashSet::new(), max_files)?
            .with_limit(limit);
        info!("Loading {} account links from {:?}", records.len(), dir);

        let by_id = records
            .map_to_object(
                |link| async move {
                    Ok::<_, LoadError>(Some((link.id, (link.left_account_id, link.right_account_id))))
                },
                None,
            )
            .await?;

        // Link ids sort first so the adjacency is built the same way on every run
        let mut ids: Vec<_> = by_id.keys().cloned().collect();
        ids.sort_by(|a, b| natord::compare(a, b));
        let mut links = Self::new();
        for id in ids {
            let (left, right) = &by_id[&id];
            links.link(left.as_str(), right.as_str());
        }
        Ok(links)
    }
}

impl AccountLinks for InMemoryAccountLinks {
    fn linked_accounts(&self, account_id: &str) -> Vec<String> {
        self.edges
            .get(account_id)
            .map(|linked| linked.iter().cloned().collect())
            .unwrap_or_default()
    }
}
