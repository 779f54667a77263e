use std::{
    collections::HashSet,
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Error};
use tracing::{info, warn};

use crate::{
    account::Account,
    account_ref::AccountRef,
    checkpoint::{CheckpointStore, JsonCheckpoint, LogCheckpoint},
    config::Config,
    error::ToUserError,
    links::InMemoryAccountLinks,
    pool::ConcurrencyPool,
    report::MigrationReport,
    source::{Initializer, RecordDirectory},
    unify::{AddOutcome, UnifiedAccounts},
};

/// Ids of every account folded into the engine, in processing order.
pub const PROCESSED_ACCOUNTS_LOG: &str = "processed-accounts";

/// Trims stray whitespace exported around identity fields.
pub fn account_initializer() -> Initializer<Account> {
    Arc::new(|account: &mut Account| {
        let email = account.email.trim();
        if email.len() != account.email.len() {
            account.email = email.to_string();
        }
        let username = account.username.trim();
        if username.len() != account.username.len() {
            account.username = username.to_string();
        }
    })
}

/// Runs (or resumes) the unification of an export.
///
/// Accounts already listed in the processed-accounts log are replayed through the
/// engine from their account refs, in log order, so that a resumed run reaches the
/// same state as an uninterrupted one. Remaining export files are then processed in
/// file order, flushing refs and the log every `checkpoint_flush_interval` accounts.
pub async fn run(config: &Config) -> Result<MigrationReport, Error> {
    let store = &CheckpointStore::new(&config.checkpoint_dir);
    let limit = config.file_open_limit;
    let initialize = account_initializer();

    let links = InMemoryAccountLinks::load(&config.account_links_dir(), limit, config.max_files())
        .await
        .context("Failed to load account links")?;
    info!("Loaded {} account links", links.link_count());
    let mut unified = UnifiedAccounts::new(Arc::new(links));

    let mut log = LogCheckpoint::new(PROCESSED_ACCOUNTS_LOG);
    let processed_ids = log
        .read_async(store)
        .await
        .user_error("The processed accounts checkpoint could not be read")?;
    let replayed = replay(store, &mut unified, &processed_ids, limit, &initialize).await?;

    let skip: HashSet<String> = processed_ids.into_iter().collect();
    // Account refs store file paths, which must resolve from any working directory
    let accounts_dir = absolute_dir(config.accounts_dir()).await?;
    let accounts = RecordDirectory::<Account>::new(accounts_dir, &skip, config.max_files())?
        .with_limit(limit)
        .with_initializer(initialize);
    info!("Processing {} accounts from {:?}", accounts.len(), accounts.dir());

    let mut processed = 0;
    for chunk in accounts.files().chunks(config.checkpoint_flush_interval.max(1)) {
        let batch = accounts
            .load_many(chunk, None)
            .await
            .user_error("An export record could not be loaded, fix or remove it and re-run")?;

        let mut refs = Vec::with_capacity(batch.len());
        for account in batch {
            let mut account_ref = AccountRef::from_account(&account);
            match unified.add_account(account) {
                AddOutcome::Created(identity) | AddOutcome::Merged(identity) => {
                    account_ref.username = Some(identity.username.clone());
                    account_ref.provider_user_id = identity.provider_user_id.clone();
                }
                AddOutcome::Rejected(_) => {}
            }
            log.add(account_ref.id.clone());
            refs.push(account_ref);
        }

        // Refs land before the log, so every logged id can be replayed
        ConcurrencyPool::new(limit)
            .each(&refs, |account_ref| async move {
                account_ref.save_async(store).await.map(drop)
            })
            .await?;
        log.save_async(store).await?;

        processed += refs.len();
        info!("Processed {}/{} accounts", processed, accounts.len());
    }

    let mut sink = config.sink_config()?.construct().await?;
    sink.emit(unified.accounts()).await?;

    let report = MigrationReport::build(&unified, replayed, processed);
    report.log();
    let path = report.save_async(store).await?;
    if report.has_problems() {
        warn!(
            "Unification finished with problems, review {:?} before provisioning",
            path
        );
    }
    Ok(report)
}

/// Resolves `dir` to an absolute path. A missing directory is returned as given.
async fn absolute_dir(dir: PathBuf) -> Result<PathBuf, Error> {
    match tokio::fs::canonicalize(&dir).await {
        Ok(absolute) => Ok(absolute),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(dir),
        Err(e) => Err(Error::from(e).context(format!("Failed to resolve export directory {dir:?}"))),
    }
}

async fn replay(
    store: &CheckpointStore,
    unified: &mut UnifiedAccounts,
    ids: &[String],
    limit: usize,
    initialize: &Initializer<Account>,
) -> Result<usize, Error> {
    let mut seen = HashSet::new();
    let ids: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
    if ids.is_empty() {
        return Ok(0);
    }

    info!("Replaying {} processed accounts", ids.len());
    ConcurrencyPool::new(limit)
        .each_ordered(
            &ids,
            |id| async move {
                let mut account_ref = AccountRef::new(id.as_str());
                account_ref.restore_async(store).await?;
                let mut account = account_ref
                    .get_account_async()
                    .await
                    .with_context(|| format!("Failed to replay account {id}"))?;
                initialize(&mut account);
                Ok::<_, Error>((account_ref, account))
            },
            |(account_ref, account)| {
                unified.add_account(account);
                if let Some(user_id) = account_ref.provider_user_id {
                    unified.set_provider_user_id(&account_ref.id, user_id);
                }
                Ok(())
            },
        )
        .await?;
    Ok(ids.len())
}
