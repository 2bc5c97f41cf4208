//! One journal run: credential → list → filter → dedup → details → render →
//! merge → commit, then the optional manifest and publish steps.
//!
//! Everything up to the document write either succeeds or aborts with the
//! document untouched. The manifest and the upload run after the commit and
//! only log their failures.

use std::collections::HashSet;

use log::{info, warn};
use serde::Serialize;

use crate::activity::ActivityId;
use crate::auth::CredentialProvider;
use crate::config::{github_token_from_env, ClientCredentials, JournalConfig, PublishSettings};
use crate::error::{JournalError, Result};
use crate::filter::ActivityFilter;
use crate::http::ActivityClient;
use crate::journal::JournalMerger;
use crate::manifest::JournalManifest;
use crate::publish::GitHubPublisher;
use crate::render::{JournalEntry, RenderedSnippet, SnippetRenderer};
use crate::store::JournalStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute the merged document but write and publish nothing
    pub dry_run: bool,
}

/// What one run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Records returned by the list call
    pub fetched: usize,
    /// Records passing the type and geofence filter
    pub relevant: usize,
    /// Relevant records already in the document
    pub already_present: usize,
    pub detail_failures: usize,
    pub render_failures: usize,
    /// Ids added to the document, in document order
    pub inserted: Vec<ActivityId>,
    /// Whether the document file was rewritten
    pub written: bool,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_error: Option<String>,
    /// Merged document text, kept only on dry runs
    #[serde(skip)]
    pub merged_document: Option<String>,
}

/// Run the pipeline once against `config`.
pub async fn run(
    config: &JournalConfig,
    credentials: ClientCredentials,
    options: RunOptions,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let store = JournalStore::new(config.journal.document.clone());
    let _lock = store.lock()?;

    let provider = CredentialProvider::new(config, credentials)?;
    let credential = provider.obtain_access_credential().await?;

    let client = ActivityClient::new(config)?;
    let listed = client
        .list_recent_activities(&credential, config.page_size)
        .await?;
    summary.fetched = listed.len();

    let filter = ActivityFilter::new(config.activity_type.as_str(), config.bounds);
    let relevant = filter.retain_relevant(listed);
    summary.relevant = relevant.len();
    info!(
        "{} of {} activities are {} inside the bounds",
        summary.relevant, summary.fetched, config.activity_type
    );

    let merger = JournalMerger::new(config.journal.container_id.as_str());
    let document = store.read()?;
    let existing = merger.existing_ids(&document)?;

    let mut queued = HashSet::new();
    let mut pending = Vec::new();
    for record in &relevant {
        let Some(id) = &record.id else {
            warn!("Skipping relevant activity without an id");
            summary.render_failures += 1;
            continue;
        };
        if existing.contains(id) {
            summary.already_present += 1;
        } else if queued.insert(id.clone()) {
            pending.push(id.clone());
        }
    }
    info!(
        "{} new activities to resolve, {} already journaled",
        pending.len(),
        summary.already_present
    );

    let renderer = SnippetRenderer::new(&config.endpoints.site_base, config.journal.date_style);
    let mut snippets: Vec<RenderedSnippet> = Vec::with_capacity(pending.len());
    for result in client.fetch_details(&credential, pending).await {
        let mut record = match result.record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping activity {}: {}", result.activity_id, e);
                summary.detail_failures += 1;
                continue;
            }
        };
        if record.id.is_none() {
            record.id = Some(result.activity_id.clone());
        }
        match renderer.render(&record) {
            Ok(snippet) => snippets.push(snippet),
            Err(e) => {
                warn!("Skipping activity {}: {}", result.activity_id, e);
                summary.render_failures += 1;
            }
        }
    }

    let outcome = merger.merge(&document, &snippets)?;
    summary.inserted = outcome.inserted.clone();
    summary.render_failures += outcome.rejected.len();

    if options.dry_run {
        info!("Dry run: {} activities would be added", summary.inserted.len());
        summary.merged_document = Some(outcome.document);
        return Ok(summary);
    }
    if !outcome.changed() {
        info!("{} is up to date", store.path().display());
        return Ok(summary);
    }

    store.write(&outcome.document)?;
    summary.written = true;

    let inserted: HashSet<&ActivityId> = outcome.inserted.iter().collect();
    let entries: Vec<JournalEntry> = snippets
        .iter()
        .filter(|s| inserted.contains(&s.id))
        .map(|s| s.entry.clone())
        .collect();
    update_manifest(config, entries);

    if let Some(settings) = &config.publish {
        match publish_document(config, settings.clone(), &outcome.document).await {
            Ok(()) => summary.published = true,
            Err(e) => {
                warn!("Publish failed, local journal is still updated: {}", e);
                summary.publish_error = Some(e.to_string());
            }
        }
    }

    Ok(summary)
}

/// [`run`] on a runtime of its own, for synchronous callers.
pub fn run_blocking(
    config: &JournalConfig,
    credentials: ClientCredentials,
    options: RunOptions,
) -> Result<RunSummary> {
    use tokio::runtime::Builder;

    let rt = Builder::new_multi_thread()
        .worker_threads(config.detail_concurrency.clamp(1, 8))
        .enable_all()
        .build()
        .map_err(|e| JournalError::Runtime {
            details: format!("Failed to create tokio runtime: {}", e),
        })?;

    rt.block_on(run(config, credentials, options))
}

fn update_manifest(config: &JournalConfig, entries: Vec<JournalEntry>) {
    let Some(path) = &config.journal.manifest else {
        return;
    };
    let result = JournalManifest::load(path).and_then(|mut manifest| {
        let added = manifest.prepend(entries);
        manifest.save(path).map(|()| added)
    });
    match result {
        Ok(added) => info!("Manifest {} gained {} entries", path.display(), added),
        Err(e) => warn!("Failed to update manifest {}: {}", path.display(), e),
    }
}

async fn publish_document(
    config: &JournalConfig,
    settings: PublishSettings,
    document: &str,
) -> Result<()> {
    let token = github_token_from_env()?;
    let publisher = GitHubPublisher::new(settings, token, config.request_timeout())?;
    publisher.publish(document).await?;
    Ok(())
}
