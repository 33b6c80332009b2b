//! # Sync Pipeline
//!
//! Runs one action end to end: validate settings, open one store handle per
//! worker on each side, resolve the KV mount, then walk, plan and copy (or
//! dump to a snapshot file for the list action).
//!
//! Every fatal condition (bad settings, unreachable store, dialect mismatch)
//! is raised before the first secret is read or written.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn, Instrument};

use crate::config::{SourceConfig, SyncAction, SyncSettings};
use crate::engine::{CopyEngine, CopyReport, DumpEngine};
use crate::errors::{Error, Result};
use crate::namespace::{NamespaceMap, SecretPayload};
use crate::planner::{plan, PlanOptions, WorkItem};
use crate::snapshot::{read_snapshot, SnapshotWriter};
use crate::store::{connect_pool, MountInfo, SecretStore, StoreConnector, VaultConnector};
use crate::walker::{TreeWalker, WalkMode};

/// Outcome of one action
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub action: SyncAction,
    pub mount: MountInfo,
    pub source_keys: usize,
    pub destination_keys: usize,
    pub planned: usize,
    pub unchanged: usize,
    /// Destination-only keys found by mirror; reported, not deleted
    pub delete_candidates: Vec<String>,
    /// Snapshot file written by the list action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    pub report: CopyReport,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

type Handles = Vec<Arc<dyn SecretStore>>;

/// A validated action ready to run
pub struct Pipeline {
    settings: SyncSettings,
    source: Option<Box<dyn StoreConnector>>,
    destination: Option<Box<dyn StoreConnector>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("source", &self.source.as_ref().map(|c| c.target()))
            .field("destination", &self.destination.as_ref().map(|c| c.target()))
            .finish()
    }
}

impl Pipeline {
    /// Build a pipeline from explicit connectors.
    ///
    /// A Vault source needs `source`; copy and mirror need `destination`.
    /// A snapshot file source ignores `source`.
    pub fn new(
        settings: SyncSettings,
        source: Option<Box<dyn StoreConnector>>,
        destination: Option<Box<dyn StoreConnector>>,
    ) -> Result<Self> {
        settings.validate()?;

        let source = match &settings.source {
            SourceConfig::Vault(_) => {
                Some(source.ok_or_else(|| Error::config("No source store configured"))?)
            }
            SourceConfig::File(_) => None,
        };
        let destination = if settings.action.writes_destination() {
            Some(destination.ok_or_else(|| {
                Error::config(format!("A destination store is required for {}", settings.action))
            })?)
        } else {
            None
        };

        Ok(Self { settings, source, destination })
    }

    /// Build a pipeline talking to the Vault servers named in `settings`.
    pub fn from_settings(settings: SyncSettings) -> Result<Self> {
        let source: Option<Box<dyn StoreConnector>> = match &settings.source {
            SourceConfig::Vault(config) => {
                Some(Box::new(VaultConnector::new(config.clone())) as Box<dyn StoreConnector>)
            }
            SourceConfig::File(_) => None,
        };
        let destination: Option<Box<dyn StoreConnector>> = settings
            .destination
            .clone()
            .map(|config| Box::new(VaultConnector::new(config)) as Box<dyn StoreConnector>);

        Self::new(settings, source, destination)
    }

    /// Run the action to completion.
    pub async fn run(self) -> Result<RunSummary> {
        let span = crate::action_span!(self.settings.action, workers = self.settings.workers);
        self.execute().instrument(span).await
    }

    async fn execute(&self) -> Result<RunSummary> {
        let workers = self.settings.workers;

        let sources = match &self.source {
            Some(connector) => Some(connect_pool(connector.as_ref(), workers).await?),
            None => None,
        };
        let dests = match &self.destination {
            Some(connector) => Some(connect_pool(connector.as_ref(), workers).await?),
            None => None,
        };

        let mount = self.resolve_mount(sources.as_ref(), dests.as_ref()).await?;
        info!(%mount, "Resolved KV mount");

        match (self.settings.action, dests) {
            (SyncAction::List, _) => {
                let sources = sources.ok_or_else(|| Error::internal("list without a source"))?;
                self.list(mount, &sources).await
            }
            (action, Some(dests)) => self.copy(action, mount, sources.as_deref(), &dests).await,
            (action, None) => Err(Error::internal(format!("{} without a destination", action))),
        }
    }

    /// Describe both mounts and insist they agree. A snapshot source takes
    /// the destination's mount.
    async fn resolve_mount(
        &self,
        sources: Option<&Handles>,
        dests: Option<&Handles>,
    ) -> Result<MountInfo> {
        let root_override = self.settings.kv_root.as_deref();

        let source_mount = match sources.and_then(|handles| handles.first()) {
            Some(handle) => Some(handle.describe_mount(root_override).await?),
            None => None,
        };
        let dest_mount = match dests.and_then(|handles| handles.first()) {
            Some(handle) => Some(handle.describe_mount(root_override).await?),
            None => None,
        };

        match (source_mount, dest_mount) {
            (Some(source), Some(dest)) if source != dest => {
                Err(Error::DialectMismatch {
                    source_mount: source.to_string(),
                    destination_mount: dest.to_string(),
                })
            }
            (Some(mount), _) | (None, Some(mount)) => Ok(mount),
            (None, None) => Err(Error::internal("no store to describe")),
        }
    }

    async fn list(&self, mount: MountInfo, sources: &Handles) -> Result<RunSummary> {
        let source_map = self.walk(sources, &mount, WalkMode::Lazy).await?;
        if source_map.is_empty() {
            warn!(%mount, "Source tree is empty");
        }
        let source_keys = source_map.len();
        let work: Vec<WorkItem> = source_map
            .into_iter()
            .map(|(path, payload)| WorkItem { path, payload })
            .collect();

        let output_file = self.settings.list_output_file.clone();
        let mut writer = SnapshotWriter::create(&output_file, mount.dialect).await?;
        let (tx, mut rx) =
            mpsc::channel::<(String, SecretPayload)>(self.settings.workers.saturating_mul(4));

        let sink = async move {
            while let Some((path, payload)) = rx.recv().await {
                writer.write_entry(&path, &payload).await?;
            }
            writer.finish().await
        };
        let dump = DumpEngine::new();
        let (report, written) = tokio::join!(dump.execute(work, sources, tx), sink);
        let report = report?;
        let written = written?;

        info!(
            file = %output_file.display(),
            written,
            failed = report.failed(),
            "Snapshot written"
        );

        Ok(RunSummary {
            action: SyncAction::List,
            mount,
            source_keys,
            destination_keys: 0,
            planned: source_keys,
            unchanged: 0,
            delete_candidates: Vec::new(),
            output_file: Some(output_file),
            report,
        })
    }

    async fn copy(
        &self,
        action: SyncAction,
        mount: MountInfo,
        sources: Option<&[Arc<dyn SecretStore>]>,
        dests: &Handles,
    ) -> Result<RunSummary> {
        let policy = self.settings.diff_policy;
        let mode = if policy.needs_destination_values() { WalkMode::Eager } else { WalkMode::Lazy };

        let source_map = match (&self.settings.source, sources) {
            (SourceConfig::File(path), _) => read_snapshot(path, mount.dialect).await?,
            (SourceConfig::Vault(_), Some(sources)) => self.walk(sources, &mount, mode).await?,
            (SourceConfig::Vault(_), None) => {
                return Err(Error::internal("Vault source without store handles"))
            }
        };
        let dest_map = self.walk(dests, &mount, mode).await?;

        if source_map.is_empty() {
            warn!(%mount, "Source tree is empty; nothing to copy");
        }
        if !dest_map.is_empty() {
            warn!(
                keys = dest_map.len(),
                "Destination already holds keys; existing keys are left alone unless they differ under the value policy"
            );
        }

        let options = PlanOptions { policy, mirror: action == SyncAction::Mirror };
        let copy_plan = plan(&source_map, &dest_map, mount.dialect, options);
        info!(
            source_keys = source_map.len(),
            destination_keys = dest_map.len(),
            planned = copy_plan.work.len(),
            unchanged = copy_plan.unchanged.len(),
            %policy,
            "Copy plan ready"
        );
        for path in &copy_plan.delete_candidates {
            warn!(%path, "Destination-only key; deletion skipped");
        }

        let planned = copy_plan.work.len();
        let report = CopyEngine::new(mount.dialect).execute(copy_plan.work, sources, dests).await?;

        Ok(RunSummary {
            action,
            mount,
            source_keys: source_map.len(),
            destination_keys: dest_map.len(),
            planned,
            unchanged: copy_plan.unchanged.len(),
            delete_candidates: copy_plan.delete_candidates,
            output_file: None,
            report,
        })
    }

    async fn walk(
        &self,
        handles: &[Arc<dyn SecretStore>],
        mount: &MountInfo,
        mode: WalkMode,
    ) -> Result<NamespaceMap> {
        let handle = handles.first().ok_or_else(|| Error::internal("empty store pool"))?;
        TreeWalker::new(self.settings.max_depth)
            .walk(handle.as_ref(), &mount.listing_root(), mount.dialect, mode)
            .await
    }
}
