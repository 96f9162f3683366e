use crate::cli::{ArchiveArgs, Command, PropagateArgs, PruneArgs, StoreArg, UploadArgs, WatchArgs};
use crate::error::{ErrorKind, Result};
use crate::output;
use crate::stores::{one, open_all, select};
use exn::{OptionExt, ResultExt};
use mcarch_archive::execute::{ArchivePlan, LocalFile, plan_archive, plan_propagation, plan_prune, plan_visibility};
use mcarch_archive::reconcile::reconcile;
use mcarch_archive::{
    Action, ExecutionReport, Executor, PassOptions, PassReport, PassStatus, ReconcileOptions, SnapshotHandle, run_pass,
};
use mcarch_config::Config;
use mcarch_model::{Catalog, FileRef, Hash, Mod, Patch, StoreKind, object_key, write_mod};
use mcarch_storage::StoreHandle;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Everything a command needs: the catalog, the stores and how to run
/// actions against them.
pub struct Context {
    pub metadata: PathBuf,
    pub revision: Option<String>,
    pub snapshot: SnapshotHandle,
    pub stores: Vec<StoreHandle>,
    pub executor: Executor,
    pub reconcile: ReconcileOptions,
    /// Public base URL per store kind, for download URLs in pass reports.
    pub public_urls: BTreeMap<StoreKind, String>,
    pub cancel: CancellationToken,
    pub dry_run: bool,
    pub json: bool,
}

/// One store's share of a command that executes actions.
#[derive(Debug, Serialize)]
struct StoreExecution {
    store: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unmatched: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    already_archived: Vec<FileRef>,
    #[serde(flatten)]
    execution: ExecutionReport,
}

#[derive(Debug, Serialize)]
struct Uploaded<'a> {
    store: &'a str,
    key: String,
}

impl Context {
    pub fn new(metadata: impl Into<PathBuf>, catalog: Catalog, stores: Vec<StoreHandle>) -> Self {
        Self {
            metadata: metadata.into(),
            revision: catalog.revision.clone(),
            snapshot: SnapshotHandle::new(catalog),
            stores,
            executor: Executor::default(),
            reconcile: ReconcileOptions::default(),
            public_urls: BTreeMap::new(),
            cancel: CancellationToken::new(),
            dry_run: false,
            json: false,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let catalog = load_catalog(&config.metadata, config.revision.as_deref()).await?;
        let stores = open_all(config)?;
        let public_urls = config
            .stores
            .values()
            .filter_map(|store| Some((store.kind(), store.public_url()?.to_string())))
            .collect();
        tracing::info!(mods = catalog.len(), stores = stores.len(), "Ready");
        Ok(Self {
            executor: Executor::new(config.concurrency, config.retries),
            reconcile: ReconcileOptions { concurrency: config.concurrency, ..ReconcileOptions::default() },
            public_urls,
            dry_run: config.dry_run,
            ..Self::new(&config.metadata, catalog, stores)
        })
    }

    /// Apply `patches` to the snapshot and write every touched mod document
    /// back to the metadata repository.
    pub async fn persist(&self, patches: &[Patch]) -> Result<()> {
        if patches.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            tracing::info!(patches = patches.len(), "Dry run, leaving metadata untouched");
            return Ok(());
        }
        let catalog = self.snapshot.apply(patches).or_raise(|| ErrorKind::Persist("snapshot".into()))?;
        let touched: BTreeSet<&str> = patches.iter().map(|p| p.file.mod_id.as_str()).collect();
        let mut documents: Vec<(PathBuf, Mod)> = Vec::with_capacity(touched.len());
        for id in touched {
            let m = catalog.get(id).ok_or_raise(|| ErrorKind::Persist(id.to_string()))?;
            documents.push((self.metadata.join(format!("{id}.json")), m.clone()));
        }
        tokio::task::spawn_blocking(move || -> Result<()> {
            for (path, m) in &documents {
                write_mod(path, m).or_raise(|| ErrorKind::Persist(m.id.clone()))?;
            }
            Ok(())
        })
        .await
        .or_raise(|| ErrorKind::Persist("metadata writer".into()))??;
        tracing::info!(patches = patches.len(), "Metadata updated");
        Ok(())
    }

    fn pass_options(&self, repair: bool) -> PassOptions {
        PassOptions {
            reconcile: self.reconcile.clone(),
            repair,
            public_urls: self.public_urls.clone(),
        }
    }

    fn show_pass(&self, report: &PassReport) -> Result<()> {
        match self.json {
            true => output::json(report),
            false => {
                output::pass(report);
                Ok(())
            },
        }
    }

    /// Show, persist, and tell whether every action went through.
    async fn finish(&self, runs: Vec<StoreExecution>) -> Result<bool> {
        if self.json {
            output::json(&runs)?;
        } else {
            for run in &runs {
                output::execution(&run.store, &run.execution);
            }
        }
        let patches: Vec<Patch> = runs.iter().flat_map(|r| r.execution.patches.iter().cloned()).collect();
        self.persist(&patches).await?;
        Ok(runs.iter().all(|r| !r.execution.has_failures() && !r.execution.cancelled))
    }

    async fn execute(&self, catalog: &Catalog, store: &StoreHandle, actions: Vec<Action>) -> StoreExecution {
        StoreExecution {
            store: store.name().to_string(),
            unmatched: Vec::new(),
            already_archived: Vec::new(),
            execution: self.executor.execute(catalog, store, actions, &self.cancel).await,
        }
    }
}

/// Load the metadata repository off the async runtime.
pub async fn load_catalog(metadata: &Path, revision: Option<&str>) -> Result<Catalog> {
    let dir = metadata.to_path_buf();
    let catalog = tokio::task::spawn_blocking(move || Catalog::load_dir(dir))
        .await
        .or_raise(|| ErrorKind::Catalog(metadata.to_path_buf()))?
        .or_raise(|| ErrorKind::Catalog(metadata.to_path_buf()))?;
    Ok(match revision {
        Some(revision) => catalog.with_revision(revision),
        None => catalog,
    })
}

/// Run `command`, returning whether it finished cleanly.
pub async fn run(ctx: &Context, command: Command) -> Result<bool> {
    match command {
        Command::Check(args) => check(ctx, args).await,
        Command::Archive(args) => archive(ctx, args).await,
        Command::Propagate(args) => propagate(ctx, args).await,
        Command::SetAcl(args) => set_acl(ctx, args).await,
        Command::Pin(args) => pin(ctx, args).await,
        Command::Prune(args) => prune(ctx, args).await,
        Command::Upload(args) => upload(ctx, args).await,
        Command::Watch(args) => watch(ctx, args).await,
    }
}

async fn check(ctx: &Context, args: StoreArg) -> Result<bool> {
    let stores = select(&ctx.stores, args.store.as_deref(), None)?;
    let options = ctx.pass_options(false);
    let report = run_pass(ctx.snapshot.current(), &stores, &ctx.executor, &options, &ctx.cancel).await;
    ctx.show_pass(&report)?;
    Ok(report.status == PassStatus::Completed)
}

async fn pin(ctx: &Context, args: StoreArg) -> Result<bool> {
    let stores = select(&ctx.stores, args.store.as_deref(), None)?;
    let options = ctx.pass_options(true);
    let report = run_pass(ctx.snapshot.current(), &stores, &ctx.executor, &options, &ctx.cancel).await;
    ctx.show_pass(&report)?;
    let patches: Vec<Patch> = report.patches().cloned().collect();
    ctx.persist(&patches).await?;
    Ok(report.is_clean())
}

async fn archive(ctx: &Context, args: ArchiveArgs) -> Result<bool> {
    let stores = select(&ctx.stores, args.store.store.as_deref(), None)?;
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path).await.or_raise(|| ErrorKind::Io(path.clone()))?;
        files.push(LocalFile::new(path, bytes));
    }
    let catalog = ctx.snapshot.current();
    let mut runs = Vec::with_capacity(stores.len());
    for store in &stores {
        let plan = plan_archive(&catalog, store.kind(), args.mod_id.as_deref(), files.clone());
        if !ctx.json {
            output::plan(store.name(), &plan);
        }
        let ArchivePlan { actions, unmatched, already_archived } = plan;
        let run = ctx.execute(&catalog, store, actions).await;
        runs.push(StoreExecution { unmatched, already_archived, ..run });
    }
    let unmatched = runs.iter().any(|r| !r.unmatched.is_empty());
    Ok(ctx.finish(runs).await? && !unmatched)
}

async fn propagate(ctx: &Context, args: PropagateArgs) -> Result<bool> {
    let from = one(&ctx.stores, &args.from)?;
    let to = one(&ctx.stores, &args.to)?;
    let catalog = ctx.snapshot.current();
    let actions = plan_propagation(&catalog, &from, to.kind())
        .or_raise(|| ErrorKind::Plan(format!("cannot propagate {} into {}", args.from, args.to)))?;
    tracing::info!(from = from.name(), to = to.name(), actions = actions.len(), "Propagating");
    let run = ctx.execute(&catalog, &to, actions).await;
    ctx.finish(vec![run]).await
}

async fn set_acl(ctx: &Context, args: StoreArg) -> Result<bool> {
    let stores = select(&ctx.stores, args.store.as_deref(), Some(StoreKind::Object))?;
    let catalog = ctx.snapshot.current();
    let mut runs = Vec::with_capacity(stores.len());
    for store in &stores {
        runs.push(ctx.execute(&catalog, store, plan_visibility(&catalog)).await);
    }
    ctx.finish(runs).await
}

async fn prune(ctx: &Context, args: PruneArgs) -> Result<bool> {
    let store = one(&ctx.stores, &args.store)?;
    let catalog = ctx.snapshot.current();
    let reconciliation = reconcile(&catalog, &store, &ctx.reconcile).await;
    if !ctx.json {
        output::reconciliation(&reconciliation.report);
    }
    let actions = plan_prune(&reconciliation.report, args.confirm)
        .or_raise(|| ErrorKind::Plan(format!("not pruning {}", args.store)))?;
    let run = ctx.execute(&catalog, &store, actions).await;
    ctx.finish(vec![run]).await
}

async fn upload(ctx: &Context, args: UploadArgs) -> Result<bool> {
    let store = one(&ctx.stores, &args.store)?;
    let bytes = tokio::fs::read(&args.file).await.or_raise(|| ErrorKind::Io(args.file.clone()))?;
    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_raise(|| ErrorKind::Io(args.file.clone()))?;
    let key = match store.kind() {
        StoreKind::Object => object_key(&Hash::of_bytes(&bytes).digest, name),
        StoreKind::Content => name.to_string(),
    };
    let ack = store.put(&key, &bytes).await.or_raise(|| ErrorKind::Store(args.store.clone()))?;
    match ctx.json {
        true => output::json(&Uploaded { store: store.name(), key: ack.key })?,
        false => println!("{}", ack.key),
    }
    Ok(true)
}

/// Repair passes on a fixed interval, reloading the metadata before each.
/// Passes never overlap: the next tick waits for the current pass.
async fn watch(ctx: &Context, args: WatchArgs) -> Result<bool> {
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let options = ctx.pass_options(true);
    let mut clean = true;
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = ticker.tick() => {},
        }
        match load_catalog(&ctx.metadata, ctx.revision.as_deref()).await {
            Ok(catalog) => {
                ctx.snapshot.replace(catalog);
            },
            Err(err) => tracing::error!(error = ?err, "Could not reload metadata, keeping the previous snapshot"),
        }
        let report = run_pass(ctx.snapshot.current(), &ctx.stores, &ctx.executor, &options, &ctx.cancel).await;
        ctx.show_pass(&report)?;
        let patches: Vec<Patch> = report.patches().cloned().collect();
        if let Err(err) = ctx.persist(&patches).await {
            tracing::error!(error = ?err, "Could not write patches, they will be recomputed next pass");
        }
        clean = report.is_clean();
        if report.status == PassStatus::Cancelled {
            break;
        }
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcarch_model::{File, Mod, Version, load_mod};
    use mcarch_storage::ContentStore;
    use mcarch_storage::backend::MockStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    const JAR: &[u8] = b"examplemod 1.0 jar bytes";

    fn examplemod() -> Mod {
        Mod {
            id: "examplemod".into(),
            name: "Example Mod".into(),
            authors: vec!["someone".into()],
            desc: String::new(),
            versions: vec![Version {
                name: "1.0".into(),
                desc: String::new(),
                platforms: vec!["1.7.10".into()],
                files: vec![File::new("examplemod-1.0.jar", Hash::of_bytes(JAR))],
                extra: Default::default(),
            }],
            extra: Default::default(),
        }
    }

    /// A metadata directory holding `examplemod.json` and the jar itself.
    async fn workspace() -> (TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("mods")).unwrap();
        write_mod(dir.path().join("mods/examplemod.json"), &examplemod()).unwrap();
        std::fs::write(dir.path().join("examplemod-1.0.jar"), JAR).unwrap();
        let catalog = load_catalog(&dir.path().join("mods"), Some("r1")).await.unwrap();
        (dir, catalog)
    }

    fn archived(dir: &TempDir) -> File {
        let m = load_mod(dir.path().join("mods/examplemod.json")).unwrap();
        m.versions[0].files[0].clone()
    }

    #[tokio::test]
    async fn archive_uploads_and_records_the_key() {
        let (dir, catalog) = workspace().await;
        let object = Arc::new(MockStore::object());
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![object.clone()]);
        let args = ArchiveArgs {
            store: StoreArg { store: None },
            mod_id: Some("examplemod".into()),
            files: vec![dir.path().join("examplemod-1.0.jar")],
        };

        assert!(run(&ctx, Command::Archive(args)).await.unwrap());
        let key = format!("{}/examplemod-1.0.jar", Hash::of_bytes(JAR).digest);
        assert_eq!(archived(&dir).archive.get(StoreKind::Object), Some(key.as_str()));
        assert_eq!(object.visibility(&key).await, Some(true));
        assert_eq!(ctx.snapshot.current().revision.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn dry_run_leaves_documents_alone() {
        let (dir, catalog) = workspace().await;
        let mut ctx = Context::new(dir.path().join("mods"), catalog, vec![Arc::new(MockStore::content())]);
        ctx.dry_run = true;
        let args = ArchiveArgs {
            store: StoreArg { store: None },
            mod_id: None,
            files: vec![dir.path().join("examplemod-1.0.jar")],
        };

        assert!(run(&ctx, Command::Archive(args)).await.unwrap());
        assert!(!archived(&dir).is_archived(StoreKind::Content));
    }

    #[tokio::test]
    async fn archive_fails_for_files_outside_the_catalog() {
        let (dir, catalog) = workspace().await;
        std::fs::write(dir.path().join("other.jar"), b"other").unwrap();
        let object = Arc::new(MockStore::object());
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![object.clone()]);
        let args = ArchiveArgs { store: StoreArg { store: None }, mod_id: None, files: vec![dir.path().join("other.jar")] };

        assert!(!run(&ctx, Command::Archive(args)).await.unwrap());
        assert_eq!(object.put_count(), 0);
    }

    #[tokio::test]
    async fn prune_needs_confirmation() {
        let (dir, catalog) = workspace().await;
        let object = Arc::new(MockStore::object().with_object("ff/stray.jar", b"stray".to_vec(), false));
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![object.clone()]);

        let refused = PruneArgs { store: object.name().to_string(), confirm: false };
        assert!(run(&ctx, Command::Prune(refused)).await.is_err());
        assert!(object.exists("ff/stray.jar").await.unwrap());

        let confirmed = PruneArgs { store: object.name().to_string(), confirm: true };
        assert!(run(&ctx, Command::Prune(confirmed)).await.unwrap());
        assert!(!object.exists("ff/stray.jar").await.unwrap());
    }

    #[tokio::test]
    async fn propagate_then_check_is_clean() {
        let (dir, catalog) = workspace().await;
        let key = format!("{}/examplemod-1.0.jar", Hash::of_bytes(JAR).digest);
        let object = Arc::new(MockStore::object().with_object(&key, JAR, true));
        let content = Arc::new(MockStore::content());
        let catalog = catalog.apply(&[Patch::new(
            FileRef::new("examplemod", "1.0", "examplemod-1.0.jar"),
            StoreKind::Object.patch_field(),
            &key,
        )])
        .unwrap();
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![object.clone(), content.clone()]);

        let args = PropagateArgs { from: object.name().to_string(), to: content.name().to_string() };
        assert!(run(&ctx, Command::Propagate(args)).await.unwrap());
        let id = MockStore::content_id(JAR);
        assert_eq!(archived(&dir).archive.get(StoreKind::Content), Some(id.as_str()));
        assert!(content.pinned().await.contains(&id));

        assert!(run(&ctx, Command::Check(StoreArg { store: None })).await.unwrap());
    }

    #[tokio::test]
    async fn pin_fails_while_orphans_and_missing_keys_remain() {
        let (dir, catalog) = workspace().await;
        let key = format!("{}/examplemod-1.0.jar", Hash::of_bytes(JAR).digest);
        let catalog = catalog
            .apply(&[Patch::new(FileRef::new("examplemod", "1.0", "examplemod-1.0.jar"), StoreKind::Object.patch_field(), &key)])
            .unwrap();
        let object = Arc::new(MockStore::object().with_object("ff/stray.jar", b"stray".to_vec(), false));
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![object.clone()]);

        assert!(!run(&ctx, Command::Pin(StoreArg { store: None })).await.unwrap());
        assert!(object.exists("ff/stray.jar").await.unwrap());
    }

    #[tokio::test]
    async fn upload_prints_the_derived_key() {
        let (dir, catalog) = workspace().await;
        let object = Arc::new(MockStore::object());
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![object.clone()]);
        let args = UploadArgs { store: object.name().to_string(), file: dir.path().join("examplemod-1.0.jar") };

        assert!(run(&ctx, Command::Upload(args)).await.unwrap());
        let key = format!("{}/examplemod-1.0.jar", Hash::of_bytes(JAR).digest);
        assert!(object.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn watch_stops_when_cancelled() {
        let (dir, catalog) = workspace().await;
        let ctx = Context::new(dir.path().join("mods"), catalog, vec![Arc::new(MockStore::object())]);
        ctx.cancel.cancel();
        assert!(run(&ctx, Command::Watch(WatchArgs { interval: 60 })).await.unwrap());
    }
}
