//! Parallel checkout walk.
//!
//! [`WorkQueue`] drives the dependency tree from its solutions down. A node
//! becomes ready once everything it requires is done; ready nodes are
//! handed to a bounded pool of tokio tasks. Each task syncs its node through
//! the [`CheckoutProvider`], reads and parses the node's manifest, inserts
//! the children, runs the node's pre-deps hooks and reports back. Newly
//! inserted children become ready on a later turn of the loop.
//!
//! The tree lives behind one mutex. Critical sections are short and never
//! span an `.await`.
//!
//! A fatal error stops admission of new nodes; tasks already running are
//! drained and the first error is returned. Ctrl-C aborts every task, which
//! kills their child processes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, StreamExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::checkout::{CheckoutProvider, ManifestSource};
use crate::constants::default_jobs;
use crate::core::GsyncError;
use crate::gn_args;
use crate::hooks::HookRunner;
use crate::manifest::ManifestParser;
use crate::tree::{DependencyTree, NodeId, NodeKind, NodeState, NodeView};
use crate::utils::progress::SyncProgress;

/// What the walk does at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkMode {
    /// Sync every node, then run hooks
    #[default]
    Sync,
    /// Parse only, then run every hook regardless of patterns
    RunHooks,
    /// Parse only, then report urls and revisions
    Revinfo,
    /// Parse only, then report local modifications
    Status,
    /// Revert every node
    Revert,
    /// Parse only; the caller flattens the tree
    Flatten,
}

/// Options of one walk.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: WalkMode,
    /// Maximum number of nodes processed at once
    pub jobs: usize,
    /// Skip hooks entirely
    pub nohooks: bool,
    /// Run hooks even when no touched file matches their pattern
    pub force: bool,
    /// Downgrade checkout failures to warnings
    pub ignore_errors: bool,
    /// Revision overrides by node name
    pub revisions: HashMap<String, String>,
    /// Report actual revisions in revinfo mode
    pub actual: bool,
    /// Draw a progress bar
    pub progress: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: WalkMode::Sync,
            jobs: default_jobs(),
            nohooks: false,
            force: false,
            ignore_errors: false,
            revisions: HashMap::new(),
            actual: false,
            progress: false,
        }
    }
}

impl SyncOptions {
    /// Default options for `mode`.
    pub fn for_mode(mode: WalkMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    fn runs_pre_deps_hooks(&self) -> bool {
        match self.mode {
            WalkMode::Sync => !self.nohooks,
            WalkMode::RunHooks => true,
            _ => false,
        }
    }
}

/// Summary of a finished walk.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Nodes that reached `Done`
    pub processed: usize,
    /// Nodes whose checkout failed under `ignore_errors`
    pub failed: Vec<String>,
    /// Hooks that actually ran (pre-deps hooks excluded)
    pub hooks_run: usize,
    /// Local modifications by node, status mode only
    pub statuses: BTreeMap<String, Vec<String>>,
    /// `(name, url)` in tree order, revinfo mode only
    pub revisions: Vec<(String, String)>,
    /// GN args files written, sync mode only
    pub gn_args_files: Vec<String>,
}

fn lock(tree: &Mutex<DependencyTree>) -> MutexGuard<'_, DependencyTree> {
    tree.lock().unwrap_or_else(PoisonError::into_inner)
}

struct JobContext<P> {
    tree: Arc<Mutex<DependencyTree>>,
    provider: Arc<P>,
    source: Arc<dyn ManifestSource>,
    hooks: HookRunner,
    options: SyncOptions,
    progress: SyncProgress,
}

/// Bounded parallel walk over a [`DependencyTree`].
pub struct WorkQueue<P> {
    ctx: Arc<JobContext<P>>,
}

impl<P: CheckoutProvider + 'static> WorkQueue<P> {
    pub fn new(
        tree: DependencyTree,
        provider: Arc<P>,
        source: Arc<dyn ManifestSource>,
        hooks: HookRunner,
        options: SyncOptions,
    ) -> Self {
        let progress = SyncProgress::new(options.progress, "Syncing");
        Self {
            ctx: Arc::new(JobContext {
                tree: Arc::new(Mutex::new(tree)),
                provider,
                source,
                hooks,
                options,
                progress,
            }),
        }
    }

    /// Shared handle on the tree.
    pub fn tree(&self) -> Arc<Mutex<DependencyTree>> {
        Arc::clone(&self.ctx.tree)
    }

    /// Take the tree back once the walk is over.
    pub fn into_tree(self) -> DependencyTree {
        let tree = Arc::clone(&self.ctx.tree);
        drop(self);
        match Arc::try_unwrap(tree) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => lock(&shared).clone(),
        }
    }

    /// Walk the whole tree, then do the mode's post-walk work.
    pub async fn run(&self) -> Result<RunReport, GsyncError> {
        let result = self.walk().await;
        self.ctx.progress.finish();
        result?;

        let mut report = RunReport::default();
        {
            let tree = lock(&self.ctx.tree);
            report.processed = tree.walk().iter().filter(|&&id| tree.node(id).processed).count();
            report.failed = tree.failed_nodes();
        }

        if self.ctx.options.mode == WalkMode::Sync {
            report.gn_args_files = self.write_gn_args()?;
        }

        match self.ctx.options.mode {
            WalkMode::Sync if !self.ctx.options.nohooks => {
                report.hooks_run = self.run_hooks(self.ctx.options.force).await?;
            }
            WalkMode::RunHooks => report.hooks_run = self.run_hooks(true).await?,
            WalkMode::Status => report.statuses = self.collect_statuses().await?,
            WalkMode::Revinfo => report.revisions = self.collect_revisions().await?,
            _ => {}
        }
        Ok(report)
    }

    async fn walk(&self) -> Result<(), GsyncError> {
        let jobs_limit = self.ctx.options.jobs.max(1);
        let mut jobs: JoinSet<(NodeId, Result<(), GsyncError>)> = JoinSet::new();
        let mut failure: Option<GsyncError> = None;

        self.ctx.progress.add_total(lock(&self.ctx.tree).len());

        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut interrupt_armed = true;

        loop {
            if failure.is_none() {
                let admitted = {
                    let mut tree = lock(&self.ctx.tree);
                    let ready: Vec<NodeId> = tree
                        .ready_nodes()
                        .into_iter()
                        .take(jobs_limit.saturating_sub(jobs.len()))
                        .collect();
                    for &id in &ready {
                        tree.node_mut(id).state = NodeState::Running;
                    }
                    ready
                };
                for id in admitted {
                    let ctx = Arc::clone(&self.ctx);
                    jobs.spawn(async move { (id, process_node(&ctx, id).await) });
                }
            }

            if jobs.is_empty() {
                if failure.is_some() {
                    break;
                }
                let tree = lock(&self.ctx.tree);
                let pending = tree.pending_nodes();
                if pending.is_empty() {
                    break;
                }
                let graph = tree.requirements_graph();
                let detail = match graph.find_cycle() {
                    Some(cycle) => cycle.join(" -> "),
                    None => {
                        let stuck: HashSet<&str> =
                            pending.iter().map(|&id| tree.node(id).name.as_str()).collect();
                        graph
                            .topological_order()
                            .unwrap_or_default()
                            .into_iter()
                            .filter(|name| stuck.contains(name.as_str()))
                            .collect::<Vec<_>>()
                            .join(", ")
                    }
                };
                return Err(GsyncError::RequirementsDeadlock { pending: detail });
            }

            tokio::select! {
                joined = jobs.join_next() => match joined {
                    Some(Ok((id, result))) => self.finish(id, result, &mut failure),
                    Some(Err(e)) => {
                        failure.get_or_insert(GsyncError::Other {
                            message: format!("worker task failed: {e}"),
                        });
                    }
                    None => {}
                },
                signal = &mut interrupt, if interrupt_armed => {
                    interrupt_armed = false;
                    if let Err(e) = signal {
                        warn!(target: "scheduler", "Cannot listen for Ctrl-C: {e}");
                        continue;
                    }
                    warn!(target: "scheduler", "Interrupted, aborting {} running jobs", jobs.len());
                    jobs.abort_all();
                    while jobs.join_next().await.is_some() {}
                    return Err(GsyncError::Interrupted);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn finish(&self, id: NodeId, result: Result<(), GsyncError>, failure: &mut Option<GsyncError>) {
        let mut tree = lock(&self.ctx.tree);
        let name = tree.node(id).name.clone();
        match result {
            Ok(()) => {
                debug!(target: "scheduler", "Finished {name}");
            }
            Err(error) if self.ctx.options.ignore_errors && error.is_checkout_error() => {
                warn!(target: "scheduler", "Ignoring failure of {name}: {error}");
                tree.node_mut(id).failed = true;
            }
            Err(error) => {
                debug!(target: "scheduler", "{name} failed, draining running jobs");
                failure.get_or_insert(error);
            }
        }
        let node = tree.node_mut(id);
        node.processed = true;
        node.state = NodeState::Done;
        self.ctx.progress.node_done(&name);
    }

    /// Hooks may read the GN args files, so they are written first.
    fn write_gn_args(&self) -> Result<Vec<String>, GsyncError> {
        let files = gn_args::render_all(&lock(&self.ctx.tree))?;
        gn_args::write_all(self.ctx.hooks.root_dir(), &files).map_err(|e| GsyncError::Io {
            message: format!("{e:#}"),
        })?;
        Ok(files.into_iter().map(|f| f.path).collect())
    }

    async fn run_hooks(&self, force: bool) -> Result<usize, GsyncError> {
        let hooks = lock(&self.ctx.tree).collect_hooks(force)?;
        info!(target: "hooks", "Running {} hooks", hooks.len());
        let ran = self.ctx.hooks.run_all(&hooks).await?;
        lock(&self.ctx.tree).mark_hooks_ran();
        Ok(ran)
    }

    fn checked_out_views(&self) -> Vec<NodeView> {
        let tree = lock(&self.ctx.tree);
        tree.walk()
            .into_iter()
            .map(|id| tree.node(id))
            .filter(|node| node.should_process && node.url.is_some())
            .map(|node| node.view())
            .collect()
    }

    async fn collect_statuses(&self) -> Result<BTreeMap<String, Vec<String>>, GsyncError> {
        let provider = &self.ctx.provider;
        let results: Vec<_> = stream::iter(self.checked_out_views())
            .map(|view| async move {
                let lines = provider.status(&view).await?;
                Ok::<_, GsyncError>((view.name, lines))
            })
            .buffered(self.ctx.options.jobs.max(1))
            .collect()
            .await;

        let mut statuses = BTreeMap::new();
        for result in results {
            let (name, lines) = result?;
            if !lines.is_empty() {
                statuses.insert(name, lines);
            }
        }
        Ok(statuses)
    }

    async fn collect_revisions(&self) -> Result<Vec<(String, String)>, GsyncError> {
        let provider = &self.ctx.provider;
        let actual = self.ctx.options.actual;
        stream::iter(self.checked_out_views())
            .map(|view| async move {
                let url = view.url.clone().unwrap_or_default();
                if !actual {
                    return Ok::<_, GsyncError>((view.name, url));
                }
                let revision = provider.revision_info(&view).await?;
                let base = match &view.kind {
                    NodeKind::Git => {
                        view.split_url().map_or(url.clone(), |(repo, _)| repo.to_string())
                    }
                    NodeKind::Cipd { package, .. } => package.clone(),
                };
                Ok((view.name, format!("{base}@{revision}")))
            })
            .buffered(self.ctx.options.jobs.max(1))
            .collect::<Vec<Result<_, GsyncError>>>()
            .await
            .into_iter()
            .collect()
    }
}

/// Process one node: sync, parse, insert children, run pre-deps hooks.
async fn process_node<P: CheckoutProvider>(
    ctx: &JobContext<P>,
    id: NodeId,
) -> Result<(), GsyncError> {
    let (view, limit, should_process, revision) = {
        let tree = lock(&ctx.tree);
        let node = tree.node(id);
        (
            node.view(),
            tree.recursion_limit(id),
            node.should_process,
            ctx.options.revisions.get(&node.name).cloned(),
        )
    };

    if !should_process {
        debug!(target: "scheduler", "Skipping {} (not processed)", view.name);
        return Ok(());
    }

    if view.managed && view.url.is_some() {
        match ctx.options.mode {
            WalkMode::Sync => {
                debug!(target: "scheduler", "Syncing {}", view.name);
                let result = ctx.provider.sync(&view, revision.as_deref()).await?;
                lock(&ctx.tree).record_sync(id, result.revision, result.touched);
            }
            WalkMode::Revert => ctx.provider.revert(&view).await?,
            _ => {}
        }
    }

    if limit == 0 || matches!(view.kind, NodeKind::Cipd { .. }) {
        return Ok(());
    }

    let text = ctx.source.read_manifest(&view)?;
    let parse_context = lock(&ctx.tree).parse_context(id);
    let parsed = ManifestParser::parse(&parse_context, text.as_deref().unwrap_or_default())?;
    let (added, pre_deps_hooks) = {
        let mut tree = lock(&ctx.tree);
        let added = tree.apply_parse(id, parsed)?;
        (added.len(), tree.pre_deps_hooks(id))
    };
    debug!(target: "scheduler", "{} declared {added} new dependencies", view.name);
    ctx.progress.add_total(added);

    if ctx.options.runs_pre_deps_hooks() && !pre_deps_hooks.is_empty() {
        ctx.hooks.run_all(&pre_deps_hooks).await?;
        lock(&ctx.tree).node_mut(id).pre_hooks_ran = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, SolutionSpec};
    use crate::test_utils::{FakeCheckout, MemoryManifestSource};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn global(root: &Path) -> GlobalConfig {
        GlobalConfig {
            root_dir: root.to_path_buf(),
            cache_dir: None,
            jobs: 4,
            target_os: ["linux".to_string()].into(),
            target_cpu: ["x64".to_string()].into(),
        }
    }

    fn queue(
        root: &Path,
        solutions: &[SolutionSpec],
        provider: Arc<FakeCheckout>,
        source: MemoryManifestSource,
        options: SyncOptions,
    ) -> WorkQueue<FakeCheckout> {
        let tree = DependencyTree::with_solutions(&global(root), solutions).unwrap();
        WorkQueue::new(tree, provider, Arc::new(source), HookRunner::new(root), options)
    }

    fn solution(name: &str) -> SolutionSpec {
        SolutionSpec::new(name, format!("https://example/{name}.git"))
    }

    /// Minimal deterministic generator for shaping random trees.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 33) % bound
        }
    }

    /// Manifests for a random tree four levels deep; returns all node names.
    fn random_tree(seed: u64, source: &MemoryManifestSource) -> Vec<String> {
        let mut rng = Lcg(seed);
        let mut names = vec!["s0".to_string(), "s1".to_string()];
        let mut frontier: Vec<(String, usize)> = names.iter().map(|n| (n.clone(), 0)).collect();
        while let Some((name, level)) = frontier.pop() {
            if level == 3 {
                continue;
            }
            let mut text = String::new();
            if level == 0 {
                text.push_str("recursion = 4\n");
            }
            text.push_str("[deps]\n");
            for i in 0..=rng.next(3) {
                let child = format!("{name}/d{i}");
                text.push_str(&format!("\"{child}\" = \"https://example/{child}.git\"\n"));
                names.push(child.clone());
                frontier.push((child, level + 1));
            }
            source.insert(&name, &text);
        }
        names
    }

    #[tokio::test]
    async fn test_scenario_single_dependency() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new().with(
            "src",
            "[deps]\n\"src/dep_a\" = { url = \"https://example/a.git@deadbeef\" }\n",
        );
        let provider = Arc::new(FakeCheckout::new());
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            source,
            SyncOptions::default(),
        );

        let report = queue.run().await.unwrap();
        assert_eq!(report.processed, 2);

        let tree = queue.into_tree();
        assert_eq!(tree.len(), 2);
        let dep = tree.node(tree.find("src/dep_a").unwrap());
        assert!(dep.url.as_deref().unwrap().ends_with("@deadbeef"));
        assert_eq!(provider.events_by_name()["src/dep_a"].revision.as_deref(), Some("deadbeef"));
    }

    #[tokio::test]
    async fn test_parent_before_child_for_every_pool_size() {
        for jobs in 1..=16 {
            let temp = TempDir::new().unwrap();
            let source = MemoryManifestSource::new();
            let names = random_tree(jobs as u64 * 7919, &source);
            let provider = Arc::new(FakeCheckout::new().with_delay(Duration::from_millis(1)));
            let options = SyncOptions {
                jobs,
                ..SyncOptions::default()
            };
            let queue = queue(
                temp.path(),
                &[solution("s0"), solution("s1")],
                Arc::clone(&provider),
                source,
                options,
            );
            queue.run().await.unwrap();

            let events = provider.events_by_name();
            assert_eq!(events.len(), names.len(), "pool size {jobs}");
            assert_eq!(provider.events().len(), names.len(), "each node synced once");
            assert!(provider.max_in_flight() <= jobs);

            let tree = queue.into_tree();
            for name in &names {
                let id = tree.find(name).unwrap();
                let parent = tree.node(id).parent.unwrap();
                if parent == DependencyTree::ROOT {
                    continue;
                }
                let parent_name = &tree.node(parent).name;
                assert!(
                    events[parent_name].finished < events[name].started,
                    "{parent_name} must finish before {name} starts (pool size {jobs})"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_children_of_solutions_wait_for_all_solutions() {
        let temp = TempDir::new().unwrap();
        let source =
            MemoryManifestSource::new().with("s1", "[deps]\nc1 = \"https://example/c1.git\"\n");
        let provider = Arc::new(FakeCheckout::new().with_delay(Duration::from_millis(5)));
        let queue = queue(
            temp.path(),
            &[solution("s1"), solution("s2")],
            Arc::clone(&provider),
            source,
            SyncOptions::default(),
        );
        queue.run().await.unwrap();

        let events = provider.events_by_name();
        assert!(events["s2"].finished < events["c1"].started);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pre_deps_hooks_run_before_children() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("marker");
        let source = MemoryManifestSource::new().with(
            "src",
            r#"
[deps]
"src/a" = "https://example/a.git"

[[pre_deps_hooks]]
action = ["touch", "marker"]
"#,
        );
        let provider = Arc::new(FakeCheckout::new().with_marker(&marker));
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            source,
            SyncOptions::default(),
        );
        queue.run().await.unwrap();

        let events = provider.events_by_name();
        assert!(!events["src"].marker_present);
        assert!(events["src/a"].marker_present);
        let tree = queue.into_tree();
        assert!(tree.node(tree.find("src").unwrap()).pre_hooks_ran);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nohooks_skips_pre_deps_hooks() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new().with(
            "src",
            "[[pre_deps_hooks]]\naction = [\"touch\", \"marker\"]\n",
        );
        let options = SyncOptions {
            nohooks: true,
            ..SyncOptions::default()
        };
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::new(FakeCheckout::new()),
            source,
            options,
        );
        let report = queue.run().await.unwrap();
        assert_eq!(report.hooks_run, 0);
        assert!(!temp.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_condition_propagates_to_grandchildren() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new()
            .with(
                "src",
                "[deps]\n\"src/a\" = { url = \"https://example/a.git\", condition = \"checkout_win\" }\n\"src/b\" = \"https://example/b.git\"\n",
            )
            .with("src/a", "[deps]\n\"src/a/x\" = \"https://example/x.git\"\n");
        let provider = Arc::new(FakeCheckout::new());
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            source,
            SyncOptions::default(),
        );
        queue.run().await.unwrap();

        let events = provider.events_by_name();
        assert!(events.contains_key("src/b"));
        assert!(!events.contains_key("src/a"));
        let tree = queue.into_tree();
        assert!(tree.find("src/a/x").is_none());
        assert!(!tree.node(tree.find("src/a").unwrap()).should_process);
    }

    #[tokio::test]
    async fn test_ignore_errors_marks_failed_nodes() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new()
            .with(
                "src",
                "[deps]\n\"src/a\" = \"https://example/a.git\"\n\"src/b\" = \"https://example/b.git\"\n",
            );
        let provider = Arc::new(FakeCheckout::new().failing("src/a"));
        let options = SyncOptions {
            ignore_errors: true,
            ..SyncOptions::default()
        };
        let queue = queue(temp.path(), &[solution("src")], Arc::clone(&provider), source, options);
        let report = queue.run().await.unwrap();
        assert_eq!(report.failed, ["src/a"]);
        assert!(provider.events_by_name().contains_key("src/b"));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_the_walk() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new()
            .with("src", "[deps]\n\"src/a\" = \"https://example/a.git\"\n");
        let provider = Arc::new(FakeCheckout::new().failing("src"));
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            source,
            SyncOptions::default(),
        );

        let err = queue.run().await.unwrap_err();
        assert!(err.is_checkout_error());
        assert!(provider.events().is_empty());
        let tree = queue.into_tree();
        assert!(tree.find("src/a").is_none());
    }

    #[tokio::test]
    async fn test_fatal_error_drains_running_jobs() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new()
            .with("s1", "[deps]\n\"s1/a\" = \"https://example/a.git\"\n")
            .with("s2", "[deps]\n\"s2/b\" = \"https://example/b.git\"\n");
        let provider = Arc::new(
            FakeCheckout::new()
                .failing("s1")
                .with_node_delay("s2", Duration::from_millis(50)),
        );
        let queue = queue(
            temp.path(),
            &[solution("s1"), solution("s2")],
            Arc::clone(&provider),
            source,
            SyncOptions::default(),
        );

        let err = queue.run().await.unwrap_err();
        match err {
            GsyncError::Checkout { node, .. } => assert_eq!(node, "s1"),
            other => panic!("unexpected error: {other:?}"),
        }

        let events = provider.events_by_name();
        assert_eq!(events.keys().collect::<Vec<_>>(), ["s2"]);
        assert!(events["s2"].finished > events["s2"].started);

        let tree = queue.into_tree();
        let s2 = tree.find("s2").unwrap();
        assert_eq!(tree.node(s2).state, NodeState::Done);
        assert!(tree.node(s2).revision.is_some());
        let b = tree.find("s2/b").unwrap();
        assert_eq!(tree.node(b).state, NodeState::Pending);
    }

    #[tokio::test]
    async fn test_enabled_declaration_wins_in_either_order() {
        let disabled =
            "[deps]\nshared = { url = \"https://example/shared.git\", condition = \"checkout_win\" }\n";
        let enabled = "[deps]\nshared = \"https://example/shared.git\"\n";
        for order in [["s1", "s2"], ["s2", "s1"]] {
            let temp = TempDir::new().unwrap();
            let source = MemoryManifestSource::new()
                .with("s1", disabled)
                .with("s2", enabled);
            let provider = Arc::new(FakeCheckout::new());
            let options = SyncOptions {
                jobs: 1,
                ..SyncOptions::default()
            };
            let solutions: Vec<SolutionSpec> = order.iter().map(|name| solution(name)).collect();
            let queue = queue(temp.path(), &solutions, Arc::clone(&provider), source, options);
            let report = queue.run().await.unwrap();

            assert!(provider.events_by_name().contains_key("shared"), "order {order:?}");
            assert_eq!(report.processed, 3, "order {order:?}");
            let tree = queue.into_tree();
            let shared = tree.node(tree.find("shared").unwrap());
            assert!(shared.should_process);
            assert_eq!(tree.node(shared.parent.unwrap()).name, "s2");
        }
    }

    #[tokio::test]
    async fn test_manifest_errors_are_fatal() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new().with("src", "deps = [");
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::new(FakeCheckout::new()),
            source,
            SyncOptions {
                ignore_errors: true,
                ..SyncOptions::default()
            },
        );
        let err = queue.run().await.unwrap_err();
        assert!(matches!(err, GsyncError::ManifestSyntax { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_with_different_urls_is_fatal() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new()
            .with("s1", "[deps]\nshared = \"https://example/one.git\"\n")
            .with("s2", "[deps]\nshared = \"https://example/two.git\"\n");
        let queue = queue(
            temp.path(),
            &[solution("s1"), solution("s2")],
            Arc::new(FakeCheckout::new()),
            source,
            SyncOptions::default(),
        );
        let err = queue.run().await.unwrap_err();
        assert!(matches!(err, GsyncError::DuplicateDependency { .. }));
    }

    #[tokio::test]
    async fn test_stuck_requirement_is_reported_as_deadlock() {
        let temp = TempDir::new().unwrap();
        let mut tree =
            DependencyTree::with_solutions(&global(temp.path()), &[solution("s1"), solution("s2")])
                .unwrap();
        let s1 = tree.find("s1").unwrap();
        let ctx = tree.parse_context(s1);
        let parsed =
            ManifestParser::parse(&ctx, "[deps]\nc1 = \"https://example/c1.git\"\n").unwrap();
        tree.apply_parse(s1, parsed).unwrap();
        tree.node_mut(s1).state = NodeState::Done;
        let s2 = tree.find("s2").unwrap();
        tree.node_mut(s2).state = NodeState::Running;

        let queue = WorkQueue::new(
            tree,
            Arc::new(FakeCheckout::new()),
            Arc::new(MemoryManifestSource::new()),
            HookRunner::new(temp.path()),
            SyncOptions::default(),
        );
        match queue.run().await.unwrap_err() {
            GsyncError::RequirementsDeadlock { pending } => assert_eq!(pending, "c1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_revision_overrides() {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(FakeCheckout::new());
        let options = SyncOptions {
            revisions: [("src".to_string(), "v2".to_string())].into(),
            ..SyncOptions::default()
        };
        let queue = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            MemoryManifestSource::new(),
            options,
        );
        queue.run().await.unwrap();
        assert_eq!(provider.events_by_name()["src"].revision.as_deref(), Some("v2"));
        let tree = queue.into_tree();
        assert_eq!(tree.node(tree.find("src").unwrap()).revision.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_non_sync_modes_do_not_sync() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new()
            .with("src", "[deps]\n\"src/a\" = \"https://example/a.git@v1\"\n");
        let provider = Arc::new(FakeCheckout::new().with_status("src/a", &[" M BUILD.gn"]));

        let status = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            MemoryManifestSource::new()
                .with("src", "[deps]\n\"src/a\" = \"https://example/a.git@v1\"\n"),
            SyncOptions::for_mode(WalkMode::Status),
        );
        let report = status.run().await.unwrap();
        assert_eq!(report.statuses.len(), 1);
        assert_eq!(report.statuses["src/a"], [" M BUILD.gn"]);

        let revinfo = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            source,
            SyncOptions {
                actual: true,
                ..SyncOptions::for_mode(WalkMode::Revinfo)
            },
        );
        let report = revinfo.run().await.unwrap();
        assert_eq!(report.revisions.len(), 2);
        assert_eq!(
            report.revisions[1],
            (
                "src/a".to_string(),
                format!("https://example/a.git@{}", FakeCheckout::revision_for("src/a"))
            )
        );

        let revert = queue(
            temp.path(),
            &[solution("src")],
            Arc::clone(&provider),
            MemoryManifestSource::new(),
            SyncOptions::for_mode(WalkMode::Revert),
        );
        revert.run().await.unwrap();
        assert_eq!(provider.reverted(), ["src"]);
        assert!(provider.events().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hooks_run_after_walk_when_files_match() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new().with(
            "src",
            r#"
[[hooks]]
name = "gen"
pattern = "\\.py$"
action = ["touch", "gen.stamp"]

[[hooks]]
name = "never"
pattern = "\\.rs$"
action = ["touch", "never.stamp"]
"#,
        );
        let provider = Arc::new(FakeCheckout::new().touching("src", &["tools/gen.py"]));
        let queue = queue(
            temp.path(),
            &[solution("src")],
            provider,
            source,
            SyncOptions::default(),
        );
        let report = queue.run().await.unwrap();
        assert_eq!(report.hooks_run, 1);
        assert!(temp.path().join("gen.stamp").exists());
        assert!(!temp.path().join("never.stamp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gn_args_written_before_hooks() {
        let temp = TempDir::new().unwrap();
        let source = MemoryManifestSource::new().with(
            "src",
            r#"
gclient_gn_args_file = "src/args.gni"
gclient_gn_args = ["flag"]

[vars]
flag = true

[[hooks]]
name = "copy"
action = ["cp", "src/args.gni", "copied.gni"]
"#,
        );
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        let provider = Arc::new(FakeCheckout::new());
        let queue = queue(
            temp.path(),
            &[solution("src")],
            provider,
            source,
            SyncOptions::default(),
        );
        let report = queue.run().await.unwrap();
        assert_eq!(report.gn_args_files, ["src/args.gni"]);
        let copied = std::fs::read_to_string(temp.path().join("copied.gni")).unwrap();
        assert!(copied.contains("flag = true"));
    }
}
