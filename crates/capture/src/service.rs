use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use argus_compare::{ComparisonOrchestrator, ImageDiffer, PixelDiffer, ResultSet};
use argus_core::paths::{thumb_for, IMAGE_EXT};
use argus_core::{
    Config, CookieTable, Device, Environment, Event, EventBus, Page, PageModel, Paths, Result,
    Version,
};
use argus_render::{
    CaptureOutcome, CaptureRequest, Engine, ImageThumbnailer, ProcessRenderer, Renderer,
    Thumbnailer,
};

use crate::expander::{expand, job_for_page, RefreshingSet};
use crate::job::Job;
use crate::version::{Touch, VersionTracker};

const COMMAND_BUFFER: usize = 100;

/// Page lists pushed from the settings screen. Unknown per-page fields (such
/// as client-side diff percentages) are dropped on deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUpdate {
    #[serde(default)]
    pub desktop: Vec<Page>,
    #[serde(default)]
    pub tablet: Vec<Page>,
    #[serde(default)]
    pub mobile: Vec<Page>,
}

/// Messages into the owning actor. All state mutation goes through these;
/// snapshot reads answer over a oneshot.
pub enum Command {
    UpdateEnvironment {
        alias: String,
        devices: Vec<Device>,
        reply: oneshot::Sender<bool>,
    },
    RefreshPage {
        env: String,
        name: String,
        device: Device,
    },
    CompareEnvironments {
        left: String,
        right: String,
        reply: oneshot::Sender<bool>,
    },
    UpdateModel {
        list: ModelUpdate,
    },
    UpdateResults {
        name: String,
        device: Device,
        percentage: String,
    },
    SetEngine {
        name: String,
    },
    SaveModel,
    Queue {
        reply: oneshot::Sender<Vec<Job>>,
    },
    Versions {
        reply: oneshot::Sender<Vec<Version>>,
    },
    Results {
        reply: oneshot::Sender<ResultSet>,
    },
    Pages {
        reply: oneshot::Sender<PageModel>,
    },
    CaptureDone {
        job: Job,
        dest: PathBuf,
        outcome: Result<CaptureOutcome>,
    },
}

/// Cloneable front door to the capture actor.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<Command>,
}

impl CaptureHandle {
    /// Expand and enqueue the named environment for all three devices.
    /// Returns false when the alias is not configured.
    pub async fn update_environment(&self, alias: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::UpdateEnvironment {
            alias: alias.to_string(),
            devices: Device::ALL.to_vec(),
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Expand and enqueue the named environment for a single device.
    pub async fn refresh_environment(&self, alias: &str, device: Device) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::UpdateEnvironment {
            alias: alias.to_string(),
            devices: vec![device],
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn refresh_page(&self, env: &str, name: &str, device: Device) {
        let _ = self
            .tx
            .send(Command::RefreshPage {
                env: env.to_string(),
                name: name.to_string(),
                device,
            })
            .await;
    }

    /// Compare two explicit environments immediately, independent of the
    /// round-completion trigger. Returns false when an alias does not
    /// resolve.
    pub async fn compare_all(&self, left: &str, right: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::CompareEnvironments {
            left: left.to_string(),
            right: right.to_string(),
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn update_model(&self, list: ModelUpdate) {
        let _ = self.tx.send(Command::UpdateModel { list }).await;
    }

    pub async fn update_results(&self, name: &str, device: Device, percentage: &str) {
        let _ = self
            .tx
            .send(Command::UpdateResults {
                name: name.to_string(),
                device,
                percentage: percentage.to_string(),
            })
            .await;
    }

    pub async fn set_engine(&self, name: &str) {
        let _ = self
            .tx
            .send(Command::SetEngine {
                name: name.to_string(),
            })
            .await;
    }

    pub async fn save_model(&self) {
        let _ = self.tx.send(Command::SaveModel).await;
    }

    pub async fn queue(&self) -> Vec<Job> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Queue { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn versions(&self) -> Vec<Version> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Versions { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn results(&self) -> ResultSet {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Results { reply }).await.is_err() {
            return ResultSet::default();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn pages(&self) -> PageModel {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Pages { reply }).await.is_err() {
            return PageModel::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// The owning actor: holds the job queue, version tracker, refreshing sets
/// and results, and serializes every mutation. Exactly one renderer
/// invocation is in flight at any time; the spawned render task reports back
/// through the command channel.
pub struct CaptureService {
    config: Config,
    paths: Paths,
    model: PageModel,
    cookies: CookieTable,
    tracker: VersionTracker,
    refreshing: RefreshingSet,
    queue: VecDeque<Job>,
    in_flight: bool,
    results: ResultSet,
    renderer: Arc<dyn Renderer>,
    thumbnailer: Arc<dyn Thumbnailer>,
    orchestrator: ComparisonOrchestrator,
    events: EventBus,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
}

impl CaptureService {
    /// Build the service with the default process renderer, image
    /// thumbnailer and pixel differ.
    pub fn new(config: Config, paths: Paths, events: EventBus) -> Result<(Self, CaptureHandle)> {
        let model = PageModel::load_or_empty(&config.pages_file(&paths));
        let engine = Engine::get(model.engine.as_deref().or(config.capture.engine.as_deref()));
        let renderer = Arc::new(ProcessRenderer::new(
            engine,
            PathBuf::from(&config.capture.render_script),
            Duration::from_secs(config.capture.render_timeout_secs),
        ));
        let thumbnailer = Arc::new(ImageThumbnailer::new(config.capture.thumb_height));
        Self::with_collaborators(config, paths, events, renderer, thumbnailer, Arc::new(PixelDiffer))
    }

    /// Build the service around explicit collaborators; used by tests and by
    /// callers embedding their own renderer.
    pub fn with_collaborators(
        config: Config,
        paths: Paths,
        events: EventBus,
        renderer: Arc<dyn Renderer>,
        thumbnailer: Arc<dyn Thumbnailer>,
        differ: Arc<dyn ImageDiffer>,
    ) -> Result<(Self, CaptureHandle)> {
        paths.ensure_dirs()?;

        let model = PageModel::load_or_empty(&config.pages_file(&paths));
        let cookies = CookieTable::load_or_empty(&config.cookies_file(&paths));
        if let Some(proxy) = &model.proxy {
            info!(proxy = %proxy, "Proxy detected");
        }
        info!(engine = renderer.name(), "Engine detected");

        let mut tracker = VersionTracker::new(paths.clone());
        tracker.bootstrap(&model.env_aliases())?;

        let results = ResultSet {
            engine: Some(renderer.name().to_string()),
            ..ResultSet::default()
        };

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = CaptureHandle { tx: tx.clone() };

        Ok((
            Self {
                config,
                paths,
                model,
                cookies,
                tracker,
                refreshing: RefreshingSet::default(),
                queue: VecDeque::new(),
                in_flight: false,
                results,
                renderer,
                thumbnailer,
                orchestrator: ComparisonOrchestrator::new(differ),
                events,
                tx,
                rx,
            },
            handle,
        ))
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Capture service started");

        if self.config.start_compare {
            self.compare_first_pair();
        }

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = shutdown.recv() => {
                    info!("Capture service shutting down");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::UpdateEnvironment {
                alias,
                devices,
                reply,
            } => {
                let found = self.update_environment(&alias, &devices);
                let _ = reply.send(found);
            }
            Command::RefreshPage { env, name, device } => self.refresh_page(&env, &name, device),
            Command::CompareEnvironments { left, right, reply } => {
                let _ = reply.send(self.compare_environments(&left, &right));
            }
            Command::UpdateModel { list } => self.update_model(list),
            Command::UpdateResults {
                name,
                device,
                percentage,
            } => self.results.upsert(&name, device, &percentage),
            Command::SetEngine { name } => self.set_engine(&name),
            Command::SaveModel => self.save_model(),
            Command::Queue { reply } => {
                let _ = reply.send(self.queue.iter().cloned().collect());
            }
            Command::Versions { reply } => {
                let _ = reply.send(self.tracker.versions().to_vec());
            }
            Command::Results { reply } => {
                let _ = reply.send(self.results.clone());
            }
            Command::Pages { reply } => {
                let _ = reply.send(self.model.clone());
            }
            Command::CaptureDone { job, dest, outcome } => self.capture_done(job, dest, outcome),
        }
    }

    /// Expand a refresh request into per-page jobs for each requested
    /// device, guarded by the refreshing set, and record the touches in the
    /// version tracker. One queue-size event fires after the whole request.
    fn update_environment(&mut self, alias: &str, devices: &[Device]) -> bool {
        let Some(env) = self.model.env_by_alias(alias).cloned() else {
            warn!(env = alias, "Unknown environment");
            return false;
        };

        let mut enqueued = false;
        for &device in devices {
            if !self.refreshing.mark(device, &env.alias) {
                info!(device = %device, env = %env.alias, "Refresh already in progress");
                continue;
            }

            info!(device = %device, env = %env.alias, "Update screenshots");
            let jobs = expand(&self.model, &self.cookies, &env, device);
            enqueued |= !jobs.is_empty();
            self.queue.extend(jobs);
            self.touch_version(device, &env.alias);
        }

        if enqueued {
            self.events.publish(Event::QueueChange {
                size: self.queue.len(),
            });
            self.ensure_dispatch();
        }
        true
    }

    /// Apply an environment-touched transition to the current version.
    fn touch_version(&mut self, device: Device, alias: &str) {
        let env_count = self.model.envs.len();
        match self.tracker.record_touch(device, alias, env_count) {
            Touch::Recorded { completed } => {
                if completed {
                    debug!(device = %device, env = alias, "Round complete for every device");
                }
            }
            // other devices or aliases still pending: just make sure the
            // queue is draining
            Touch::RepeatCollecting => self.ensure_dispatch(),
            Touch::RepeatComplete => self.allocate_version(),
            Touch::NoVersion => {
                self.allocate_version();
                if let Touch::Recorded { .. } = self.tracker.record_touch(device, alias, env_count)
                {
                    debug!(device = %device, env = alias, "Recorded touch after allocation");
                }
            }
        }
    }

    fn allocate_version(&mut self) {
        match self.tracker.add_version() {
            Ok(()) => self.events.publish(Event::VersionList {
                versions: self.tracker.versions().to_vec(),
            }),
            Err(e) => error!(error = %e, "Version allocation failed"),
        }
    }

    /// Queue a single page refresh. Does not touch the refreshing set or the
    /// version tracker: the capture lands in the current round.
    fn refresh_page(&mut self, env_alias: &str, name: &str, device: Device) {
        let Some(env) = self.model.env_by_alias(env_alias).cloned() else {
            warn!(env = env_alias, "Unknown environment");
            return;
        };
        let Some(page) = self
            .model
            .pages(device)
            .iter()
            .find(|p| p.name == name)
            .cloned()
        else {
            warn!(name, device = %device, "Unknown page");
            return;
        };
        if page.url.is_empty() {
            warn!(name, "Page has no URL");
            return;
        }

        info!(name, device = %device, env = %env.alias, "Updating single screen");
        self.queue
            .push_back(job_for_page(&self.model, &self.cookies, &env, device, &page));
        self.events.publish(Event::QueueChange {
            size: self.queue.len(),
        });
        self.ensure_dispatch();
    }

    /// Start the head job unless a capture is already outstanding.
    fn ensure_dispatch(&mut self) {
        if self.in_flight {
            return;
        }
        let Some(job) = self.queue.front().cloned() else {
            return;
        };
        self.dispatch(job);
    }

    fn dispatch(&mut self, job: Job) {
        self.in_flight = true;

        let dest = match self.tracker.current_name() {
            Some(version) => self.paths.image_path(version, &job.options.env, &job.name),
            None => {
                warn!("No current version, capturing into the root directory");
                self.paths
                    .capture_dir()
                    .join(format!("{}{}{}", job.options.env, job.name, IMAGE_EXT))
            }
        };

        let request = CaptureRequest {
            url: job.url.clone(),
            dest: dest.clone(),
            user_agent: job.options.user_agent.clone(),
            viewport: job.options.viewport,
            cookies: job.options.cookies.clone(),
            blacklist: self.model.blacklist.clone(),
            proxy: self.model.proxy.clone(),
        };

        let renderer = self.renderer.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = renderer.capture(&request).await;
            let _ = tx.send(Command::CaptureDone { job, dest, outcome }).await;
        });
    }

    /// One capture finished, successfully or not: thumbnail, notify, pop,
    /// continue. A drain with touched environments triggers the comparison.
    fn capture_done(&mut self, job: Job, dest: PathBuf, outcome: Result<CaptureOutcome>) {
        self.in_flight = false;

        match outcome {
            Ok(_) => info!(dest = %dest.display(), "Update done"),
            Err(e) => error!(name = %job.name, env = %job.options.env, error = %e, "Capture failed"),
        }

        if let Err(e) = self.thumbnailer.thumbnail(&dest, &thumb_for(&dest)) {
            warn!(error = %e, "Thumbnail generation failed");
        }

        self.events.publish(Event::ScreenUpdated {
            name: job.name.clone(),
            env: job.options.env.clone(),
        });

        self.queue.pop_front();
        self.events.publish(Event::QueueChange {
            size: self.queue.len(),
        });

        if !self.queue.is_empty() {
            self.ensure_dispatch();
            return;
        }

        // round drained: compare if anything was refreshed, then allow the
        // next refresh of the same environments
        if !self.refreshing.is_empty() {
            self.compare_first_pair();
        }
        self.refreshing.clear();
    }

    /// The automatic comparison always diffs the first two configured
    /// environments, independent of which aliases were touched this round.
    fn compare_first_pair(&mut self) {
        if self.model.envs.len() < 2 {
            warn!("Need at least two environments to compare");
            return;
        }
        let left = self.model.envs[0].clone();
        let right = self.model.envs[1].clone();
        self.run_comparison(&left, &right);
    }

    fn compare_environments(&mut self, left: &str, right: &str) -> bool {
        let (Some(left), Some(right)) = (
            self.model.env_by_alias(left).cloned(),
            self.model.env_by_alias(right).cloned(),
        ) else {
            warn!(left, right, "Comparison aliases did not resolve");
            return false;
        };
        self.run_comparison(&left, &right);
        true
    }

    fn run_comparison(&mut self, left: &Environment, right: &Environment) {
        let Some(version) = self.tracker.current_name().map(str::to_string) else {
            warn!("No version to compare");
            return;
        };
        self.orchestrator.compare(
            &self.model,
            left,
            right,
            &self.paths,
            &version,
            &mut self.results,
        );
    }

    fn update_model(&mut self, list: ModelUpdate) {
        self.model.desktop = list.desktop;
        self.model.tablet = list.tablet;
        self.model.mobile = list.mobile;
        self.model.edited = true;
        info!("Page model updated");
    }

    fn save_model(&mut self) {
        let path = self.config.pages_file(&self.paths);
        match self.model.save(&path) {
            Ok(()) => {
                self.model.edited = false;
                info!(path = %path.display(), "Page model saved");
            }
            Err(e) => error!(error = %e, "Failed to save page model"),
        }
    }

    fn set_engine(&mut self, name: &str) {
        let engine = Engine::get(Some(name));
        self.renderer = Arc::new(ProcessRenderer::new(
            engine,
            PathBuf::from(&self.config.capture.render_script),
            Duration::from_secs(self.config.capture.render_timeout_secs),
        ));
        self.model.engine = Some(engine.name.to_string());
        self.results.engine = Some(engine.name.to_string());
        info!(engine = engine.name, "Engine updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TWO_ENVS_ONE_PAGE: &str = r#"{
        "host": "http://{$alias}.example.com",
        "envs": [
            {"alias": "envA", "server": "a"},
            {"alias": "envB", "server": "b"}
        ],
        "desktop": [{"name": "home", "url": "$host/"}],
        "tablet": [{"name": "home", "url": "$host/"}],
        "mobile": [{"name": "home", "url": "$host/"}]
    }"#;

    const ONE_ENV_TWO_PAGES: &str = r#"{
        "host": "http://{$alias}.example.com",
        "envs": [{"alias": "envA", "server": "a"}],
        "desktop": [
            {"name": "home", "url": "$host/home"},
            {"name": "about", "url": "$host/about"}
        ],
        "tablet": [
            {"name": "home", "url": "$host/home"},
            {"name": "about", "url": "$host/about"}
        ],
        "mobile": [
            {"name": "home", "url": "$host/home"},
            {"name": "about", "url": "$host/about"}
        ]
    }"#;

    struct MockRenderer {
        delay: Duration,
        urls: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl MockRenderer {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                urls: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Renderer for MockRenderer {
        fn name(&self) -> &str {
            "mock"
        }

        async fn capture(&self, req: &CaptureRequest) -> Result<CaptureOutcome> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.urls.lock().unwrap().push(req.url.clone());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(CaptureOutcome::default())
        }
    }

    struct NoopThumbnailer;

    impl Thumbnailer for NoopThumbnailer {
        fn thumbnail(&self, _src: &Path, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingDiffer {
        calls: AtomicUsize,
    }

    impl ImageDiffer for CountingDiffer {
        fn diff(&self, _left: &Path, _right: &Path) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.0)
        }
    }

    struct Fixture {
        handle: CaptureHandle,
        events: EventBus,
        paths: Paths,
        _dir: tempfile::TempDir,
        _shutdown: broadcast::Sender<()>,
    }

    fn start(
        pages_json: &str,
        renderer: Arc<dyn Renderer>,
        differ: Arc<dyn ImageDiffer>,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        std::fs::write(paths.pages_file(), pages_json).unwrap();

        let events = EventBus::new(64);
        let (service, handle) = CaptureService::with_collaborators(
            Config::default(),
            paths.clone(),
            events.clone(),
            renderer,
            Arc::new(NoopThumbnailer),
            differ,
        )
        .unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(service.run(shutdown_tx.subscribe()));

        Fixture {
            handle,
            events,
            paths,
            _dir: dir,
            _shutdown: shutdown_tx,
        }
    }

    /// Collect queue-size events until the queue reports empty.
    async fn wait_for_drain(rx: &mut broadcast::Receiver<Event>) -> Vec<usize> {
        let mut sizes = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(Event::QueueChange { size })) => {
                    sizes.push(size);
                    if size == 0 {
                        return sizes;
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => panic!("event stream closed: {}", e),
                Err(_) => panic!("timed out waiting for the queue to drain"),
            }
        }
    }

    #[tokio::test]
    async fn test_update_environment_enqueues_and_drains() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(2)));
        let differ = Arc::new(CountingDiffer::default());
        let fx = start(TWO_ENVS_ONE_PAGE, renderer.clone(), differ.clone());
        let mut rx = fx.events.subscribe();

        assert!(fx.handle.update_environment("envA").await);
        let sizes = wait_for_drain(&mut rx).await;
        assert_eq!(sizes, vec![3, 2, 1, 0]);

        // envA recorded for all three devices, round still collecting
        let versions = fx.handle.versions().await;
        let current = versions.last().unwrap();
        for device in Device::ALL {
            assert!(current.contains(device, "envA"));
        }
        assert!(!current.is_complete(2));

        // the drain triggered the automatic comparison
        assert_eq!(differ.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_environment_is_rejected() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(CountingDiffer::default()));
        assert!(!fx.handle.update_environment("nope").await);
        assert!(fx.handle.queue().await.is_empty());
    }

    #[tokio::test]
    async fn test_jobs_complete_in_fifo_order() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(ONE_ENV_TWO_PAGES, renderer.clone(), Arc::new(CountingDiffer::default()));
        let mut rx = fx.events.subscribe();

        fx.handle.update_environment("envA").await;
        wait_for_drain(&mut rx).await;

        let urls = renderer.urls.lock().unwrap().clone();
        let expected: Vec<String> = ["home", "about"]
            .iter()
            .cycle()
            .take(6)
            .map(|p| format!("http://a.example.com/{}", p))
            .collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_single_flight_dispatch() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(3)));
        let fx = start(ONE_ENV_TWO_PAGES, renderer.clone(), Arc::new(CountingDiffer::default()));
        let mut rx = fx.events.subscribe();

        fx.handle.update_environment("envA").await;
        wait_for_drain(&mut rx).await;

        assert_eq!(renderer.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_refresh_is_dropped() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(5)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer.clone(), Arc::new(CountingDiffer::default()));
        let mut rx = fx.events.subscribe();

        fx.handle.update_environment("envA").await;
        fx.handle.update_environment("envA").await;
        wait_for_drain(&mut rx).await;

        // the second refresh of a pending environment/device pair adds nothing
        assert_eq!(renderer.urls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_complete_round_seals_and_next_touch_allocates() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(CountingDiffer::default()));
        let mut rx = fx.events.subscribe();

        fx.handle.update_environment("envA").await;
        wait_for_drain(&mut rx).await;
        fx.handle.update_environment("envB").await;
        wait_for_drain(&mut rx).await;

        let versions = fx.handle.versions().await;
        assert_eq!(versions.len(), 1);
        assert!(versions.last().unwrap().is_complete(2));

        // the round is sealed: refreshing envA again starts a new one
        fx.handle.update_environment("envA").await;
        wait_for_drain(&mut rx).await;

        let versions = fx.handle.versions().await;
        assert_eq!(versions.len(), 2);
        assert!(versions[0].is_complete(2));
    }

    #[tokio::test]
    async fn test_refresh_page_queues_one_job_without_touching_round() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let differ = Arc::new(CountingDiffer::default());
        let fx = start(ONE_ENV_TWO_PAGES, renderer.clone(), differ.clone());
        let mut rx = fx.events.subscribe();

        fx.handle.refresh_page("envA", "about", Device::Mobile).await;
        let sizes = wait_for_drain(&mut rx).await;
        assert_eq!(sizes, vec![1, 0]);

        assert_eq!(renderer.urls.lock().unwrap().len(), 1);
        // a single-page refresh marks nothing dirty, so no comparison fires
        assert_eq!(differ.calls.load(Ordering::SeqCst), 0);
        let versions = fx.handle.versions().await;
        assert!(versions.last().unwrap().aliases(Device::Mobile).is_empty());
    }

    #[tokio::test]
    async fn test_compare_all_with_identical_images_yields_no_entries() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(PixelDiffer));

        let versions = fx.handle.versions().await;
        let version = versions.last().unwrap().name.clone();
        let img = image::ImageBuffer::from_pixel(8, 8, image::Rgba([7u8, 7, 7, 255]));
        img.save(fx.paths.image_path(&version, "envA", "home")).unwrap();
        img.save(fx.paths.image_path(&version, "envB", "home")).unwrap();

        assert!(fx.handle.compare_all("envA", "envB").await);

        let results = fx.handle.results().await;
        for device in Device::ALL {
            assert!(results.device(device).results.is_empty());
        }
    }

    #[tokio::test]
    async fn test_compare_all_unknown_alias() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(CountingDiffer::default()));
        assert!(!fx.handle.compare_all("envA", "nope").await);
    }

    #[tokio::test]
    async fn test_externally_computed_results_are_upserted() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(CountingDiffer::default()));

        fx.handle.update_results("home", Device::Tablet, "3.14").await;
        let results = fx.handle.results().await;
        assert_eq!(results.device(Device::Tablet).results[0].percentage, "3.14");

        fx.handle.update_results("home", Device::Tablet, "0.00").await;
        let results = fx.handle.results().await;
        assert!(results.device(Device::Tablet).results.is_empty());
    }

    #[tokio::test]
    async fn test_model_update_and_save() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(CountingDiffer::default()));

        let list: ModelUpdate = serde_json::from_str(
            r#"{
                "desktop": [{"name": "landing", "url": "$host/landing", "percentage": "2.00"}],
                "tablet": [],
                "mobile": []
            }"#,
        )
        .unwrap();
        fx.handle.update_model(list).await;

        let model = fx.handle.pages().await;
        assert!(model.edited);
        assert_eq!(model.desktop[0].name, "landing");
        // environments survive a page-list replacement
        assert_eq!(model.envs.len(), 2);

        fx.handle.save_model().await;
        let model = fx.handle.pages().await;
        assert!(!model.edited);
        let saved = PageModel::load(&fx.paths.pages_file()).unwrap();
        assert_eq!(saved.desktop[0].name, "landing");
    }

    #[tokio::test]
    async fn test_engine_swap_is_visible_in_snapshots() {
        let renderer = Arc::new(MockRenderer::new(Duration::from_millis(1)));
        let fx = start(TWO_ENVS_ONE_PAGE, renderer, Arc::new(CountingDiffer::default()));

        fx.handle.set_engine("slimerjs").await;
        assert_eq!(fx.handle.pages().await.engine.as_deref(), Some("slimerjs"));
        assert_eq!(fx.handle.results().await.engine.as_deref(), Some("slimerjs"));
    }
}
