//! In-memory stand-ins for the remote browser, the text model and artifact
//! storage, shared by the unit tests of every service.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{runtime::Handle, time::sleep};
use uuid::Uuid;

use crate::{
    configuration::{DirectorySettings, PageTimeouts, RoastSettings},
    domain::Run,
    services::{
        ArtifactStore, BrowserError, BrowserPage, BrowserSession, Locator, PageConnector,
        Pipeline, RoastError, RoastModel, RoastPrompt, Roaster, RunManager, SessionError,
        SessionProvider, StorageError,
    },
};

/// What the fake browser shows for one url.
#[derive(Debug, Clone)]
pub struct FakeDocument {
    title: Option<String>,
    texts: HashMap<Locator, Vec<String>>,
    hrefs: HashMap<Locator, Vec<String>>,
    failing: HashSet<Locator>,
    slow: HashMap<Locator, Duration>,
    clickable: HashSet<Locator>,
    inputs: HashSet<Locator>,
}

impl FakeDocument {
    pub fn new() -> Self {
        FakeDocument {
            title: Some("Fake page".to_string()),
            texts: HashMap::new(),
            hrefs: HashMap::new(),
            failing: HashSet::new(),
            slow: HashMap::new(),
            clickable: HashSet::new(),
            inputs: HashSet::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    pub fn text(mut self, locator: Locator, texts: &[&str]) -> Self {
        self.texts
            .insert(locator, texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn href(mut self, locator: Locator, hrefs: &[&str]) -> Self {
        self.hrefs
            .insert(locator, hrefs.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn failing(mut self, locator: Locator) -> Self {
        self.failing.insert(locator);
        self
    }

    pub fn slow(mut self, locator: Locator, delay: Duration) -> Self {
        self.slow.insert(locator, delay);
        self
    }

    pub fn clickable(mut self, locator: Locator) -> Self {
        self.clickable.insert(locator);
        self
    }

    pub fn input(mut self, locator: Locator) -> Self {
        self.inputs.insert(locator);
        self
    }

    async fn lookup(&self, locator: &Locator) -> Result<(), BrowserError> {
        if let Some(delay) = self.slow.get(locator) {
            sleep(*delay).await;
        }
        match self.failing.contains(locator) {
            true => Err(BrowserError::Driver(format!("no such element: {}", locator))),
            false => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Site {
    documents: HashMap<String, FakeDocument>,
    unreachable: HashSet<String>,
    hanging: HashSet<String>,
    panicking: HashSet<String>,
    reveal: HashMap<String, (usize, usize)>,
    broken_screenshots: bool,
}

#[derive(Debug, Default)]
struct PageState {
    current: Option<String>,
    visited: Vec<String>,
    scrolls: usize,
    clicks: Vec<Locator>,
    submitted: Vec<(Locator, String)>,
    closed: bool,
}

/// A scripted browser tab. Urls without a document load as an empty page.
#[derive(Debug, Default)]
pub struct FakePage {
    site: Site,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new() -> Self {
        FakePage::default()
    }

    /// Same site, fresh navigation history.
    pub fn fresh(&self) -> Self {
        FakePage {
            site: self.site.clone(),
            state: Mutex::new(PageState::default()),
        }
    }

    pub fn with_document(mut self, url: &str, document: FakeDocument) -> Self {
        self.site.documents.insert(url.to_string(), document);
        self
    }

    /// Navigation to `url` fails.
    pub fn unreachable(mut self, url: &str) -> Self {
        self.site.unreachable.insert(url.to_string());
        self
    }

    /// Navigation to `url` never finishes.
    pub fn hanging(mut self, url: &str) -> Self {
        self.site.hanging.insert(url.to_string());
        self
    }

    /// Reading anything from `url` panics.
    pub fn panicking(mut self, url: &str) -> Self {
        self.site.panicking.insert(url.to_string());
        self
    }

    /// Links on `url` appear `initial` at a time, plus `per_scroll` after
    /// every scroll.
    pub fn reveal(mut self, url: &str, initial: usize, per_scroll: usize) -> Self {
        self.site
            .reveal
            .insert(url.to_string(), (initial, per_scroll));
        self
    }

    pub fn broken_screenshots(mut self) -> Self {
        self.site.broken_screenshots = true;
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.state().visited.clone()
    }

    pub fn scrolls(&self) -> usize {
        self.state().scrolls
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.state().clicks.clone()
    }

    pub fn submitted(&self) -> Vec<(Locator, String)> {
        self.state().submitted.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    fn current(&self) -> Result<(String, FakeDocument), BrowserError> {
        let url = {
            let state = self.state();
            if state.closed {
                return Err(BrowserError::Closed);
            }
            state.current.clone().unwrap_or_default()
        };
        // Outside the lock, so the page can still be closed afterwards.
        if self.site.panicking.contains(&url) {
            panic!("renderer crashed on {}", url);
        }
        let document = self
            .site
            .documents
            .get(&url)
            .cloned()
            .unwrap_or_else(FakeDocument::new);
        Ok((url, document))
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.state().visited.push(url.to_string());
        if self.site.hanging.contains(url) {
            futures::future::pending::<()>().await;
        }
        if self.site.unreachable.contains(url) {
            return Err(BrowserError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }

        self.state().current = Some(url.to_string());
        Ok(())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        let (_, document) = self.current()?;
        document
            .title
            .ok_or_else(|| BrowserError::Driver("document has no title".to_string()))
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let (_, document) = self.current()?;
        document.lookup(locator).await?;
        Ok(document.texts.get(locator).cloned().unwrap_or_default())
    }

    async fn hrefs(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let (url, document) = self.current()?;
        document.lookup(locator).await?;
        let mut hrefs = document.hrefs.get(locator).cloned().unwrap_or_default();
        if let Some((initial, per_scroll)) = self.site.reveal.get(&url) {
            hrefs.truncate(initial + per_scroll * self.scrolls());
        }
        Ok(hrefs)
    }

    async fn click(&self, locator: &Locator) -> Result<bool, BrowserError> {
        let (_, document) = self.current()?;
        document.lookup(locator).await?;
        match document.clickable.contains(locator) {
            true => {
                self.state().clicks.push(locator.clone());
                Ok(true)
            }
            false => Ok(false),
        }
    }

    async fn fill_and_submit(&self, locator: &Locator, text: &str) -> Result<bool, BrowserError> {
        let (_, document) = self.current()?;
        document.lookup(locator).await?;
        match document.inputs.contains(locator) {
            true => {
                self.state()
                    .submitted
                    .push((locator.clone(), text.to_string()));
                Ok(true)
            }
            false => Ok(false),
        }
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.current()?;
        self.state().scrolls += 1;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.current()?;
        match self.site.broken_screenshots {
            true => Err(BrowserError::Driver("screenshot failed".to_string())),
            false => Ok(vec![137, 80, 78, 71]),
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.state().closed = true;
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for Arc<FakePage> {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.as_ref().goto(url).await
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.as_ref().title().await
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        self.as_ref().texts(locator).await
    }

    async fn hrefs(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        self.as_ref().hrefs(locator).await
    }

    async fn click(&self, locator: &Locator) -> Result<bool, BrowserError> {
        self.as_ref().click(locator).await
    }

    async fn fill_and_submit(&self, locator: &Locator, text: &str) -> Result<bool, BrowserError> {
        self.as_ref().fill_and_submit(locator, text).await
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.as_ref().scroll_to_bottom().await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.as_ref().screenshot().await
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.as_ref().close().await
    }
}

/// Hands every session its own copy of a template page.
#[derive(Default)]
pub struct FakeConnector {
    template: FakePage,
    fail: bool,
    pages: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeConnector {
    pub fn new(template: FakePage) -> Self {
        FakeConnector {
            template,
            ..FakeConnector::default()
        }
    }

    pub fn failing() -> Self {
        FakeConnector {
            fail: true,
            ..FakeConnector::default()
        }
    }

    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageConnector for FakeConnector {
    async fn connect(&self, session: &BrowserSession) -> Result<Box<dyn BrowserPage>, BrowserError> {
        if self.fail {
            return Err(BrowserError::Driver(format!(
                "session {} refused the connection",
                session.id
            )));
        }
        let page = Arc::new(self.template.fresh());
        self.pages.lock().unwrap().push(page.clone());
        Ok(Box::new(page))
    }
}

#[derive(Default)]
pub struct FakeSessions {
    fail: bool,
    stall: bool,
    created: AtomicUsize,
    closed: Mutex<Vec<String>>,
}

impl FakeSessions {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn create_session(&self) -> Result<BrowserSession, SessionError> {
        if self.stall {
            futures::future::pending::<()>().await;
        }
        if self.fail {
            return Err(SessionError::Status {
                status: reqwest::StatusCode::UNAUTHORIZED,
                body: "invalid api key".to_string(),
            });
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BrowserSession {
            id: format!("session-{}", n),
            connect_url: format!("wss://connect.test/session-{}", n),
            webdriver_url: None,
        })
    }

    async fn close_session(&self, id: &str) -> bool {
        self.closed.lock().unwrap().push(id.to_string());
        true
    }
}

/// Replies with a canned roast and remembers every prompt it was sent.
#[derive(Clone)]
pub struct FakeModel {
    reply: Option<String>,
    prompts: Arc<Mutex<Vec<RoastPrompt>>>,
}

impl FakeModel {
    pub fn replying(text: &str) -> Self {
        FakeModel {
            reply: Some(text.to_string()),
            prompts: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        FakeModel {
            reply: None,
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<RoastPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoastModel for FakeModel {
    async fn complete(&self, prompt: &RoastPrompt) -> Result<String, RoastError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.reply.clone().ok_or(RoastError::EmptyResponse)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    fail: bool,
    screenshots: Mutex<Vec<String>>,
    traces: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryStore {
    pub fn failing() -> Self {
        MemoryStore {
            fail: true,
            ..MemoryStore::default()
        }
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.screenshots.lock().unwrap().clone()
    }

    pub fn traces(&self) -> Vec<(String, serde_json::Value)> {
        self.traces.lock().unwrap().clone()
    }

    fn check(&self, key: &str) -> Result<(), StorageError> {
        match self.fail {
            true => Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            }),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put_screenshot(
        &self,
        run_id: Uuid,
        target_slug: &str,
        _png: Vec<u8>,
    ) -> Result<String, StorageError> {
        let key = crate::services::screenshot_key(run_id, target_slug);
        self.check(&key)?;
        self.screenshots.lock().unwrap().push(key.clone());
        Ok(format!("memory://{}", key))
    }

    async fn put_trace(
        &self,
        run_id: Uuid,
        target_slug: &str,
        trace: &serde_json::Value,
    ) -> Result<String, StorageError> {
        let key = crate::services::trace_key(run_id, target_slug);
        self.check(&key)?;
        self.traces.lock().unwrap().push((key.clone(), trace.clone()));
        Ok(format!("memory://{}", key))
    }
}

/// Builds a `RunManager` over fakes and keeps handles to them for assertions.
pub struct TestPipeline {
    pub sessions: Arc<FakeSessions>,
    pub connector: Arc<FakeConnector>,
    pub model: FakeModel,
    pub store: Arc<MemoryStore>,
    pub directory: DirectorySettings,
}

impl TestPipeline {
    pub fn new() -> Self {
        TestPipeline {
            sessions: Arc::default(),
            connector: Arc::default(),
            model: FakeModel::replying("Your hero is shy, your button is shyer."),
            store: Arc::default(),
            directory: DirectorySettings {
                base_url: "https://dir.test".to_string(),
                scroll_pause_millis: 0,
                max_scroll_attempts: 3,
                ..DirectorySettings::default()
            },
        }
    }

    pub fn page(mut self, page: FakePage) -> Self {
        self.connector = Arc::new(FakeConnector::new(page));
        self
    }

    pub fn failing_sessions(mut self) -> Self {
        self.sessions = Arc::new(FakeSessions {
            fail: true,
            ..FakeSessions::default()
        });
        self
    }

    /// Session acquisition never completes, so runs stay in flight.
    pub fn stall_sessions(mut self) -> Self {
        self.sessions = Arc::new(FakeSessions {
            stall: true,
            ..FakeSessions::default()
        });
        self
    }

    pub fn failing_connector(mut self) -> Self {
        self.connector = Arc::new(FakeConnector::failing());
        self
    }

    pub fn model(mut self, model: FakeModel) -> Self {
        self.model = model;
        self
    }

    pub fn directory(mut self, directory: DirectorySettings) -> Self {
        self.directory = directory;
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.store = Arc::new(MemoryStore::failing());
        self
    }

    pub fn manager(&self) -> RunManager {
        let pipeline = Pipeline {
            sessions: self.sessions.clone(),
            connector: self.connector.clone(),
            roaster: Roaster::new(Arc::new(self.model.clone()), RoastSettings::default()),
            storage: self.store.clone(),
            directory: self.directory.clone(),
            timeouts: PageTimeouts {
                navigation: Duration::from_millis(200),
                extraction: Duration::from_millis(100),
                screenshot: Duration::from_millis(100),
                settle: Duration::ZERO,
            },
        };
        RunManager::new(pipeline, Handle::current())
    }
}

/// Polls until the run reaches a terminal status.
pub async fn wait_for_terminal(manager: &RunManager, run_id: Uuid) -> Run {
    for _ in 0..500 {
        let run = manager.get_run(run_id).unwrap();
        if run.status.is_terminal() {
            return run;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish in time", run_id);
}
