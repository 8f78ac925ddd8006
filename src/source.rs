use crate::types::{SuiteCollection, TestCase, TestSuite};
use indexmap::IndexMap;
use parking_lot::Mutex;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bound on a single fetch of the suite data.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameter appended when a fresh copy is forced.
pub const CACHE_BUST_PARAM: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("could not read {0}")]
    Read(String),
    #[error("server answered {code} {text}")]
    Status { code: u16, text: String },
    #[error("no answer within {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("test data is malformed: {0}")]
    Malformed(String),
    #[error("invalid source configuration: {0}")]
    Config(String),
    #[error("superseded by a newer load")]
    Superseded,
}

impl SourceError {
    /// True for failures of the transfer itself, as opposed to bad content.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_)
                | SourceError::Read(_)
                | SourceError::Status { .. }
                | SourceError::Timeout(_)
        )
    }
}

// On-the-wire layout of the test data.
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    sets: Vec<String>,
    #[serde(default)]
    problems: IndexMap<String, Vec<String>>,
    test_cases: IndexMap<String, Vec<RawCase>>,
}

#[derive(Debug, Deserialize)]
struct RawCase {
    input: Vec<Value>,
    output: Value,
}

impl From<RawPayload> for SuiteCollection {
    fn from(raw: RawPayload) -> Self {
        let suites = raw
            .test_cases
            .into_iter()
            .map(|(name, cases)| {
                let suite = TestSuite {
                    name: name.clone(),
                    cases: cases
                        .into_iter()
                        .map(|c| TestCase {
                            input: c.input,
                            expected: c.output,
                        })
                        .collect(),
                };
                (name, suite)
            })
            .collect();
        SuiteCollection {
            sets: raw.sets,
            problems: raw.problems,
            suites,
        }
    }
}

pub fn parse_payload(text: &str) -> Result<SuiteCollection, SourceError> {
    let raw: RawPayload =
        serde_json::from_str(text).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(raw.into())
}

/// Reads test data from disk. `.yaml`/`.yml` files are read as YAML,
/// anything else as JSON.
pub fn load_collection_file(path: &Path) -> Result<SuiteCollection, SourceError> {
    let content = fs::read_to_string(path)
        .map_err(|e| SourceError::Read(format!("{}: {e}", path.display())))?;
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        let raw: RawPayload = serde_yaml::from_str(&content)
            .map_err(|e| SourceError::Malformed(format!("{}: {e}", path.display())))?;
        Ok(raw.into())
    } else {
        parse_payload(&content)
    }
}

/// Somewhere a suite collection can be fetched from.
#[allow(async_fn_in_trait)]
pub trait SuiteSource {
    /// `fresh` asks the source to bypass any cache on the way.
    async fn fetch(&self, fresh: bool) -> Result<SuiteCollection, SourceError>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl SuiteSource for FileSource {
    async fn fetch(&self, _fresh: bool) -> Result<SuiteCollection, SourceError> {
        load_collection_file(&self.path)
    }
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let url = Url::parse(url).map_err(|e| SourceError::Config(format!("{url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Config(e.to_string()))?;
        Ok(Self {
            url,
            timeout,
            client,
        })
    }

    /// The URL a fetch will request. With `fresh`, a unique token is added
    /// so intermediate caches cannot answer.
    pub fn request_url(&self, fresh: bool) -> Url {
        let mut url = self.url.clone();
        if fresh {
            url.query_pairs_mut()
                .append_pair(CACHE_BUST_PARAM, &Uuid::new_v4().simple().to_string());
        }
        url
    }

    fn classify(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

impl SuiteSource for HttpSource {
    async fn fetch(&self, fresh: bool) -> Result<SuiteCollection, SourceError> {
        let url = self.request_url(fresh);
        info!("fetching test data from {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                code: status.as_u16(),
                text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let body = response.text().await.map_err(|e| self.classify(e))?;
        debug!("received {} bytes", body.len());
        parse_payload(&body)
    }
}

/// Either kind of source, picked at runtime from configuration.
#[derive(Debug, Clone)]
pub enum DataSource {
    File(FileSource),
    Http(HttpSource),
}

impl SuiteSource for DataSource {
    async fn fetch(&self, fresh: bool) -> Result<SuiteCollection, SourceError> {
        match self {
            DataSource::File(s) => s.fetch(fresh).await,
            DataSource::Http(s) => s.fetch(fresh).await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded(Arc<SuiteCollection>),
    Failed(SourceError),
}

#[derive(Debug, Default)]
struct LoaderInner {
    state: LoadState,
    /// What `state` was before the current run of loads started.
    before_loading: LoadState,
    generation: u64,
    pending: Option<CancellationToken>,
}

/// Puts the state back if a `load` future is dropped before it settles.
struct PendingLoad<'a> {
    inner: &'a Mutex<LoaderInner>,
    generation: u64,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.generation == self.generation && matches!(inner.state, LoadState::Loading) {
            debug!("load dropped before it finished");
            inner.pending = None;
            inner.state = std::mem::take(&mut inner.before_loading);
        }
    }
}

/// Holds the session's suite collection and the state of loading it.
///
/// Only the most recent `load` may publish its outcome: starting a new one
/// cancels the one in flight, which then returns [`SourceError::Superseded`].
/// Failures are never retried automatically; calling `load` again is the retry.
/// A `load` dropped before it settles leaves the state as it found it.
#[derive(Debug)]
pub struct SuiteLoader<S> {
    source: S,
    inner: Mutex<LoaderInner>,
}

impl<S: SuiteSource> SuiteLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            inner: Mutex::new(LoaderInner::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> LoadState {
        self.inner.lock().state.clone()
    }

    /// The loaded collection, if loading has completed successfully.
    pub fn current(&self) -> Option<Arc<SuiteCollection>> {
        match &self.inner.lock().state {
            LoadState::Loaded(c) => Some(c.clone()),
            _ => None,
        }
    }

    pub async fn load(&self, fresh: bool) -> Result<Arc<SuiteCollection>, SourceError> {
        let token = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock();
            if let Some(previous) = inner.pending.replace(token.clone()) {
                debug!("cancelling pending load");
                previous.cancel();
            }
            inner.generation += 1;
            if !matches!(inner.state, LoadState::Loading) {
                inner.before_loading = std::mem::replace(&mut inner.state, LoadState::Loading);
            }
            inner.generation
        };
        let _guard = PendingLoad {
            inner: &self.inner,
            generation,
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => return Err(SourceError::Superseded),
            r = self.source.fetch(fresh) => r,
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Err(SourceError::Superseded);
        }
        inner.pending = None;
        inner.before_loading = LoadState::Unloaded;
        match outcome {
            Ok(collection) => {
                info!("loaded {} suites", collection.suites.len());
                let collection = Arc::new(collection);
                inner.state = LoadState::Loaded(collection.clone());
                Ok(collection)
            }
            Err(e) => {
                warn!("loading test data failed: {e}");
                inner.state = LoadState::Failed(e.clone());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SAMPLE: &str = r#"{
        "sets": ["arrays"],
        "problems": {"arrays": ["countClumps"]},
        "test_cases": {
            "countClumps": [
                {"input": [[]], "output": 0},
                {"input": [[1, 1]], "output": 1}
            ],
            "fib": [{"input": [4], "output": 5}]
        }
    }"#;

    #[test]
    fn payload_keeps_order_and_shape() {
        let c = parse_payload(SAMPLE).unwrap();
        assert_eq!(c.sets, vec!["arrays"]);
        assert_eq!(c.problems_in("arrays").unwrap(), ["countClumps"]);
        assert_eq!(c.suites.keys().collect::<Vec<_>>(), ["countClumps", "fib"]);
        let clumps = c.suite("countClumps").unwrap();
        assert_eq!(clumps.cases[1].input, vec![json!([1, 1])]);
        assert_eq!(clumps.cases[1].expected, json!(1));
    }

    #[test]
    fn bad_shapes_are_malformed() {
        for text in [
            "not json",
            r#"{"sets": []}"#,
            r#"{"test_cases": {"f": [{"input": 3, "output": 1}]}}"#,
            r#"{"test_cases": {"f": [{"input": []}]}}"#,
        ] {
            assert!(
                matches!(parse_payload(text), Err(SourceError::Malformed(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn cache_bust_only_when_fresh() {
        let source = HttpSource::new("http://localhost/data.json?v=1", DEFAULT_FETCH_TIMEOUT)
            .unwrap();
        assert_eq!(source.request_url(false).as_str(), "http://localhost/data.json?v=1");
        let a = source.request_url(true);
        let b = source.request_url(true);
        assert!(a.query_pairs().any(|(k, _)| k == CACHE_BUST_PARAM));
        assert!(a.query_pairs().any(|(k, v)| k == "v" && v == "1"));
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        assert!(matches!(
            HttpSource::new("not a url", DEFAULT_FETCH_TIMEOUT),
            Err(SourceError::Config(_))
        ));
    }

    /// First fetch is slow, later ones are quick.
    struct SlowThenFast {
        calls: AtomicUsize,
    }

    impl SuiteSource for SlowThenFast {
        async fn fetch(&self, _fresh: bool) -> Result<SuiteCollection, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = if n == 0 { 2_000 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let mut c = parse_payload(SAMPLE)?;
            c.sets = vec![format!("call-{n}")];
            Ok(c)
        }
    }

    #[tokio::test]
    async fn newer_load_wins() {
        let loader = SuiteLoader::new(SlowThenFast {
            calls: AtomicUsize::new(0),
        });
        let (first, second) = tokio::join!(loader.load(false), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            loader.load(true).await
        });
        assert_eq!(first.unwrap_err(), SourceError::Superseded);
        assert_eq!(second.unwrap().sets, vec!["call-1"]);
        assert_eq!(loader.current().unwrap().sets, vec!["call-1"]);
    }

    #[tokio::test]
    async fn dropped_load_puts_state_back() {
        let loader = SuiteLoader::new(SlowThenFast {
            calls: AtomicUsize::new(0),
        });
        let abandoned = tokio::time::timeout(Duration::from_millis(50), loader.load(false)).await;
        assert!(abandoned.is_err());
        assert!(matches!(loader.state(), LoadState::Unloaded));
        assert!(loader.inner.lock().pending.is_none());

        assert_eq!(loader.load(false).await.unwrap().sets, vec!["call-1"]);
        let abandoned = tokio::time::timeout(Duration::from_millis(1), loader.load(true)).await;
        assert!(abandoned.is_err());
        assert_eq!(loader.current().unwrap().sets, vec!["call-1"]);
    }

    struct Failing;

    impl SuiteSource for Failing {
        async fn fetch(&self, _fresh: bool) -> Result<SuiteCollection, SourceError> {
            Err(SourceError::Status {
                code: 500,
                text: "Internal Server Error".into(),
            })
        }
    }

    #[tokio::test]
    async fn failure_leaves_no_collection() {
        let loader = SuiteLoader::new(Failing);
        assert!(matches!(loader.state(), LoadState::Unloaded));
        let err = loader.load(false).await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(loader.current().is_none());
        assert!(matches!(loader.state(), LoadState::Failed(SourceError::Status { code: 500, .. })));
    }
}
