//! Climate Data Store retrieve API: submit a request, poll it, download the
//! result once the job has run.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    download::{download_url, ensure_success, http_client},
    error::{Error, Result},
};

pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
const URL_ENV: &str = "CDSAPI_URL";
const KEY_ENV: &str = "CDSAPI_KEY";
const RC_FILE: &str = ".cdsapirc";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// State of a submitted request as reported by the CDS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// Queued or running, with the raw status.
    Pending(String),
    Completed,
    /// Failed, rejected or dismissed, with the reason.
    Failed(String),
}

/// The three calls the request/poll loop needs.
#[async_trait]
pub trait CdsClient: Send + Sync {
    /// Submits `request` for `dataset` and returns the request id.
    async fn submit(&self, dataset: &str, request: &Value) -> Result<String>;

    async fn status(&self, request_id: &str) -> Result<RequestState>;

    /// Downloads the result of a completed request to `path`.
    async fn download(&self, request_id: &str, path: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct RcFile {
    url: Option<String>,
    key: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
}

/// Client for the CDS `retrieve/v1` REST API.
#[derive(Debug, Clone)]
pub struct HttpCdsClient {
    client: Client,
    url: String,
    key: String,
}

impl HttpCdsClient {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        Ok(HttpCdsClient {
            client: http_client()?,
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
        })
    }

    /// Credentials from `CDSAPI_URL` / `CDSAPI_KEY`, falling back to
    /// `~/.cdsapirc`.
    pub fn from_env() -> Result<Self> {
        if let Ok(key) = env::var(KEY_ENV) {
            let url = env::var(URL_ENV).unwrap_or_else(|_| DEFAULT_CDS_URL.to_string());
            return Self::new(url, key);
        }

        let rc_path = dirs::home_dir()
            .map(|home| home.join(RC_FILE))
            .filter(|path| path.is_file())
            .ok_or(Error::MissingEnv(KEY_ENV))?;
        let rc = parse_rc(&fs::read_to_string(&rc_path)?)?;
        debug!("Using CDS credentials from {}", rc_path.display());

        Self::new(rc.url.unwrap_or_else(|| DEFAULT_CDS_URL.to_string()), rc.key)
    }

    fn job_url(&self, request_id: &str) -> String {
        format!("{}/retrieve/v1/jobs/{request_id}", self.url)
    }
}

fn parse_rc(document: &str) -> Result<RcFile> {
    Ok(serde_yaml::from_str(document)?)
}

fn parse_state(status: &str) -> RequestState {
    match status {
        "successful" => RequestState::Completed,
        "failed" | "rejected" | "dismissed" => RequestState::Failed(format!("request {status}")),
        other => RequestState::Pending(other.to_string()),
    }
}

#[async_trait]
impl CdsClient for HttpCdsClient {
    async fn submit(&self, dataset: &str, request: &Value) -> Result<String> {
        let url = format!("{}/retrieve/v1/processes/{dataset}/execution", self.url);
        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.key)
            .json(&json!({ "inputs": request }))
            .send()
            .await?;
        let response = match ensure_success(response) {
            Err(Error::RequestFailed { status: 401 | 403, .. }) => {
                return Err(Error::Authentication(
                    "The CDS rejected the API key. Check CDSAPI_KEY or ~/.cdsapirc and \
                     that the dataset licence has been accepted."
                        .to_string(),
                ))
            }
            other => other?,
        };
        let job: JobStatus = response.json().await?;
        debug!("Submitted request {} with status {}", job.job_id, job.status);

        Ok(job.job_id)
    }

    async fn status(&self, request_id: &str) -> Result<RequestState> {
        let response = self
            .client
            .get(self.job_url(request_id))
            .header(TOKEN_HEADER, &self.key)
            .send()
            .await?;
        let job: JobStatus = ensure_success(response)?.json().await?;

        Ok(parse_state(&job.status))
    }

    async fn download(&self, request_id: &str, path: &Path) -> Result<PathBuf> {
        let response = self
            .client
            .get(format!("{}/results", self.job_url(request_id)))
            .header(TOKEN_HEADER, &self.key)
            .send()
            .await?;
        let results: JobResults = ensure_success(response)?.json().await?;

        download_url(&self.client, &results.asset.value.href, path).await
    }
}

/// A submitted request still waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub query: Value,
}

/// One file to retrieve and the query producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub filepath: PathBuf,
    pub query: Value,
}

/// Request handles on disk, keyed by target file, so that an interrupted
/// run picks up where it stopped instead of submitting again.
#[derive(Debug)]
struct PendingStore {
    path: PathBuf,
    requests: BTreeMap<PathBuf, PendingRequest>,
}

impl PendingStore {
    fn open(path: &Path) -> Result<Self> {
        let requests = if path.is_file() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(PendingStore {
            path: path.to_path_buf(),
            requests,
        })
    }

    fn save(&self) -> Result<()> {
        if self.requests.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.requests)?)?;
        Ok(())
    }
}

/// A request being polled, and whether its handle came from an earlier run.
#[derive(Debug)]
struct Outstanding {
    request_id: String,
    retrieval: Retrieval,
    resumed: bool,
}

async fn submit(
    client: &dyn CdsClient,
    dataset: &str,
    store: &mut PendingStore,
    retrieval: &Retrieval,
) -> Result<String> {
    debug!("Making request {}", retrieval.query);
    let request_id = client.submit(dataset, &retrieval.query).await?;
    store.requests.insert(
        retrieval.filepath.clone(),
        PendingRequest {
            request_id: request_id.clone(),
            query: retrieval.query.clone(),
        },
    );
    store.save()?;

    Ok(request_id)
}

/// Submits every retrieval (reusing a persisted handle when its query is
/// unchanged and `clobber` is not set), then polls every `poll_interval`
/// until all are downloaded. A failed request aborts the call.
///
/// A resumed handle the CDS no longer answers for is dropped and its query
/// submitted again. Authentication failures are never retried.
pub async fn retrieve_all(
    client: &dyn CdsClient,
    dataset: &str,
    retrievals: Vec<Retrieval>,
    pending_path: &Path,
    poll_interval: Duration,
    clobber: bool,
) -> Result<Vec<PathBuf>> {
    let mut store = PendingStore::open(pending_path)?;

    let mut outstanding = Vec::with_capacity(retrievals.len());
    for retrieval in retrievals {
        let resumable = match store.requests.get(&retrieval.filepath) {
            Some(pending) if clobber => {
                info!(
                    "Discarding request {} for {}, clobber set",
                    pending.request_id,
                    retrieval.filepath.display()
                );
                None
            }
            Some(pending) if pending.query == retrieval.query => Some(pending.request_id.clone()),
            _ => None,
        };
        let entry = match resumable {
            Some(request_id) => {
                info!("Resuming request {} for {}", request_id, retrieval.filepath.display());
                Outstanding {
                    request_id,
                    retrieval,
                    resumed: true,
                }
            }
            None => Outstanding {
                request_id: submit(client, dataset, &mut store, &retrieval).await?,
                retrieval,
                resumed: false,
            },
        };
        outstanding.push(entry);
    }

    let mut downloaded = Vec::new();
    while !outstanding.is_empty() {
        let mut still_pending = Vec::new();
        for entry in outstanding {
            let filepath = &entry.retrieval.filepath;
            let state = match client.status(&entry.request_id).await {
                Err(Error::RequestFailed { status, .. })
                    if entry.resumed && !matches!(status, 401 | 403) =>
                {
                    warn!(
                        "Stored request {} for {} is unknown to the CDS (status {}), submitting again",
                        entry.request_id,
                        filepath.display(),
                        status
                    );
                    store.requests.remove(filepath);
                    store.save()?;
                    let request_id = submit(client, dataset, &mut store, &entry.retrieval).await?;
                    still_pending.push(Outstanding {
                        request_id,
                        retrieval: entry.retrieval,
                        resumed: false,
                    });
                    continue;
                }
                other => other?,
            };
            match state {
                RequestState::Completed => {
                    client.download(&entry.request_id, filepath).await?;
                    store.requests.remove(filepath);
                    store.save()?;
                    downloaded.push(entry.retrieval.filepath);
                }
                RequestState::Failed(reason) => {
                    store.requests.remove(filepath);
                    store.save()?;
                    warn!("Request {} for {} failed", entry.request_id, filepath.display());
                    return Err(Error::RemoteTask {
                        request_id: entry.request_id,
                        reason,
                    });
                }
                RequestState::Pending(state) => {
                    debug!(
                        "For request {} and filename {}, state is {}",
                        entry.request_id,
                        filepath.display(),
                        state
                    );
                    still_pending.push(entry);
                }
            }
        }
        outstanding = still_pending;
        if !outstanding.is_empty() {
            tokio::time::sleep(poll_interval).await;
        }
    }

    Ok(downloaded)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory CDS: every request completes after `polls_until_done`
    /// status calls, unless its query asks for a failure. With
    /// `forget_unknown`, ids it did not hand out answer 404.
    #[derive(Default)]
    pub(crate) struct MockCds {
        pub polls_until_done: usize,
        pub forget_unknown: bool,
        pub submitted: Mutex<Vec<Value>>,
        pub status_calls: Mutex<BTreeMap<String, usize>>,
        pub payload: Vec<u8>,
    }

    #[async_trait]
    impl CdsClient for MockCds {
        async fn submit(&self, _dataset: &str, request: &Value) -> Result<String> {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(request.clone());
            Ok(format!("job-{}", submitted.len()))
        }

        async fn status(&self, request_id: &str) -> Result<RequestState> {
            let submitted = self.submitted.lock().unwrap().clone();
            let issued = (1..=submitted.len()).any(|n| format!("job-{n}") == request_id);
            if self.forget_unknown && !issued {
                return Err(Error::RequestFailed {
                    url: format!("jobs/{request_id}"),
                    status: 404,
                });
            }
            let failing = submitted
                .iter()
                .enumerate()
                .any(|(i, query)| format!("job-{}", i + 1) == request_id && query["fail"] == true);
            if failing {
                return Ok(RequestState::Failed("request failed".to_string()));
            }
            let mut calls = self.status_calls.lock().unwrap();
            let count = calls.entry(request_id.to_string()).or_insert(0);
            *count += 1;
            Ok(if *count > self.polls_until_done {
                RequestState::Completed
            } else {
                RequestState::Pending("running".to_string())
            })
        }

        async fn download(&self, _request_id: &str, path: &Path) -> Result<PathBuf> {
            fs::create_dir_all(path.parent().unwrap())?;
            fs::write(path, &self.payload)?;
            Ok(path.to_path_buf())
        }
    }

    fn retrieval(dir: &Path, name: &str, query: Value) -> Retrieval {
        Retrieval {
            filepath: dir.join(name),
            query,
        }
    }

    #[tokio::test]
    async fn should_poll_until_every_request_is_downloaded() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("pending_requests.json");
        let cds = MockCds {
            polls_until_done: 2,
            ..Default::default()
        };
        let retrievals = vec![
            retrieval(dir.path(), "a.grib", json!({"year": "2020"})),
            retrieval(dir.path(), "b.grib", json!({"year": "2021"})),
        ];

        let downloaded = retrieve_all(&cds, "cems", retrievals, &pending, Duration::ZERO, false)
            .await
            .unwrap();

        assert_eq!(downloaded.len(), 2);
        assert!(dir.path().join("a.grib").is_file());
        assert_eq!(cds.status_calls.lock().unwrap()["job-1"], 3);
        assert!(!pending.exists());
    }

    #[tokio::test]
    async fn should_abort_on_failed_request() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("pending_requests.json");
        let cds = MockCds::default();
        let retrievals = vec![retrieval(dir.path(), "a.grib", json!({"fail": true}))];

        let result = retrieve_all(&cds, "cems", retrievals, &pending, Duration::ZERO, false).await;

        assert!(matches!(result, Err(Error::RemoteTask { ref request_id, .. }) if request_id == "job-1"));
        assert!(!dir.path().join("a.grib").exists());
    }

    #[tokio::test]
    async fn should_resume_persisted_request() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("pending_requests.json");
        let query = json!({"year": "2020"});
        let mut store = PendingStore::open(&pending).unwrap();
        store.requests.insert(
            dir.path().join("a.grib"),
            PendingRequest {
                request_id: "job-7".to_string(),
                query: query.clone(),
            },
        );
        store.save().unwrap();
        let cds = MockCds::default();

        retrieve_all(
            &cds,
            "cems",
            vec![
                retrieval(dir.path(), "a.grib", query),
                retrieval(dir.path(), "b.grib", json!({"year": "2021"})),
            ],
            &pending,
            Duration::ZERO,
            false,
        )
        .await
        .unwrap();

        // only the second file needed a new request
        assert_eq!(cds.submitted.lock().unwrap().len(), 1);
        assert!(cds.status_calls.lock().unwrap().contains_key("job-7"));
        assert!(!pending.exists());
    }

    fn seed_pending(pending: &Path, filepath: PathBuf, request_id: &str, query: &Value) {
        let mut store = PendingStore::open(pending).unwrap();
        store.requests.insert(
            filepath,
            PendingRequest {
                request_id: request_id.to_string(),
                query: query.clone(),
            },
        );
        store.save().unwrap();
    }

    #[tokio::test]
    async fn should_resubmit_request_the_cds_no_longer_knows() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("pending_requests.json");
        let query = json!({"year": "2020"});
        seed_pending(&pending, dir.path().join("a.grib"), "expired-job", &query);
        let cds = MockCds {
            forget_unknown: true,
            payload: b"GRIB".to_vec(),
            ..Default::default()
        };

        let downloaded = retrieve_all(
            &cds,
            "cems",
            vec![retrieval(dir.path(), "a.grib", query.clone())],
            &pending,
            Duration::ZERO,
            false,
        )
        .await
        .unwrap();

        assert_eq!(downloaded, vec![dir.path().join("a.grib")]);
        assert_eq!(*cds.submitted.lock().unwrap(), vec![query]);
        assert_eq!(fs::read(dir.path().join("a.grib")).unwrap(), b"GRIB");
        assert!(!pending.exists());
    }

    #[tokio::test]
    async fn should_discard_persisted_request_when_clobbering() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("pending_requests.json");
        let query = json!({"year": "2020"});
        seed_pending(&pending, dir.path().join("a.grib"), "job-7", &query);
        let cds = MockCds::default();

        retrieve_all(
            &cds,
            "cems",
            vec![retrieval(dir.path(), "a.grib", query)],
            &pending,
            Duration::ZERO,
            true,
        )
        .await
        .unwrap();

        assert_eq!(cds.submitted.lock().unwrap().len(), 1);
        assert!(!cds.status_calls.lock().unwrap().contains_key("job-7"));
        assert!(!pending.exists());
    }

    #[test]
    fn should_map_job_status() {
        assert_eq!(parse_state("successful"), RequestState::Completed);
        assert_eq!(parse_state("running"), RequestState::Pending("running".to_string()));
        assert!(matches!(parse_state("rejected"), RequestState::Failed(_)));
    }

    #[test]
    fn should_parse_rc_file() {
        let rc = parse_rc("url: https://cds.example.org/api\nkey: abc-123\n").unwrap();

        assert_eq!(rc.url.as_deref(), Some("https://cds.example.org/api"));
        assert_eq!(rc.key, "abc-123");
    }
}
