//! HTTP downloads to disk with progress reporting.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Response};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("anticipy/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for all data sources.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Decides whether `filepath` must be (re)created, for downloads and
/// processing alike. Logs the decision.
///
/// Returns `true` when the file exists and `clobber` is not set, in which
/// case the caller keeps the existing file.
pub fn check_file_existence(filepath: &Path, clobber: bool) -> bool {
    let exists = filepath.exists();
    let action = match (exists, clobber) {
        (true, true) => "overwriting existing",
        (true, false) => "using existing",
        (false, _) => "creating new",
    };
    info!(
        "File {} {} and clobber set to {}, {} file.",
        filepath.display(),
        if exists { "exists" } else { "does not exist" },
        clobber,
        action
    );

    exists && !clobber
}

/// Fails with [`Error::RequestFailed`] when the response is not a success.
pub fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::RequestFailed {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

/// GETs `url` into `file_path`.
pub async fn download_url(client: &Client, url: &str, file_path: &Path) -> Result<PathBuf> {
    let response = ensure_success(client.get(url).send().await?)?;
    save_response(response, file_path).await
}

/// Streams a successful response to `file_path`.
///
/// Data goes to a temporary sibling first and is renamed once complete, so an
/// interrupted transfer never leaves a truncated file under the final name.
pub async fn save_response(response: Response, file_path: &Path) -> Result<PathBuf> {
    let parent = file_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let progress_bar = create_download_spinner(file_path);
    let total_size = response.content_length().unwrap_or(0);
    if total_size > 0 {
        progress_bar.set_length(total_size);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
        ) {
            progress_bar.set_style(style.progress_chars("=> "));
        }
    }

    let mut file = NamedTempFile::new_in(parent)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        progress_bar.set_position(downloaded);
    }
    file.persist(file_path).map_err(|e| e.error)?;

    progress_bar.finish_and_clear();
    debug!("Saved {} bytes to {}", downloaded, file_path.display());

    Ok(file_path.to_path_buf())
}

fn create_download_spinner(file_path: &Path) -> ProgressBar {
    let name = file_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let bar = ProgressBar::new_spinner().with_message(format!("Downloading {name}"));
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Canned answer for one request path, query string ignored.
    #[derive(Debug, Clone)]
    pub(crate) struct Route {
        pub path: String,
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl Route {
        pub fn new(path: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
            Route {
                path: path.to_string(),
                status,
                headers: Vec::new(),
                body: body.into(),
            }
        }

        pub fn header(mut self, name: &str, value: &str) -> Self {
            self.headers.push((name.to_string(), value.to_string()));
            self
        }
    }

    /// Serves `routes` on a local port and returns the base URL. Paths
    /// without a route answer 404.
    pub(crate) async fn serve(routes: Vec<Route>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 4096];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let target = head.split_whitespace().nth(1).unwrap_or("/");
                    let path = target.split('?').next().unwrap_or(target);
                    let route = routes
                        .iter()
                        .find(|route| route.path == path)
                        .cloned()
                        .unwrap_or_else(|| Route::new(path, 404, "not found"));

                    let mut response = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Length: {}\r\nConnection: close\r\n",
                        route.status,
                        route.body.len()
                    );
                    for (name, value) in &route.headers {
                        response.push_str(&format!("{name}: {value}\r\n"));
                    }
                    response.push_str("\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.write_all(&route.body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn should_download_and_report_failed_status() {
        let temp_dir = TempDir::new().unwrap();
        let base = serve(vec![Route::new("/data.nc", 200, "payload")]).await;
        let client = http_client().unwrap();
        let file_path = temp_dir.path().join("nested/data.nc");

        download_url(&client, &format!("{base}/data.nc"), &file_path)
            .await
            .unwrap();
        let gone = temp_dir.path().join("gone.nc");
        let missing = download_url(&client, &format!("{base}/gone.nc"), &gone).await;

        assert_eq!(fs::read(&file_path).unwrap(), b"payload");
        assert!(matches!(missing, Err(Error::RequestFailed { status: 404, .. })));
        assert!(!gone.exists());
    }

    #[test]
    fn should_skip_existing_file_without_clobber() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("raw.nc");
        fs::write(&file_path, b"data").unwrap();

        assert!(check_file_existence(&file_path, false));
        assert!(!check_file_existence(&file_path, true));
    }

    #[test]
    fn should_not_skip_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("raw.nc");

        assert!(!check_file_existence(&file_path, false));
        assert!(!check_file_existence(&file_path, true));
    }

    #[test]
    fn should_convert_spinner_to_progress_bar() {
        let temp_dir = TempDir::new().unwrap();
        let pb = create_download_spinner(&temp_dir.path().join("a.tif"));

        pb.set_length(1000);
        pb.set_position(500);

        assert_eq!(pb.length(), Some(1000));
        assert_eq!(pb.position(), 500);
        pb.finish_and_clear();
    }
}
