//! XNAT REST client.
//!
//! A thin wrapper over `reqwest` that knows how XNAT authenticates
//! (basic auth exchanged for a `JSESSIONID` cookie) and how it reports
//! results (HTTP status codes, `ResultSet` JSON listings). Every failure
//! caused by the server or the network surfaces as
//! [`XnatKitError::Xnat`], so callers can tell server trouble apart
//! from local errors.

pub mod archive_spec;
mod entities;
pub mod paths;

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use xnatkit_shared::{Result, XnatKitError, normalize_host};

pub use entities::ScanFields;

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("xnatkit/", env!("CARGO_PKG_VERSION"));

/// Default timeout in seconds for a single request.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Client options
// ---------------------------------------------------------------------------

/// Connection settings for an [`XnatClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// XNAT base URL, e.g. `https://xnat.example.org/xnat`.
    pub host: String,
    pub username: String,
    pub password: String,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// XnatClient
// ---------------------------------------------------------------------------

/// An authenticated connection to one XNAT server.
///
/// Open the server session with [`XnatClient::connect`] and release it
/// with [`XnatClient::disconnect`]. Requests in between ride on the
/// session cookie kept by the client's cookie store.
#[derive(Debug, Clone)]
pub struct XnatClient {
    http: Client,
    host: String,
    username: String,
    password: String,
}

/// `{"ResultSet": {"Result": [...]}}` envelope of XNAT listings.
#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(rename = "ResultSet")]
    result_set: ResultSet<T>,
}

#[derive(Debug, Deserialize)]
struct ResultSet<T> {
    #[serde(rename = "Result", default = "Vec::new")]
    result: Vec<T>,
}

impl XnatClient {
    /// Build a client. No request is sent until [`XnatClient::connect`].
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let host = normalize_host(&opts.host)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| XnatKitError::xnat(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            host,
            username: opts.username.clone(),
            password: opts.password.clone(),
        })
    }

    /// Base URL without trailing slash.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Absolute URL of a host-relative `/data/...` path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.host)
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Open a server session with basic auth. Returns the session token.
    #[instrument(skip_all, fields(host = %self.host, user = %self.username))]
    pub async fn connect(&self) -> Result<String> {
        let url = self.url(paths::JSESSION);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| XnatKitError::xnat(format!("{url}: {e}")))?;

        let response = expect_status(response, &url, &[StatusCode::OK])?;
        let token = response
            .text()
            .await
            .map_err(|e| XnatKitError::xnat(format!("{url}: failed to read body: {e}")))?;

        info!("session opened");
        Ok(token.trim().to_string())
    }

    /// Close the server session.
    #[instrument(skip_all, fields(host = %self.host))]
    pub async fn disconnect(&self) -> Result<()> {
        let url = self.url(paths::JSESSION);
        let response = self.send(self.http.delete(&url), &url).await?;
        expect_status(response, &url, &[StatusCode::OK, StatusCode::NO_CONTENT])?;
        info!("session closed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Generic verbs
    // -----------------------------------------------------------------------

    /// `GET` a path and return the HTTP status, whatever it is.
    ///
    /// Used for existence checks; only transport failures are errors.
    pub async fn resource_status(&self, path: &str) -> Result<u16> {
        let url = self.url(path);
        let response = self.send(self.http.get(&url), &url).await?;
        let status = response.status().as_u16();
        debug!(%url, status, "existence check");
        Ok(status)
    }

    /// Whether a path answers `200 OK`.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resource_status(path).await? == 200)
    }

    /// `PUT` a path with query parameters. Accepts 200 and 201.
    pub async fn put(&self, path: &str, query: &[(&str, &str)]) -> Result<u16> {
        self.call(Method::PUT, path, query).await
    }

    /// `POST` a path with query parameters. Accepts 200 and 201.
    pub async fn post(&self, path: &str, query: &[(&str, &str)]) -> Result<u16> {
        self.call(Method::POST, path, query).await
    }

    /// `DELETE` a path with query parameters. Accepts 200 and 201.
    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<u16> {
        self.call(Method::DELETE, path, query).await
    }

    /// Upload a local file as the request body (`inbody=true`).
    #[instrument(skip_all, fields(path = %path, file = %file.display()))]
    pub async fn put_file(&self, path: &str, file: &Path, query: &[(&str, &str)]) -> Result<u16> {
        let body = tokio::fs::read(file)
            .await
            .map_err(|e| XnatKitError::io(file, e))?;
        let size = body.len();

        let url = self.url(path);
        let request = self
            .http
            .put(&url)
            .query(query)
            .query(&[("inbody", "true")])
            .body(body);
        let response = self.send(request, &url).await?;
        let status = accept_created(response, &url)?;

        debug!(%url, size, status, "file uploaded");
        Ok(status)
    }

    /// Query a listing and deserialize its `ResultSet.Result` rows.
    pub async fn query<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let url = self.url(path);
        let request = self.http.get(&url).query(&[("format", "json")]).query(query);
        let response = self.send(request, &url).await?;
        let response = expect_status(response, &url, &[StatusCode::OK])?;

        let body = response
            .text()
            .await
            .map_err(|e| XnatKitError::xnat(format!("{url}: failed to read body: {e}")))?;
        let listing: Listing<T> = serde_json::from_str(&body)
            .map_err(|e| XnatKitError::parse(format!("{url}: unexpected listing: {e}")))?;

        Ok(listing.result_set.result)
    }

    /// `GET` a path and return the body as text.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        let response = self.send(self.http.get(&url), &url).await?;
        let response = expect_status(response, &url, &[StatusCode::OK])?;
        response
            .text()
            .await
            .map_err(|e| XnatKitError::xnat(format!("{url}: failed to read body: {e}")))
    }

    /// Stream a `GET` response body into `dest`. Returns the bytes written.
    #[instrument(skip_all, fields(path = %path, dest = %dest.display()))]
    pub async fn download(&self, path: &str, query: &[(&str, &str)], dest: &Path) -> Result<u64> {
        let url = self.url(path);
        let response = self.send(self.http.get(&url).query(query), &url).await?;
        let mut response = expect_status(response, &url, &[StatusCode::OK])?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| XnatKitError::io(dest, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| XnatKitError::xnat(format!("{url}: download interrupted: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| XnatKitError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| XnatKitError::io(dest, e))?;

        debug!(%url, written, "download complete");
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn call(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<u16> {
        let url = self.url(path);
        let request = self.http.request(method.clone(), &url).query(query);
        let response = self.send(request, &url).await?;
        let status = accept_created(response, &url)?;
        debug!(%method, %url, status, "request ok");
        Ok(status)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| XnatKitError::xnat(format!("{url}: {e}")))
    }
}

/// Accept 200 or 201, returning the status code.
fn accept_created(response: Response, url: &str) -> Result<u16> {
    let response = expect_status(response, url, &[StatusCode::OK, StatusCode::CREATED])?;
    Ok(response.status().as_u16())
}

fn expect_status(response: Response, url: &str, accepted: &[StatusCode]) -> Result<Response> {
    let status = response.status();
    if accepted.contains(&status) {
        Ok(response)
    } else {
        Err(XnatKitError::xnat_status(
            status.as_u16(),
            format!("{url}: unexpected response {status}"),
        ))
    }
}
