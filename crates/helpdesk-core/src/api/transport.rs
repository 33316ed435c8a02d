//! HTTP transport used by the session guard.
//!
//! `Transport` is the seam between the guard and the network: the guard
//! decides *when* a request is sent and with which credentials, the transport
//! decides *how*. `HttpTransport` is the production implementation built on
//! reqwest with a cookie jar, so every call is credential-bearing.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_reqwest(), f)
    }
}

/// A file sent as the `file` field of a multipart form.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        Ok(Self {
            mime_type: guess_mime(&file_name).map(str::to_string),
            file_name,
            bytes,
        })
    }
}

fn guess_mime(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        "pdf" => Some("application/pdf"),
        "zip" => Some("application/zip"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    File(FilePart),
}

/// An outbound call, relative to the API base URL.
///
/// Requests are cheap to clone so the guard can hold on to one while it
/// waits for a refresh and send it again afterwards.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Bearer token attached by the session guard at dispatch time.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// `{}` as the body, for endpoints that expect JSON but take no fields.
    pub fn with_empty_object(mut self) -> Self {
        self.body = RequestBody::Json(serde_json::Value::Object(serde_json::Map::new()));
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_file(mut self, file: FilePart) -> Self {
        self.body = RequestBody::File(file);
        self
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes requests against the remote service.
///
/// Implementations return `Err` for every non-2xx status, classified with
/// [`ApiError::from_status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;

    /// Cookies currently held for the service, one `name=value; Path=...`
    /// line per cookie, if any.
    fn cookie_snapshot(&self) -> Option<String> {
        None
    }

    /// Seed the cookie jar from a snapshot taken in an earlier process.
    fn restore_cookies(&self, _snapshot: &str) {}
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client and the cookie jar are shared.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    jar: Arc<Jar>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid API URL {}: {}", base_url, e)))?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            base_url,
            jar,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&joined)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid URL {}: {}", joined, e)))
    }

    /// Paths a snapshot distinguishes, widest first. A cookie is recorded
    /// under the first scope that sees it.
    fn cookie_scopes() -> [&'static str; 2] {
        ["/", crate::auth::REFRESH_PATH]
    }

    fn cookie_pairs(&self, scope: &str) -> Vec<String> {
        let Some(header) = self.endpoint(scope).ok().and_then(|url| self.jar.cookies(&url)) else {
            return Vec::new();
        };
        header
            .to_str()
            .map(|h| {
                h.split("; ")
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(&request.path)?;
        debug!(method = %request.method, path = %request.path, "Sending request");

        let mut builder = self.client.request(request.method.as_reqwest(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::File(file) => {
                let mut part = Part::bytes(file.bytes).file_name(file.file_name);
                if let Some(ref mime) = file.mime_type {
                    part = part.mime_str(mime)?;
                }
                builder.multipart(Form::new().part("file", part))
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            Ok(ApiResponse::new(status.as_u16(), body.to_vec()))
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(path = %request.path, status = status.as_u16(), "Request failed");
            Err(ApiError::from_status(status, &body))
        }
    }

    fn cookie_snapshot(&self) -> Option<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut lines = Vec::new();
        for scope in Self::cookie_scopes() {
            for pair in self.cookie_pairs(scope) {
                if !seen.contains(&pair) {
                    lines.push(format!("{}; Path={}", pair, scope));
                    seen.push(pair);
                }
            }
        }
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    fn restore_cookies(&self, snapshot: &str) {
        let Ok(base) = Url::parse(&self.base_url) else {
            return;
        };
        for line in snapshot.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.jar.add_cookie_str(line, &base);
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new(&server.uri(), Duration::from_secs(5)).expect("transport")
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            HttpTransport::new("not a url", Duration::from_secs(1)),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("crash.LOG"), Some("text/plain"));
        assert_eq!(guess_mime("screenshot.jpeg"), Some("image/jpeg"));
        assert_eq!(guess_mime("archive.tar.zip"), Some("application/zip"));
        assert_eq!(guess_mime("Makefile"), None);
    }

    #[test]
    fn test_file_part_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let part = FilePart::from_path(&file).unwrap();
        assert_eq!(part.file_name, "report.pdf");
        assert_eq!(part.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(part.bytes, b"%PDF");
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let t = HttpTransport::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            t.endpoint("/api/v1/tickets").unwrap().as_str(),
            "http://localhost:8080/api/v1/tickets"
        );
        assert_eq!(
            t.endpoint("api/v1/categories").unwrap().as_str(),
            "http://localhost:8080/api/v1/categories"
        );
    }

    #[tokio::test]
    async fn test_sends_json_query_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tickets"))
            .and(query_param("page", "2"))
            .and(header("authorization", "Bearer abc"))
            .and(body_json(serde_json::json!({"title": "Printer"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "t1"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = ApiRequest::post("/api/v1/tickets")
            .with_json(&serde_json::json!({"title": "Printer"}))
            .unwrap()
            .with_query(vec![("page".to_string(), "2".to_string())]);
        request.bearer = Some("abc".to_string());

        let response = transport(&server).send(request).await.unwrap();
        assert_eq!(response.status, 201);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], "t1");
    }

    #[tokio::test]
    async fn test_maps_unauthorized_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tickets/stats"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = transport(&server)
            .send(ApiRequest::get("/api/v1/tickets/stats"))
            .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_cookies_are_carried_and_snapshotted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "access_token=a1; Path=/; HttpOnly")
                    .set_body_json(serde_json::json!({})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/categories"))
            .and(header("cookie", "access_token=a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server);
        t.send(ApiRequest::post("/api/v1/auth/login")).await.unwrap();
        t.send(ApiRequest::get("/api/v1/categories")).await.unwrap();

        assert_eq!(t.cookie_snapshot().as_deref(), Some("access_token=a1; Path=/"));
    }

    #[tokio::test]
    async fn test_snapshot_keeps_refresh_cookie_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "access_token=a1; Path=/; HttpOnly")
                    .append_header("set-cookie", "refresh_token=r1; Path=/api/v1/auth/refresh; HttpOnly")
                    .set_body_json(serde_json::json!({})),
            )
            .mount(&server)
            .await;

        let t = transport(&server);
        t.send(ApiRequest::post("/api/v1/auth/login")).await.unwrap();

        assert_eq!(
            t.cookie_snapshot().as_deref(),
            Some("access_token=a1; Path=/\nrefresh_token=r1; Path=/api/v1/auth/refresh")
        );
    }

    #[tokio::test]
    async fn test_restored_cookies_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tickets"))
            .and(header("cookie", "refresh_token=r9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server);
        t.restore_cookies("refresh_token=r9; Path=/");
        t.send(ApiRequest::get("/api/v1/tickets")).await.unwrap();
    }

    #[tokio::test]
    async fn test_restored_refresh_cookie_stays_on_refresh_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .and(header_regex("cookie", "refresh_token=r9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tickets"))
            .and(header("cookie", "access_token=a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server);
        t.restore_cookies("access_token=a1; Path=/\nrefresh_token=r9; Path=/api/v1/auth/refresh");
        t.send(ApiRequest::get("/api/v1/tickets")).await.unwrap();
        t.send(ApiRequest::post("/api/v1/auth/refresh")).await.unwrap();
    }

    #[tokio::test]
    async fn test_uploads_multipart_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tickets/t1/attachments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let request = ApiRequest::post("/api/v1/tickets/t1/attachments").with_file(FilePart {
            file_name: "log.txt".to_string(),
            mime_type: Some("text/plain".to_string()),
            bytes: b"boot failed".to_vec(),
        });
        transport(&server).send(request).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("filename=\"log.txt\""));
        assert!(body.contains("boot failed"));
    }
}
