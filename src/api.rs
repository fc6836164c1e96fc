// API client module: a small blocking HTTP client for Strava's upload
// endpoints and its OAuth token endpoint.

use crate::error::{Result, UploadError};
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_OAUTH_URL: &str = "https://www.strava.com/oauth";
pub const ACTIVITY_URL: &str = "https://www.strava.com/activities";
pub const OAUTH_SCOPE: &str = "activity:write,activity:read_all";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Blocking client holding the reqwest client, the two Strava base URLs
/// and the bearer token for upload calls.
#[derive(Clone)]
pub struct StravaClient {
    client: Client,
    api_url: String,
    oauth_url: String,
    token: Option<String>,
}

/// File plus metadata for one upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: PathBuf,
    pub name: Option<String>,
    pub description: Option<String>,
    pub activity_type: String,
}

impl UploadRequest {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        UploadRequest {
            file: file.into(),
            name: None,
            description: None,
            activity_type: "Swim".into(),
        }
    }
}

/// Strava's upload resource, returned by both the create and the status
/// endpoints. `activity_id` appears once processing is done.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UploadStatus {
    pub id: u64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub activity_id: Option<u64>,
}

/// Response of the OAuth token endpoint for both grant types.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl StravaClient {
    /// Create a client for the public Strava endpoints, or the ones named
    /// by `STRAVA_API_URL` / `STRAVA_OAUTH_URL` when set.
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("STRAVA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let oauth_url =
            std::env::var("STRAVA_OAUTH_URL").unwrap_or_else(|_| DEFAULT_OAUTH_URL.into());
        Self::new(&api_url, &oauth_url)
    }

    pub fn new(api_url: &str, oauth_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("strava-uploader/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(StravaClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            oauth_url: oauth_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Store the access token for subsequent upload calls.
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(UploadError::MissingToken)?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| UploadError::Config("access token contains invalid characters".into()))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Start an upload: multipart POST to `/uploads`. Strava replies 201
    /// with the upload resource before processing finishes.
    pub fn create_upload(&self, req: &UploadRequest) -> Result<UploadStatus> {
        let url = format!("{}/uploads", self.api_url);
        let bytes = std::fs::read(&req.file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => UploadError::FileNotFound(req.file.clone()),
            _ => UploadError::Io(e),
        })?;
        let file_name = req
            .file
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("activity.fit")
            .to_string();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let mut form = multipart::Form::new()
            .text("data_type", data_type_for(&req.file))
            .text("activity_type", req.activity_type.clone());
        if let Some(name) = &req.name {
            form = form.text("name", name.clone());
        }
        if let Some(description) = &req.description {
            form = form.text("description", description.clone());
        }
        let form = form.part("file", part);

        info!(file = %req.file.display(), "uploading to strava");
        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .multipart(form)
            .send()?;
        let status: UploadStatus = check(res)?.json()?;
        debug!(upload_id = status.id, status = ?status.status, "upload created");
        Ok(status)
    }

    /// Current state of an upload started by `create_upload`.
    pub fn upload_status(&self, upload_id: u64) -> Result<UploadStatus> {
        let url = format!("{}/uploads/{}", self.api_url, upload_id);
        let res = self.client.get(&url).headers(self.auth_headers()?).send()?;
        Ok(check(res)?.json()?)
    }

    /// URL the user opens in a browser to grant the app upload access.
    pub fn authorize_url(&self, client_id: &str, redirect_uri: &str) -> Result<Url> {
        let base = format!("{}/authorize", self.oauth_url);
        Url::parse_with_params(
            &base,
            &[
                ("client_id", client_id),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("approval_prompt", "force"),
                ("scope", OAUTH_SCOPE),
            ],
        )
        .map_err(|e| UploadError::Config(format!("bad OAuth URL {}: {}", base, e)))
    }

    /// Trade a one-time authorization code for tokens.
    pub fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("grant_type", "authorization_code"),
        ])
    }

    /// Trade a refresh token for a fresh access token.
    pub fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
    }

    fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = format!("{}/token", self.oauth_url);
        let res = self.client.post(&url).form(form).send()?;
        Ok(check(res)?.json()?)
    }
}

/// Turn a non-success response into the matching error, keeping the body.
fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(UploadError::Unauthorized(body));
    }
    Err(UploadError::Rejected { status, body })
}

/// Strava `data_type` for a file, from its extension. Unknown extensions
/// are sent as `fit`.
pub fn data_type_for(path: &Path) -> &'static str {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    const KNOWN: [&str; 6] = ["fit.gz", "tcx.gz", "gpx.gz", "fit", "tcx", "gpx"];
    KNOWN
        .into_iter()
        .find(|ext| name.ends_with(&format!(".{}", ext)))
        .unwrap_or("fit")
}

pub fn activity_url(activity_id: u64) -> String {
    format!("{}/{}", ACTIVITY_URL, activity_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_follows_extension() {
        assert_eq!(data_type_for(Path::new("out/25_swimming.fit")), "fit");
        assert_eq!(data_type_for(Path::new("ride.GPX")), "gpx");
        assert_eq!(data_type_for(Path::new("run.tcx.gz")), "tcx.gz");
        assert_eq!(data_type_for(Path::new("swim.fit.gz")), "fit.gz");
        assert_eq!(data_type_for(Path::new("export.bin")), "fit");
        assert_eq!(data_type_for(Path::new("gpx")), "fit");
    }

    #[test]
    fn authorize_url_carries_scope_and_client() {
        let client = StravaClient::new(DEFAULT_API_URL, DEFAULT_OAUTH_URL).unwrap();
        let url = client.authorize_url("12345", DEFAULT_REDIRECT_URI).unwrap();
        assert_eq!(url.path(), "/oauth/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "12345".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("approval_prompt".into(), "force".into())));
        assert!(pairs.contains(&("scope".into(), OAUTH_SCOPE.into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost".into())));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = StravaClient::new("http://127.0.0.1:9/api/v3/", "http://127.0.0.1:9/oauth/")
            .unwrap();
        assert_eq!(client.api_url, "http://127.0.0.1:9/api/v3");
        assert_eq!(client.oauth_url, "http://127.0.0.1:9/oauth");
    }

    #[test]
    fn upload_without_token_is_refused() {
        let client = StravaClient::new(DEFAULT_API_URL, DEFAULT_OAUTH_URL).unwrap();
        let err = client.upload_status(1).unwrap_err();
        assert!(matches!(err, UploadError::MissingToken));
    }

    #[test]
    fn upload_status_parses_partial_resource() {
        let json = r#"{"id":16486788,"id_str":"16486788","external_id":null,
            "error":null,"status":"Your activity is still being processed.","activity_id":null}"#;
        let status: UploadStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.id, 16486788);
        assert!(status.activity_id.is_none());
        assert!(status.error.is_none());
    }
}
