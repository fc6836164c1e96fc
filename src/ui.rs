// UI layer: console output, the spinner shown while Strava processes an
// upload, and the interactive `authorize` / `refresh` flows built on
// `dialoguer`.

use crate::api::{StravaClient, TokenResponse, UploadRequest, UploadStatus, DEFAULT_REDIRECT_URI};
use crate::config::{StravaConfig, ENV_CLIENT_ID, ENV_CLIENT_SECRET};
use crate::error::UploadError;
use crate::upload::{self, BatchReport, Progress, UploadOptions, UploadOutcome};
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const RULE: &str = "============================================================";

pub fn banner(title: &str) {
    println!("{}", RULE);
    println!("{}", title);
    println!("{}", RULE);
}

/// Spinner that follows an upload through creation and polling.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style);
        }
        Spinner { bar }
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for Spinner {
    fn started(&self, file: &Path) {
        self.bar.reset();
        self.bar.enable_steady_tick(Duration::from_millis(120));
        self.bar.set_message(format!("Uploading {}...", file.display()));
    }

    fn created(&self, upload: &UploadStatus) {
        self.bar.println(format!("Upload started (ID: {})", upload.id));
        self.bar.set_message("Waiting for Strava to process the file...");
    }

    fn polled(&self, upload: &UploadStatus, attempt: u32, max_attempts: u32) {
        let status = upload.status.as_deref().unwrap_or("processing");
        self.bar
            .set_message(format!("Status: {} (attempt {}/{})", status, attempt, max_attempts));
    }

    fn finished(&self) {
        self.bar.finish_and_clear();
    }
}

/// Upload a single file and print the result. Returns whether it worked.
pub fn run_single(client: &StravaClient, req: &UploadRequest, opts: &UploadOptions) -> bool {
    let spinner = Spinner::new();
    match upload::upload_file(client, req, opts, &spinner) {
        Ok(outcome) => {
            print_success(&outcome);
            true
        }
        Err(e) => {
            report_error(&e);
            false
        }
    }
}

/// Upload every match of `pattern`, then print the summary. Returns
/// whether every file went through.
pub fn run_multiple(
    client: &StravaClient,
    pattern: &str,
    activity_type: &str,
    opts: &UploadOptions,
) -> Result<bool> {
    let files = upload::expand_pattern(pattern)?;
    if files.is_empty() {
        println!("No files found matching: {}", pattern);
        return Ok(true);
    }
    println!("\nFound {} file(s) to upload", files.len());

    let spinner = Spinner::new();
    let report = upload::upload_multiple(client, files, activity_type, opts, &spinner);
    print_summary(&report);
    Ok(report.all_succeeded())
}

fn print_success(outcome: &UploadOutcome) {
    println!("\nUpload successful!");
    println!("Activity ID: {}", outcome.activity_id);
    println!("View at: {}", outcome.url);
}

pub fn print_summary(report: &BatchReport) {
    println!();
    banner("UPLOAD SUMMARY");
    println!("Successful: {}/{}", report.successful(), report.results.len());
    for (file, result) in &report.results {
        match result {
            Ok(outcome) => {
                println!("[OK] {}", file.display());
                println!("   -> {}", outcome.url);
            }
            Err(e) => println!("[FAIL] {} ({})", file.display(), e),
        }
    }
}

/// Print an error together with what the user can do about it.
pub fn report_error(err: &UploadError) {
    match err {
        UploadError::MissingToken => print_missing_token_help(),
        UploadError::Unauthorized(body) => {
            println!("\nUpload failed: Strava rejected the access token (HTTP 401).");
            if !body.is_empty() {
                println!("Response: {}", body);
            }
            println!("The token has probably expired or lacks the activity:write scope.");
            println!("Run `uploader refresh` to renew it, or `uploader authorize` to start over.");
        }
        UploadError::Rejected { status, body } => {
            println!("\nUpload failed: {}", status);
            println!("Response: {}", body);
        }
        UploadError::Processing(msg) => {
            println!("\nUpload error: {}", msg);
            println!("Check that the file is a valid activity file and not a duplicate.");
        }
        UploadError::Timeout { .. } => {
            println!("\n{}", err);
            println!("Upload timed out. Check Strava manually: https://www.strava.com/");
        }
        UploadError::Network(e) => println!("\nNetwork error: {}", e),
        other => println!("\nError: {}", other),
    }
}

pub fn print_missing_token_help() {
    println!("\nERROR: No Strava access token found!");
    println!("\nTo upload to Strava, you need to:");
    println!("1. Create a Strava API app at: https://www.strava.com/settings/api");
    println!("2. Get your access token (run `uploader authorize`)");
    println!("3. Either:");
    println!("   a) Set environment variable: STRAVA_ACCESS_TOKEN");
    println!("   b) Create strava_config.json with your credentials:");
    println!("      {{");
    println!("        \"client_id\": \"your_client_id\",");
    println!("        \"client_secret\": \"your_client_secret\",");
    println!("        \"access_token\": \"your_access_token\"");
    println!("      }}");
}

/// Pull the authorization code out of what the user pasted: either the
/// bare code, `code&state=...`, or the whole redirect URL.
pub fn extract_code(input: &str) -> String {
    let input = input.trim();
    let after = match input.find("code=") {
        Some(pos) => &input[pos + "code=".len()..],
        None => input,
    };
    after.split('&').next().unwrap_or_default().trim().to_string()
}

/// Interactive OAuth flow: collect client credentials, send the user to
/// Strava's consent page, exchange the returned code and save everything
/// to `config_path`.
pub fn authorize(client: &StravaClient, config_path: &Path) -> Result<()> {
    banner("STRAVA OAUTH TOKEN GENERATOR");

    let mut existing = StravaConfig::default();
    if config_path.exists() {
        println!("\nFound existing {}", config_path.display());
        let reuse = Confirm::new()
            .with_prompt("Use existing client ID and secret?")
            .default(true)
            .interact()?;
        if reuse {
            existing = StravaConfig::load(config_path)
                .with_context(|| format!("Reading {}", config_path.display()))?;
        }
    }

    if existing.client_id.trim().is_empty() {
        println!("\nFirst, create a Strava API app at:");
        println!("   https://www.strava.com/settings/api\n");
        existing.client_id = Input::new()
            .with_prompt("Enter your Client ID")
            .interact_text()?;
    }
    if existing.client_secret.trim().is_empty() {
        existing.client_secret = Password::new()
            .with_prompt("Enter your Client Secret")
            .interact()?;
    }
    let client_id = existing.client_id.trim().to_string();
    let client_secret = existing.client_secret.trim().to_string();

    let url = client.authorize_url(&client_id, DEFAULT_REDIRECT_URI)?;
    println!();
    banner("STEP 1: AUTHORIZE THE APP");
    println!("\n1. Visit this URL in your browser:\n");
    println!("{}", url);
    println!("\n2. Click 'Authorize' to grant permissions");
    println!("3. You'll be redirected to a URL like:");
    println!("   http://localhost/?state=&code=ABCDEF123456789...");
    println!("\n4. Paste that URL, or everything after 'code='");

    let pasted: String = Input::new()
        .with_prompt("Authorization code")
        .interact_text()?;
    let code = extract_code(&pasted);
    if code.is_empty() {
        anyhow::bail!("No authorization code given");
    }

    println!();
    banner("STEP 2: EXCHANGE CODE FOR TOKEN");
    let tokens = match client.exchange_code(&client_id, &client_secret, &code) {
        Ok(tokens) => tokens,
        Err(e) => {
            println!("\nError: Failed to get token ({})", e);
            println!("\nPossible issues:");
            println!("- Invalid authorization code (codes expire quickly)");
            println!("- Incorrect client ID or secret");
            println!("- Code already used (each code can only be used once)");
            return Err(e).context("Token exchange failed");
        }
    };

    let config = StravaConfig {
        client_id,
        client_secret,
        ..Default::default()
    };
    save_tokens(config, &tokens, config_path)?;
    println!("\nAccess Token:  {}", tokens.access_token);
    println!("Refresh Token: {}", tokens.refresh_token);
    println!("\nYou can now upload activities, e.g.:");
    println!("  uploader output/25_swimming.fit");
    Ok(())
}

/// Renew the access token with the stored refresh token.
pub fn refresh(client: &StravaClient, config_path: &Path) -> Result<()> {
    refresh_with(client, config_path, |key| std::env::var(key).ok())
}

/// Same as [`refresh`] with an injectable environment. The environment
/// only fills a missing client id/secret for the token request; the file
/// keeps its own fields and gets just the new tokens written back.
pub fn refresh_with<F>(client: &StravaClient, config_path: &Path, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let config = StravaConfig::load(config_path)
        .with_context(|| format!("Reading {}", config_path.display()))?;
    let refresh_token = config
        .refresh_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .context("No refresh_token in config; run `uploader authorize` first")?;

    let or_env = |value: &str, key: &str| match value.trim() {
        "" => env(key).unwrap_or_default(),
        v => v.to_string(),
    };
    let client_id = or_env(&config.client_id, ENV_CLIENT_ID);
    let client_secret = or_env(&config.client_secret, ENV_CLIENT_SECRET);
    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        anyhow::bail!("client_id and client_secret are required to refresh the token");
    }

    let tokens = client
        .refresh_access_token(&client_id, &client_secret, &refresh_token)
        .context("Refreshing access token")?;
    save_tokens(config, &tokens, config_path)?;
    Ok(())
}

/// Write the new tokens over `config` as loaded from disk.
fn save_tokens(mut config: StravaConfig, tokens: &TokenResponse, path: &Path) -> Result<()> {
    config.access_token = tokens.access_token.clone();
    config.refresh_token = Some(tokens.refresh_token.clone());
    config.expires_at = Some(tokens.expires_at);
    config
        .save(path)
        .with_context(|| format!("Writing {}", path.display()))?;
    info!(path = %path.display(), expires_at = tokens.expires_at, "stored new tokens");
    println!("\nSaved credentials to {}", path.display());
    println!("Access token expires at: {}", format_expiry(tokens.expires_at));
    Ok(())
}

/// Render a unix timestamp as UTC, falling back to the raw number.
pub fn format_expiry(expires_at: i64) -> String {
    match chrono::DateTime::from_timestamp(expires_at, 0) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => expires_at.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_from_any_paste() {
        assert_eq!(extract_code("abc123"), "abc123");
        assert_eq!(extract_code("  abc123&scope=read  "), "abc123");
        assert_eq!(
            extract_code("http://localhost/?state=&code=abc123&scope=read,activity:write"),
            "abc123"
        );
        assert_eq!(extract_code(""), "");
    }

    #[test]
    fn expiry_is_rendered_in_utc() {
        assert_eq!(format_expiry(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_expiry(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }
}
