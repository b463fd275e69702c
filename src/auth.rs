use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use url::Url;

pub const SCOPE: &str = "https://mail.google.com/";

// Treat a token as expired slightly early so a scan never starts with
// one about to lapse mid-run.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// The OAuth client file as downloaded from the Google Cloud console.
#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: InstalledApp,
}

#[derive(Debug, Clone, Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Cached token. Carries the client id/secret and token URI so a
/// refresh never needs the credentials file again.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    client_id: String,
    client_secret: String,
    token_uri: String,
}

impl StoredToken {
    fn is_usable(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expiry
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Returns a usable access token: from the cache, via a refresh, or
/// through a fresh installed-app consent flow, in that order. The
/// cache file is (re)written whenever a new token is obtained.
pub fn obtain(credentials_path: &Path, token_path: &Path) -> Result<StoredToken> {
    if let Some(token) = load_token(token_path) {
        if token.is_usable() {
            return Ok(token);
        }
        if let Some(refresh_token) = token.refresh_token.clone() {
            match refresh(&token, &refresh_token) {
                Ok(refreshed) => {
                    save_token(token_path, &refreshed)?;
                    return Ok(refreshed);
                }
                Err(err) => {
                    log::warn!("token refresh failed, starting a new consent flow: {:#}", err)
                }
            }
        }
    }
    let secrets = load_secrets(credentials_path)?;
    let token = consent_flow(&secrets.installed)?;
    save_token(token_path, &token)?;
    Ok(token)
}

fn load_token(path: &Path) -> Option<StoredToken> {
    let file = File::open(path).ok()?;
    match serde_json::from_reader(file) {
        Ok(token) => Some(token),
        Err(err) => {
            log::warn!("ignoring unreadable token cache {}: {}", path.display(), err);
            None
        }
    }
}

fn load_secrets(path: &Path) -> Result<ClientSecrets> {
    let file = File::open(path).with_context(|| {
        format!(
            "failed to open {}; download the OAuth client file from the Google Cloud console",
            path.display()
        )
    })?;
    serde_json::from_reader(file).with_context(|| format!("failed to parse {}", path.display()))
}

fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    #[cfg(unix)]
    set_private_permission(&file)?;
    serde_json::to_writer_pretty(file, token)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn set_private_permission(file: &File) -> io::Result<()> {
    let mut perms = file.metadata()?.permissions();
    let mode = (perms.mode() & !0o777) | 0o600;
    perms.set_mode(mode);
    file.set_permissions(perms)
}

/// Runs the installed-app flow: bind a loopback listener, send the
/// operator to the consent page, catch the redirect, exchange the code.
fn consent_flow(app: &InstalledApp) -> Result<StoredToken> {
    let server = tiny_http::Server::http("127.0.0.1:0")
        .map_err(|err| anyhow!("failed to bind loopback listener: {}", err))?;
    let port = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow!("loopback listener has no IP address"))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{}", port);

    let auth_url = Url::parse_with_params(
        &app.auth_uri,
        &[
            ("client_id", app.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .context("invalid authorization URI in the credentials file")?;
    eprintln!("Open this URL in your browser and grant access:");
    eprintln!("{}", auth_url);

    let code = wait_for_code(&server)?;
    let issued = Utc::now();
    let response: TokenResponse = ureq::post(&app.token_uri)
        .send_form(&[
            ("code", code.as_str()),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .context("token exchange failed")?
        .into_json()
        .context("malformed token response")?;
    Ok(StoredToken {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expiry: issued + Duration::seconds(response.expires_in),
        client_id: app.client_id.clone(),
        client_secret: app.client_secret.clone(),
        token_uri: app.token_uri.clone(),
    })
}

fn wait_for_code(server: &tiny_http::Server) -> Result<String> {
    loop {
        let request = server
            .recv()
            .context("failed to receive the OAuth redirect")?;
        let url = Url::parse(&format!("http://127.0.0.1{}", request.url()))
            .context("unparsable OAuth redirect")?;
        let mut code = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            let _ = request.respond(tiny_http::Response::from_string(
                "Access was denied. You can close this tab.",
            ));
            bail!("consent was denied: {}", error);
        }
        match code {
            Some(code) => {
                let _ = request.respond(tiny_http::Response::from_string(
                    "Authentication complete. You can close this tab.",
                ));
                return Ok(code);
            }
            // Browsers also ask for things like favicon.ico; keep
            // waiting for the actual redirect.
            None => {
                let _ = request
                    .respond(tiny_http::Response::from_string("").with_status_code(404));
            }
        }
    }
}

fn refresh(token: &StoredToken, refresh_token: &str) -> Result<StoredToken> {
    let issued = Utc::now();
    let response: TokenResponse = ureq::post(&token.token_uri)
        .send_form(&[
            ("refresh_token", refresh_token),
            ("client_id", token.client_id.as_str()),
            ("client_secret", token.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .context("token refresh request failed")?
        .into_json()
        .context("malformed token response")?;
    Ok(StoredToken {
        access_token: response.access_token,
        // Google omits the refresh token on refresh; keep the old one.
        refresh_token: response
            .refresh_token
            .or_else(|| Some(refresh_token.to_string())),
        expiry: issued + Duration::seconds(response.expires_in),
        client_id: token.client_id.clone(),
        client_secret: token.client_secret.clone(),
        token_uri: token.token_uri.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expiry,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_uri: default_token_uri(),
        }
    }

    #[test]
    fn test_is_usable() {
        assert!(token(Utc::now() + Duration::hours(1)).is_usable());
        assert!(!token(Utc::now()).is_usable());
        // Within the safety margin counts as expired.
        assert!(!token(Utc::now() + Duration::seconds(30)).is_usable());
    }

    #[test]
    fn test_token_roundtrip() {
        let original = token(Utc::now() + Duration::hours(1));
        let json = serde_json::to_string(&original).unwrap();
        let parsed: StoredToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.access_token, original.access_token);
        assert_eq!(parsed.refresh_token, original.refresh_token);
        assert_eq!(parsed.expiry, original.expiry);
        assert_eq!(parsed.token_uri, original.token_uri);
    }

    #[test]
    fn test_secrets_parsing() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "client_secret": "xyz",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let secrets: ClientSecrets = serde_json::from_str(json).unwrap();
        assert_eq!(secrets.installed.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.installed.token_uri, default_token_uri());
    }
}
