use std::path::PathBuf;

use anyhow::{Context as _, bail};
use url::Url;

use crate::auth::FileTokenStore;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const SERVER_URL_ENV: &str = "HRCHAT_SERVER_URL";
pub const TOKEN_FILE_ENV: &str = "HRCHAT_TOKEN_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: Url,
    pub token_path: PathBuf,
}

/// One layer of overrides; flags and environment each produce one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub server_url: Option<String>,
    pub token_file: Option<PathBuf>,
}

pub fn env_overrides() -> SettingsOverrides {
    SettingsOverrides {
        server_url: env_non_empty(SERVER_URL_ENV),
        token_file: env_non_empty(TOKEN_FILE_ENV).map(PathBuf::from),
    }
}

/// Flag over environment over built-in default, resolved one slot at a time.
pub fn resolve_settings(
    flags: &SettingsOverrides,
    env: &SettingsOverrides,
) -> anyhow::Result<ClientSettings> {
    let raw_url = flags
        .server_url
        .clone()
        .or_else(|| env.server_url.clone())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

    let token_path = flags
        .token_file
        .clone()
        .or_else(|| env.token_file.clone())
        .unwrap_or_else(FileTokenStore::default_path);

    Ok(ClientSettings {
        server_url: parse_server_url(&raw_url)?,
        token_path,
    })
}

pub fn parse_server_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid server url `{raw}`"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        bail!("server url must use http or https, got `{}`", url.scheme());
    }
    Ok(url)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
