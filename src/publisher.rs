//! Publication of archives as a release on a GitHub compatible host.

use crate::config::ReleaseConfig;
use crate::error::{Error, Result};
use crate::renderer::TemplateRenderer;
use log::{debug, info};
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// A release as returned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub upload_url: String,
    #[serde(default)]
    pub html_url: String,
}

/// The release to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

/// Operations the publisher needs from a release host.
pub trait ReleaseHost {
    fn find_release(&self, tag: &str) -> Result<Option<Release>>;
    /// Deletes the release and the tag it points at.
    fn delete_release(&self, release: &Release) -> Result<()>;
    fn create_release(&self, release: &NewRelease) -> Result<Release>;
    fn upload_asset(&self, release: &Release, name: &str, content: Vec<u8>) -> Result<()>;
}

/// GitHub REST v3 implementation of [`ReleaseHost`].
pub struct GithubHost {
    client: Client,
    api_url: Url,
    owner: String,
    repo: String,
    token: String,
}

impl GithubHost {
    pub fn new(config: &ReleaseConfig, token: String) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| Error::ConfigError(format!("invalid release.api_url: {e}")))?;
        let client = Client::builder()
            .user_agent(concat!("scriptpack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::PublishError(e.to_string()))?;
        Ok(Self { client, api_url, owner: config.owner.clone(), repo: config.repo.clone(), token })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/repos/{}/{}/{path}", self.owner, self.repo))
            .map_err(|e| Error::PublishError(format!("invalid endpoint: {e}")))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| Error::PublishError(format!("request failed: {e}")))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::PublishError(format!(
                "authentication failed ({})",
                response.status()
            ))),
            _ => Ok(response),
        }
    }

    fn expect_success(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        Err(Error::PublishError(format!("{action} failed with {status}: {body}")))
    }
}

/// Turns the hypermedia `upload_url` into a concrete asset upload URL.
pub fn asset_upload_url(upload_url: &str, name: &str) -> Result<Url> {
    let template = Regex::new(r"\{[^}]*\}").map_err(|e| Error::PublishError(e.to_string()))?;
    let mut url = Url::parse(&template.replace_all(upload_url, ""))
        .map_err(|e| Error::PublishError(format!("invalid upload url '{upload_url}': {e}")))?;
    url.query_pairs_mut().append_pair("name", name);
    Ok(url)
}

impl ReleaseHost for GithubHost {
    fn find_release(&self, tag: &str) -> Result<Option<Release>> {
        let url = self.endpoint(&format!("releases/tags/{tag}"))?;
        let response = self.send(self.client.get(url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "release lookup")?;
        let release = response.json().map_err(|e| Error::PublishError(e.to_string()))?;
        Ok(Some(release))
    }

    fn delete_release(&self, release: &Release) -> Result<()> {
        let url = self.endpoint(&format!("releases/{}", release.id))?;
        Self::expect_success(self.send(self.client.delete(url))?, "release deletion")?;

        let url = self.endpoint(&format!("git/refs/tags/{}", release.tag_name))?;
        let response = self.send(self.client.delete(url))?;
        // The tag may already be gone together with the release.
        if !matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY) {
            Self::expect_success(response, "tag deletion")?;
        }
        Ok(())
    }

    fn create_release(&self, release: &NewRelease) -> Result<Release> {
        let url = self.endpoint("releases")?;
        let response = self.send(self.client.post(url).json(release))?;
        Self::expect_success(response, "release creation")?
            .json()
            .map_err(|e| Error::PublishError(e.to_string()))
    }

    fn upload_asset(&self, release: &Release, name: &str, content: Vec<u8>) -> Result<()> {
        let url = asset_upload_url(&release.upload_url, name)?;
        let request = self.client.post(url).header("Content-Type", "application/zip").body(content);
        Self::expect_success(self.send(request)?, &format!("upload of '{name}'"))?;
        Ok(())
    }
}

/// Builds the release request from the configuration.
pub fn new_release(
    config: &ReleaseConfig,
    renderer: &dyn TemplateRenderer,
    version: &str,
    changelog: &str,
) -> Result<NewRelease> {
    let context = serde_json::json!({
        "changelog": changelog,
        "version": version,
        "tag": config.tag,
    });
    Ok(NewRelease {
        tag_name: config.tag.clone(),
        target_commitish: config.target_commitish.clone(),
        name: renderer.render(&config.name, &context)?,
        body: renderer.render(&config.body, &context)?,
        draft: false,
        prerelease: config.prerelease,
    })
}

/// Creates (or replaces, when `overwrite` is set) the release and uploads `assets`.
///
/// # Errors
/// * `Error::PublishError` if the release exists and `overwrite` is false,
///   an asset is missing, or the host rejects a request
pub fn publish(
    host: &dyn ReleaseHost,
    release: &NewRelease,
    overwrite: bool,
    assets: &[PathBuf],
) -> Result<Release> {
    for asset in assets {
        if !asset.is_file() {
            return Err(Error::PublishError(format!("asset '{}' does not exist", asset.display())));
        }
    }

    if let Some(existing) = host.find_release(&release.tag_name)? {
        if !overwrite {
            return Err(Error::PublishError(format!(
                "release '{}' already exists",
                release.tag_name
            )));
        }
        info!("Replacing existing release '{}'", release.tag_name);
        host.delete_release(&existing)?;
    }

    let created = host.create_release(release)?;
    debug!("Created release {} ({})", created.id, created.html_url);
    for asset in assets {
        let name = asset_name(asset);
        info!("Uploading {name}");
        host.upload_asset(&created, &name, fs::read(asset)?)?;
    }
    Ok(created)
}

fn asset_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
