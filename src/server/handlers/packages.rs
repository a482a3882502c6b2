// src/server/handlers/packages.rs
//! Package endpoints: lookup, search, updates, download, push, delete
//!
//! Lists in query strings are pipe-separated, the way NuGet clients send
//! them (`packageIds=A|B&versions=1.0|2.0`).

use crate::error::Error;
use crate::framework::Framework;
use crate::package::{DependencyGroup, PackageIdentity, PackageRecord, package_file_name};
use crate::repository::{SearchOptions, UpdateRequest};
use crate::server::ServerState;
use crate::server::error::ApiResult;
use crate::version::{NuGetVersion, VersionRange};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Package metadata as returned by the API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub id: String,
    pub version: String,
    pub normalized_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub authors: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_client_version: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
    pub supported_frameworks: Vec<Framework>,
    pub package_hash: String,
    pub package_hash_algorithm: String,
    pub package_size: u64,
    pub last_updated: DateTime<Utc>,
    pub published: DateTime<Utc>,
    pub listed: bool,
    pub is_latest_version: bool,
    pub is_absolute_latest_version: bool,
    pub is_prerelease: bool,
    pub is_semver2: bool,
    pub require_license_acceptance: bool,
    pub development_dependency: bool,
    pub download_url: String,
}

impl From<&PackageRecord> for PackageMetadata {
    fn from(record: &PackageRecord) -> Self {
        let normalized_version = record.version.to_normalized_string();
        Self {
            download_url: format!("/api/v2/package/{}/{}", record.id, normalized_version),
            id: record.id.clone(),
            version: record.version.to_full_string(),
            normalized_version,
            title: record.title.clone(),
            authors: record.authors.clone(),
            owners: record.owners.clone(),
            description: record.description.clone(),
            summary: record.summary.clone(),
            release_notes: record.release_notes.clone(),
            tags: record.tags.clone(),
            icon_url: record.icon_url.clone(),
            license_url: record.license_url.clone(),
            license_expression: record.license_expression.clone(),
            project_url: record.project_url.clone(),
            copyright: record.copyright.clone(),
            language: record.language.clone(),
            min_client_version: record.min_client_version.clone(),
            dependency_groups: record.dependency_groups.clone(),
            supported_frameworks: record.supported_frameworks.clone(),
            package_hash: record.package_hash.clone(),
            package_hash_algorithm: record.package_hash_algorithm.clone(),
            package_size: record.package_size,
            last_updated: record.last_updated,
            published: record.published,
            listed: record.listed,
            is_latest_version: record.is_latest_version,
            is_absolute_latest_version: record.is_absolute_latest_version,
            is_prerelease: record.is_prerelease(),
            is_semver2: record.is_semver2(),
            require_license_acceptance: record.require_license_acceptance,
            development_dependency: record.development_dependency,
        }
    }
}

fn to_metadata(records: &[Arc<PackageRecord>]) -> Vec<PackageMetadata> {
    records.iter().map(|r| PackageMetadata::from(r.as_ref())).collect()
}

fn not_found(id: &str, version: &str) -> Error {
    Error::PackageNotFound {
        id: id.to_string(),
        version: version.to_string(),
    }
}

/// Non-empty, trimmed entries of a pipe-separated list
fn split_list(value: Option<&str>) -> Vec<&str> {
    value
        .unwrap_or_default()
        .split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_frameworks(value: Option<&str>) -> ApiResult<Vec<Framework>> {
    split_list(value).into_iter().map(Framework::parse).collect()
}

/// SemVer 2.0 packages are only shown to clients that announce 2.0.0+
fn allows_semver2(level: Option<&str>) -> bool {
    level
        .and_then(|level| NuGetVersion::parse(level).ok())
        .is_some_and(|level| level >= NuGetVersion::new(2, 0, 0))
}

/// GET /api/v2/packages/:id
///
/// Default version of a package: the highest listed stable version, or the
/// highest listed prerelease when there is no stable one.
pub async fn get_package(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PackageMetadata>> {
    let record = state
        .repository
        .find_package(&id)
        .await?
        .ok_or_else(|| not_found(&id, "latest"))?;
    Ok(Json(PackageMetadata::from(record.as_ref())))
}

/// GET /api/v2/packages/:id/versions
pub async fn get_package_versions(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PackageMetadata>>> {
    let records = state.repository.find_packages_by_id(&id).await?;
    Ok(Json(to_metadata(&records)))
}

/// GET /api/v2/packages/:id/:version
pub async fn get_package_version(
    State(state): State<Arc<ServerState>>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<PackageMetadata>> {
    let parsed = NuGetVersion::parse(&version)?;
    let record = state
        .repository
        .find_package_version(&id, &parsed)
        .await?
        .ok_or_else(|| not_found(&id, &version))?;
    Ok(Json(PackageMetadata::from(record.as_ref())))
}

/// GET /api/v2/package/:id/:version
///
/// Streams the package archive.
pub async fn download_package(
    State(state): State<Arc<ServerState>>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    use tokio::fs::File;
    use tokio_util::io::ReaderStream;

    let parsed = NuGetVersion::parse(&version)?;
    let record = state
        .repository
        .find_package_version(&id, &parsed)
        .await?
        .ok_or_else(|| not_found(&id, &version))?;

    let file = match File::open(&record.full_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                "Cached package {} {} is missing on disk: {}",
                record.id,
                record.version,
                record.full_path.display()
            );
            return Err(not_found(&id, &version));
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();
    let filename = package_file_name(&record.id, &record.version).to_lowercase();

    tracing::debug!("Serving {} ({} bytes)", filename, length);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Error::Task(format!("failed to build response: {}", e)))
}

/// Query parameters for search
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub target_framework: Option<String>,
    #[serde(default)]
    pub include_prerelease: bool,
    #[serde(default)]
    pub include_delisted: bool,
    pub sem_ver_level: Option<String>,
    #[serde(default)]
    pub skip: usize,
    pub take: Option<usize>,
}

/// GET /api/v2/search
pub async fn search(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<PackageMetadata>>> {
    let options = SearchOptions {
        term: params.q,
        target_frameworks: parse_frameworks(params.target_framework.as_deref())?,
        include_prerelease: params.include_prerelease,
        include_delisted: params.include_delisted,
        allow_semver2: allows_semver2(params.sem_ver_level.as_deref()),
    };

    let results = state.repository.search(&options).await?;
    let page: Vec<PackageMetadata> = results
        .iter()
        .skip(params.skip)
        .take(params.take.unwrap_or(usize::MAX))
        .map(|r| PackageMetadata::from(r.as_ref()))
        .collect();
    Ok(Json(page))
}

/// Query parameters for update checks
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesParams {
    pub package_ids: String,
    pub versions: String,
    #[serde(default)]
    pub include_prerelease: bool,
    #[serde(default)]
    pub include_all_versions: bool,
    pub target_frameworks: Option<String>,
    pub version_constraints: Option<String>,
    pub sem_ver_level: Option<String>,
}

impl UpdatesParams {
    /// Build the core request; `None` when ids and versions don't line up.
    ///
    /// An unparsable version or constraint rejects the whole request so
    /// the aligned lists can never shift against each other.
    fn into_request(self) -> ApiResult<Option<UpdateRequest>> {
        let ids = split_list(Some(&self.package_ids));
        let versions = split_list(Some(&self.versions));
        if ids.len() != versions.len() {
            return Ok(None);
        }

        let packages = ids
            .into_iter()
            .zip(versions)
            .map(|(id, version)| NuGetVersion::parse(version).map(|v| PackageIdentity::new(id, v)))
            .collect::<ApiResult<Vec<_>>>()?;

        // Empty entries mean "no constraint" for that position
        let version_constraints = match self.version_constraints.as_deref() {
            Some(value) if !value.trim().is_empty() => value
                .split('|')
                .map(str::trim)
                .map(|item| {
                    if item.is_empty() {
                        Ok(None)
                    } else {
                        VersionRange::parse(item).map(Some).map_err(|e| {
                            Error::InvalidRequest(format!("bad version constraint '{}': {}", item, e))
                        })
                    }
                })
                .collect::<ApiResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Some(UpdateRequest {
            packages,
            version_constraints,
            target_frameworks: parse_frameworks(self.target_frameworks.as_deref())?,
            include_prerelease: self.include_prerelease,
            include_all_versions: self.include_all_versions,
            allow_semver2: allows_semver2(self.sem_ver_level.as_deref()),
        }))
    }
}

/// GET /api/v2/updates
pub async fn get_updates(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<UpdatesParams>,
) -> ApiResult<Json<Vec<PackageMetadata>>> {
    let Some(request) = params.into_request()? else {
        return Ok(Json(Vec::new()));
    };
    let results = state.repository.get_updates(&request).await?;
    Ok(Json(to_metadata(&results)))
}

/// PUT /api/v2/package
///
/// Body is the raw `.nupkg` archive.
pub async fn push_package(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if body.is_empty() {
        return Err(Error::InvalidPackage("empty request body".to_string()));
    }

    let record = state.repository.add_package_bytes(body.to_vec()).await?;
    tracing::info!("Pushed {} {}", record.id, record.version);
    Ok((StatusCode::CREATED, Json(PackageMetadata::from(record.as_ref()))))
}

/// DELETE /api/v2/package/:id/:version
///
/// Deletes the package, or delists it when delisting is enabled.
pub async fn delete_package(
    State(state): State<Arc<ServerState>>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let parsed = NuGetVersion::parse(&version)?;
    state.repository.remove_package(&id, &parsed).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v2/package/:id/:version
///
/// Relists a delisted package.
pub async fn relist_package(
    State(state): State<Arc<ServerState>>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let parsed = NuGetVersion::parse(&version)?;
    state.repository.relist_package(&id, &parsed).await?;
    Ok(StatusCode::OK)
}
