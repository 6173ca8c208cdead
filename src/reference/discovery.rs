//! Discovery of installable integration domains

use super::{ReferenceKind, Resolution, TrackedReference};
use crate::core::{TesterError, TesterResult};
use crate::di::traits::{ConfigProvider, SourceProvider};
use crate::github::types::{EntryKind, RepoInfo};
use std::collections::BTreeSet;

/// Manifest file declaring an integration
pub const MANIFEST_FILE: &str = "manifest.json";

/// Whether a repository is the core repository or a fork of it
pub fn is_core_repository(info: &RepoInfo, core_repository: &str) -> bool {
    info.full_name.eq_ignore_ascii_case(core_repository)
        || info
            .parent_full_name
            .as_deref()
            .is_some_and(|parent| parent.eq_ignore_ascii_case(core_repository))
}

/// Domains touched by a set of changed paths
///
/// The domain is the first path segment below `components_path`; files
/// directly inside `components_path` do not count.
pub fn domains_from_diff<'a>(
    paths: impl IntoIterator<Item = &'a String>,
    components_path: &str,
) -> BTreeSet<String> {
    let prefix = format!("{}/", components_path.trim_end_matches('/'));
    paths
        .into_iter()
        .filter_map(|path| {
            let rest = path.strip_prefix(&prefix)?;
            let (domain, _) = rest.split_once('/')?;
            (!domain.is_empty()).then(|| domain.to_string())
        })
        .collect()
}

/// Path of an integration inside the source tree
pub fn integration_path(config: &dyn ConfigProvider, core: bool, domain: &str) -> String {
    let base = if core {
        config.core_components_path()
    } else {
        config.custom_components_path()
    };
    format!("{}/{}", base.trim_end_matches('/'), domain)
}

/// Find the candidate domains of a resolved reference
///
/// Core repositories are only trackable through pull requests, whose changed
/// files name the candidates. Other repositories must carry exactly one
/// integration under the custom components path.
pub async fn discover(
    source: &dyn SourceProvider,
    config: &dyn ConfigProvider,
    reference: &TrackedReference,
    resolution: &Resolution,
    core: bool,
) -> TesterResult<BTreeSet<String>> {
    if core {
        let ReferenceKind::PullRequest(number) = reference.kind else {
            return Err(TesterError::CoreRequiresPullRequest(reference.to_string()));
        };
        let paths = source
            .get_pr_diff(&reference.owner, &reference.repo, number)
            .await?;
        let domains = domains_from_diff(&paths, config.core_components_path());
        if domains.is_empty() {
            return Err(TesterError::NoIntegrationInDiff(reference.to_string()));
        }
        tracing::debug!("{} touches {:?}", reference, domains);
        return Ok(domains);
    }

    let root = config.custom_components_path();
    let entries = source
        .list_directory(&reference.owner, &reference.repo, root, &resolution.commit_sha)
        .await
        .map_err(|e| match e {
            TesterError::NotFound(_) => {
                TesterError::ManifestNotFound(format!("{} has no {} directory", reference, root))
            }
            other => other,
        })?;

    for entry in entries.iter().filter(|e| e.kind == EntryKind::Dir) {
        let manifest_path = format!("{}/{}/{}", root, entry.name, MANIFEST_FILE);
        let Some(manifest) =
            read_manifest(source, reference, &manifest_path, &resolution.commit_sha).await?
        else {
            continue;
        };

        let domain = manifest
            .get("domain")
            .and_then(|d| d.as_str())
            .unwrap_or(&entry.name);
        if domain != entry.name {
            tracing::warn!(
                "Manifest domain '{}' differs from directory '{}'; using the directory",
                domain,
                entry.name
            );
        }
        tracing::debug!("Found integration {} in {}", entry.name, reference);

        return Ok(BTreeSet::from([entry.name.clone()]));
    }

    Err(TesterError::ManifestNotFound(format!(
        "no {} under {} in {}",
        MANIFEST_FILE, root, reference
    )))
}

/// Display name from the integration's manifest, if it has one
///
/// Best effort: any lookup failure yields `None`.
pub async fn integration_name(
    source: &dyn SourceProvider,
    config: &dyn ConfigProvider,
    reference: &TrackedReference,
    commit_sha: &str,
    core: bool,
    domain: &str,
) -> Option<String> {
    let manifest_path = format!("{}/{}", integration_path(config, core, domain), MANIFEST_FILE);
    match read_manifest(source, reference, &manifest_path, commit_sha).await {
        Ok(Some(manifest)) => manifest
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("No name for {}: {}", domain, e);
            None
        }
    }
}

/// Fetch and parse a manifest; a missing or unreadable one is `None`
async fn read_manifest(
    source: &dyn SourceProvider,
    reference: &TrackedReference,
    path: &str,
    commit_sha: &str,
) -> TesterResult<Option<serde_json::Value>> {
    let content = match source
        .get_file_content(&reference.owner, &reference.repo, path, commit_sha)
        .await
    {
        Ok(content) => content,
        Err(TesterError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable manifest {}: {}", path, e);
            Ok(None)
        }
    }
}
