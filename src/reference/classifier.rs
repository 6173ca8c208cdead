//! Purely syntactic URL classification

use super::{ReferenceKind, TrackedReference};
use crate::core::{TesterError, TesterResult};
use regex::Regex;

/// `[https://][www.]github.com/<owner>/<repo>`
const REPO_PREFIX: &str =
    r"^(?:https?://)?(?:www\.)?github\.com/(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+?)";

/// Classify a GitHub URL into a tracked reference
///
/// Accepted shapes: the repository itself (default branch), `/tree/<branch>`,
/// `/pull/<number>` and `/commit/<sha>`, each with an optional trailing slash.
/// Branch names may contain `/`. Owner and repository keep their case; the
/// commit hash is lowercased.
pub fn classify(url: &str) -> TesterResult<TrackedReference> {
    let url = url.trim();

    let shapes: [(&str, fn(&regex::Captures) -> Option<ReferenceKind>); 4] = [
        (r"(?:\.git)?/?$", |_| Some(ReferenceKind::DefaultBranch)),
        (r"/tree/(?P<branch>.+?)/?$", |caps| {
            Some(ReferenceKind::Branch(caps.name("branch")?.as_str().to_string()))
        }),
        (r"/pull/(?P<number>\d+)/?$", |caps| {
            caps.name("number")?
                .as_str()
                .parse()
                .ok()
                .map(ReferenceKind::PullRequest)
        }),
        (r"/commit/(?P<sha>[0-9a-fA-F]{7,40})/?$", |caps| {
            Some(ReferenceKind::Commit(caps.name("sha")?.as_str().to_lowercase()))
        }),
    ];

    for (suffix, build) in shapes {
        let re = Regex::new(&format!("{}{}", REPO_PREFIX, suffix))
            .map_err(|e| TesterError::Config(format!("Invalid regex: {}", e)))?;

        let Some(caps) = re.captures(url) else {
            continue;
        };

        let (Some(owner), Some(repo)) = (caps.name("owner"), caps.name("repo")) else {
            continue;
        };

        if let Some(kind) = build(&caps) {
            return Ok(TrackedReference::new(owner.as_str(), repo.as_str(), kind));
        }
    }

    Err(TesterError::InvalidUrlFormat(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_default_branch() {
        for url in [
            "https://github.com/Owner/Repo",
            "https://github.com/Owner/Repo/",
            "http://www.github.com/Owner/Repo",
            "github.com/Owner/Repo",
            "https://github.com/Owner/Repo.git",
        ] {
            let reference = classify(url).unwrap();
            assert_eq!(reference.owner, "Owner", "{}", url);
            assert_eq!(reference.repo, "Repo", "{}", url);
            assert_eq!(reference.kind, ReferenceKind::DefaultBranch, "{}", url);
        }
    }

    #[test]
    fn test_classify_branch_with_slashes() {
        let reference = classify("https://github.com/owner/repo/tree/feature/new-thing/").unwrap();
        assert_eq!(
            reference.kind,
            ReferenceKind::Branch("feature/new-thing".to_string())
        );
    }

    #[test]
    fn test_classify_pull_request() {
        let reference = classify("https://github.com/home-assistant/core/pull/42").unwrap();
        assert_eq!(reference.owner, "home-assistant");
        assert_eq!(reference.repo, "core");
        assert_eq!(reference.kind, ReferenceKind::PullRequest(42));
    }

    #[test]
    fn test_classify_commit_lowercases_sha() {
        let reference =
            classify("https://github.com/owner/repo/commit/ABCDEF0123456789ABCDEF0123456789ABCDEF01")
                .unwrap();
        assert_eq!(
            reference.kind,
            ReferenceKind::Commit("abcdef0123456789abcdef0123456789abcdef01".to_string())
        );
    }

    #[test]
    fn test_classify_rejects_other_shapes() {
        for url in [
            "",
            "not a url",
            "https://gitlab.com/owner/repo",
            "https://github.com/owner",
            "https://github.com/owner/repo/issues/3",
            "https://github.com/owner/repo/pull/abc",
            "https://github.com/owner/repo/commit/xyz",
            "https://github.com/owner/repo/tree/",
            "https://github.com/owner/repo/blob/main/README.md",
        ] {
            assert!(
                matches!(classify(url), Err(TesterError::InvalidUrlFormat(_))),
                "{} should be rejected",
                url
            );
        }
    }
}
