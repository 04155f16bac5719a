//! Repository-aware link shortening and shorthand references.
//!
//! Autolinked GitHub, GitLab and Bitbucket URLs are displayed in their short
//! form (`owner/repo#12`), and shorthand references typed in prose
//! (`@user`, `owner/repo!3`) become links to GitHub.

use url::Url;

use crate::util::html::escape_html;

use super::rewrite::Segment;

const COMMIT_DISPLAY_LEN: usize = 7;
const MIN_SHA_LEN: usize = 7;
const MAX_SHA_LEN: usize = 40;
const GITHUB: &str = "https://github.com";

/// Top-level GitHub paths that are not user names.
const RESERVED_USER_PATHS: [&str; 12] = [
    "about",
    "explore",
    "features",
    "issues",
    "login",
    "marketplace",
    "notifications",
    "orgs",
    "pricing",
    "pulls",
    "settings",
    "topics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl Provider {
    fn from_host(host: &str) -> Option<Self> {
        match host.trim_start_matches("www.") {
            "github.com" => Some(Self::GitHub),
            "gitlab.com" => Some(Self::GitLab),
            "bitbucket.org" => Some(Self::Bitbucket),
            _ => None,
        }
    }

    fn class(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::GitLab => "GitLab",
            Self::Bitbucket => "Bitbucket",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Mention,
    Repository,
    Issue,
    Pull,
    Commit,
    Compare,
    Discussion,
}

impl LinkKind {
    fn class(self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Repository => "repository",
            Self::Issue => "issue",
            Self::Pull => "pull",
            Self::Commit => "commit",
            Self::Compare => "compare",
            Self::Discussion => "discussion",
        }
    }

    fn title(self, provider: Provider) -> &'static str {
        match (self, provider) {
            (Self::Mention, _) => "User",
            (Self::Repository, _) => "Repository",
            (Self::Issue, _) => "Issue",
            (Self::Pull, Provider::GitLab) => "Merge Request",
            (Self::Pull, _) => "Pull Request",
            (Self::Commit, _) => "Commit",
            (Self::Compare, _) => "Compare",
            (Self::Discussion, _) => "Discussion",
        }
    }
}

/// A resolved repository reference ready to be rendered as an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepoLink {
    provider: Provider,
    kind: LinkKind,
    href: String,
    label: String,
}

impl RepoLink {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    fn with_label(mut self, label: String) -> Self {
        self.label = label;
        self
    }

    pub(crate) fn to_html(&self) -> String {
        let label = escape_html(self.label());
        format!(
            "<a class=\"magiclink magiclink-{} magiclink-{}\" href=\"{}\" title=\"{} {}: {label}\">{label}</a>",
            self.provider.class(),
            self.kind.class(),
            escape_html(&self.href),
            self.provider.label(),
            self.kind.title(self.provider),
        )
    }
}

/// Shorten a repository URL. Returns `None` for URLs that are not on a known
/// provider, carry a query or fragment, or do not match a known path shape.
pub(crate) fn shorten_url(href: &str) -> Option<RepoLink> {
    let url = Url::parse(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.query().is_some() || url.fragment().is_some()
    {
        return None;
    }
    let provider = Provider::from_host(url.host_str()?)?;
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let (kind, label) = match segments.as_slice() {
        [user] if !RESERVED_USER_PATHS.contains(user) => (LinkKind::Mention, format!("@{user}")),
        [user, repo] => (LinkKind::Repository, format!("{user}/{repo}")),
        rest => {
            let (user, repo, tail) = match rest {
                [user, repo, "-", tail @ ..] | [user, repo, tail @ ..] => (user, repo, tail),
                _ => return None,
            };
            let (kind, reference) = classify_tail(provider, tail)?;
            (kind, format!("{user}/{repo}{reference}"))
        }
    };

    Some(RepoLink {
        provider,
        kind,
        href: href.to_string(),
        label,
    })
}

fn classify_tail(provider: Provider, tail: &[&str]) -> Option<(LinkKind, String)> {
    let [section, value] = tail else {
        return None;
    };

    let kind = match (provider, *section) {
        (_, "issues") => LinkKind::Issue,
        (Provider::GitHub, "pull")
        | (Provider::GitLab, "merge_requests")
        | (Provider::Bitbucket, "pull-requests") => LinkKind::Pull,
        (Provider::GitHub | Provider::GitLab, "commit") | (Provider::Bitbucket, "commits") => {
            LinkKind::Commit
        }
        (Provider::GitHub | Provider::GitLab, "compare") => LinkKind::Compare,
        (Provider::GitHub, "discussions") => LinkKind::Discussion,
        _ => return None,
    };

    let reference = match kind {
        LinkKind::Issue | LinkKind::Pull | LinkKind::Discussion => {
            if !is_number(value) {
                return None;
            }
            let marker = match kind {
                LinkKind::Issue => '#',
                LinkKind::Pull => '!',
                _ => '?',
            };
            format!("{marker}{value}")
        }
        LinkKind::Commit => {
            if !is_sha(value) {
                return None;
            }
            format!("@{}", &value[..COMMIT_DISPLAY_LEN])
        }
        LinkKind::Compare => {
            let (from, to) = value.split_once("...")?;
            if !is_sha(from) || !is_sha(to) {
                return None;
            }
            format!(
                "@{}...{}",
                &from[..COMMIT_DISPLAY_LEN],
                &to[..COMMIT_DISPLAY_LEN]
            )
        }
        LinkKind::Mention | LinkKind::Repository => return None,
    };

    Some((kind, reference))
}

/// Split prose into plain text and GitHub shorthand links.
pub(crate) fn expand_shorthand(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut plain_start = 0;
    let mut index = 0;

    while index < text.len() {
        let at_boundary = text[..index]
            .chars()
            .next_back()
            .is_none_or(|prev| !prev.is_alphanumeric() && !"_-./@".contains(prev));

        if at_boundary && let Some((len, link)) = parse_shorthand(&text[index..]) {
            if plain_start < index {
                segments.push(Segment::Text(text[plain_start..index].to_string()));
            }
            segments.push(Segment::Html(link.to_html()));
            index += len;
            plain_start = index;
            continue;
        }

        index += text[index..].chars().next().map_or(1, char::len_utf8);
    }

    if plain_start < text.len() {
        segments.push(Segment::Text(text[plain_start..].to_string()));
    }
    segments
}

fn parse_shorthand(input: &str) -> Option<(usize, RepoLink)> {
    if let Some(rest) = input.strip_prefix('@') {
        let user = take_user(rest)?;
        let after_user = &rest[user.len()..];
        if let Some(repo_part) = after_user.strip_prefix('/')
            && let Some(repo) = take_repo(repo_part)
        {
            let consumed = 1 + user.len() + 1 + repo.len();
            return ends_cleanly(input, consumed).then(|| {
                (
                    consumed,
                    github_link(LinkKind::Repository, format!("{user}/{repo}"), String::new()),
                )
            });
        }
        let consumed = 1 + user.len();
        return ends_cleanly(input, consumed).then(|| {
            (
                consumed,
                RepoLink {
                    provider: Provider::GitHub,
                    kind: LinkKind::Mention,
                    href: format!("{GITHUB}/{user}"),
                    label: format!("@{user}"),
                },
            )
        });
    }

    let user = take_user(input)?;
    let repo = take_repo(input[user.len()..].strip_prefix('/')?)?;
    let prefix_len = user.len() + 1 + repo.len();
    let reference = &input[prefix_len..];
    let marker = reference.chars().next()?;
    let body = &reference[marker.len_utf8()..];
    let slug = format!("{user}/{repo}");

    let (kind, value_len) = match marker {
        '#' | '!' => {
            let digits = body.chars().take_while(char::is_ascii_digit).count();
            let kind = if marker == '#' {
                LinkKind::Issue
            } else {
                LinkKind::Pull
            };
            (kind, digits)
        }
        '@' => {
            let hex = body.chars().take_while(char::is_ascii_hexdigit).count();
            if !(MIN_SHA_LEN..=MAX_SHA_LEN).contains(&hex) {
                return None;
            }
            (LinkKind::Commit, hex)
        }
        _ => return None,
    };
    if value_len == 0 {
        return None;
    }

    let consumed = prefix_len + 1 + value_len;
    if !ends_cleanly(input, consumed) {
        return None;
    }
    let value = &body[..value_len];
    let link = match kind {
        LinkKind::Issue => github_link(kind, slug.clone(), format!("/issues/{value}"))
            .with_label(format!("{slug}#{value}")),
        LinkKind::Pull => github_link(kind, slug.clone(), format!("/pull/{value}"))
            .with_label(format!("{slug}!{value}")),
        _ => github_link(kind, slug.clone(), format!("/commit/{value}"))
            .with_label(format!("{slug}@{}", &value[..COMMIT_DISPLAY_LEN])),
    };
    Some((consumed, link))
}

fn github_link(kind: LinkKind, slug: String, suffix: String) -> RepoLink {
    RepoLink {
        provider: Provider::GitHub,
        kind,
        href: format!("{GITHUB}/{slug}{suffix}"),
        label: slug,
    }
}

fn ends_cleanly(input: &str, consumed: usize) -> bool {
    input[consumed..]
        .chars()
        .next()
        .is_none_or(|next| !next.is_alphanumeric() && next != '_')
}

fn take_user(input: &str) -> Option<&str> {
    let len = input
        .char_indices()
        .find(|&(_, ch)| !(ch.is_ascii_alphanumeric() || ch == '-'))
        .map_or(input.len(), |(index, _)| index);
    let user = &input[..len];
    (!user.is_empty() && !user.starts_with('-') && user.len() <= 39).then_some(user)
}

fn take_repo(input: &str) -> Option<&str> {
    let len = input
        .char_indices()
        .find(|&(_, ch)| !(ch.is_ascii_alphanumeric() || "-_.".contains(ch)))
        .map_or(input.len(), |(index, _)| index);
    let repo = input[..len].trim_end_matches('.');
    (!repo.is_empty()).then_some(repo)
}

fn is_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}

fn is_sha(value: &str) -> bool {
    (MIN_SHA_LEN..=MAX_SHA_LEN).contains(&value.len())
        && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}
