use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;

use super::readme::kind_from_content_type;
use super::{RateSnapshot, ReadmeFile, ReadmeVariant, Sourced, StarPage, StarSource};
use crate::error::{Error, Result};
use crate::models::StarredRepo;

const PER_PAGE: u32 = 100;
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const API_VERSION: &str = "2022-11-28";

/// Fallback wait when GitHub throttles without saying for how long.
const DEFAULT_RETRY_SECS: i64 = 60;

/// GitHub REST API client for the authenticated user's stars.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct GhRepo {
    id: u64,
    name: String,
    full_name: String,
    owner: GhOwner,
    description: Option<String>,
    html_url: String,
    #[serde(default)]
    stargazers_count: u64,
    language: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GhOwner {
    login: String,
}

#[derive(Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Deserialize)]
struct GhRateLimit {
    resources: GhRateResources,
}

#[derive(Deserialize)]
struct GhRateResources {
    core: GhRate,
}

#[derive(Deserialize)]
struct GhRate {
    limit: u32,
    remaining: u32,
    reset: i64,
}

impl From<GhRepo> for StarredRepo {
    fn from(repo: GhRepo) -> Self {
        Self {
            id: repo.id,
            owner: repo.owner.login,
            name: repo.name,
            full_name: repo.full_name,
            description: repo.description,
            url: repo.html_url,
            star_count: repo.stargazers_count,
            language: repo.language,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
        }
    }
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn get(&self, path: &str, accept: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("star-search/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("request failed: {e}")))
    }

    /// Current core budget. GitHub does not count this call against it.
    pub async fn rate_limit(&self) -> Result<RateSnapshot> {
        let resp = self.send(self.get("/rate_limit", JSON_MEDIA_TYPE)).await?;
        let resp = check_status(resp).await?;
        let body: GhRateLimit = parse_json(resp).await?;

        Ok(RateSnapshot {
            remaining: body.resources.core.remaining,
            limit: body.resources.core.limit,
            reset_at: timestamp_or_now(body.resources.core.reset),
        })
    }

    /// Login of the user the token belongs to.
    pub async fn authenticated_user(&self) -> Result<Sourced<String>> {
        let resp = self.send(self.get("/user", JSON_MEDIA_TYPE)).await?;
        let budget = rate_snapshot(resp.headers());
        let resp = check_status(resp).await?;
        let user: GhUser = parse_json(resp).await?;
        Ok(Sourced::new(user.login, budget))
    }
}

#[async_trait]
impl StarSource for GitHubClient {
    async fn list_stars_page(&self, page: u32) -> Result<Sourced<StarPage>> {
        let path = format!("/user/starred?per_page={PER_PAGE}&page={page}");
        let resp = self.send(self.get(&path, JSON_MEDIA_TYPE)).await?;
        let budget = rate_snapshot(resp.headers());
        let resp = check_status(resp).await?;

        let has_next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|link| link.contains("rel=\"next\""));

        let repos: Vec<GhRepo> = parse_json(resp).await?;
        tracing::debug!("Fetched stars page {page}: {} repos", repos.len());

        Ok(Sourced::new(
            StarPage {
                repos: repos.into_iter().map(StarredRepo::from).collect(),
                has_next,
            },
            budget,
        ))
    }

    async fn get_readme(
        &self,
        repo: &StarredRepo,
        variant: ReadmeVariant,
    ) -> Result<Sourced<Option<ReadmeFile>>> {
        let path = variant.path(&repo.owner, &repo.name);
        let resp = self.send(self.get(&path, RAW_MEDIA_TYPE)).await?;
        let budget = rate_snapshot(resp.headers());

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Sourced::new(None, budget));
        }

        let resp = check_status(resp).await?;
        let kind = match variant {
            ReadmeVariant::Detected => kind_from_content_type(
                resp.headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok()),
            ),
            _ => variant.kind(),
        };
        let text = resp.text().await.map_err(|e| {
            Error::RemoteUnavailable(format!("failed to read {} body: {e}", variant.label()))
        })?;

        Ok(Sourced::new(Some(ReadmeFile::new(text, kind)), budget))
    }
}

/// Parse the `X-RateLimit-*` headers, if all three are present.
pub fn rate_snapshot(headers: &HeaderMap) -> Option<RateSnapshot> {
    let number = |name: &str| -> Option<i64> { headers.get(name)?.to_str().ok()?.trim().parse().ok() };

    let remaining = number("x-ratelimit-remaining")?;
    let limit = number("x-ratelimit-limit")?;
    let reset = number("x-ratelimit-reset")?;

    Some(RateSnapshot {
        remaining: u32::try_from(remaining).unwrap_or(0),
        limit: u32::try_from(limit).unwrap_or(0),
        reset_at: timestamp_or_now(reset),
    })
}

fn timestamp_or_now(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Map a non-success response to `RateLimited` or `RemoteUnavailable`.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let throttled = status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS;
    if throttled {
        if let Some(reset_at) = rate_limited_until(resp.headers()) {
            tracing::debug!("GitHub throttled request to {}", resp.url());
            return Err(Error::RateLimited { reset_at });
        }
    }

    let url = resp.url().clone();
    let body = resp.text().await.unwrap_or_default();

    // Secondary limits come without budget headers; only the message says so
    if throttled && body.to_ascii_lowercase().contains("rate limit") {
        tracing::debug!("GitHub secondary rate limit on {}", url.path());
        return Err(Error::RateLimited {
            reset_at: Utc::now() + chrono::Duration::seconds(DEFAULT_RETRY_SECS),
        });
    }

    Err(Error::RemoteUnavailable(format!(
        "GitHub API returned {status} for {}: {}",
        url.path(),
        body.trim()
    )))
}

fn rate_limited_until(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    if let Some(secs) = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return Some(Utc::now() + chrono::Duration::seconds(secs.max(0)));
    }

    let snapshot = rate_snapshot(headers);
    match snapshot {
        Some(s) if s.remaining == 0 => Some(s.reset_at),
        None if headers.get("x-ratelimit-remaining").is_some_and(|v| v == "0") => {
            Some(Utc::now() + chrono::Duration::seconds(DEFAULT_RETRY_SECS))
        }
        _ => None,
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T> {
    resp.json()
        .await
        .map_err(|e| Error::RemoteUnavailable(format!("unexpected GitHub response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReadmeKind;
    use mockito::Matcher;

    const STARS_PAGE: &str = r#"[
        {
            "id": 1296269,
            "name": "Hello-World",
            "full_name": "octocat/Hello-World",
            "owner": {"login": "octocat"},
            "description": "This your first repo!",
            "html_url": "https://github.com/octocat/Hello-World",
            "stargazers_count": 80,
            "language": "Rust",
            "created_at": "2011-01-26T19:01:12Z",
            "updated_at": "2011-01-26T19:14:43Z"
        },
        {
            "id": 42,
            "name": "no-description",
            "full_name": "octocat/no-description",
            "owner": {"login": "octocat"},
            "description": null,
            "html_url": "https://github.com/octocat/no-description",
            "stargazers_count": 3,
            "language": null
        }
    ]"#;

    fn repo() -> StarredRepo {
        StarredRepo {
            id: 1296269,
            owner: "octocat".to_string(),
            name: "Hello-World".to_string(),
            full_name: "octocat/Hello-World".to_string(),
            description: None,
            url: "https://github.com/octocat/Hello-World".to_string(),
            star_count: 80,
            language: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn client(server: &mockito::ServerGuard) -> GitHubClient {
        GitHubClient::new(reqwest::Client::new(), &server.url(), "ghp_test")
    }

    #[tokio::test]
    async fn test_list_stars_page_parses_repos_and_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/user/starred".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-remaining", "4999")
            .with_header("x-ratelimit-limit", "5000")
            .with_header("x-ratelimit-reset", "1700000000")
            .with_header(
                "link",
                r#"<https://api.github.com/user/starred?page=2>; rel="next", <https://api.github.com/user/starred?page=4>; rel="last""#,
            )
            .with_body(STARS_PAGE)
            .create_async()
            .await;

        let page = client(&server).list_stars_page(1).await.unwrap();
        mock.assert_async().await;

        assert!(page.value.has_next);
        assert_eq!(page.value.repos.len(), 2);
        let first = &page.value.repos[0];
        assert_eq!(first.id, 1296269);
        assert_eq!(first.owner, "octocat");
        assert_eq!(first.name, "Hello-World");
        assert_eq!(first.star_count, 80);
        assert!(first.created_at.is_some());
        assert!(page.value.repos[1].description.is_none());

        let budget = page.budget.unwrap();
        assert_eq!(budget.remaining, 4999);
        assert_eq!(budget.limit, 5000);
        assert_eq!(budget.reset_at.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_last_page_has_no_next() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/user/starred".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let page = client(&server).list_stars_page(3).await.unwrap();
        assert!(!page.value.has_next);
        assert!(page.value.repos.is_empty());
        assert!(page.budget.is_none());
    }

    #[tokio::test]
    async fn test_readme_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/contents/README.md")
            .match_header("accept", RAW_MEDIA_TYPE)
            .with_status(200)
            .with_body("# Hello World")
            .create_async()
            .await;

        let readme = client(&server)
            .get_readme(&repo(), ReadmeVariant::Markdown)
            .await
            .unwrap();
        let file = readme.value.unwrap();
        assert_eq!(file.text, "# Hello World");
        assert_eq!(file.kind, ReadmeKind::Markdown);
    }

    #[tokio::test]
    async fn test_detected_readme_uses_readme_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let fixed = server
            .mock("GET", Matcher::Regex(r"/contents/".to_string()))
            .expect(0)
            .create_async()
            .await;
        let detected = server
            .mock("GET", "/repos/octocat/Hello-World/readme")
            .match_header("accept", RAW_MEDIA_TYPE)
            .with_status(200)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body("Hello World, in docs/readme.txt")
            .create_async()
            .await;

        let readme = client(&server)
            .get_readme(&repo(), ReadmeVariant::Detected)
            .await
            .unwrap();
        detected.assert_async().await;
        fixed.assert_async().await;

        let file = readme.value.unwrap();
        assert_eq!(file.text, "Hello World, in docs/readme.txt");
        assert_eq!(file.kind, ReadmeKind::Plain);
    }

    #[tokio::test]
    async fn test_detected_readme_defaults_to_markdown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/readme")
            .with_status(200)
            .with_header("content-type", "application/vnd.github.raw; charset=utf-8")
            .with_body("Hello World\n===========")
            .create_async()
            .await;

        let readme = client(&server)
            .get_readme(&repo(), ReadmeVariant::Detected)
            .await
            .unwrap();
        assert_eq!(readme.value.unwrap().kind, ReadmeKind::Markdown);
    }

    #[tokio::test]
    async fn test_readme_missing_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/contents/README.txt")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        let readme = client(&server)
            .get_readme(&repo(), ReadmeVariant::Plain)
            .await
            .unwrap();
        assert!(readme.value.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/contents/README.md")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-limit", "5000")
            .with_header("x-ratelimit-reset", "1700000600")
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .get_readme(&repo(), ReadmeVariant::Markdown)
            .await
            .unwrap_err();
        match err {
            Error::RateLimited { reset_at } => assert_eq!(reset_at.timestamp(), 1_700_000_600),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_after_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/contents/README.md")
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;

        let before = Utc::now();
        let err = client(&server)
            .get_readme(&repo(), ReadmeVariant::Markdown)
            .await
            .unwrap_err();
        match err {
            Error::RateLimited { reset_at } => {
                assert!(reset_at >= before + chrono::Duration::seconds(30));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_secondary_limit_message_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/contents/README.md")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"message":"You have exceeded a secondary rate limit. Please wait a few minutes before you try again."}"#,
            )
            .create_async()
            .await;

        let before = Utc::now();
        let err = client(&server)
            .get_readme(&repo(), ReadmeVariant::Markdown)
            .await
            .unwrap_err();
        match err {
            Error::RateLimited { reset_at } => {
                assert!(reset_at >= before + chrono::Duration::seconds(DEFAULT_RETRY_SECS));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forbidden_without_limit_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octocat/Hello-World/contents/README.md")
            .with_status(403)
            .with_body(r#"{"message":"Resource not accessible by personal access token"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .get_readme(&repo(), ReadmeVariant::Markdown)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;

        let err = client(&server).authenticated_user().await.unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_rate_limit_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rate_limit")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"resources":{"core":{"limit":5000,"remaining":4321,"reset":1700000000,"used":679}}}"#,
            )
            .create_async()
            .await;

        let snapshot = client(&server).rate_limit().await.unwrap();
        assert_eq!(snapshot.limit, 5000);
        assert_eq!(snapshot.remaining, 4321);
        assert_eq!(snapshot.reset_at.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_authenticated_user() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"login":"octocat","id":1}"#)
            .create_async()
            .await;

        let user = client(&server).authenticated_user().await.unwrap();
        assert_eq!(user.value, "octocat");
    }

    #[test]
    fn test_rate_snapshot_requires_all_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "10".parse().unwrap());
        assert!(rate_snapshot(&headers).is_none());

        headers.insert("x-ratelimit-limit", "60".parse().unwrap());
        headers.insert("x-ratelimit-reset", "1700000000".parse().unwrap());
        let snapshot = rate_snapshot(&headers).unwrap();
        assert_eq!(snapshot.remaining, 10);
        assert_eq!(snapshot.limit, 60);
    }
}
