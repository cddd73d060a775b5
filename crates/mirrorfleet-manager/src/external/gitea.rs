use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use mirrorfleet_api::size::format_size;
use mirrorfleet_api::{JobStatus, MirrorStatus, MirrorType, SyncStatus};

use super::{External, ExternalError};
use crate::mirrorz;

/// Lists mirror repositories of a Gitea instance.
pub struct GiteaProvider {
    url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GiteaRepo {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    empty: bool,
    /// Repository size in KiB.
    #[serde(default)]
    size: u64,
    #[serde(default)]
    clone_url: String,
    #[serde(default)]
    original_url: String,
    #[serde(default)]
    mirror_interval: String,
    #[serde(default)]
    mirror_updated: String,
}

#[derive(Debug, Deserialize)]
struct GiteaMsg {
    ok: bool,
    #[serde(default)]
    data: Vec<GiteaRepo>,
}

/// Parse a Go-style duration string (`8h0m0s`, `30m`, `90s`) into seconds.
fn parse_go_duration(s: &str) -> i64 {
    let mut total = 0i64;
    let mut num = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            num.push(c);
            continue;
        }
        let unit = if c == 'm' && chars.peek() == Some(&'s') {
            chars.next();
            0.001
        } else {
            match c {
                'h' => 3600.0,
                'm' => 60.0,
                's' => 1.0,
                _ => {
                    num.clear();
                    continue;
                }
            }
        };
        if let Ok(v) = num.parse::<f64>() {
            total += (v * unit) as i64;
        }
        num.clear();
    }
    total
}

impl GiteaRepo {
    fn updated_unix(&self) -> i64 {
        DateTime::parse_from_rfc3339(&self.mirror_updated)
            .map(|t| t.with_timezone(&Utc).timestamp())
            .unwrap_or(0)
    }

    fn status(&self) -> SyncStatus {
        if self.empty {
            SyncStatus::Syncing
        } else {
            SyncStatus::Success
        }
    }

    fn status_z(&self) -> String {
        if self.empty {
            "U".to_string()
        } else {
            let updated = self.updated_unix();
            let next = updated + parse_go_duration(&self.mirror_interval);
            format!("S{updated}X{next}")
        }
    }
}

impl GiteaProvider {
    pub fn new(url: String, http: reqwest::Client) -> Self {
        Self { url, http }
    }

    async fn fetch(&self) -> Result<GiteaMsg, ExternalError> {
        let url = format!(
            "{}/api/v1/repos/search?mode=mirror",
            self.url.trim_end_matches('/')
        );
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let msg: GiteaMsg = resp.json().await?;
        if !msg.ok {
            return Err(ExternalError::Invalid("gitea not ok".to_string()));
        }
        Ok(msg)
    }
}

#[async_trait]
impl External for GiteaProvider {
    async fn list(&self) -> Result<Vec<MirrorStatus>, ExternalError> {
        let msg = self.fetch().await?;
        Ok(msg
            .data
            .into_iter()
            .map(|repo| {
                let updated = repo.updated_unix();
                let interval = parse_go_duration(&repo.mirror_interval);
                MirrorStatus {
                    id: repo.name.clone(),
                    desc: repo.description.clone(),
                    url: repo.clone_url.clone(),
                    mirror_type: MirrorType::Git,
                    size_str: format_size(repo.size * 1024),
                    status: JobStatus {
                        status: repo.status(),
                        last_update: updated,
                        scheduled: updated + interval,
                        upstream: repo.original_url.clone(),
                        size: repo.size * 1024,
                        ..Default::default()
                    },
                    ..Default::default()
                }
            })
            .collect())
    }

    async fn list_z(&self) -> Result<Vec<mirrorz::Mirror>, ExternalError> {
        let msg = self.fetch().await?;
        Ok(msg
            .data
            .into_iter()
            .map(|repo| mirrorz::Mirror {
                cname: repo.name.clone(),
                desc: repo.description.clone(),
                url: repo.clone_url.clone(),
                status: repo.status_z(),
                upstream: repo.original_url.clone(),
                size: format_size(repo.size * 1024),
                ..Default::default()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn go_durations_parse_to_seconds() {
        assert_eq!(parse_go_duration("8h0m0s"), 8 * 3600);
        assert_eq!(parse_go_duration("30m"), 1800);
        assert_eq!(parse_go_duration("90s"), 90);
        assert_eq!(parse_go_duration("1h30m"), 5400);
        assert_eq!(parse_go_duration(""), 0);
        assert_eq!(parse_go_duration("500ms"), 0);
    }

    fn repo_payload() -> serde_json::Value {
        serde_json::json!({
            "ok": true,
            "data": [
                {
                    "id": 1,
                    "name": "linux",
                    "description": "kernel mirror",
                    "empty": false,
                    "size": 2048,
                    "clone_url": "https://git.example.com/mirror/linux.git",
                    "original_url": "https://github.com/torvalds/linux",
                    "mirror_interval": "8h0m0s",
                    "mirror_updated": "2024-01-01T00:00:00Z"
                },
                {
                    "id": 2,
                    "name": "empty-repo",
                    "empty": true,
                    "size": 0,
                    "clone_url": "https://git.example.com/mirror/empty.git"
                }
            ]
        })
    }

    #[tokio::test]
    async fn lists_mirror_repositories() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/search"))
            .and(query_param("mode", "mirror"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_payload()))
            .mount(&server)
            .await;

        let provider = GiteaProvider::new(server.uri(), reqwest::Client::new());
        let list = provider.list().await.unwrap();
        assert_eq!(list.len(), 2);

        let linux = &list[0];
        assert_eq!(linux.id, "linux");
        assert_eq!(linux.status.status, SyncStatus::Success);
        assert_eq!(linux.status.last_update, 1_704_067_200);
        assert_eq!(linux.status.scheduled, 1_704_067_200 + 8 * 3600);
        assert_eq!(linux.status.size, 2048 * 1024);

        let empty = &list[1];
        assert_eq!(empty.status.status, SyncStatus::Syncing);
    }

    #[tokio::test]
    async fn mirrorz_entries_use_compact_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_payload()))
            .mount(&server)
            .await;

        let provider = GiteaProvider::new(server.uri(), reqwest::Client::new());
        let list = provider.list_z().await.unwrap();
        assert_eq!(list[0].status, format!("S{}X{}", 1_704_067_200, 1_704_067_200 + 8 * 3600));
        assert_eq!(list[1].status, "U");
    }

    #[tokio::test]
    async fn not_ok_payload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false})),
            )
            .mount(&server)
            .await;

        let provider = GiteaProvider::new(server.uri(), reqwest::Client::new());
        assert!(provider.list().await.is_err());
    }
}
