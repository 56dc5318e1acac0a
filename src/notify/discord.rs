use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

use super::{Notifier, NotifyError};
use crate::storage::Article;
use crate::util::truncate_chars;

/// Embed accent color.
const EMBED_COLOR: u32 = 0x0099ff;
/// Characters of snippet shown in the embed description.
const SNIPPET_CHARS: usize = 200;
/// Discord rejects embed titles longer than this.
const TITLE_LIMIT: usize = 256;

/// Posts one embed per article to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    url: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    fields: Vec<EmbedField>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

#[derive(Debug, serde::Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

impl DiscordNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn build_embed(article: &Article, category: &str) -> Embed {
    let description = (!article.snippet.is_empty())
        .then(|| truncate_chars(&article.snippet, SNIPPET_CHARS).into_owned());

    Embed {
        title: truncate_chars(&article.title, TITLE_LIMIT - 3).into_owned(),
        url: article.link.clone(),
        color: EMBED_COLOR,
        description,
        fields: vec![
            EmbedField {
                name: "Category",
                value: category.to_string(),
                inline: true,
            },
            EmbedField {
                name: "Published",
                value: article
                    .published_at
                    .format("%Y-%m-%d %H:%M UTC")
                    .to_string(),
                inline: true,
            },
        ],
        timestamp: article.published_at.to_rfc3339(),
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(
        &self,
        destination: &SecretString,
        article: &Article,
        category: &str,
    ) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            embeds: vec![build_embed(article, category)],
        };

        let response = self
            .client
            .post(destination.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|b| b.retry_after)
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            return Err(NotifyError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(NotifyError::HttpStatus(status.as_u16()));
        }

        tracing::info!(article = %article.id, category = %category, "Posted to Discord");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(snippet: &str) -> Article {
        Article {
            id: "a-1".into(),
            title: "Release notes".into(),
            link: "https://example.com/release".into(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            snippet: snippet.into(),
        }
    }

    #[test]
    fn test_embed_layout() {
        let embed = build_embed(&article("Short snippet"), "Tech");
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(json["title"], "Release notes");
        assert_eq!(json["url"], "https://example.com/release");
        assert_eq!(json["color"], 0x0099ff);
        assert_eq!(json["description"], "Short snippet");
        assert_eq!(json["fields"][0]["name"], "Category");
        assert_eq!(json["fields"][0]["value"], "Tech");
        assert_eq!(json["fields"][1]["value"], "2024-03-01 09:30 UTC");
        assert_eq!(json["timestamp"], "2024-03-01T09:30:00+00:00");
    }

    #[test]
    fn test_embed_truncates_long_snippet() {
        let long = "x".repeat(250);
        let embed = build_embed(&article(&long), "Tech");
        let description = embed.description.unwrap();

        assert_eq!(description.chars().count(), 203);
        assert!(description.ends_with("..."));
    }

    #[test]
    fn test_embed_omits_empty_description() {
        let embed = build_embed(&article(""), "Tech");
        let json = serde_json::to_value(&embed).unwrap();

        assert!(json.get("description").is_none());
    }

    #[tokio::test]
    async fn test_notify_posts_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(reqwest::Client::new());
        let destination = SecretString::from(format!("{}/webhook", server.uri()));
        notifier
            .notify(&destination, &article("snippet"), "Tech")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["embeds"][0]["title"], "Release notes");
        assert_eq!(body["embeds"][0]["fields"][0]["value"], "Tech");
    }

    #[tokio::test]
    async fn test_notify_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({"message": "slow down", "retry_after": 1.5})),
            )
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(reqwest::Client::new());
        let destination = SecretString::from(format!("{}/webhook", server.uri()));
        let result = notifier.notify(&destination, &article(""), "Tech").await;

        match result {
            Err(NotifyError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_millis(1500)));
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notify_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(reqwest::Client::new());
        let destination = SecretString::from(format!("{}/webhook", server.uri()));
        let result = notifier.notify(&destination, &article(""), "Tech").await;

        assert!(matches!(result, Err(NotifyError::HttpStatus(500))));
    }
}
