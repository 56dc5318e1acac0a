use reqwest::redirect::Policy;
use std::time::Duration;

/// Sent on every feed fetch and webhook post.
pub const USER_AGENT: &str = concat!("feedrelay/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;

/// Follows at most [`MAX_REDIRECTS`] hops and rejects loops.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Shared client for feeds and webhooks.
///
/// Per-request deadlines are applied by the callers, so no global timeout is
/// set here beyond the connect timeout.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy())
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
}
