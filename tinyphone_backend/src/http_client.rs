use std::time::Duration;

pub fn build_http_client() -> reqwest::Client {
    build_http_client_with_timeout(None)
}

/// Builds the shared client. System proxy discovery is opt-in via
/// `TINYPHONE_ENABLE_SYSTEM_PROXY`; without it the client never reads proxy
/// settings from the environment.
pub fn build_http_client_with_timeout(timeout: Option<Duration>) -> reqwest::Client {
    let allow_system_proxy = std::env::var("TINYPHONE_ENABLE_SYSTEM_PROXY")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if allow_system_proxy {
        match attempt_build(timeout, false) {
            Ok(client) => return client,
            Err(error) => tracing::warn!(
                "HTTP client initialization with system proxy discovery failed ({}); retrying with no_proxy",
                error
            ),
        }
    }

    match attempt_build(timeout, true) {
        Ok(client) => client,
        Err(error) => {
            tracing::error!(
                "HTTP client initialization failed ({}); using library defaults",
                error
            );
            reqwest::Client::new()
        }
    }
}

fn attempt_build(
    timeout: Option<Duration>,
    no_proxy: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if no_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}
