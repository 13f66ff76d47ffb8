use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` used for platform API calls.
///
/// - `proxy_url = None` => reqwest defaults (system/env proxy)
/// - `proxy_url = Some(..)` => explicit proxy; an invalid URL disables proxying
pub fn build_api_client(
    user_agent: &str,
    request_timeout: Duration,
    proxy_url: Option<&str>,
) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(user_agent);

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    if let Some(url) = proxy_url {
        match reqwest::Proxy::all(url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(error) => {
                warn!(proxy_url = %url, error = %error, "Invalid proxy URL; disabling proxy");
                builder = builder.no_proxy();
            }
        }
    }

    builder.build().unwrap_or_else(|error| {
        warn!(error = %error, "Failed to build HTTP client; falling back to reqwest defaults");
        reqwest::Client::new()
    })
}
