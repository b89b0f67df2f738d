//! Application start-up handling of the authorization redirect.
//!
//! After the backend authenticates the user it sends them back to the
//! page they started from with `?code=...` appended. Bootstrap looks for
//! that parameter and, when it is there, finishes the handshake.

use reqwest::Url;
use tracing::debug;

use crate::api::{ApiClient, ClientError};

/// Base for resolving path-only locations such as `/?code=abc`.
const RELATIVE_LOCATION_BASE: &str = "http://localhost/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boot {
    /// No authorization code in the location; nothing was sent.
    Idle,
    /// The code was exchanged, stored, and the root navigated to.
    Authenticated,
}

/// Run the callback operation if `current_location` carries a `code`.
pub async fn bootstrap(client: &ApiClient, current_location: &str) -> Result<Boot, ClientError> {
    match authorization_code(current_location) {
        Some(code) => {
            debug!("Authorization code found in location");
            client.complete_auth(&code).await?;
            Ok(Boot::Authenticated)
        }
        None => Ok(Boot::Idle),
    }
}

/// The `code` query parameter of a location, if present (even when empty).
/// Unparseable locations have no code.
pub fn authorization_code(location: &str) -> Option<String> {
    let url = Url::parse(location)
        .or_else(|_| Url::parse(RELATIVE_LOCATION_BASE).and_then(|base| base.join(location)))
        .ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_absolute_location() {
        assert_eq!(
            authorization_code("http://127.0.0.1:8976/?code=abc123&state=xyz").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_code_from_relative_location() {
        assert_eq!(authorization_code("/?code=a%2Bb").as_deref(), Some("a+b"));
        assert_eq!(authorization_code("?code=zzz").as_deref(), Some("zzz"));
    }

    #[test]
    fn test_empty_code_still_counts() {
        assert_eq!(authorization_code("http://localhost/?code=").as_deref(), Some(""));
    }

    #[test]
    fn test_no_code() {
        assert_eq!(authorization_code("http://localhost:8080/"), None);
        assert_eq!(authorization_code("http://localhost:8080/?codes=1"), None);
        assert_eq!(authorization_code("http://[::1"), None);
    }
}
