use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use tracing::warn;

use crate::session::SessionStore;

/// Hook run on every outgoing request, in registration order.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut Request);
}

/// Attaches `Authorization: Bearer {token}` when the store holds a token.
pub struct BearerAuth {
    session: Arc<SessionStore>,
}

impl BearerAuth {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }
}

impl RequestInterceptor for BearerAuth {
    fn intercept(&self, request: &mut Request) {
        let Some(token) = self.session.token().filter(|t| !t.is_empty()) else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("Stored token is not a valid header value, sending without it"),
        }
    }
}
