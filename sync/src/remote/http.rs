//! HTTP client for the order service.
//!
//! `GET|PUT|DELETE {base}/carts/{scope}` with the scope percent-encoded as
//! one path segment; a 404 on read means no cart.

use cart_engine::{Scope, WirePayload};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{items_from_body, RemoteCart, RemoteError};

#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn cart_url(&self, scope: &Scope) -> String {
        format!(
            "{}/carts/{}",
            self.base_url,
            urlencoding::encode(&scope.to_string())
        )
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

impl RemoteCart for HttpRemote {
    fn fetch<'a>(&'a self, scope: &'a Scope) -> BoxFuture<'a, Result<Vec<Value>, RemoteError>> {
        async move {
            let url = self.cart_url(scope);
            let response = self.client.get(&url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                debug!(scope = %scope, "No remote cart");
                return Ok(Vec::new());
            }
            let body: Value = ensure_success(response).await?.json().await?;
            items_from_body(body)
        }
        .boxed()
    }

    fn replace<'a>(
        &'a self,
        scope: &'a Scope,
        payload: &'a WirePayload,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        async move {
            let response = self
                .client
                .put(self.cart_url(scope))
                .json(payload)
                .send()
                .await?;
            ensure_success(response).await?;
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, scope: &'a Scope) -> BoxFuture<'a, Result<(), RemoteError>> {
        async move {
            let response = self.client.delete(self.cart_url(scope)).send().await?;
            // Already gone is fine.
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            ensure_success(response).await?;
            Ok(())
        }
        .boxed()
    }
}
