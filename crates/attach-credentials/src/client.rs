use std::sync::Arc;

use http::{HeaderName, HeaderValue};
use reqwest::IntoUrl;
use serde_json::Value;

use crate::{
    attach::CredentialAttacher,
    error::{Error, Result},
    params::RequestParams,
    plugin::{RequestContext, RequestPlugin},
};

/// Wrapper around `reqwest::Client` that runs a [`RequestPlugin`] (by default a
/// [`CredentialAttacher`]) on the request params and applies the resulting
/// `auth` and `headers` to the request.
///
/// Requests are only built, never sent by this type.
#[derive(Debug, Clone)]
pub struct HttpClient<P: RequestPlugin = CredentialAttacher> {
    plugin: P,
    client: reqwest::Client,
}

impl<P: RequestPlugin> HttpClient<P> {
    /// Creates a new `HttpClient` with the given plugin.
    pub fn new(plugin: P) -> Self {
        Self {
            plugin,
            client: reqwest::Client::new(),
        }
    }

    /// Set a custom `reqwest::Client`.
    #[must_use]
    pub fn set_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Start building a `Request` for `params`, attaching credentials.
    ///
    /// # Errors
    /// - Returns an error if the url is invalid.
    /// - Returns an error if the plugin fails, typically because credentials could not be
    ///   loaded or refreshed.
    /// - Returns an error if a header in the processed params is not valid.
    pub async fn request<U: IntoUrl>(
        &self,
        method: reqwest::Method,
        url: U,
        params: RequestParams,
    ) -> Result<reqwest::RequestBuilder> {
        let url = url.into_url().map_err(Arc::new)?;
        let context = RequestContext::new(method.clone(), url.clone());
        let params = self.plugin.process(&context, params).await?;
        apply_params(self.client.request(method, url), &params)
    }

    /// Convenience method to build a `GET` request.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn get<U: IntoUrl>(
        &self,
        url: U,
        params: RequestParams,
    ) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::GET, url, params).await
    }

    /// Convenience method to build a `POST` request.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn post<U: IntoUrl>(
        &self,
        url: U,
        params: RequestParams,
    ) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::POST, url, params).await
    }

    /// Convenience method to build a `PUT` request.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn put<U: IntoUrl>(
        &self,
        url: U,
        params: RequestParams,
    ) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::PUT, url, params).await
    }

    /// Convenience method to build a `DELETE` request.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn delete<U: IntoUrl>(
        &self,
        url: U,
        params: RequestParams,
    ) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::DELETE, url, params).await
    }
}

/// Apply `auth` (basic or bearer) and `headers` of `params` to a request.
///
/// # Errors
/// Fails with `InvalidHeaderValue` if a header name or value is not valid.
pub fn apply_params(
    mut request: reqwest::RequestBuilder,
    params: &RequestParams,
) -> Result<reqwest::RequestBuilder> {
    if let Some(auth) = params.auth() {
        if let Some(username) = auth.get("username").and_then(Value::as_str) {
            let password = auth.get("password").and_then(Value::as_str);
            request = request.basic_auth(username, password);
        } else if let Some(token) = auth.get("bearer").and_then(Value::as_str) {
            request = request.bearer_auth(token);
        }
    }

    for (name, value) in params.headers().into_iter().flatten() {
        let Some(value) = value.as_str() else {
            continue;
        };
        require_ascii(value)?;
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_e| Error::InvalidHeaderValue)?;
        let mut value = HeaderValue::from_str(value).map_err(|_e| Error::InvalidHeaderValue)?;
        if name == http::header::AUTHORIZATION || name == http::header::COOKIE {
            value.set_sensitive(true);
        }
        request = request.header(name, value);
    }

    Ok(request)
}

/// Helper function to ensure that a string is ASCII.
///
/// # Errors
/// Fails with `InvalidHeaderValue` if the string is not ASCII.
pub(crate) fn require_ascii(s: &str) -> Result<()> {
    if s.is_ascii() {
        Ok(())
    } else {
        Err(Error::InvalidHeaderValue)
    }
}
