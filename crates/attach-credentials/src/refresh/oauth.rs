use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use oauth2::{
    basic::{BasicClient, BasicTokenType},
    ClientId, ClientSecret, EndpointNotSet, EndpointSet, ErrorResponse, RefreshToken,
    RequestTokenError, Scope, TokenResponse, TokenUrl,
};

use super::{ProviderStrategy, TokenGrant};
use crate::error::{Error, Result};

impl<TE: ErrorResponse> From<RequestTokenError<oauth2::HttpClientError<reqwest::Error>, TE>>
    for Error
{
    fn from(value: RequestTokenError<oauth2::HttpClientError<reqwest::Error>, TE>) -> Self {
        match value {
            RequestTokenError::Request(e) => Error::RefreshFailed(e.to_string()),
            RequestTokenError::Parse(e, _) => {
                Error::RefreshFailed(format!("Failed to parse token response: {e}"))
            }
            RequestTokenError::ServerResponse(e) => Error::RefreshFailed(e.to_string()),
            RequestTokenError::Other(e) => Error::RefreshFailed(e),
        }
    }
}

type TokenUrlClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Exchanges refresh tokens at an `OAuth2` token endpoint (`grant_type=refresh_token`).
///
/// Register it in a [`StrategyRegistry`](super::StrategyRegistry) under the
/// provider name the credentials are stored for.
#[derive(Debug, Clone)]
pub struct OAuth2Strategy {
    oauth2_client: TokenUrlClient,
    http_client: reqwest::Client,
    scopes: Vec<Scope>,
    extra_params: HashMap<String, String>,
}

impl OAuth2Strategy {
    /// Create a new [`OAuth2StrategyBuilder`].
    #[must_use]
    pub fn builder(client_id: &str, client_secret: &str, token_url: url::Url) -> OAuth2StrategyBuilder {
        OAuth2StrategyBuilder::new(client_id, client_secret, token_url)
    }
}

/// Builder for [`OAuth2Strategy`].
///
/// The following configurations are available:
/// * `http_client`: Custom `reqwest::Client` to use for token requests. Default is a client with redirects disabled.
/// * `scopes`: Scopes to request in the token. Empty by default.
/// * `extra_params`: Extra parameters to include in the token request. Empty by default.
#[derive(Debug, Clone)]
pub struct OAuth2StrategyBuilder {
    oauth2_client: TokenUrlClient,
    http_client: Option<reqwest::Client>,
    scopes: Vec<Scope>,
    extra_params: HashMap<String, String>,
}

impl OAuth2StrategyBuilder {
    #[must_use]
    pub fn new(client_id: &str, client_secret: &str, token_url: url::Url) -> Self {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_token_uri(TokenUrl::from_url(token_url));

        Self {
            oauth2_client: client,
            http_client: None,
            scopes: Vec::new(),
            extra_params: HashMap::new(),
        }
    }

    /// Optionally specify the `reqwest::Client` to use for token requests.
    /// When setting a custom client, please make sure to set the `redirect` policy to `Policy::none()`
    /// to prevent SSRF vulnerabilities.
    #[must_use]
    pub fn set_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Add a scope to the token request.
    #[must_use]
    pub fn add_scope(mut self, scope: &str) -> Self {
        self.scopes.push(Scope::new(scope.to_string()));
        self
    }

    /// Add multiple scopes to the token request.
    #[must_use]
    pub fn add_scopes<I>(mut self, scopes: &[I]) -> Self
    where
        I: AsRef<str>,
    {
        self.scopes
            .extend(scopes.iter().map(|s| Scope::new(s.as_ref().to_string())));
        self
    }

    /// Appends an extra param to the token request.
    #[must_use]
    pub fn add_extra_param(mut self, name: &str, value: &str) -> Self {
        self.extra_params
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Build the [`OAuth2Strategy`].
    ///
    /// # Errors
    /// Fails if no custom HTTP client was set and the default client cannot be created.
    pub fn build(self) -> Result<OAuth2Strategy> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .map_err(Arc::new)?,
        };

        Ok(OAuth2Strategy {
            oauth2_client: self.oauth2_client,
            http_client,
            scopes: self.scopes,
            extra_params: self.extra_params,
        })
    }
}

#[async_trait]
impl ProviderStrategy for OAuth2Strategy {
    async fn refresh_token_grant(&self, refresh_token: &str) -> Result<TokenGrant> {
        let client_id = self.oauth2_client.client_id().as_str();
        let refresh_token = RefreshToken::new(refresh_token.to_string());

        let mut request = self.oauth2_client.exchange_refresh_token(&refresh_token);
        for scope in &self.scopes {
            request = request.add_scope(scope.clone());
        }
        for (name, value) in &self.extra_params {
            request = request.add_extra_param(name, value);
        }

        let response = request
            .request_async(&self.http_client)
            .await
            .map_err(|e| {
                tracing::error!("Failed to refresh token for client `{client_id}`: {e}");
                Error::from(e)
            })?;
        tracing::debug!("Successfully refreshed token for client `{client_id}`");

        let token_type = match response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(ext) => ext.clone(),
        };

        Ok(TokenGrant {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
            issued_on: None,
            token_type: Some(token_type),
        })
    }
}
