use async_trait::async_trait;

use crate::{error::Result, params::RequestParams};

/// Information about the outbound request a plugin runs for.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Option<http::Method>,
    pub url: Option<url::Url>,
}

impl RequestContext {
    #[must_use]
    pub fn new(method: http::Method, url: url::Url) -> Self {
        Self {
            method: Some(method),
            url: Some(url),
        }
    }
}

/// A named hook invoked once per outbound request, before it is sent.
#[async_trait]
pub trait RequestPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Transform the request params.
    ///
    /// # Errors
    /// Implementations fail instead of returning partially processed params.
    async fn process(&self, context: &RequestContext, params: RequestParams)
        -> Result<RequestParams>;
}
