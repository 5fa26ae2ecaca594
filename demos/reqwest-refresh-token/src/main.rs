use std::{str::FromStr, sync::Arc};

use attach_credentials::{
    AttachCredentialsOptions, CredentialAttacher, CredentialRecord, Credentials, HttpClient,
    MemoryIdentityStore, OAuth2StrategyBuilder, RequestParams, StrategyRegistry,
};
use serde_json::json;
use url::Url;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let provider = "my-provider";
    let token_endpoint = Url::from_str("https://identity.example.com/oauth2/token").unwrap();

    // Credentials that expired a minute ago. The first request refreshes them.
    let store = MemoryIdentityStore::new().with_identity(
        "user-1",
        provider,
        CredentialRecord::with_credentials(Credentials::new(
            "bearer",
            json!({ "token": "expired-token" }),
        ))
        .expires_at(chrono::Utc::now() - chrono::TimeDelta::minutes(1))
        .refresh_token("my-refresh-token"),
    );
    let store = Arc::new(store);

    let strategy = OAuth2StrategyBuilder::new("my-client-id", "my-client-secret", token_endpoint)
        .add_scope("my-scope")
        .build()
        .unwrap();

    let attacher = CredentialAttacher::new(
        AttachCredentialsOptions::builder()
            .provider_name(provider)
            .store(store.clone())
            .strategies(StrategyRegistry::new().register(provider, strategy))
            .build(),
    )
    .unwrap();

    // Generate a new reqwest Client and wrap it with `HttpClient`.
    let client = HttpClient::new(attacher).set_client(reqwest::Client::new());

    // The subject is taken from `user` and removed before the request is built.
    let mut params = RequestParams::new();
    params.insert("user", json!({ "id": "user-1" }));
    let request = client
        .get("https://api.example.com/data", params)
        .await
        .unwrap();
    let _response = request.send().await.unwrap();

    // The refreshed credentials were written back.
    let _refreshed = store.records("user-1", provider);
}
