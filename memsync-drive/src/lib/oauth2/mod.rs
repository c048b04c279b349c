use std::sync::Arc;

use chrono::Duration;
use futures::prelude::*;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
pub use oauth2::{AccessToken, Scope};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use memsync::{error, ServiceAccountKey};

mod token_cache;

pub use self::token_cache::TokenCache;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;

pub trait GetToken: Send + Sync + 'static {
    fn get_token(
        &self,
        scopes: Vec<Scope>,
    ) -> impl Future<Output = memsync::Result<AccessToken>> + Send;
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResp {
    access_token: String,
    expires_in: i64,
}

struct Inner {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    cache: RwLock<TokenCache>,
}

/// Access tokens obtained by the JWT bearer grant of a service account
#[derive(Clone)]
pub struct ServiceAccount {
    inner: Arc<Inner>,
}

impl ServiceAccount {
    /// Fails with a configuration error if the private key can't be parsed.
    /// No request is made before the first call to `get_token`.
    pub fn new(key: ServiceAccountKey, http: Option<reqwest::Client>) -> memsync::Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|err| {
            memsync::config_error!("Invalid private key for {}: {err}", key.client_email)
        })?;
        let http = http.unwrap_or_default();
        Ok(Self {
            inner: Arc::new(Inner {
                key,
                encoding_key,
                http,
                cache: RwLock::new(TokenCache::new()),
            }),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.inner.key.client_email
    }

    fn assertion(&self, scopes: &[Scope]) -> memsync::Result<String> {
        let key = &self.inner.key;

        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = key.private_key_id.clone();

        let iat = jsonwebtoken::get_current_timestamp();
        let scope: Vec<&str> = scopes.iter().map(|s| s.as_str()).collect();
        let claims = JwtClaims {
            iss: key.client_email.clone(),
            scope: scope.join(" "),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &self.inner.encoding_key)
            .map_err(|err| memsync::config_error!("Failed to sign token request: {err}"))
    }

    async fn fetch_token(&self, scopes: &[Scope]) -> memsync::Result<(AccessToken, Duration)> {
        let token_uri = &self.inner.key.token_uri;
        log::info!(
            "requesting access token for {} from {token_uri}",
            self.client_email()
        );

        let jwt = self.assertion(scopes)?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", jwt.as_str())];
        let resp = self
            .inner
            .http
            .post(token_uri.as_str())
            .form(&params)
            .send()
            .await
            .map_err(error::remote)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            memsync::remote_bail!(
                Some(status.as_u16()),
                "POST {token_uri} returned {status}\n{body}"
            );
        }
        let resp: TokenResp = resp.json().await.map_err(error::remote)?;
        Ok((
            AccessToken::new(resp.access_token),
            Duration::seconds(resp.expires_in),
        ))
    }
}

impl GetToken for ServiceAccount {
    async fn get_token(&self, scopes: Vec<Scope>) -> memsync::Result<AccessToken> {
        let cached = self.inner.cache.read().await.get(&scopes);
        if let Some(access_token) = cached {
            return Ok(access_token);
        }
        let (access_token, expires_in) = self.fetch_token(&scopes).await?;
        let mut cache = self.inner.cache.write().await;
        cache.insert(&scopes, access_token.clone(), expires_in);
        Ok(access_token)
    }
}
