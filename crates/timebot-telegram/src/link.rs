//! One-time deep-link tokens for binding a Telegram account.
//!
//! A token is `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`.
//! The bot hands it out in a "link your account" reply; the account service
//! posts it back together with the signed-in user's id (see the webhook
//! `/link` route), which calls [`complete_link`].

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use timebot_models::{User, UserId};
use timebot_persistence::DataStore;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::{BotError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Not a token at all.
    #[error("link token is malformed")]
    Malformed,
    /// Well-formed but not signed by us, or altered.
    #[error("link token signature does not match")]
    BadSignature,
    #[error("link token has expired")]
    Expired,
    #[error("link token was already used")]
    AlreadyUsed,
}

/// What a token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkClaims {
    pub telegram_id: i64,
    pub chat_id: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
    pub nonce: String,
}

/// Issues and checks link tokens.
pub struct LinkTokens {
    mac: HmacSha256,
    ttl: Duration,
    base_url: Url,
    /// Consumed nonces and their expiry, pruned on each consume.
    used: Mutex<HashMap<String, i64>>,
}

impl fmt::Debug for LinkTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkTokens")
            .field("ttl", &self.ttl)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl LinkTokens {
    pub fn new(secret: &str, ttl: Duration, base_url: Url) -> Result<Self> {
        if secret.len() < 16 {
            return Err(BotError::Config(
                "link secret must be at least 16 bytes".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BotError::Config(format!("link secret: {e}")))?;
        Ok(Self {
            mac,
            ttl,
            base_url,
            used: Mutex::new(HashMap::new()),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `telegram_id` in `chat_id`, valid from now.
    pub fn issue(&self, telegram_id: i64, chat_id: i64) -> Result<String> {
        self.issue_at(telegram_id, chat_id, Utc::now().timestamp())
    }

    pub fn issue_at(&self, telegram_id: i64, chat_id: i64, now: i64) -> Result<String> {
        let claims = LinkClaims {
            telegram_id,
            chat_id,
            exp: now + self.ttl.as_secs() as i64,
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        };
        let body = serde_json::to_vec(&claims)?;
        let sig = self.sign(&body);
        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(&body), URL_SAFE_NO_PAD.encode(sig)))
    }

    /// Checks signature and expiry without consuming the token.
    pub fn verify(&self, token: &str) -> std::result::Result<LinkClaims, LinkError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> std::result::Result<LinkClaims, LinkError> {
        let (body_b64, sig_b64) = token.trim().split_once('.').ok_or(LinkError::Malformed)?;
        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| LinkError::Malformed)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| LinkError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(&body);
        mac.verify_slice(&sig).map_err(|_| LinkError::BadSignature)?;

        let claims: LinkClaims = serde_json::from_slice(&body).map_err(|_| LinkError::Malformed)?;
        if now > claims.exp {
            return Err(LinkError::Expired);
        }
        Ok(claims)
    }

    /// Verifies and marks the token used. A second consume fails.
    pub async fn consume(&self, token: &str) -> std::result::Result<LinkClaims, LinkError> {
        self.consume_at(token, Utc::now().timestamp()).await
    }

    pub async fn consume_at(
        &self,
        token: &str,
        now: i64,
    ) -> std::result::Result<LinkClaims, LinkError> {
        let claims = self.verify_at(token, now)?;
        let mut used = self.used.lock().await;
        used.retain(|_, exp| *exp >= now);
        if used.contains_key(&claims.nonce) {
            return Err(LinkError::AlreadyUsed);
        }
        used.insert(claims.nonce.clone(), claims.exp);
        Ok(claims)
    }

    /// The URL the user opens to finish linking.
    pub fn link_url(&self, token: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }

    fn sign(&self, body: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Consumes `token` and binds its Telegram user to `user_id`.
pub async fn complete_link(
    tokens: &LinkTokens,
    store: &dyn DataStore,
    token: &str,
    user_id: UserId,
) -> Result<(User, LinkClaims)> {
    let claims = tokens.consume(token).await?;
    debug!(telegram_id = claims.telegram_id, user_id = %user_id, "Link token accepted");
    let user = store.link_telegram(user_id, claims.telegram_id).await?;
    info!(
        telegram_id = claims.telegram_id,
        user_id = %user.id,
        "Telegram account linked"
    );
    Ok((user, claims))
}
