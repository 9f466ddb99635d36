use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::claims::{Claims, TokenKind},
    config::JwtConfig,
    state::AppState,
    users::repo_types::User,
};

/// Verification links stay valid for one day regardless of configuration.
pub const VERIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("{}", describe(.0.kind()))]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("jwt kind mismatch: expected {expected:?}")]
    WrongKind { expected: TokenKind },
}

fn describe(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "jwt expired",
        ErrorKind::InvalidSignature => "invalid signature",
        ErrorKind::InvalidAudience => "jwt audience invalid",
        ErrorKind::InvalidIssuer => "jwt issuer invalid",
        ErrorKind::ImmatureSignature => "jwt not active",
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => "jwt malformed",
        _ => "invalid token",
    }
}

#[derive(Clone)]
struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KindKeys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Signing and verification keys for the three token kinds.
#[derive(Clone)]
pub struct JwtKeys {
    verification: KindKeys,
    access: KindKeys,
    refresh: KindKeys,
    issuer: String,
    audience: String,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        let minutes = |m: i64| Duration::from_secs((m.max(0) as u64) * 60);
        Self {
            verification: KindKeys::new(&cfg.verification_secret, VERIFICATION_TTL),
            access: KindKeys::new(&cfg.access_secret, minutes(cfg.access_ttl_minutes)),
            refresh: KindKeys::new(&cfg.refresh_secret, minutes(cfg.refresh_ttl_minutes)),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Verification => &self.verification,
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        profile: Option<(&str, &str)>,
    ) -> anyhow::Result<String> {
        let keys = self.keys(kind);
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(keys.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
            email: profile.map(|(email, _)| email.to_string()),
            full_name: profile.map(|(_, name)| name.to_string()),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_verification(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Verification, None)
    }

    /// Access tokens carry the email and full name so clients can render
    /// without another round trip.
    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        self.sign_with_kind(
            user.id,
            TokenKind::Access,
            Some((&user.email, &user.full_name)),
        )
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh, None)
    }

    /// Check signature, expiry, issuer and audience against the secret of `kind`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            return Err(TokenError::WrongKind { expected: kind });
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }
}
