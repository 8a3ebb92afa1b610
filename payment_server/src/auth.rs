//! Access-token issuing and verification.
//!
//! Customers authenticate with a bearer JWT (HS256) carrying their user id in the `sub` claim.
//! [`JwtClaims`] doubles as an actix extractor, so any handler that takes a `JwtClaims`
//! argument is authenticated: the extractor pulls the token from the `Authorization` header
//! and verifies it against the server's [`TokenIssuer`].

use std::future::{ready, Ready};

use actix_web::{web, FromRequest, HttpRequest};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, errors::AuthError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The authenticated user's id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }
}

impl FromRequest for JwtClaims {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = extract_claims(req).map_err(|e| {
            debug!("🔑️ Rejecting request. {e}");
            crate::errors::ServerError::AuthenticationError(e).into()
        });
        ready(result)
    }
}

fn extract_claims(req: &HttpRequest) -> Result<JwtClaims, AuthError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| AuthError::TokenIssueError("TokenIssuer is not registered with the app".to_string()))?;
    let header = req.headers().get("Authorization").ok_or(AuthError::MissingToken)?;
    let token = header
        .to_str()
        .ok()
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| AuthError::PoorlyFormattedToken("Expected a Bearer token".to_string()))?;
    issuer.decode(token)
}

/// Issues and verifies the server's access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_secs: i64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime_secs: config.token_lifetime.num_seconds(),
        }
    }

    /// Issue a new access token for the given user. Callers must have authenticated the user
    /// beforehand; this method just signs.
    pub fn issue_token(&self, user_id: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims { sub: user_id.to_string(), iat: now, exp: now + self.lifetime_secs };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssueError(e.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(data.claims)
    }
}
