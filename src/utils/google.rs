// src/utils/google.rs

use std::{str::FromStr, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::Client;
use serde::Deserialize;

use crate::{config::Config, error::AppError};

const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// The profile fields needed to find or create an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleProfile {
    pub email: String,
    pub name: String,
    /// Google's stable subject id.
    pub subject: String,
}

/// `aud` is a single string in Google's tokens, but JWT allows a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// The tokeninfo endpoint renders numbers and booleans as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Text(String),
}

impl<T: FromStr + Copy> Lenient<T> {
    fn get(&self) -> Option<T> {
        match self {
            Lenient::Value(v) => Some(*v),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Claims of a Google ID token, as decoded locally or returned by tokeninfo.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    email_verified: Option<Lenient<bool>>,
    name: Option<String>,
    aud: Option<Audience>,
    exp: Option<Lenient<i64>>,
}

/// Response of the userinfo endpoint for opaque access tokens.
#[derive(Debug, Deserialize)]
struct UserInfo {
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

/// Turns a token handed over by the browser into a `GoogleProfile`.
#[derive(Debug, Clone)]
pub struct GoogleVerifier {
    http: Client,
    tokeninfo_url: String,
    userinfo_url: String,
    client_id: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum TokenKind {
    /// `header.payload.signature` with a Google issuer; Google must vouch for it.
    IdToken,
    /// Not a readable ID token; try it as an access token.
    Opaque,
}

impl GoogleVerifier {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build Google HTTP client: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

        Ok(Self {
            http,
            tokeninfo_url: config.google_tokeninfo_url.clone(),
            userinfo_url: config.google_userinfo_url.clone(),
            client_id: config.google_client_id.clone(),
        })
    }

    /// Resolves the token through Google: ID tokens via tokeninfo, which checks
    /// the signature, access tokens via userinfo. The result always carries an
    /// email.
    pub async fn resolve(&self, token: &str) -> Result<GoogleProfile, AppError> {
        let profile = match classify(token)? {
            TokenKind::IdToken => {
                let claims = self.fetch_tokeninfo(token).await?;
                verify_claims(claims, self.client_id.as_deref(), now_secs())?
            }
            TokenKind::Opaque => self.fetch_userinfo(token).await?,
        };

        if profile.email.is_empty() {
            return Err(AppError::BadRequest("Email not provided by Google".to_string()));
        }

        Ok(profile)
    }

    async fn fetch_tokeninfo(&self, token: &str) -> Result<IdTokenClaims, AppError> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Could not reach Google: {}", e)))?;

        if !response.status().is_success() {
            tracing::info!("Google tokeninfo rejected token with status {}", response.status());
            return Err(AppError::AuthError("Invalid Google token".to_string()));
        }

        response
            .json::<IdTokenClaims>()
            .await
            .map_err(|e| AppError::BadGateway(format!("Unexpected Google response: {}", e)))
    }

    async fn fetch_userinfo(&self, token: &str) -> Result<GoogleProfile, AppError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Could not reach Google: {}", e)))?;

        if !response.status().is_success() {
            tracing::info!("Google userinfo rejected token with status {}", response.status());
            return Err(AppError::AuthError("Invalid Google token".to_string()));
        }

        let info = response
            .json::<UserInfo>()
            .await
            .map_err(|e| AppError::BadGateway(format!("Unexpected Google response: {}", e)))?;

        Ok(GoogleProfile {
            email: info.email.unwrap_or_default(),
            name: info.name.unwrap_or_default(),
            subject: info.id.unwrap_or_default(),
        })
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn issuer_ok(claims: &IdTokenClaims) -> bool {
    claims
        .iss
        .as_deref()
        .is_some_and(|iss| ISSUERS.contains(&iss))
}

/// Peeks at the payload of a three-segment token without trusting it. A token
/// that names a foreign issuer is refused before any network call.
fn classify(token: &str) -> Result<TokenKind, AppError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Ok(TokenKind::Opaque);
    }

    let Ok(payload) = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('=')) else {
        return Ok(TokenKind::Opaque);
    };
    let Ok(claims) = serde_json::from_slice::<IdTokenClaims>(&payload) else {
        return Ok(TokenKind::Opaque);
    };

    if !issuer_ok(&claims) {
        return Err(AppError::AuthError("Invalid token issuer".to_string()));
    }

    Ok(TokenKind::IdToken)
}

/// Checks the claims Google returned for a signature-verified ID token.
fn verify_claims(
    claims: IdTokenClaims,
    client_id: Option<&str>,
    now: i64,
) -> Result<GoogleProfile, AppError> {
    if !issuer_ok(&claims) {
        return Err(AppError::AuthError("Invalid token issuer".to_string()));
    }

    match claims.exp.as_ref().and_then(Lenient::get) {
        Some(exp) if exp >= now => {}
        _ => return Err(AppError::AuthError("Google token has expired".to_string())),
    }

    if let Some(expected) = client_id {
        if !claims.aud.as_ref().is_some_and(|aud| aud.contains(expected)) {
            return Err(AppError::AuthError("Token audience mismatch".to_string()));
        }
    }

    if claims.email_verified.as_ref().and_then(Lenient::get) == Some(false) {
        return Err(AppError::AuthError("Google email is not verified".to_string()));
    }

    Ok(GoogleProfile {
        email: claims.email.unwrap_or_default(),
        name: claims.name.unwrap_or_default(),
        subject: claims.sub.unwrap_or_default(),
    })
}
