//! Mini-app presentation.
//!
//! # Responsibility
//! - Decide how a manifest is opened: in-process route, sandbox viewer, or a
//!   new top-level browsing context with optional derived-token auth.
//!
//! # Invariants
//! - External launches never proceed without a parseable http(s) URL.
//! - A blocked external context is reported, not silently ignored.

pub mod deep_link;

use crate::collab::{CollaboratorError, IdentityProvider, Navigator, TokenMinter};
use crate::manifest::{AppManifest, AuthMethod, LaunchMode};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use url::Url;

pub use deep_link::{DeepLink, DeepLinkResolver};

/// Query parameter carrying a derived auth token to external apps.
pub const AUTH_TOKEN_PARAM: &str = "bazari_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Navigated { route: String },
    OpenedExternal { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    MissingUrl(String),
    InvalidUrl(String),
    NotAuthenticated,
    TokenMint(CollaboratorError),
    Blocked(String),
}

impl Display for LaunchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUrl(app_id) => write!(f, "external app `{app_id}` has no externalUrl"),
            Self::InvalidUrl(value) => write!(f, "external app URL is invalid: {value}"),
            Self::NotAuthenticated => write!(f, "user must be signed in to open this app"),
            Self::TokenMint(err) => write!(f, "failed to mint app token: {err}"),
            Self::Blocked(url) => write!(f, "browser blocked opening {url}"),
        }
    }
}

impl Error for LaunchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TokenMint(err) => Some(err),
            _ => None,
        }
    }
}

/// Collaborators and routes needed to open apps.
pub struct Launcher<'a> {
    pub navigator: &'a dyn Navigator,
    pub identity: &'a dyn IdentityProvider,
    pub token_minter: &'a dyn TokenMinter,
    pub sandbox_route: &'a str,
}

impl Launcher<'_> {
    pub async fn launch(&self, manifest: &AppManifest) -> Result<LaunchOutcome, LaunchError> {
        let outcome = match manifest.launch_mode {
            LaunchMode::Internal => {
                let route = manifest.entry_point.clone();
                self.navigator.navigate(&route);
                LaunchOutcome::Navigated { route }
            }
            LaunchMode::Sandboxed => {
                let route = format!(
                    "{}/{}",
                    self.sandbox_route.trim_end_matches('/'),
                    manifest.id
                );
                self.navigator.navigate(&route);
                LaunchOutcome::Navigated { route }
            }
            LaunchMode::External => {
                let url = self.external_url(manifest).await?;
                if !self.navigator.open_external(&url) {
                    warn!(
                        "event=app_launch module=launcher status=blocked app_id={}",
                        manifest.id
                    );
                    return Err(LaunchError::Blocked(url));
                }
                LaunchOutcome::OpenedExternal { url }
            }
        };
        info!(
            "event=app_launch module=launcher status=ok app_id={} mode={:?}",
            manifest.id, manifest.launch_mode
        );
        Ok(outcome)
    }

    async fn external_url(&self, manifest: &AppManifest) -> Result<String, LaunchError> {
        let raw = manifest
            .external_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| LaunchError::MissingUrl(manifest.id.clone()))?;
        let mut url = Url::parse(raw).map_err(|_| LaunchError::InvalidUrl(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LaunchError::InvalidUrl(raw.to_string()));
        }

        if manifest.auth_method == AuthMethod::DerivedToken {
            let user = self
                .identity
                .current_user()
                .ok_or(LaunchError::NotAuthenticated)?;
            let token = self
                .token_minter
                .mint_token(&manifest.id, &user)
                .await
                .map_err(LaunchError::TokenMint)?;
            url.query_pairs_mut().append_pair(AUTH_TOKEN_PARAM, &token);
        }
        Ok(url.to_string())
    }
}
