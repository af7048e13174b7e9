//! Remote app-store catalog source.

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Source of remote manifest records.
///
/// Records are returned raw so the registry can skip invalid entries one by
/// one instead of failing the whole fetch.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    async fn fetch_manifests(&self) -> Result<Vec<Value>, CatalogError>;
}

/// Remote catalog fetch errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    InvalidEndpoint(String),
    Transport(String),
    Status(u16),
    Body(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEndpoint(value) => write!(f, "invalid catalog endpoint: {value}"),
            Self::Transport(message) => write!(f, "catalog request failed: {message}"),
            Self::Status(code) => write!(f, "catalog responded with status {code}"),
            Self::Body(message) => write!(f, "catalog body is not a manifest array: {message}"),
        }
    }
}

impl Error for CatalogError {}

/// Extracts the manifest array from a catalog body.
///
/// Accepts a bare array or an object wrapping it under `apps`.
pub fn manifest_records(body: Value) -> Result<Vec<Value>, CatalogError> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => match object.remove("apps") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(CatalogError::Body("missing `apps` array".to_string())),
        },
        other => Err(CatalogError::Body(format!("unexpected {}", json_kind(&other)))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(feature = "remote-catalog")]
pub use http::HttpRemoteCatalog;

#[cfg(feature = "remote-catalog")]
mod http {
    use super::{manifest_records, CatalogError, RemoteCatalog};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    const DEFAULT_TIMEOUT_SECS: u64 = 20;

    /// `GET`s a JSON manifest array from an app-store endpoint.
    #[derive(Clone)]
    pub struct HttpRemoteCatalog {
        client: reqwest::Client,
        endpoint: url::Url,
    }

    impl HttpRemoteCatalog {
        pub fn new(endpoint: &str) -> Result<Self, CatalogError> {
            let endpoint = url::Url::parse(endpoint)
                .map_err(|err| CatalogError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(CatalogError::InvalidEndpoint(endpoint.to_string()));
            }
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .map_err(|err| CatalogError::Transport(err.to_string()))?;
            Ok(Self { client, endpoint })
        }

        pub fn endpoint(&self) -> &url::Url {
            &self.endpoint
        }
    }

    #[async_trait]
    impl RemoteCatalog for HttpRemoteCatalog {
        async fn fetch_manifests(&self) -> Result<Vec<Value>, CatalogError> {
            let response = self
                .client
                .get(self.endpoint.clone())
                .send()
                .await
                .map_err(|err| CatalogError::Transport(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(CatalogError::Status(status.as_u16()));
            }
            let body: Value = response
                .json()
                .await
                .map_err(|err| CatalogError::Body(err.to_string()))?;
            manifest_records(body)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::HttpRemoteCatalog;
        use crate::manifest::remote::CatalogError;

        #[test]
        fn rejects_non_http_endpoints() {
            assert!(matches!(
                HttpRemoteCatalog::new("ftp://catalog.test/apps"),
                Err(CatalogError::InvalidEndpoint(_))
            ));
            assert!(matches!(
                HttpRemoteCatalog::new("not a url"),
                Err(CatalogError::InvalidEndpoint(_))
            ));
            let catalog = HttpRemoteCatalog::new("https://catalog.test/api/apps")
                .expect("https endpoint");
            assert_eq!(catalog.endpoint().path(), "/api/apps");
        }
    }
}
