//! Container registry login data.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::errors::{DeployError, Result, ServiceResult};

const MODULE: &str = "deckhand::registry_auth";

/// One entry of the registry's authorization data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationData {
    /// Base64 of `user:password`.
    pub authorization_token: String,
    pub proxy_endpoint: Option<String>,
}

#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn authorization_data(&self) -> ServiceResult<Vec<AuthorizationData>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerCredentials {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

pub struct RegistryAuthorizer {
    api: Arc<dyn RegistryApi>,
}

impl RegistryAuthorizer {
    pub fn new(api: Arc<dyn RegistryApi>) -> Self {
        Self { api }
    }

    /// Decode the first authorization token into a docker login pair.
    pub async fn docker_credentials(&self) -> Result<DockerCredentials> {
        let data = self
            .api
            .authorization_data()
            .await?
            .into_iter()
            .next()
            .ok_or(DeployError::MissingAuthorizationData)?;

        let (username, password) = decode_token(&data.authorization_token)?;
        log::debug!(target: MODULE, "Decoded registry credentials for user {username}");
        Ok(DockerCredentials {
            username,
            password,
            registry: data.proxy_endpoint,
        })
    }
}

fn decode_token(token: &str) -> Result<(String, String)> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|err| DeployError::MalformedAuthorizationToken(err.to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|err| DeployError::MalformedAuthorizationToken(err.to_string()))?;
    decoded
        .split_once(':')
        .map(|(user, password)| (user.to_string(), password.to_string()))
        .ok_or_else(|| DeployError::MalformedAuthorizationToken("missing ':' separator".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRegistry(Vec<AuthorizationData>);

    #[async_trait]
    impl RegistryApi for FakeRegistry {
        async fn authorization_data(&self) -> ServiceResult<Vec<AuthorizationData>> {
            Ok(self.0.clone())
        }
    }

    fn authorizer(tokens: &[&str]) -> RegistryAuthorizer {
        RegistryAuthorizer::new(Arc::new(FakeRegistry(
            tokens
                .iter()
                .map(|token| AuthorizationData {
                    authorization_token: token.to_string(),
                    proxy_endpoint: Some("https://123.dkr.ecr.eu-west-1.amazonaws.com".to_string()),
                })
                .collect(),
        )))
    }

    #[tokio::test]
    async fn decodes_user_and_password() {
        // "user:password"
        let credentials = authorizer(&["dXNlcjpwYXNzd29yZA=="])
            .docker_credentials()
            .await
            .unwrap();

        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password, "password");
        assert_eq!(
            credentials.registry.as_deref(),
            Some("https://123.dkr.ecr.eu-west-1.amazonaws.com")
        );
    }

    #[tokio::test]
    async fn password_may_contain_colons() {
        let token = STANDARD.encode("AWS:pass:word");
        let credentials = authorizer(&[&token]).docker_credentials().await.unwrap();
        assert_eq!(credentials.username, "AWS");
        assert_eq!(credentials.password, "pass:word");
    }

    #[tokio::test]
    async fn rejects_missing_and_malformed_tokens() {
        let err = authorizer(&[]).docker_credentials().await.unwrap_err();
        assert!(matches!(err, DeployError::MissingAuthorizationData));

        let err = authorizer(&["not base64!"]).docker_credentials().await.unwrap_err();
        assert_eq!(err.code(), "ECR-1002");

        let token = STANDARD.encode("no-separator");
        let err = authorizer(&[&token]).docker_credentials().await.unwrap_err();
        assert!(matches!(err, DeployError::MalformedAuthorizationToken(_)));
    }
}
