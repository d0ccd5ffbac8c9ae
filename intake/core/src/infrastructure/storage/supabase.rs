// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Supabase Storage Adapter
//!
//! Production `ObjectStore` over the Supabase Storage REST API, authenticated
//! with the service-role key.
//!
//! # API Endpoints
//!
//! - `POST /storage/v1/object/{bucket}/{path}` - Upload (`x-upsert` controls overwrite)
//! - `DELETE /storage/v1/object/{bucket}` - Batch remove (`{"prefixes": [...]}`)
//! - `POST /storage/v1/object/sign/{bucket}/{path}` - Signed download URL
//! - `GET /storage/v1/bucket/{bucket}` - Health check

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::storage::{ObjectStore, StorageError};

pub struct SupabaseStorage {
    client: Client,
    /// Project base URL (e.g., "https://xyz.supabase.co")
    base_url: String,
    service_role_key: String,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, rename = "statusCode")]
    status_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SupabaseStorage {
    pub fn new(
        base_url: impl Into<String>,
        service_role_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Unknown(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
        })
    }

    /// Build an endpoint URL; every path segment is percent-encoded
    fn build_url(&self, prefix: &[&str], object_path: &str) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StorageError::InvalidPath(format!("Invalid storage URL: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidPath("Storage URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.extend(prefix);
            segments.extend(object_path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
    }

    async fn error_from(response: reqwest::Response, target: &str) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        let message = parsed
            .as_ref()
            .and_then(|b| b.message.clone().or_else(|| b.error.clone()))
            .unwrap_or_else(|| format!("HTTP {}", status));
        let duplicate = parsed
            .as_ref()
            .map(|b| {
                b.status_code.as_deref() == Some("409")
                    || b.error.as_deref() == Some("Duplicate")
            })
            .unwrap_or(false);

        match status {
            StatusCode::CONFLICT => StorageError::AlreadyExists(target.to_string()),
            _ if duplicate => StorageError::AlreadyExists(target.to_string()),
            StatusCode::NOT_FOUND => StorageError::NotFound(target.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StorageError::PermissionDenied(message)
            }
            s if s.is_server_error() => StorageError::Unavailable(message),
            _ => StorageError::Unknown(format!("{}: {}", target, message)),
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let url = self.build_url(&["storage", "v1", "object", bucket], path)?;

        let response = self
            .authorized(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .body(bytes)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response, path).await)
        }
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }

        let url = self.build_url(&["storage", "v1", "object", bucket], "")?;
        let response = self
            .authorized(self.client.delete(url))
            .json(&RemoveRequest { prefixes: paths })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response, bucket).await)
        }
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let url = self.build_url(&["storage", "v1", "object", "sign", bucket], path)?;
        let response = self
            .authorized(self.client.post(url))
            .json(&SignRequest { expires_in: ttl.as_secs() })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, path).await);
        }

        let signed: SignResponse = response.json().await?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let url = self.build_url(&["storage", "v1", "bucket"], "")?;
        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response, "bucket list").await)
        }
    }
}
