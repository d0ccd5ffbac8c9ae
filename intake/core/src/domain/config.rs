// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Intake Service Configuration
//
// Defines the configuration schema of the intake service:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP server, database and object store backends
// - Task queue and identifier hashing
// - Upload policy, authentication, demo mode and rate limits
// - Logging and metrics

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::application::OwnerId;
use crate::domain::intake::IntakePolicy;
use crate::domain::stored_file::APPLICATION_FILES_BUCKET;

pub const API_VERSION: &str = "benefits-intake/v1";
pub const KIND: &str = "IntakeConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfigManifest {
    /// API version (must be "benefits-intake/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "IntakeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: IntakeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Service configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub intake: IntakePolicy,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub demo: DemoConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub hashing: HashingConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Origins allowed by CORS; empty allows any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    /// Body allowance on top of the aggregate upload limit for the form field
    #[serde(default = "default_body_slack_bytes")]
    pub body_slack_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreBackend {
    #[default]
    Memory,
    Local,
    Supabase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: ObjectStoreBackend,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Base directory for the local backend
    #[serde(default = "default_local_path")]
    pub local_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_role_key: Option<String>,

    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_seconds: u64,

    #[serde(default = "default_storage_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// SQS queue URL; dispatch is skipped with a warning when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqs_queue_url: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Capacity of the in-process submission job channel
    #[serde(default = "default_worker_capacity")]
    pub worker_capacity: usize,

    /// Submissions processed at the same time; the rest wait in the channel
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used by the identity provider to sign access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_audience")]
    pub audience: String,

    /// Role a user row must carry to submit; unset accepts any role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caseworker_user_id: Option<String>,
}

impl DemoConfig {
    pub fn applicant_id(&self) -> Option<OwnerId> {
        self.applicant_user_id
            .as_deref()
            .and_then(|id| OwnerId::from_string(id).ok())
    }

    pub fn caseworker_id(&self) -> Option<OwnerId> {
        self.caseworker_user_id
            .as_deref()
            .and_then(|id| OwnerId::from_string(id).ok())
    }
}

/// A fixed budget of requests per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self { max_requests, window_seconds }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per client IP on public routes
    #[serde(default = "default_public_api_limit")]
    pub public_api: RateLimitRule,

    /// Per client IP on authenticated routes
    #[serde(default = "default_private_api_limit")]
    pub private_api: RateLimitRule,

    /// Per user on the authenticated submission endpoint
    #[serde(default = "default_submission_limit")]
    pub submissions: RateLimitRule,

    /// Per demo session on the demo submission endpoint
    #[serde(default = "default_demo_session_submission_limit")]
    pub demo_session_submissions: RateLimitRule,

    /// Per client IP on the demo submission endpoint
    #[serde(default = "default_demo_ip_submission_limit")]
    pub demo_ip_submissions: RateLimitRule,

    /// Per demo session on every demo route
    #[serde(default = "default_demo_api_limit")]
    pub demo_api: RateLimitRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashingBackend {
    /// `hash_ssn(text)` database function
    #[default]
    Database,
    /// Keyed HMAC-SHA256 computed in process
    Hmac,
    /// Identifier is not hashed
    Disabled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashingConfig {
    #[serde(default)]
    pub backend: HashingBackend,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_body_slack_bytes() -> u64 {
    2 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    5
}

fn default_bucket() -> String {
    APPLICATION_FILES_BUCKET.to_string()
}

fn default_local_path() -> String {
    "./data/object-store".to_string()
}

fn default_signed_url_ttl() -> u64 {
    3600
}

fn default_storage_timeout() -> u64 {
    30
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_worker_capacity() -> usize {
    256
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_audience() -> String {
    "authenticated".to_string()
}

fn default_public_api_limit() -> RateLimitRule {
    RateLimitRule::new(100, 15 * 60)
}

fn default_private_api_limit() -> RateLimitRule {
    RateLimitRule::new(500, 15 * 60)
}

fn default_submission_limit() -> RateLimitRule {
    RateLimitRule::new(1, 60 * 60)
}

fn default_demo_session_submission_limit() -> RateLimitRule {
    RateLimitRule::new(5, 60 * 60)
}

fn default_demo_ip_submission_limit() -> RateLimitRule {
    RateLimitRule::new(10, 60 * 60)
}

fn default_demo_api_limit() -> RateLimitRule {
    RateLimitRule::new(100, 15 * 60)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
            cors_allowed_origins: vec![],
            body_slack_bytes: default_body_slack_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::Memory,
            bucket: default_bucket(),
            local_path: default_local_path(),
            supabase_url: None,
            service_role_key: None,
            signed_url_ttl_seconds: default_signed_url_ttl(),
            timeout_seconds: default_storage_timeout(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            sqs_queue_url: None,
            region: default_region(),
            worker_capacity: default_worker_capacity(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            audience: default_audience(),
            required_role: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            public_api: default_public_api_limit(),
            private_api: default_private_api_limit(),
            submissions: default_submission_limit(),
            demo_session_submissions: default_demo_session_submission_limit(),
            demo_ip_submissions: default_demo_ip_submission_limit(),
            demo_api: default_demo_api_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for IntakeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "benefits-intake".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: IntakeConfigSpec::default(),
        }
    }
}

impl IntakeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. INTAKE_CONFIG_PATH environment variable
    /// 2. ./intake-config.yaml (working directory)
    /// 3. ~/.intake/config.yaml (user home)
    /// 4. /etc/intake/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("INTAKE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./intake-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".intake").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/intake/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Deployment secrets and endpoints are normally injected this way.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let spec = &mut self.spec;

        if let Some(url) = get("INTAKE_DATABASE_URL") {
            tracing::info!("Environment override: INTAKE_DATABASE_URL (postgres backend)");
            spec.database.backend = DatabaseBackend::Postgres;
            spec.database.url = Some(url);
        }

        if let Some(url) = get("SUPABASE_URL") {
            spec.storage.supabase_url = Some(url);
        }
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY") {
            spec.storage.service_role_key = Some(key);
        }
        if spec.storage.backend == ObjectStoreBackend::Memory
            && spec.storage.supabase_url.is_some()
            && spec.storage.service_role_key.is_some()
        {
            tracing::info!("Environment override: Supabase credentials present (supabase storage backend)");
            spec.storage.backend = ObjectStoreBackend::Supabase;
        }

        if let Some(secret) = get("SUPABASE_JWT_SECRET") {
            spec.auth.jwt_secret = Some(secret);
        }

        if let Some(url) = get("SQS_QUEUE_URL") {
            spec.queue.sqs_queue_url = Some(url);
        }
        if let Some(region) = get("AWS_REGION") {
            spec.queue.region = region;
        }

        if let Some(id) = get("DEMO_APPLICANT_USER_ID") {
            spec.demo.applicant_user_id = Some(id);
        }
        if let Some(id) = get("DEMO_CASEWORKER_USER_ID") {
            spec.demo.caseworker_user_id = Some(id);
        }

        if let Some(key) = get("INTAKE_SSN_HASH_KEY") {
            spec.hashing.hmac_key = Some(key);
            if spec.database.backend == DatabaseBackend::Memory {
                spec.hashing.backend = HashingBackend::Hmac;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        let intake = &spec.intake;
        if intake.max_file_bytes == 0 || intake.max_total_bytes == 0 || intake.max_files == 0 {
            anyhow::bail!("spec.intake limits must be greater than zero");
        }
        if intake.max_total_bytes < intake.max_file_bytes {
            anyhow::bail!("spec.intake.max_total_bytes cannot be smaller than max_file_bytes");
        }
        if intake.allowed_content_types.is_empty() {
            anyhow::bail!("spec.intake.allowed_content_types cannot be empty");
        }

        if spec.database.backend == DatabaseBackend::Postgres && spec.database.url.is_none() {
            anyhow::bail!("spec.database.url is required for the postgres backend");
        }

        if spec.storage.backend == ObjectStoreBackend::Supabase
            && (spec.storage.supabase_url.is_none() || spec.storage.service_role_key.is_none())
        {
            anyhow::bail!("spec.storage.supabase_url and service_role_key are required for the supabase backend");
        }
        if spec.storage.bucket.is_empty() {
            anyhow::bail!("spec.storage.bucket cannot be empty");
        }

        if spec.hashing.backend == HashingBackend::Hmac && spec.hashing.hmac_key.is_none() {
            anyhow::bail!("spec.hashing.hmac_key is required for the hmac backend");
        }
        if spec.hashing.backend == HashingBackend::Database
            && spec.database.backend != DatabaseBackend::Postgres
        {
            anyhow::bail!("spec.hashing.backend 'database' requires the postgres database backend");
        }

        for (name, id) in [
            ("applicant_user_id", &spec.demo.applicant_user_id),
            ("caseworker_user_id", &spec.demo.caseworker_user_id),
        ] {
            if let Some(id) = id {
                if OwnerId::from_string(id).is_err() {
                    anyhow::bail!("spec.demo.{} must be a UUID, got '{}'", name, id);
                }
            }
        }

        let limits = &spec.rate_limits;
        for (name, rule) in [
            ("public_api", limits.public_api),
            ("private_api", limits.private_api),
            ("submissions", limits.submissions),
            ("demo_session_submissions", limits.demo_session_submissions),
            ("demo_ip_submissions", limits.demo_ip_submissions),
            ("demo_api", limits.demo_api),
        ] {
            if rule.max_requests == 0 || rule.window_seconds == 0 {
                anyhow::bail!("spec.rate_limits.{} must allow at least one request per window", name);
            }
        }

        if spec.queue.worker_capacity == 0 {
            anyhow::bail!("spec.queue.worker_capacity must be greater than zero");
        }
        if spec.queue.max_concurrent_jobs == 0 {
            anyhow::bail!("spec.queue.max_concurrent_jobs must be greater than zero");
        }

        Ok(())
    }
}
