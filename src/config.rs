use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure loaded from wa_review.toml and environment variables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub workload: WorkloadConfig,
    pub review_api: ReviewApiConfig,
    pub generation: GenerationConfig,
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// The workload under review and the lens it is reviewed against
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadConfig {
    pub workload_id: String,
    pub lens_alias: String,
}

/// External review record service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewApiConfig {
    pub base_url: String,
    /// Annotation attached to every answer update
    pub update_note: String,
    /// Upper bound on ListAnswers round trips for a single pillar
    pub max_pages_per_pillar: usize,
    pub milestone_prefix: String,
}

/// Text-generation service used for the analysis step
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaxonomyConfig {
    /// Filesystem path or http(s) URL of the best-practice CSV
    pub source: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    pub path: Option<PathBuf>,
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub review_api_token: Option<String>,
    pub generation_api_key: Option<String>,
    /// No client-side timeout unless explicitly configured
    pub request_timeout_ms: Option<u64>,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            review_api_token: None,
            generation_api_key: None,
            request_timeout_ms: None,
            log_level: "wa_review=info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            review_api_token: lookup("WA_REVIEW_API_TOKEN").filter(|v| !v.trim().is_empty()),
            generation_api_key: lookup("WA_GENERATION_API_KEY").filter(|v| !v.trim().is_empty()),
            request_timeout_ms: lookup("WA_REQUEST_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&ms| ms > 0),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "wa_review=info".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses WA_REVIEW_CONFIG environment variable or defaults to "wa_review.toml"
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("WA_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        let config_path =
            std::env::var("WA_REVIEW_CONFIG").unwrap_or_else(|_| "wa_review.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            toml::from_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Apply env-first overrides on top of whatever the TOML file provided
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("WA_WORKLOAD_ID") {
            tracing::debug!("WA_WORKLOAD_ID env override applied");
            self.workload.workload_id = v;
        }
        if let Some(v) = lookup("WA_LENS_ALIAS") {
            self.workload.lens_alias = v;
        }
        if let Some(v) = lookup("WA_REVIEW_API_URL") {
            tracing::debug!("WA_REVIEW_API_URL env override applied");
            self.review_api.base_url = v;
        }
        if let Some(v) = lookup("WA_GENERATION_ENDPOINT") {
            self.generation.endpoint = v;
        }
        if let Some(v) = lookup("WA_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("WA_TAXONOMY_SOURCE") {
            self.taxonomy.source = v;
        }
        if let Some(v) = lookup("WA_SESSION_PATH") {
            self.session.path = Some(PathBuf::from(v));
        }
        if let Some(pages) = lookup("WA_MAX_PAGES").and_then(|v| v.parse::<usize>().ok()) {
            self.review_api.max_pages_per_pillar = pages;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workload.workload_id.trim().is_empty() {
            anyhow::bail!("workload_id must be set (WA_WORKLOAD_ID or [workload] in config)");
        }
        if self.review_api.max_pages_per_pillar == 0 {
            anyhow::bail!("max_pages_per_pillar must be at least 1");
        }
        for (name, url) in [
            ("review_api.base_url", &self.review_api.base_url),
            ("generation.endpoint", &self.generation.endpoint),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} '{}' must start with http:// or https://", name, url);
            }
        }
        if self.taxonomy.source.trim().is_empty() {
            anyhow::bail!("taxonomy.source must point at the best-practice CSV");
        }
        Ok(())
    }

    /// Where the session file lives; falls back to the platform data dir
    pub fn session_path(&self) -> PathBuf {
        if let Some(path) = &self.session.path {
            return path.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wa-review")
            .join("session.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workload: WorkloadConfig {
                workload_id: String::new(),
                lens_alias: "wellarchitected".to_string(),
            },
            review_api: ReviewApiConfig {
                base_url: "http://127.0.0.1:8790".to_string(),
                update_note: "Updated during review process".to_string(),
                max_pages_per_pillar: 1000,
                milestone_prefix: "Review completed on".to_string(),
            },
            generation: GenerationConfig {
                endpoint: "http://127.0.0.1:8791/v1/messages".to_string(),
                model: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
                max_tokens: 4096,
                anthropic_version: "bedrock-2023-05-31".to_string(),
            },
            taxonomy: TaxonomyConfig {
                source: "well_architected_best_practices.csv".to_string(),
            },
            session: SessionConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}
