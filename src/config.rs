use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};

const SYNC_MAX_THREADS: u16 = 4;

const DEFAULT_AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";
const DEFAULT_MEMBERS_TABLE: &str = "Members";
const DEFAULT_UPDATES_TABLE: &str = "Build Updates";

const DEFAULT_EMBEDDING_API_URL: &str = "https://api.openai.com/v1/embeddings";
/// One fixed model is used for every vector in the cache; vectors produced by
/// different models are not comparable.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 60;

const DEFAULT_IMAGE_MAX_DIMENSION: u32 = 600;
const DEFAULT_IMAGE_QUALITY: u8 = 85;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Remote tabular data source (Airtable-compatible REST API).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AirtableConfig {
    #[serde(default = "default_airtable_api_url")]
    pub api_url: String,

    /// Base identifier, e.g. "appnc2IWGpsHNfTvt"
    #[serde(default)]
    pub base_id: String,

    #[serde(default = "default_members_table")]
    pub members_table: String,

    #[serde(default = "default_updates_table")]
    pub updates_table: String,

    /// Personal access token. Falls back to AIRTABLE_API_KEY when empty.
    #[serde(default)]
    pub api_key: String,

    /// Server-side named view used when fetching members (e.g. "Accepted only")
    #[serde(default)]
    pub member_view: Option<String>,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_AIRTABLE_API_URL.to_string(),
            base_id: String::new(),
            members_table: DEFAULT_MEMBERS_TABLE.to_string(),
            updates_table: DEFAULT_UPDATES_TABLE.to_string(),
            api_key: String::new(),
            member_view: None,
        }
    }
}

/// Language-model embedding endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_api_url")]
    pub api_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key. Falls back to OPENAI_API_KEY when empty.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_EMBEDDING_API_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
        }
    }
}

/// Profile image cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Larger images are scaled down to fit this dimension
    #[serde(default = "default_image_max_dimension")]
    pub max_dimension: u32,

    /// WebP quality (1-100)
    #[serde(default = "default_image_quality")]
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_IMAGE_MAX_DIMENSION,
            quality: DEFAULT_IMAGE_QUALITY,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen_addr")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

fn default_airtable_api_url() -> String {
    DEFAULT_AIRTABLE_API_URL.to_string()
}

fn default_members_table() -> String {
    DEFAULT_MEMBERS_TABLE.to_string()
}

fn default_updates_table() -> String {
    DEFAULT_UPDATES_TABLE.to_string()
}

fn default_embedding_api_url() -> String {
    DEFAULT_EMBEDDING_API_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    DEFAULT_EMBEDDING_TIMEOUT_SECS
}

fn default_image_max_dimension() -> u32 {
    DEFAULT_IMAGE_MAX_DIMENSION
}

fn default_image_quality() -> u8 {
    DEFAULT_IMAGE_QUALITY
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn sync_max_threads() -> u16 {
    SYNC_MAX_THREADS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Worker threads used for per-member enrichment during sync
    #[serde(default = "sync_max_threads")]
    pub sync_max_threads: u16,

    #[serde(default)]
    pub airtable: AirtableConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_max_threads: SYNC_MAX_THREADS,
            airtable: AirtableConfig::default(),
            embedding: EmbeddingConfig::default(),
            images: ImageConfig::default(),
            web: WebConfig::default(),
            base_path: String::new(),
        }
    }
}

impl Config {
    fn validate(&mut self) {
        if self.sync_max_threads == 0 {
            self.sync_max_threads = 1
        }

        if self.embedding.timeout_secs == 0 {
            panic!("embedding.timeout_secs must be greater than 0");
        }

        if self.images.quality == 0 || self.images.quality > 100 {
            panic!(
                "images.quality must be between 1 and 100, got {}",
                self.images.quality
            );
        }

        if self.images.max_dimension == 0 {
            panic!("images.max_dimension must be greater than 0");
        }

        if self.web.listen.parse::<std::net::SocketAddr>().is_err() {
            panic!("web.listen is not a valid socket address: {}", self.web.listen);
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store =
            storage::BackendLocal::new(base_path).expect("cannot create data directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("cannot write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("cannot read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("cannot create data directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("cannot write config");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Airtable token from config, falling back to the environment.
    pub fn airtable_key(&self) -> String {
        if !self.airtable.api_key.is_empty() {
            return self.airtable.api_key.clone();
        }
        std::env::var("AIRTABLE_API_KEY").unwrap_or_default()
    }

    /// Embedding API key from config, falling back to the environment.
    pub fn embedding_key(&self) -> String {
        if !self.embedding.api_key.is_empty() {
            return self.embedding.api_key.clone();
        }
        std::env::var("OPENAI_API_KEY").unwrap_or_default()
    }

    #[cfg(test)]
    pub fn for_tests(base_path: &str) -> Self {
        let mut config = Self::default();
        config.base_path = base_path.to_string();
        config.validate();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::for_tests("/tmp");
        assert_eq!(config.sync_max_threads, SYNC_MAX_THREADS);
        assert_eq!(config.airtable.members_table, "Members");
        assert_eq!(config.airtable.updates_table, "Build Updates");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.images.max_dimension, 600);
    }

    #[test]
    fn test_load_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::load_with(base);
        assert!(std::path::Path::new(base).join("config.yaml").exists());
        assert_eq!(config.base_path(), base);
        assert_eq!(config.sync_max_threads, SYNC_MAX_THREADS);
    }

    #[test]
    fn test_load_roundtrip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let mut config = Config::load_with(base);
        config.airtable.base_id = "appXXXX".to_string();
        config.save();

        let reloaded = Config::load_with(base);
        assert_eq!(reloaded.airtable.base_id, "appXXXX");
    }

    #[test]
    #[should_panic]
    fn test_zero_timeout_panics() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let mut config = Config::load_with(base);
        config.embedding.timeout_secs = 0;
        config.save();

        let _ = Config::load_with(base);
    }
}
