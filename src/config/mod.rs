use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub recommendation: RecommendationConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("invalid server host/port")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Model/version tag stamped onto persisted recommendation rows.
    pub model_tag: String,
    pub cache_ttl_seconds: u64,
    pub default_limit: usize,
    /// Minimum Jaccard overlap for a user to count as a neighbor.
    pub neighbor_similarity_threshold: f64,
    pub max_neighbors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Behavior window for preference extraction, in days.
    pub window_days: i64,
    /// Behavior window for item popularity/engagement, in days.
    pub popularity_window_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                pool_size: 10,
            },
            recommendation: RecommendationConfig {
                model_tag: "hybrid-v1".to_string(),
                cache_ttl_seconds: 3600,
                default_limit: 10,
                neighbor_similarity_threshold: 0.1,
                max_neighbors: 50,
            },
            analysis: AnalysisConfig {
                window_days: 30,
                popularity_window_days: 30,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ACADREC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
