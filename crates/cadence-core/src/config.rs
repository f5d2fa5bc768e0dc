use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the Cadence engine.
///
/// Loaded from a TOML file; every section and field has a default so a
/// partial (or absent) file still yields a working configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub general: GeneralConfig,
    pub classifier: ClassifierConfig,
    pub transition: TransitionConfig,
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub voice: VoiceConfig,
    pub session: SessionConfig,
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CadenceConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Thresholds for the classification cascade.
///
/// These values are the category contract from the classifier's rule table;
/// changing them changes category outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Similarity at or above which input continues the current sentence.
    pub continuation_threshold: f64,
    /// Lower bound of the partial-shift band.
    pub partial_threshold: f64,
    /// Minimum similarity for clarification to apply.
    pub clarification_threshold: f64,
    /// Minimum similarity to a historical turn for resumption.
    pub resumption_threshold: f64,
    /// Minimum same-topic similarity for contradiction detection.
    pub contradiction_threshold: f64,
    /// How many history turns the pattern heuristics inspect.
    pub pattern_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            continuation_threshold: 0.75,
            partial_threshold: 0.40,
            clarification_threshold: 0.30,
            resumption_threshold: 0.40,
            contradiction_threshold: 0.30,
            pattern_window: 10,
        }
    }
}

/// Transition phrase selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Depth of the recently-used-phrase FIFO shared across categories.
    pub recent_phrase_window: usize,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            recent_phrase_window: 10,
        }
    }
}

/// Tiered memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Full-detail interactions kept before summarization kicks in.
    pub retention_threshold: usize,
    /// Interactions condensed into one summary.
    pub summary_batch_size: usize,
    /// Fast-tier capacity for raw interactions (oldest evicted first).
    pub fast_tier_capacity: usize,
    /// Durable-tier write queue flush size.
    pub durable_batch_size: usize,
    /// Durable-tier flush timer in seconds.
    pub flush_interval_secs: u64,
    /// Characters of input used in the read-time dedup key.
    pub dedup_prefix_len: usize,
    /// Pattern analysis cache TTL in seconds.
    pub pattern_cache_ttl_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retention_threshold: 20,
            summary_batch_size: 5,
            fast_tier_capacity: 200,
            durable_batch_size: 10,
            flush_interval_secs: 300,
            dedup_prefix_len: 200,
            pattern_cache_ttl_secs: 1800,
        }
    }
}

/// Default signal weights for memory retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub time_weight: f64,
    pub topic_weight: f64,
    pub semantic_weight: f64,
    pub relation_weight: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            time_weight: 0.3,
            topic_weight: 0.3,
            semantic_weight: 0.3,
            relation_weight: 0.1,
        }
    }
}

/// Voice output and interruption timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Silence before speaking a transition phrase, in milliseconds.
    pub pre_pause_ms: u64,
    /// Silence after speaking a transition phrase, in milliseconds.
    pub post_pause_ms: u64,
    /// Delay between the two defensive stop calls, in milliseconds.
    pub stop_settle_ms: u64,
    /// How long an interrupted playback position stays resumable, seconds.
    pub interrupted_position_ttl_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            pre_pause_ms: 500,
            post_pause_ms: 1000,
            stop_settle_ms: 100,
            interrupted_position_ttl_secs: 300,
        }
    }
}

/// Session context settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Recent turns kept in the per-session ring buffer.
    pub recent_turn_window: usize,
    /// History entries handed back from `process_input`.
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recent_turn_window: 10,
            history_window: 20,
        }
    }
}
