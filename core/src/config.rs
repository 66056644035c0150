//! Runtime configuration: decoder penalties and trainer hyperparameters that
//! live outside a trained model file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default beam width for `Model::analyze` when the caller doesn't pass
    /// an explicit `top_k`.
    pub top_k_default: usize,

    /// Additive penalty applied when a candidate morpheme's vowel condition
    /// doesn't match the previous surface's trailing jamo.
    pub vowel_condition_penalty: f32,
    /// Additive penalty for a polarity-condition mismatch.
    pub polarity_condition_penalty: f32,
    /// Additive penalty when a `combine_socket` morpheme isn't preceded by
    /// its matching socket.
    pub combine_socket_penalty: f32,

    /// Probability threshold for accepting an arg-max vowel/polarity label
    /// when deriving dictionary-entry conditions; below it the condition
    /// falls back to `any`/`none`.
    pub condition_threshold: f32,
    /// Morphemes in the inflectional tag range (JKS and later) with a
    /// dictionary weight below this are discarded during corpus import.
    pub weight_cutoff: f32,

    /// Skip-bigram trainer: initial SGD learning rate.
    pub lr_start: f32,
    /// Skip-bigram trainer: total gradient steps before training stops.
    pub total_steps: u64,
    /// Skip-bigram trainer: half-window size `W` for pair collection.
    pub window_size: u8,
    /// Minimum per-token occurrence count (scaled by `window_size`) for a
    /// pair to be considered.
    pub min_cnt: u32,
    /// Minimum co-occurrence count for a pair to be considered.
    pub min_co_cnt: u32,
    /// Cap on the number of (condition, target) pairs kept after
    /// normalized-PMI ranking.
    pub max_data_size: usize,
    /// Normalized-PMI floor; pairs below it are dropped before ranking.
    pub pmi_threshold: f32,
    /// Initial logit bias given to the implicit "other" slot so the trainer
    /// starts by trusting the base LM.
    pub lm_initial_bias: f32,
    /// Floor on the "other" slot's softmax mass; violations pull the
    /// gradient back toward it so the skip-bigram correction can't starve
    /// the base LM entirely.
    pub lm_regularizing_limit: f32,
    /// Samples between each worker's flush of its thread-local gradient into
    /// the shared logits.
    pub update_interval: u32,
    /// Number of worker threads used for training.
    pub train_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_k_default: 5,

            vowel_condition_penalty: 5.0,
            polarity_condition_penalty: 5.0,
            combine_socket_penalty: 8.0,

            condition_threshold: 0.825,
            weight_cutoff: 10.0,

            lr_start: 0.025,
            total_steps: 1_000_000,
            window_size: 2,
            min_cnt: 10,
            min_co_cnt: 2,
            max_data_size: 1_000_000,
            pmi_threshold: 0.0,
            lm_initial_bias: 10.0,
            lm_regularizing_limit: 0.333,
            update_interval: 10_000,
            train_workers: 4,
        }
    }
}

impl Config {
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The gradient block size the trainer partitions the logit vector into
    /// for fine-grained locking. Unlike the other knobs this is a layout
    /// constant shared with the on-disk skip-bigram format, not something a
    /// caller should tune per run.
    pub const fn gradient_block_size() -> usize {
        128
    }
}
