//! Fine-tuning preparation for an open-weight SQL model.
//!
//! Loads NLQ/SQL training pairs, renders each into the instruction prompt the
//! adapter is trained on, and writes the training text together with the LoRA
//! and trainer settings consumed by the training job.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the training pairs.
pub const DEFAULT_DATASET_PATH: &str = "data/nlq_sql_data_pairs.json";

/// File name of the rendered training text.
pub const TRAIN_FILE: &str = "train.jsonl";

/// File name of the serialized plan.
pub const CONFIG_FILE: &str = "finetune_config.json";

/// Errors raised while preparing a fine-tuning run.
#[derive(Debug, Error)]
pub enum FinetuneError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid dataset {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize plan for {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record {index} has an empty '{field}' field")]
    EmptyField { index: usize, field: &'static str },

    #[error("Dataset contains no training pairs")]
    EmptyDataset,

    #[error("Invalid LoRA configuration: {0}")]
    InvalidConfig(String),
}

/// One natural-language question paired with its SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub instruction: String,
    #[serde(default)]
    pub input: String,
    pub output: String,
}

impl TrainingPair {
    fn validate(&self, index: usize) -> Result<(), FinetuneError> {
        if self.instruction.trim().is_empty() {
            return Err(FinetuneError::EmptyField {
                index,
                field: "instruction",
            });
        }
        if self.output.trim().is_empty() {
            return Err(FinetuneError::EmptyField {
                index,
                field: "output",
            });
        }
        Ok(())
    }
}

/// Renders a pair into the prompt text the model learns from.
pub fn format_prompt(pair: &TrainingPair) -> String {
    format!(
        "Instruction: {}\nInput: {}\nSQL: {}",
        pair.instruction, pair.input, pair.output
    )
}

/// Low-rank adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    pub r: u32,
    pub lora_alpha: u32,
    pub target_modules: Vec<String>,
    pub lora_dropout: f64,
    pub task_type: String,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            r: 8,
            lora_alpha: 32,
            // attention projections
            target_modules: vec!["q_proj".to_string(), "v_proj".to_string()],
            lora_dropout: 0.05,
            task_type: "CAUSAL_LM".to_string(),
        }
    }
}

impl LoraConfig {
    pub fn validate(&self) -> Result<(), FinetuneError> {
        if self.r == 0 {
            return Err(FinetuneError::InvalidConfig("rank must be positive".into()));
        }
        if self.target_modules.is_empty() {
            return Err(FinetuneError::InvalidConfig(
                "at least one target module is required".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.lora_dropout) {
            return Err(FinetuneError::InvalidConfig(format!(
                "dropout {} outside [0, 1)",
                self.lora_dropout
            )));
        }
        Ok(())
    }

    /// Scaling factor applied to the adapter output (`alpha / r`).
    pub fn scaling(&self) -> f64 {
        f64::from(self.lora_alpha) / f64::from(self.r)
    }
}

/// Trainer hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArgs {
    pub output_dir: String,
    pub num_train_epochs: u32,
    pub per_device_train_batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub learning_rate: f64,
    pub fp16: bool,
    pub logging_steps: u32,
    pub save_strategy: String,
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            output_dir: "finetuned_sql_llm".to_string(),
            num_train_epochs: 3,
            per_device_train_batch_size: 2,
            gradient_accumulation_steps: 4,
            learning_rate: 2e-4,
            fp16: true,
            logging_steps: 10,
            save_strategy: "epoch".to_string(),
        }
    }
}

impl TrainingArgs {
    /// Samples contributing to each optimizer step.
    pub fn effective_batch_size(&self) -> u32 {
        self.per_device_train_batch_size
            .saturating_mul(self.gradient_accumulation_steps)
    }

    /// Optimizer steps for `samples` training examples.
    pub fn total_steps(&self, samples: usize) -> u64 {
        let per_step = u64::from(self.effective_batch_size().max(1));
        let steps_per_epoch = (samples as u64).div_ceil(per_step);
        steps_per_epoch * u64::from(self.num_train_epochs)
    }
}

/// Everything the training job needs besides the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetunePlan {
    pub base_model: String,
    pub load_in_4bit: bool,
    pub max_length: usize,
    pub lora: LoraConfig,
    pub training: TrainingArgs,
}

impl Default for FinetunePlan {
    fn default() -> Self {
        Self {
            base_model: "google/gemma-2b".to_string(),
            load_in_4bit: true,
            max_length: 512,
            lora: LoraConfig::default(),
            training: TrainingArgs::default(),
        }
    }
}

/// Counts reported after preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareSummary {
    pub pairs: usize,
    pub train_file: PathBuf,
    pub config_file: PathBuf,
    pub total_steps: u64,
}

/// Loads training pairs from a JSON array or JSON Lines file.
pub fn load_pairs(path: &Path) -> Result<Vec<TrainingPair>, FinetuneError> {
    let text = fs::read_to_string(path).map_err(|source| FinetuneError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |source| FinetuneError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let pairs: Vec<TrainingPair> = if text.trim_start().starts_with('[') {
        serde_json::from_str(&text).map_err(parse_err)?
    } else {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<TrainingPair>)
            .collect::<Result<_, _>>()
            .map_err(parse_err)?
    };

    if pairs.is_empty() {
        return Err(FinetuneError::EmptyDataset);
    }
    for (index, pair) in pairs.iter().enumerate() {
        pair.validate(index)?;
    }
    Ok(pairs)
}

/// Writes `train.jsonl` and `finetune_config.json` into `out_dir`.
pub fn prepare(
    dataset: &Path,
    out_dir: &Path,
    plan: &FinetunePlan,
) -> Result<PrepareSummary, FinetuneError> {
    plan.lora.validate()?;
    let pairs = load_pairs(dataset)?;

    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| FinetuneError::Write { path, source }
    };

    fs::create_dir_all(out_dir).map_err(write_err(out_dir))?;

    let train_file = out_dir.join(TRAIN_FILE);
    let file = fs::File::create(&train_file).map_err(write_err(&train_file))?;
    let mut writer = BufWriter::new(file);
    for pair in &pairs {
        let line = serde_json::json!({ "text": format_prompt(pair) });
        writeln!(writer, "{line}").map_err(write_err(&train_file))?;
    }
    writer.flush().map_err(write_err(&train_file))?;

    let config_file = out_dir.join(CONFIG_FILE);
    let config = serde_json::to_string_pretty(plan).map_err(|source| FinetuneError::Serialize {
        path: config_file.clone(),
        source,
    })?;
    fs::write(&config_file, config).map_err(write_err(&config_file))?;

    tracing::info!(pairs = pairs.len(), out_dir = %out_dir.display(), "fine-tuning data prepared");

    Ok(PrepareSummary {
        pairs: pairs.len(),
        train_file,
        config_file,
        total_steps: plan.training.total_steps(pairs.len()),
    })
}
