use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ai_gateway::types::AIGatewayConfig,
    cli::CliOptions,
    narrative::{
        FactDriftPolicy, OracleMode, PipelineSettings,
        adapters::ai_gateway::{GenerationParams, STAGES},
    },
};

pub const DEFAULT_CONFIG_FILE: &str = "encounter-docgen.jsonc";
pub const DEFAULT_SCHEMA_FILE: &str = "encounter-docgen.schema.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ai_gateway: AIGatewayConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub refiner: RefinerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("data/synthea")
}

fn default_selection_seed() -> u64 {
    313
}

fn default_temperature() -> f64 {
    1.0
}

fn default_max_output_tokens() -> u64 {
    16_000
}

fn default_max_clarification_rounds() -> u32 {
    6
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/results")
}

fn default_trace_file() -> PathBuf {
    PathBuf::from("data/results/trace.jsonl")
}

fn default_telemetry_sink() -> TelemetrySinkKind {
    TelemetrySinkKind::Tracing
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

fn default_stderr_level() -> StderrLevel {
    StderrLevel::Warn
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_dir")]
    pub dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dir: default_dataset_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub encounter_id: Option<String>,
    #[serde(default = "default_selection_seed")]
    pub seed: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            encounter_id: None,
            seed: default_selection_seed(),
        }
    }
}

/// Per-stage override; unset fields fall back to the `generation` defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOverride {
    #[serde(default)]
    pub backend_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u64>,
    #[serde(default)]
    pub max_request_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub backend_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u64,
    #[serde(default)]
    pub max_request_time_ms: Option<u64>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageOverride>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend_id: None,
            model: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_request_time_ms: None,
            stages: BTreeMap::new(),
        }
    }
}

impl GenerationConfig {
    pub fn for_stage(&self, stage: &str) -> GenerationParams {
        let stage_override = self.stages.get(stage).cloned().unwrap_or_default();
        GenerationParams {
            backend_id: stage_override.backend_id.or_else(|| self.backend_id.clone()),
            model: stage_override.model.or_else(|| self.model.clone()),
            temperature: Some(stage_override.temperature.unwrap_or(self.temperature)),
            max_output_tokens: stage_override
                .max_output_tokens
                .unwrap_or(self.max_output_tokens),
            max_request_time_ms: stage_override
                .max_request_time_ms
                .or(self.max_request_time_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_enabled_true")]
    pub concurrent_summaries: bool,
    #[serde(default = "default_max_clarification_rounds")]
    pub max_clarification_rounds: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrent_summaries: true,
            max_clarification_rounds: default_max_clarification_rounds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub mode: OracleMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefinerConfig {
    #[serde(default)]
    pub on_fact_drift: FactDriftPolicy,
    #[serde(default)]
    pub facility_style_profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_enabled_true")]
    pub write_manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_manifest: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySinkKind {
    None,
    Tracing,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_sink")]
    pub sink: TelemetrySinkKind,
    #[serde(default = "default_trace_file")]
    pub trace_file: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: default_telemetry_sink(),
            trace_file: default_trace_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StderrLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_stderr_level")]
    pub stderr_level: StderrLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_level: default_stderr_level(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize config")?;
        config.validate()?;

        for path in [
            &mut config.dataset.dir,
            &mut config.output.dir,
            &mut config.telemetry.trace_file,
        ] {
            if !path.is_absolute() {
                *path = config_base.join(&*path);
            }
        }

        Ok(config)
    }

    /// Command-line flags win over file values.
    pub fn apply_overrides(&mut self, options: &CliOptions) {
        if let Some(dir) = &options.data_dir {
            self.dataset.dir = dir.clone();
        }
        if let Some(dir) = &options.output_dir {
            self.output.dir = dir.clone();
        }
        if let Some(encounter_id) = &options.encounter_id {
            self.selection.encounter_id = Some(encounter_id.clone());
        }
        if let Some(seed) = options.seed {
            self.selection.seed = seed;
        }
        if let Some(model) = &options.model {
            self.generation.model = Some(model.clone());
        }
        if let Some(temperature) = options.temperature {
            self.generation.temperature = temperature;
        }
        if let Some(max_tokens) = options.max_tokens {
            self.generation.max_output_tokens = max_tokens;
        }
        if options.no_telemetry {
            self.telemetry.sink = TelemetrySinkKind::None;
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            concurrent_summaries: self.pipeline.concurrent_summaries,
            max_clarification_rounds: self.pipeline.max_clarification_rounds,
            on_fact_drift: self.refiner.on_fact_drift,
            facility_style_profile: self.refiner.facility_style_profile.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(unknown) = self
            .generation
            .stages
            .keys()
            .find(|name| !STAGES.contains(&name.as_str()))
        {
            return Err(anyhow!(
                "generation.stages has unknown stage '{}'; expected one of: {}",
                unknown,
                STAGES.join(", ")
            ));
        }

        let backend_known = |id: &str| self.ai_gateway.backends.iter().any(|b| b.id == id);
        let referenced = self.generation.backend_id.iter().chain(
            self.generation
                .stages
                .values()
                .filter_map(|stage| stage.backend_id.as_ref()),
        );
        for backend_id in referenced {
            if !backend_known(backend_id) {
                return Err(anyhow!(
                    "generation references unknown backend '{}'",
                    backend_id
                ));
            }
        }
        Ok(())
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join(DEFAULT_SCHEMA_FILE);
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or {} next to it",
        DEFAULT_SCHEMA_FILE
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
