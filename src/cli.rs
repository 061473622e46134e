use std::{env, path::PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::config::DEFAULT_CONFIG_FILE;

pub const USAGE: &str = "usage: encounter-docgen [--config <path>] [--data-dir <dir>] \
[--output-dir <dir>] [--encounter-id <id>] [--seed <n>] [--model <id>] \
[--temperature <t>] [--max-tokens <n>] [--no-telemetry]";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub encounter_id: Option<String>,
    pub seed: Option<u64>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub no_telemetry: bool,
    pub help: bool,
}

impl CliOptions {
    pub fn from_env() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut options = Self::default();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("missing value for {flag}. {USAGE}"))
            };
            match arg.as_str() {
                "--config" => options.config_path = Some(PathBuf::from(value("--config")?)),
                "--data-dir" => options.data_dir = Some(PathBuf::from(value("--data-dir")?)),
                "--output-dir" => options.output_dir = Some(PathBuf::from(value("--output-dir")?)),
                "--encounter-id" => options.encounter_id = Some(value("--encounter-id")?),
                "--seed" => {
                    let raw = value("--seed")?;
                    options.seed = Some(
                        raw.parse()
                            .with_context(|| format!("invalid --seed '{raw}'"))?,
                    );
                }
                "--model" => options.model = Some(value("--model")?),
                "--temperature" => {
                    let raw = value("--temperature")?;
                    options.temperature = Some(
                        raw.parse()
                            .with_context(|| format!("invalid --temperature '{raw}'"))?,
                    );
                }
                "--max-tokens" => {
                    let raw = value("--max-tokens")?;
                    options.max_tokens = Some(
                        raw.parse()
                            .with_context(|| format!("invalid --max-tokens '{raw}'"))?,
                    );
                }
                "--no-telemetry" => options.no_telemetry = true,
                "-h" | "--help" => options.help = true,
                other => return Err(anyhow!("unknown argument: {other}. {USAGE}")),
            }
        }

        Ok(options)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}
