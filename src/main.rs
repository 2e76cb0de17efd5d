use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use apigen::{
    config::{OperationNaming, UnionPolicy},
    GeneratorConfig, Pipeline, Status, Target,
};
use clap::{Args, Parser, Subcommand};

/// Generate typed models and operation stubs from an OpenAPI contract
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate code for one target into an output directory
    Generate(Generate),
}

#[derive(Debug, Args)]
struct Generate {
    /// Contract document, YAML or JSON
    input: PathBuf,

    /// Directory receiving the generated files and `apigen-report.json`
    #[arg(short, long)]
    output: PathBuf,

    /// Language of the generated code
    #[arg(short, long, value_enum)]
    target: Target,

    /// YAML generator configuration, flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `union_policy` of the config file
    #[arg(long, value_enum)]
    union_policy: Option<UnionPolicy>,

    /// Overrides `operation_naming` of the config file
    #[arg(long, value_enum)]
    operation_naming: Option<OperationNaming>,

    /// Render units one after the other instead of on a thread pool
    #[arg(long)]
    sequential: bool,
}

impl Generate {
    fn config(&self) -> anyhow::Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("could not read config `{}`", path.display()))?;
                GeneratorConfig::from_yaml(&content)
                    .with_context(|| format!("invalid config `{}`", path.display()))?
            }
            None => GeneratorConfig::default(),
        };
        if let Some(union_policy) = self.union_policy {
            config.union_policy = union_policy;
        }
        if let Some(operation_naming) = self.operation_naming {
            config.operation_naming = operation_naming;
        }
        if self.sequential {
            config.parallel = false;
        }
        Ok(config)
    }

    fn run(&self) -> anyhow::Result<Status> {
        let pipeline = Pipeline::new(self.target, self.config()?);
        let report = pipeline
            .generate_to_dir(&self.input, &self.output)
            .with_context(|| format!("could not generate from `{}`", self.input.display()))?;
        log::info!(
            "{} file(s) under {} ({:?})",
            report.files.len(),
            self.output.display(),
            report.status
        );
        Ok(report.status)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Generate(generate) => generate.run(),
    };
    match result {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
