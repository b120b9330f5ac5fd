use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use medxai::{HeartOptions, MaskInput, ModelRegistry, RegistryConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "medxai",
    version,
    about = "Explainable classification of brain and heart segmentation masks",
    long_about = "medxai extracts imaging biomarkers from NIfTI segmentation masks and runs\n\
        the registered classifier for an organ/disease pair.\n\n\
        EXAMPLES:\n\
        \n  medxai registry --models models\n\
        \n  medxai infer --models models --organ brain --disease alzheimers seg.nii.gz --xai\n\
        \n  medxai infer --models models --organ heart --disease cardiomyopathy ed.nii.gz es.nii.gz"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered organs and diseases
    Registry(RegistryArgs),
    /// Run one prediction and print it as JSON
    Infer(InferArgs),
}

#[derive(Debug, Args)]
struct RegistryArgs {
    /// Root of the `<organ>/<disease>/` model tree
    #[arg(long, value_name = "DIR", default_value = "models")]
    models: PathBuf,

    /// Directory for staged mask files
    #[arg(long, value_name = "DIR")]
    staging_dir: Option<PathBuf>,

    /// Use the spacing stored in heart mask headers instead of 1.5 x 1.5 x 2.0 mm
    #[arg(long)]
    header_spacing: bool,
}

#[derive(Debug, Args)]
struct InferArgs {
    #[command(flatten)]
    registry: RegistryArgs,

    #[arg(long)]
    organ: String,

    #[arg(long)]
    disease: String,

    /// Segmentation mask (brain) or end-diastole mask (heart)
    #[arg(value_name = "MASK")]
    mask: PathBuf,

    /// End-systole mask (heart only)
    #[arg(value_name = "ES_MASK")]
    es_mask: Option<PathBuf>,

    /// Include explainability output
    #[arg(long)]
    xai: bool,
}

impl RegistryArgs {
    fn config(&self) -> RegistryConfig {
        let mut heart = HeartOptions::new();
        if self.header_spacing {
            heart = heart.header_spacing();
        }
        let mut config = RegistryConfig::new(&self.models).heart(heart);
        if let Some(dir) = &self.staging_dir {
            config = config.staging_dir(dir);
        }
        config
    }
}

fn run(cli: Cli) -> medxai::Result<()> {
    match cli.command {
        Command::Registry(args) => {
            let registry = ModelRegistry::scan(&args.config())?;
            for model in registry.iter() {
                println!(
                    "{}/{}\t{}\t{} features\t{} classes",
                    model.organ(),
                    model.disease(),
                    model.pipeline(),
                    model.bundle().x_cols().len(),
                    model.bundle().classes().len()
                );
            }
            if registry.is_empty() {
                tracing::warn!("no models registered");
            }
        }
        Command::Infer(args) => {
            let registry = ModelRegistry::scan(&args.registry.config())?;
            let model = registry.get(&args.organ, &args.disease)?;
            let ed = fs::read(&args.mask)?;
            let es = args.es_mask.as_ref().map(fs::read).transpose()?;
            let input = match &es {
                Some(es) => MaskInput::Pair { ed: &ed, es },
                None => MaskInput::Single(&ed),
            };
            let result = model.infer(input, args.xai)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, decode = e.is_decode_error(), "request failed");
            ExitCode::FAILURE
        }
    }
}
