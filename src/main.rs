use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use digit_cnn::{fit, predict, preprocess, MnistDataset, Network, NetworkSpec, TrainConfig};

/// Train and run a convolutional handwritten-digit classifier.
#[derive(Debug, Parser)]
#[command(name = "digit-cnn", version, about)]
struct Cli {
    /// Mini-batch size [default: 32]
    #[arg(short = 'b', long = "num-batch")]
    num_batch: Option<usize>,

    /// Image of a digit to classify after training or loading
    #[arg(short = 'p', long = "image-path")]
    image_path: Option<PathBuf>,

    /// Number of training epochs [default: 10]
    #[arg(long)]
    epochs: Option<usize>,

    /// Initial learning rate [default: 0.002]
    #[arg(long = "learning-rate", visible_alias = "lr")]
    learning_rate: Option<f32>,

    /// Learning-rate decay per epoch [default: 0.7]
    #[arg(long)]
    gamma: Option<f32>,

    /// Check the architecture's shape chain before running
    #[arg(long)]
    compile: bool,

    /// Load saved parameters instead of training
    #[arg(long)]
    load_model: bool,

    /// Save parameters after the run
    #[arg(long)]
    save_model: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Where parameters are loaded from and saved to
    #[arg(long, default_value = "model/mnist_cnn.json")]
    model_path: PathBuf,

    /// Directory holding the MNIST IDX files (optionally gzipped)
    #[arg(long, default_value = "data/mnist")]
    data_dir: PathBuf,

    /// RNG seed for initialization, shuffling and dropout [default: 42]
    #[arg(long)]
    seed: Option<u64>,

    /// JSON training config; explicit flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON network architecture; the built-in digit classifier otherwise
    #[arg(long)]
    arch: Option<PathBuf>,
}

impl Cli {
    fn train_config(&self) -> anyhow::Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::load_json(path)
                .with_context(|| format!("loading training config {}", path.display()))?,
            None => TrainConfig::default(),
        };
        if let Some(v) = self.num_batch { config.batch_size = v; }
        if let Some(v) = self.epochs { config.epochs = v; }
        if let Some(v) = self.learning_rate { config.learning_rate = v; }
        if let Some(v) = self.gamma { config.gamma = v; }
        if let Some(v) = self.seed { config.seed = v; }
        config.validate()?;
        Ok(config)
    }

    fn network_spec(&self) -> anyhow::Result<NetworkSpec> {
        match &self.arch {
            Some(path) => {
                let path = path.to_string_lossy();
                NetworkSpec::load_json(&path).with_context(|| format!("loading architecture {}", path))
            }
            None => Ok(NetworkSpec::digit_classifier()),
        }
    }
}

fn result_line(image_path: &Path, digit: usize) -> String {
    format!("Result for the image '{}': {}", image_path.display(), digit)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Using device: cpu");

    let config = cli.train_config()?;
    let spec = cli.network_spec()?;
    debug!(?config, "training config");

    if cli.compile {
        let out = spec.output_shape().context("architecture does not type-check")?;
        info!(output = ?out, params = spec.parameter_count(), "architecture shape chain is consistent");
    }

    let input = match &cli.image_path {
        Some(path) => Some(
            preprocess(path).with_context(|| format!("preprocessing {}", path.display()))?,
        ),
        None => None,
    };

    let mut network = Network::from_spec(spec, config.seed)?;
    info!(params = network.parameter_count(), "model built");

    if cli.load_model {
        match network.load(&cli.model_path) {
            Ok(()) => info!(path = %cli.model_path.display(), "loaded pre-trained model"),
            Err(e) if e.is_not_found() => {
                println!("Couldn't find the pre-trained model.");
                println!("Try training one, or check the path.");
            }
            Err(e) => println!("Error: {}", e),
        }
    } else {
        let train = MnistDataset::train(&cli.data_dir)
            .with_context(|| format!("loading training set from {}", cli.data_dir.display()))?;
        let test = MnistDataset::test(&cli.data_dir)
            .with_context(|| format!("loading test set from {}", cli.data_dir.display()))?;

        let history = fit(&mut network, &train, &test, &config)?;
        if let Some(last) = history.last() {
            info!(
                epochs = last.epoch,
                accuracy = %format!("{:.2}%", 100.0 * last.eval.accuracy()),
                "training finished"
            );
        }
    }

    if let (Some(path), Some(input)) = (&cli.image_path, input) {
        let prediction = predict(&mut network, &input)?;
        debug!(logits = ?prediction.logits, "raw logits");
        println!("{}", result_line(path, prediction.digit));
    }

    if cli.save_model {
        match network.save(&cli.model_path) {
            Ok(()) => info!(path = %cli.model_path.display(), "saved model"),
            Err(e) => println!("Error {}", e),
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_line_names_the_image() {
        assert_eq!(
            result_line(Path::new("photos/seven.png"), 7),
            "Result for the image 'photos/seven.png': 7"
        );
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let cli = Cli::parse_from(["digit-cnn", "-b", "64", "--lr", "1.0", "--epochs", "3"]);
        let config = cli.train_config().unwrap();
        assert_eq!((config.batch_size, config.epochs), (64, 3));
        assert_eq!(config.learning_rate, 1.0);
        assert_eq!(config.gamma, TrainConfig::default().gamma);
    }
}
