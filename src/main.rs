//! CLI entry point for nirnet-rs.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use candle_core::Device;
use nirnet_rs::{pipeline, NirnetConfig, Result};

#[derive(Parser)]
#[command(name = "nirnet")]
#[command(about = "Near-infrared spectrum composition regression")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "config.yaml")]
        output: String,
        /// Path to the input CSV table the config should point at
        #[arg(long, default_value = "corn.csv")]
        input: String,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },
    /// Run preprocessing, training, evaluation and importance analysis
    Run {
        /// Path to configuration file
        config: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output, input } => {
            let config = NirnetConfig::with_input(&input);
            config.to_file(&output)?;
            println!("configuration written to: {output}");
        }
        Commands::Validate { config } => {
            let config = NirnetConfig::from_file(&config)?;
            config.validate()?;
            println!("configuration is valid");
            println!("  input: {}", config.input.path);
            println!("  targets: {}", config.input.target_columns.join(", "));
            println!("  epochs: {}", config.training.epochs);
        }
        Commands::Run { config } => {
            let config = NirnetConfig::from_file(&config)?;
            let device = select_device();
            let artifacts = pipeline::run(&config, &device)?;
            println!(
                "done: {} epochs, exports written to {}",
                artifacts.history.len(),
                config.output_dir
            );
        }
    }

    Ok(())
}

/// Pick the compute device once at startup: CUDA when compiled in and
/// available, CPU otherwise. `NIRNET_FORCE_CPU=1` overrides.
fn select_device() -> Device {
    let force_cpu = std::env::var("NIRNET_FORCE_CPU")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if !force_cpu && cfg!(feature = "cuda") {
        match Device::cuda_if_available(0) {
            Ok(device @ Device::Cuda(_)) => {
                tracing::info!("device: CUDA");
                device
            }
            Ok(_) => {
                tracing::warn!("CUDA not available; falling back to CPU");
                Device::Cpu
            }
            Err(err) => {
                tracing::warn!("CUDA init failed ({err}); falling back to CPU");
                Device::Cpu
            }
        }
    } else {
        tracing::info!("device: CPU");
        Device::Cpu
    }
}
