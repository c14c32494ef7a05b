//! CLI entry point for tflite-rs.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tflite_rs::cli::{Cli, Commands};
use tflite_rs::config::Config;
use tflite_rs::{
    coral_delegate, DelegateConfig, Interpreter, ModelSource, Platform, TensorInfo, TfliteEngine,
};

fn load_engine(library: Option<PathBuf>) -> Result<TfliteEngine> {
    let engine = match library {
        Some(path) => TfliteEngine::load(&path)
            .with_context(|| format!("Failed to load library: {}", path.display()))?,
        None => TfliteEngine::load_default()?,
    };
    info!("TFLite version: {}", engine.version());
    Ok(engine)
}

fn read_model(location: &str) -> Result<Vec<u8>> {
    info!("Loading model: {}", location);
    ModelSource::from_location(location)
        .into_bytes()
        .with_context(|| format!("Failed to read model: {}", location))
}

fn describe(tensor: &TensorInfo) -> Value {
    serde_json::json!({
        "index": tensor.id(),
        "name": tensor.name(),
        "dtype": tensor.data_type().to_string(),
        "shape": tensor.shape(),
    })
}

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Infer {
            model,
            input,
            threads,
            delegate,
            coral,
            delegate_option,
            library,
            config,
            format,
        } => {
            let config = if let Some(config_path) = config {
                Config::from_yaml_file(&config_path)
                    .with_context(|| format!("Failed to load config: {}", config_path.display()))?
            } else {
                Config::default()
            };

            // Flags override the config file
            let mut options = config.interpreter_options()?;
            if threads.is_some() {
                options.threads = threads;
            }
            if let Some(path) = delegate {
                options.delegate = Some(DelegateConfig {
                    path,
                    options: delegate_option,
                });
            } else if coral {
                let plugin = coral_delegate(delegate_option, None, Platform::current())?;
                info!("Using {} on {}", plugin.name, Platform::current());
                options.delegate = plugin.to_config();
            } else if !delegate_option.is_empty() {
                bail!("--delegate-option requires --delegate or --coral");
            }

            let library = library.or_else(|| config.engine.library.map(PathBuf::from));
            let engine = load_engine(library)?;

            let model_bytes = read_model(&model)?;
            let mut interpreter = Interpreter::new(&engine, &model_bytes, &options)?;
            info!("Model loaded successfully");

            info!("Loading input: {}", input.display());
            let input_json: Value = serde_json::from_str(
                &fs::read_to_string(&input)
                    .with_context(|| format!("Failed to read input: {}", input.display()))?,
            )?;

            // Expected format: { "inputs": [[...], [...]] }, one flat array per input
            let arrays = input_json["inputs"]
                .as_array()
                .context("Input must have 'inputs' array")?;
            if arrays.len() != interpreter.inputs().len() {
                bail!(
                    "Model has {} inputs but {} were provided",
                    interpreter.inputs().len(),
                    arrays.len()
                );
            }
            for (tensor, values) in interpreter.inputs_mut().iter_mut().zip(arrays) {
                let values: Vec<f64> = values
                    .as_array()
                    .with_context(|| format!("Input '{}' must be an array", tensor.name()))?
                    .iter()
                    .map(|v| v.as_f64().context("Input values must be numbers"))
                    .collect::<Result<_>>()?;
                let name = tensor.name().to_string();
                tensor.data_mut().fill_from_f64(&values, &name)?;
            }

            info!("Running inference...");
            let start = Instant::now();
            interpreter.run()?;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            info!(
                "Inference complete: {} outputs in {:.2}ms",
                interpreter.outputs().len(),
                latency_ms
            );

            let output = serde_json::json!({
                "num_outputs": interpreter.outputs().len(),
                "latency_ms": latency_ms,
                "outputs": interpreter.outputs().iter().map(|t| {
                    let mut entry = describe(t);
                    entry["data"] = serde_json::json!(t.data().to_f64_vec());
                    entry
                }).collect::<Vec<_>>()
            });

            if format == "pretty" {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", serde_json::to_string(&output)?);
            }
        }

        Commands::Info { model, library } => {
            let engine = load_engine(library)?;

            println!("tflite-rs v{}", env!("CARGO_PKG_VERSION"));
            println!("TFLite: {}", engine.version());
            println!();
            println!("Model: {}", model);

            let model_bytes = read_model(&model)?;
            let interpreter = Interpreter::new(&engine, &model_bytes, &Default::default())?;
            let groups = [("input", interpreter.inputs()), ("output", interpreter.outputs())];
            for (kind, tensors) in groups {
                for t in tensors {
                    println!(
                        "  {} {}: {} {} [{}]",
                        kind,
                        t.id(),
                        t.name(),
                        t.data_type(),
                        t.descriptor().shape_string()
                    );
                }
            }
            println!("Status: OK (model loaded successfully)");
        }
    }

    Ok(())
}
