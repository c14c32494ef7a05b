//! Command-line interface for tflite-rs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run TensorFlow Lite models through the TFLite C library.
#[derive(Parser, Debug)]
#[command(name = "tflite-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the library version and the model's tensors.
    Info {
        /// Path or http(s) URL of the .tflite model.
        #[arg(short, long)]
        model: String,

        /// Path to the TFLite C library.
        #[arg(short, long)]
        library: Option<PathBuf>,
    },

    /// Run one inference.
    Infer {
        /// Path or http(s) URL of the .tflite model.
        #[arg(short, long)]
        model: String,

        /// Path to input data file (JSON: {"inputs": [[...], ...]}).
        #[arg(short, long)]
        input: PathBuf,

        /// Worker threads; values <= 0 keep the engine default.
        #[arg(short, long)]
        threads: Option<i32>,

        /// Path to an external delegate library.
        #[arg(short, long, conflicts_with = "coral")]
        delegate: Option<String>,

        /// Attach the Coral Edge TPU delegate for this platform.
        #[arg(long)]
        coral: bool,

        /// Delegate option as key=value. May be repeated.
        #[arg(long = "delegate-option", value_parser = parse_key_value)]
        delegate_option: Vec<(String, String)>,

        /// Path to the TFLite C library.
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Path to optional YAML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (json, pretty).
        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_infer() {
        let cli = Cli::try_parse_from([
            "tflite-rs",
            "infer",
            "--model",
            "m.tflite",
            "--input",
            "in.json",
            "--delegate",
            "libedgetpu.so.1",
            "--delegate-option",
            "device=usb",
            "--delegate-option",
            "a=b=c",
        ])
        .unwrap();
        match cli.command {
            Commands::Infer {
                model,
                delegate_option,
                threads,
                coral,
                format,
                ..
            } => {
                assert_eq!(model, "m.tflite");
                assert!(!coral);
                assert_eq!(
                    delegate_option,
                    vec![
                        ("device".to_string(), "usb".to_string()),
                        ("a".to_string(), "b=c".to_string()),
                    ]
                );
                assert_eq!(threads, None);
                assert_eq!(format, "json");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_delegate_option() {
        let result = Cli::try_parse_from([
            "tflite-rs",
            "infer",
            "-m",
            "m.tflite",
            "-i",
            "in.json",
            "--delegate-option",
            "novalue",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_coral_flag() {
        let args = ["tflite-rs", "infer", "-m", "https://tfhub.dev/a/lite-model/b/1"];
        let extra = ["-i", "in.json", "--coral"];
        let cli = Cli::try_parse_from(args.iter().chain(&extra)).unwrap();
        match cli.command {
            Commands::Infer {
                model,
                coral,
                delegate,
                ..
            } => {
                assert!(model.starts_with("https://"));
                assert!(coral);
                assert_eq!(delegate, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let extra = ["-i", "x", "--coral", "-d", "lib.so"];
        let both = Cli::try_parse_from(args.iter().chain(&extra));
        assert!(both.is_err());
    }
}
