//! Personalization simulator
//!
//! Runs one personalization session against simulated flash, OTP and
//! lifecycle controllers and prints the export bundle.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use manuf_core::{logging, Config};
use manuf_personalize::sim::{SimEntropy, SimFlash, SimLifecycle, SimOtp};
use manuf_personalize::{
    check_personalization_complete, Disposition, ExportBundle, LifecycleState, P256Primitive,
    Personalizer,
};
use serde::Serialize;
use tracing::info;

/// JSON output for a session
#[derive(Debug, Serialize)]
struct SessionOutput {
    success: bool,
    personalization_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle: Option<ExportBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disposition: Option<Disposition>,
}

#[derive(Debug)]
struct Options {
    config: Option<PathBuf>,
    lifecycle: LifecycleState,
    seed: Option<u64>,
    locked: bool,
    json: bool,
}

/// Parse command-line arguments, without the program name. Returns `None`
/// when usage was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options {
        config: None,
        lifecycle: LifecycleState::Dev,
        seed: None,
        locked: false,
        json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = args.get(i).context("Missing value for --config")?;
                options.config = Some(PathBuf::from(path));
            }
            "--lifecycle" | "-l" => {
                i += 1;
                let state = args.get(i).context("Missing value for --lifecycle")?;
                options.lifecycle = state.parse().map_err(anyhow::Error::msg)?;
            }
            "--seed" | "-s" => {
                i += 1;
                let seed = args.get(i).context("Missing value for --seed")?;
                options.seed = Some(seed.parse().context("Invalid --seed")?);
            }
            "--locked" => options.locked = true,
            "--json" => options.json = true,
            "--help" | "-h" => return Ok(None),
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    Ok(Some(options))
}

fn print_usage() {
    println!("Personalization simulator");
    println!();
    println!("USAGE:");
    println!("    personalize-sim [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>        Station configuration (TOML)");
    println!("    -l, --lifecycle <STATE>    Device lifecycle state [default: DEV]");
    println!("    -s, --seed <U64>           Seed for the simulated random source");
    println!("        --locked               Start with the secret partition locked");
    println!("        --json                 Print JSON output");
}

fn run(options: Options) -> Result<bool> {
    let config = match &options.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    logging::init(&config.logging).context("Failed to initialize logging")?;

    let seed = options.seed.unwrap_or_else(rand::random);
    info!(seed, lifecycle = %options.lifecycle, locked = options.locked, "Starting simulated session");

    let mut flash = SimFlash::new();
    let mut otp = if options.locked {
        SimOtp::locked()
    } else {
        SimOtp::new()
    };
    let lifecycle = SimLifecycle::new(options.lifecycle);

    let mut engine = Personalizer::new(SimEntropy::seeded(seed), P256Primitive, &config)?;
    let result = engine.provision_device(&mut flash, &lifecycle, &mut otp);
    let complete = check_personalization_complete(&otp).ok();

    let output = match result {
        Ok(bundle) => SessionOutput {
            success: true,
            personalization_complete: complete,
            bundle: Some(bundle),
            error: None,
            disposition: None,
        },
        Err(e) => SessionOutput {
            success: false,
            personalization_complete: complete,
            bundle: None,
            error: Some(e.to_string()),
            disposition: Some(e.disposition()),
        },
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match (&output.bundle, &output.error) {
            (Some(bundle), _) => {
                println!("Status: {:?}", bundle.status);
                println!("Lifecycle: {}", bundle.lifecycle_state);
                if let Some(key) = &bundle.device_public_key {
                    println!("Device public key: {}", key);
                }
                if let Some(wrapped) = &bundle.wrapped_rma_token {
                    println!("Wrapped RMA token for host key {}", wrapped.host_key_id);
                }
            }
            (None, Some(error)) => {
                println!("Error: {}", error);
                if let Some(disposition) = output.disposition {
                    println!("Disposition: {:?}", disposition);
                }
            }
            (None, None) => {}
        }
        match output.personalization_complete {
            Some(complete) => println!("Personalization complete: {}", complete),
            None => println!("Personalization complete: unknown"),
        }
    }

    Ok(output.success)
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            println!();
            print_usage();
            process::exit(1);
        }
    };

    match run(options) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let options = parse_args(&[]).unwrap().unwrap();
        assert_eq!(options.lifecycle, LifecycleState::Dev);
        assert!(options.config.is_none());
        assert!(options.seed.is_none());
        assert!(!options.locked);
        assert!(!options.json);
    }

    #[test]
    fn test_all_options() {
        let options = parse_args(&args(&[
            "--seed", "7", "--locked", "--json", "-l", "PROD", "-c", "station.toml",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(options.seed, Some(7));
        assert!(options.locked);
        assert!(options.json);
        assert_eq!(options.lifecycle, LifecycleState::Prod);
        assert_eq!(options.config, Some(PathBuf::from("station.toml")));
    }

    #[test]
    fn test_help_requested() {
        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
        assert!(parse_args(&args(&["--json", "-h"])).unwrap().is_none());
    }

    #[test]
    fn test_bad_lifecycle_rejected() {
        assert!(parse_args(&args(&["--lifecycle", "bogus"])).is_err());
        assert!(parse_args(&args(&["--lifecycle"])).is_err());
    }

    #[test]
    fn test_bad_seed_rejected() {
        assert!(parse_args(&args(&["--seed", "seven"])).is_err());
    }

    #[test]
    fn test_unknown_argument_rejected() {
        let err = parse_args(&args(&["--verbose"])).unwrap_err();
        assert!(err.to_string().contains("--verbose"));
    }
}
