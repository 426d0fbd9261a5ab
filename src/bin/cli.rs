use anyhow::{bail, Context};
use crabintrinsics::bridge::{get_intrinsics_with, BridgeError};
use crabintrinsics::permissions::check_permission;
#[cfg(not(target_os = "android"))]
use crabintrinsics::platform::NativePlatform;
use crabintrinsics::platform::{PlatformInfo, TrackingPlatform};
use crabintrinsics::testing::{sample_distortion, ScriptedPlatform};
use crabintrinsics::{IntrinsicsAcquirer, IntrinsicsConfig};
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crabintrinsics::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: crabintrinsics-cli <acquire|config> [--simulate] [--json] [--config <path>]");
        std::process::exit(1);
    }

    let config = load_config(&args)?;
    let command = &args[1];
    match command.as_str() {
        "acquire" => cmd_acquire(&args, config).await,
        "config" => cmd_config(config),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn load_config(args: &[String]) -> anyhow::Result<IntrinsicsConfig> {
    match flag_value(args, "--config") {
        Some(path) => {
            let path = PathBuf::from(path);
            IntrinsicsConfig::load_from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))
        }
        None if args.iter().any(|a| a == "--config") => bail!("--config needs a path"),
        None => Ok(IntrinsicsConfig::load_or_default()),
    }
}

async fn cmd_acquire(args: &[String], config: IntrinsicsConfig) -> anyhow::Result<()> {
    let json = args.iter().any(|a| a == "--json");

    let result = if args.iter().any(|a| a == "--simulate") {
        let platform = ScriptedPlatform::converging_after(3).with_distortion(sample_distortion());
        acquire_on(platform, config, json).await
    } else {
        acquire_native(config, json).await
    };

    if let Err(e) = result {
        if json {
            println!("{}", serde_json::to_string(&e)?);
        } else {
            eprintln!("Acquisition failed: {}", e);
        }
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(not(target_os = "android"))]
async fn acquire_native(config: IntrinsicsConfig, json: bool) -> Result<(), BridgeError> {
    acquire_on(NativePlatform::default(), config, json).await
}

// ARCore needs the JNI environment of a hosting activity
#[cfg(target_os = "android")]
async fn acquire_native(_config: IntrinsicsConfig, _json: bool) -> Result<(), BridgeError> {
    Err(BridgeError::not_attached())
}

async fn acquire_on<P: TrackingPlatform>(
    platform: P,
    config: IntrinsicsConfig,
    json: bool,
) -> Result<(), BridgeError> {
    let acquirer = IntrinsicsAcquirer::new(platform, config.acquisition);
    print_platform(&acquirer.platform_info(), json);

    let calibration = get_intrinsics_with(&acquirer, check_permission()).await?;
    if json {
        match serde_json::to_string(&calibration) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Could not encode result: {}", e),
        }
    } else {
        println!(
            "focal length: {:.3} {:.3}",
            calibration.focal_length.0, calibration.focal_length.1
        );
        println!(
            "principal point: {:.3} {:.3}",
            calibration.principal_point.0, calibration.principal_point.1
        );
        println!(
            "image: {}x{}",
            calibration.image_dimensions.0, calibration.image_dimensions.1
        );
        if calibration.has_distortion() {
            println!("distortion: {:?}", calibration.distortion_coefficients);
        } else {
            println!("distortion: none published");
        }
    }
    Ok(())
}

fn print_platform(info: &PlatformInfo, json: bool) {
    if !json {
        println!(
            "{} backend on {} (supported: {})",
            info.backend,
            info.platform.as_str(),
            info.supported
        );
    }
}

fn cmd_config(config: IntrinsicsConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(&config).context("rendering config")?;
    print!("{}", rendered);
    println!(
        "# worst case: {}ms before giving up",
        config.acquisition.worst_case_duration().as_millis()
    );
    Ok(())
}
