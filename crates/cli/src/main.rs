use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use meshnode_core::{
    DecodeLayout, ExternalGenerator, KeyProvisioner, NativeGenerator, NodeConfig, TrailingBytes,
    FIELD_DESCRIPTIONS,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "meshnode")]
#[command(about = "Generate and maintain mesh node configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the external key generator (defaults to realmain next to this binary)
    #[arg(long, global = true)]
    generator: Option<PathBuf>,

    /// Generate keys in process instead of running the external generator
    #[arg(long, global = true, conflicts_with = "generator")]
    native: bool,

    /// Byte mask the generator applies to its output, in hex
    #[arg(long, global = true, value_parser = parse_mask, default_value = "3f")]
    mask: u8,

    /// Seconds to wait for the generator before giving up
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Reject generator output that carries bytes past the key frame
    #[arg(long, global = true)]
    strict: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a default configuration with fresh keys
    Genconf {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the keys in an existing configuration file
    Newkeys {
        /// Configuration file to update
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print a fresh keypair
    Keys,
    /// Load and validate a configuration file
    Check {
        /// Configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Describe configuration fields
    Describe {
        /// Field to describe (all fields when omitted)
        field: Option<String>,
    },
}

fn parse_mask(value: &str) -> Result<u8, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid mask {value:?}: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match &cli.command {
        Commands::Genconf { output } => generate_config(&cli, output.as_deref()),
        Commands::Newkeys { config } => rotate_keys(&cli, &config_path(config.as_deref())),
        Commands::Keys => print_keys(&cli),
        Commands::Check { config } => check_config(&config_path(config.as_deref())),
        Commands::Describe { field } => describe(field.as_deref()),
    }
}

fn build_provisioner(cli: &Cli) -> KeyProvisioner {
    let trailing = if cli.strict {
        TrailingBytes::Reject
    } else {
        TrailingBytes::Ignore
    };
    let layout = DecodeLayout::default()
        .with_mask(cli.mask)
        .with_trailing(trailing);

    let provisioner = if cli.native {
        KeyProvisioner::new(NativeGenerator::new(cli.mask))
    } else {
        let generator = match &cli.generator {
            Some(path) => ExternalGenerator::new(path),
            None => ExternalGenerator::colocated(),
        };
        KeyProvisioner::new(generator.with_timeout(Duration::from_secs(cli.timeout_secs)))
    };

    let provisioner = provisioner.with_layout(layout);
    debug!("Using {:?}", provisioner);
    provisioner
}

fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meshnode")
            .join("node.conf")
    })
}

fn generate_config(cli: &Cli, output: Option<&Path>) -> Result<()> {
    let config = NodeConfig::generate(&build_provisioner(cli)).context("Could not generate keys")?;

    match output {
        Some(path) => {
            config
                .save_to_file(path)
                .with_context(|| format!("Could not write {}", path.display()))?;
            info!("Wrote new configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn rotate_keys(cli: &Cli, path: &Path) -> Result<()> {
    let mut config = NodeConfig::load_from_file(path)
        .with_context(|| format!("Could not load {}", path.display()))?;

    // The file is only rewritten once new keys are in hand
    config
        .install_new_keys(&build_provisioner(cli))
        .context("Could not generate keys; configuration left unchanged")?;

    config
        .save_to_file(path)
        .with_context(|| format!("Could not write {}", path.display()))?;

    println!("🔑 New public key: {}", config.public_key);
    Ok(())
}

fn print_keys(cli: &Cli) -> Result<()> {
    let keys = build_provisioner(cli)
        .generate_keys()
        .context("Could not generate keys")?;

    println!("Public key:  {}", keys.public_key_str()?);
    println!("Private key: {}", keys.private_key_str()?);
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = NodeConfig::load_from_file(path)
        .with_context(|| format!("Could not load {}", path.display()))?;

    if let Err(e) = config.validate() {
        bail!("{} is invalid: {}", path.display(), e);
    }

    println!("✅ {} is valid", path.display());
    if !config.has_keys() {
        println!("⚠️  No keypair set; run `meshnode newkeys` to provision one");
    }
    Ok(())
}

fn describe(field: Option<&str>) -> Result<()> {
    match field {
        Some(name) => match NodeConfig::field_description(name) {
            Some(description) => println!("{}: {}", name, description),
            None => bail!("Unknown configuration field: {}", name),
        },
        None => {
            for (name, description) in FIELD_DESCRIPTIONS {
                println!("{}\n  {}\n", name, description);
            }
        }
    }
    Ok(())
}
