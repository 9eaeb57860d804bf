//! Interface Registry CLI
//!
//! Loads the bundled and configured interface manifests, then inspects,
//! hashes, encodes, decodes or generates bindings for them.

use std::path::PathBuf;

use amr_interfaces::codegen::{generate_rust, CodegenOptions};
use amr_interfaces::{Codec, InterfaceSet, InterfacesConfig, Value};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amr-interfaces")]
#[command(about = "Inspect and exercise AMR/SLAM interface definitions")]
struct Cli {
    /// Config file (defaults: interfaces.toml, .interfaces.toml, config/interfaces.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Additional manifest directory (repeatable)
    #[arg(short, long = "manifests", global = true)]
    manifests: Vec<PathBuf>,

    /// Skip the interfaces embedded in this binary
    #[arg(long, global = true)]
    no_bundled: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every manifest and report what registered
    Check,

    /// Show one interface: fields, hash and dependencies
    Show {
        /// Qualified name (e.g. amr_interfaces/msg/RobotStatus)
        name: String,
    },

    /// Fuzzy-search interface names
    Search {
        query: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print type hashes
    Hash {
        /// Only this interface
        name: Option<String>,
    },

    /// Encode a JSON value to hex
    Encode {
        /// Qualified schema name
        name: String,
        /// JSON value (reads --file when omitted)
        json: Option<String>,
        /// Read the JSON value from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Decode hex bytes to JSON
    Decode {
        /// Qualified schema name
        name: String,
        /// Hex-encoded payload
        hex: String,
    },

    /// Generate Rust bindings
    Codegen {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Leave out serde derives
        #[arg(long)]
        no_serde: bool,
    },

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match InterfacesConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: InterfacesConfig) -> Result<()> {
    if let Commands::Config { init } = &cli.command {
        return show_config(&config, init.as_ref());
    }

    let set = load_interfaces(&cli, &config)?;

    match cli.command {
        Commands::Check => {
            println!("✅ {} interfaces registered", set.registry.len());
            for (package, version) in &set.packages {
                let count = set
                    .registry
                    .names()
                    .filter(|n| n.split('/').next() == Some(package.as_str()))
                    .count();
                println!("  📦 {} {} - {} interfaces", package, version, count);
            }
            println!("  🔧 {} services, 🎯 {} actions", set.services.len(), set.actions.len());
            Ok(())
        }

        Commands::Show { name } => {
            let entry = set.registry.entry(&name).ok_or_else(|| not_found(&set, &name))?;
            let schema = &entry.schema;

            println!("📄 {} ({})", schema.name, schema.kind);
            println!("   hash: {}", entry.type_hash);
            println!("   registered: {}", entry.registered_at.to_rfc3339());
            println!();
            for field in &schema.fields {
                match &field.default {
                    Some(default) => println!("  {}: {} = {}", field.name, field.field_type, default.to_json()),
                    None => println!("  {}: {}", field.name, field.field_type),
                }
            }

            let deps = set.registry.dependencies(&name);
            if !deps.is_empty() {
                println!();
                println!("  depends on:");
                for dep in deps {
                    println!("    └─ {}", dep);
                }
            }
            Ok(())
        }

        Commands::Search { query, limit } => {
            let matches = set.registry.search(&query, limit);
            if matches.is_empty() {
                println!("No interfaces match '{}'", query);
            }
            for name in matches {
                println!("{}", name);
            }
            Ok(())
        }

        Commands::Hash { name } => {
            match name {
                Some(name) => {
                    let entry = set.registry.entry(&name).ok_or_else(|| not_found(&set, &name))?;
                    println!("{}", entry.type_hash);
                }
                None => {
                    for entry in set.registry.entries() {
                        println!("{}  {}", entry.type_hash, entry.schema.name);
                    }
                }
            }
            Ok(())
        }

        Commands::Encode { name, json, file } => {
            let text = match (json, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("pass a JSON value or --file"),
            };
            let schema = set.registry.lookup(&name).ok_or_else(|| not_found(&set, &name))?;
            let json: serde_json::Value = serde_json::from_str(&text).context("parsing JSON value")?;
            let value = Value::from_json(&json, schema, &set.registry)?;

            let codec = Codec::new(&set.registry).with_limits(config.codec.limits());
            let bytes = codec.encode(&value, schema)?;
            debug!(interface = %name, len = bytes.len(), "encoded value");
            println!("{}", hex::encode(&bytes));
            Ok(())
        }

        Commands::Decode { name, hex: payload } => {
            let schema = set.registry.lookup(&name).ok_or_else(|| not_found(&set, &name))?;
            let bytes = hex::decode(payload.trim()).context("payload is not valid hex")?;

            let codec = Codec::new(&set.registry).with_limits(config.codec.limits());
            let value = codec.decode(&bytes, schema)?;
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
            Ok(())
        }

        Commands::Codegen { output, no_serde } => {
            let options = CodegenOptions {
                derive_serde: config.codegen.derive_serde && !no_serde,
            };
            let generated = generate_rust(&set.registry, &options);

            match output {
                Some(path) => {
                    std::fs::write(&path, &generated.code)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("✅ {} types written to {:?}", generated.type_count, path);
                }
                None => print!("{}", generated.code),
            }
            Ok(())
        }

        Commands::Config { init } => show_config(&config, init.as_ref()),
    }
}

fn load_interfaces(cli: &Cli, config: &InterfacesConfig) -> Result<InterfaceSet> {
    let mut config = config.clone();
    config.registry.include_bundled &= !cli.no_bundled;
    config.registry.manifest_dirs.extend(cli.manifests.iter().cloned());

    let set = InterfaceSet::from_config(&config).context("loading interface manifests")?;
    if set.registry.is_empty() {
        bail!("no interface manifests to load");
    }
    Ok(set)
}

fn not_found(set: &InterfaceSet, name: &str) -> anyhow::Error {
    match set.registry.search(name, 1).first() {
        Some(suggestion) => anyhow!("interface '{}' not found (did you mean {}?)", name, suggestion),
        None => anyhow!("interface '{}' not found", name),
    }
}

fn show_config(config: &InterfacesConfig, init: Option<&PathBuf>) -> Result<()> {
    match init {
        Some(path) => {
            let path_str = path.to_str().ok_or_else(|| anyhow!("config path is not UTF-8"))?;
            config.save(path_str)?;
            println!("✅ Config written to {:?}", path);
        }
        None => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}
