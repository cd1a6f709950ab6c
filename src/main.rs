use anyhow::{Context, Result, bail};
use argon2_envelope::{Envelope, HashEngine, Parameters, Storage};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod auth;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 131072)
    #[arg(long = "argon-mem", env = "ARGON2_ENVELOPE_MEM")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time", env = "ARGON2_ENVELOPE_TIME")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 4)
    #[arg(long = "argon-parallelism", env = "ARGON2_ENVELOPE_PARALLELISM")]
    parallelism: Option<u8>,

    /// Salt length in bytes (default: 32)
    #[arg(long = "salt-len", env = "ARGON2_ENVELOPE_SALT_LEN")]
    salt_length: Option<u32>,

    /// Derived key length in bytes (default: 32)
    #[arg(long = "key-len", env = "ARGON2_ENVELOPE_KEY_LEN")]
    key_length: Option<u32>,
}

impl Argon2Args {
    fn to_parameters(&self) -> Parameters {
        let default = Parameters::DEFAULT;

        Parameters::new(
            self.mem_cost_kib.unwrap_or(default.memory_cost()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.parallelism.unwrap_or(default.parallelism()),
            self.salt_length.unwrap_or(default.salt_length()),
            self.key_length.unwrap_or(default.key_length()),
        )
    }
}

#[derive(Debug, clap::Args)]
#[group(required = true, multiple = false)]
struct HashSource {
    /// Base64 encoded hash
    #[arg(long, value_name = "BASE64")]
    hash: Option<String>,

    /// File holding the raw hash bytes
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

impl HashSource {
    fn load(&self) -> Result<Envelope> {
        if let Some(encoded) = &self.hash {
            let bytes = STANDARD
                .decode(encoded.trim())
                .context("hash is not valid base64")?;
            return Envelope::from_bytes(bytes).context("invalid hash");
        }

        if let Some(path) = &self.file {
            return Storage::new(path.clone())
                .load()
                .with_context(|| format!("failed to read hash from {}", path.display()));
        }

        bail!("no hash given")
    }
}

#[derive(Debug, Parser)]
#[command(name = "argon2-envelope")]
#[command(
    version,
    about = "Create and check self-describing Argon2id password hashes."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Hashes a password
    Hash {
        #[command(flatten)]
        argon2: Argon2Args,

        /// Write the raw hash to this file instead of printing base64
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Checks a password against a stored hash
    Verify {
        #[command(flatten)]
        source: HashSource,
    },

    /// Shows the parameters, salt and key of a stored hash
    Inspect {
        #[command(flatten)]
        source: HashSource,

        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    parameters: Parameters,
    salt: String,
    key: String,
    len: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    match args.command {
        Commands::Hash { argon2, out } => {
            let params = argon2.to_parameters();
            let password = auth::read_new_password()?;
            let envelope =
                argon2_envelope::derive(&password, params).context("failed to hash password")?;
            drop(password);

            match out {
                Some(path) => {
                    Storage::new(path.clone())
                        .save(&envelope)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("hash written to {}", path.display());
                }
                None => println!("{}", STANDARD.encode(envelope.as_bytes())),
            }
        }
        Commands::Verify { source } => {
            let envelope = source.load()?;
            let password = auth::read_password()?;

            if !HashEngine::new().validate(&password, envelope.as_bytes()) {
                bail!("password does not match");
            }
            println!("password is valid");
        }
        Commands::Inspect { source, json } => {
            let envelope = source.load()?;
            let Some(parameters) = envelope.header() else {
                bail!("no hash stored");
            };

            let report = Report {
                parameters,
                salt: STANDARD.encode(envelope.salt()),
                key: STANDARD.encode(envelope.key()),
                len: envelope.len(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("memory cost:  {} KiB", parameters.memory_cost());
                println!("time cost:    {}", parameters.time_cost());
                println!("parallelism:  {}", parameters.parallelism());
                println!("salt length:  {}", parameters.salt_length());
                println!("key length:   {}", parameters.key_length());
                println!("salt:         {}", report.salt);
                println!("key:          {}", report.key);
            }
        }
    }

    Ok(())
}
