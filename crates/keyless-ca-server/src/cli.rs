//! Command-line interface definitions for keyless-ca-server
//!
//! Defines all CLI commands, subcommands, and arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "keyless-ca-server",
    author,
    version,
    about = "Short-lived code-signing certificate authority",
    long_about = "Issues short-lived code-signing certificates bound to OIDC identities, \
                  with Certificate Transparency submission"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the issuance server
    Serve(ServeArgs),

    /// Print the configured CA's root certificate and exit
    #[command(name = "createca")]
    CreateCa(CreateCaArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to the server configuration file (JSON or YAML)
    #[arg(long = "config", value_name = "PATH", required = true)]
    pub config_path: PathBuf,

    /// Override the listen port from the configuration file
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct CreateCaArgs {
    /// Path to the server configuration file (JSON or YAML)
    #[arg(long = "config", value_name = "PATH", required = true)]
    pub config_path: PathBuf,

    /// Write the root certificate PEM here instead of stdout
    #[arg(long = "out", value_name = "PATH")]
    pub out_path: Option<PathBuf>,
}
