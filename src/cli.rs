//! Command-line interface for the `nuvana` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::{EmiRequest, TermUnit};
use crate::logging::Verbosity;

/// nuvana - online banking service
#[derive(Debug, Parser)]
#[command(name = "nuvana")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (defaults to ./nuvana.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a salted hash for an admin credential
    HashPassword {
        password: String,
    },

    /// Work out the monthly instalment for a loan
    Emi(EmiArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliTermUnit {
    Years,
    Months,
}

impl From<CliTermUnit> for TermUnit {
    fn from(value: CliTermUnit) -> Self {
        match value {
            CliTermUnit::Years => TermUnit::Years,
            CliTermUnit::Months => TermUnit::Months,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct EmiArgs {
    /// Loan amount
    #[arg(long)]
    pub principal: f64,

    /// Annual interest rate in percent
    #[arg(long)]
    pub rate: f64,

    /// Loan tenure
    #[arg(long)]
    pub term: f64,

    #[arg(long, value_enum, default_value_t = CliTermUnit::Years)]
    pub unit: CliTermUnit,

    /// Print the yearly outstanding-principal schedule too
    #[arg(long)]
    pub schedule: bool,
}

impl EmiArgs {
    #[must_use]
    pub fn request(&self) -> EmiRequest {
        EmiRequest {
            principal: self.principal,
            annual_rate: self.rate,
            term: self.term,
            unit: self.unit.into(),
        }
    }
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
