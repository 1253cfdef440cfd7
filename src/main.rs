#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use nuvana::cli::{Cli, Command, EmiArgs};
use nuvana::core::{breakdown, remaining_principal_schedule};
use nuvana::{Config, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    match cli.command {
        Command::Serve { port } => {
            let mut config =
                Config::load_from(cli.config.clone()).context("failed to load configuration")?;
            if let Some(port) = port {
                config.server.port = port;
            }
            nuvana::api::run_http_server(config)
                .await
                .context("server error")?;
        }
        Command::HashPassword { password } => {
            println!("{}", nuvana::auth::hash_password(&password));
        }
        Command::Emi(args) => print_emi(&args)?,
    }
    Ok(())
}

fn print_emi(args: &EmiArgs) -> anyhow::Result<()> {
    let request = args.request();
    request.validate()?;
    let result = breakdown(request.principal, request.annual_rate, request.years());
    println!("Monthly EMI:     {:>14.2}", result.emi);
    println!("Total interest:  {:>14.2}", result.total_interest);
    println!("Total payment:   {:>14.2}", result.total_payment);
    if args.schedule {
        println!();
        println!("{:>6}  {:>14}", "Year", "Outstanding");
        for point in remaining_principal_schedule(
            request.principal,
            request.annual_rate,
            request.years(),
            result.emi,
        ) {
            println!("{:>6.1}  {:>14.2}", point.year, point.remaining);
        }
    }
    Ok(())
}
