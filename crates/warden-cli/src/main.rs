//! Warden - admission webhooks for AWS workload clusters

use clap::Parser;
use tracing::error;

mod config;
mod error;
mod exit_codes;
mod server;
mod telemetry;

use config::Args;

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let args = Args::parse();

    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install the TLS crypto provider: {e:?}");
        std::process::exit(exit_codes::ERROR);
    }

    if let Err(e) = telemetry::init(args.log_json) {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(exit_codes::ERROR);
    }

    if let Err(e) = server::run(args).await {
        error!(error = %e, "warden stopped");
        let code = e.exit_code();
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(code);
    }
}
