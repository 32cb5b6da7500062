//! # grpc-steps CLI Entry Point
//!
//! The main executable of `grpc-steps`. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs the
//!    `tracing` subscriber (`RUST_LOG`, `info` by default).
//! 2. **Registration**: Builds the method [`Registry`] from descriptor sets, server
//!    reflection and the optional JSON configuration.
//! 3. **Execution**: Runs the feature files with `cucumber`, one [`world::GrpcWorld`] per scenario.
//! 4. **Presentation**: Prints the registered methods (`--list`) or the registration errors.

mod cli;
mod formatter;
mod world;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use cucumber::World;
use formatter::{FormattedString, GenericError, MethodList};
use grpc_steps::{
    GrpcSteps, Registry, RegistryConfig, ServiceOption, grpc::dial,
    reflection::client::ReflectionClient,
};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;
use world::GrpcWorld;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing();

    let registry = match build_registry(&args).await {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!(
                "{}",
                FormattedString::from(GenericError("Registration Failed:", format!("{err:#}")))
            );
            process::exit(1);
        }
    };

    if args.list {
        println!("{}", FormattedString::from(MethodList(&registry)));
        return;
    }

    info!(methods = registry.len(), features = %args.features.display(), "running features");

    if let Err(err) = world::install(GrpcSteps::new(registry)) {
        eprintln!("{}", FormattedString::from(GenericError("Startup Failed:", err.to_string())));
        process::exit(1);
    }

    GrpcWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run_and_exit(args.features)
        .await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn build_registry(args: &Cli) -> anyhow::Result<Registry> {
    let mut builder = Registry::builder();

    if let Some(path) = &args.config {
        let config = RegistryConfig::from_file(path)?;
        builder = builder.with_config(&config);
    }

    if let Some(address) = &args.address {
        builder = builder.default_service_options([ServiceOption::address(address)]);
    }

    if !args.headers.is_empty() {
        builder =
            builder.default_service_options([ServiceOption::headers(args.headers.clone())]);
    }

    if let Some(prefix) = &args.prefix {
        builder = builder.service_prefix(prefix);
    }

    for path in &args.descriptor_sets {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read '{}'", path.display()))?;

        builder = builder
            .register_file_descriptor_set(&bytes, [])
            .with_context(|| format!("Invalid descriptor set '{}'", path.display()))?;
    }

    for address in &args.reflect {
        let channel = dial::connect(address, &[]).await?;
        let mut client = ReflectionClient::new(channel);

        let services = client
            .all_service_descriptors()
            .await
            .with_context(|| format!("Server reflection failed for '{address}'"))?;

        for service in services {
            info!(service = service.full_name(), %address, "registered service via reflection");
            builder = builder.register_service(service, [ServiceOption::address(address)]);
        }
    }

    Ok(builder.build()?)
}
