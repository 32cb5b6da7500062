//! # CLI
//!
//! This module defines the command-line interface of `grpc-steps` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers are `key:value`).
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "grpc-steps",
    version,
    about = "Run Gherkin feature files against gRPC services"
)]
pub struct Cli {
    /// Feature file, or directory searched for `.feature` files
    #[arg(default_value = "features")]
    pub features: PathBuf,

    /// Encoded FileDescriptorSet (.bin) whose services are registered
    #[arg(short = 'd', long = "descriptor-set")]
    pub descriptor_sets: Vec<PathBuf>,

    /// Server whose services are registered through gRPC server reflection
    ///
    /// Calls to the reflected services are sent to that same server.
    #[arg(short = 'r', long = "reflect")]
    pub reflect: Vec<String>,

    /// Default address of every registered service (e.g. `localhost:50051` or `:9090`)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Header sent with every call (`key:value`)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// JSON registry configuration file
    ///
    /// Per-service settings of the file take precedence over `--address` and `--header`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Prefix stripped from method names, so `ItemService/GetItem` can stand for
    /// `/grpctest.ItemService/GetItem` with `--prefix /grpctest.`
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Print the registered methods and exit
    #[arg(short, long)]
    pub list: bool,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["grpc-steps"]).unwrap();

        assert_eq!(cli.features, PathBuf::from("features"));
        assert!(cli.descriptor_sets.is_empty());
        assert!(cli.reflect.is_empty());
        assert!(!cli.list);
    }

    #[test]
    fn repeated_sources_and_headers() {
        let cli = Cli::try_parse_from([
            "grpc-steps",
            "tests/features",
            "-d",
            "a.bin",
            "--descriptor-set",
            "b.bin",
            "--reflect",
            "localhost:50051",
            "-H",
            "locale: en-US",
            "--header",
            "x-tag:a",
            "--prefix",
            "/grpctest.",
            "--list",
        ])
        .unwrap();

        assert_eq!(cli.features, PathBuf::from("tests/features"));
        assert_eq!(
            cli.descriptor_sets,
            vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")]
        );
        assert_eq!(cli.reflect, vec!["localhost:50051".to_string()]);
        assert_eq!(
            cli.headers,
            vec![
                ("locale".to_string(), "en-US".to_string()),
                ("x-tag".to_string(), "a".to_string()),
            ]
        );
        assert_eq!(cli.prefix.as_deref(), Some("/grpctest."));
        assert!(cli.list);
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(Cli::try_parse_from(["grpc-steps", "-H", "no-separator"]).is_err());
    }
}
