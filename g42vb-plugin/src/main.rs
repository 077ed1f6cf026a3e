mod protocol;
mod server;

use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::{Env, Target};

use g42vb_core::identifier::AssociationId;

use server::{Server, schema_document};

#[derive(Parser)]
#[command(name = "terraform-provider-g42vbcloud")]
#[command(about = "g42vbcloud provider plugin", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the plugin protocol on stdin/stdout (default)
    Serve,
    /// Print provider, resource and data source schemas as JSON
    Schema,
    /// Split a floating IP association ID into its fields
    ParseId {
        /// Association ID, `<public_ip>/<instance_id>/<fixed_ip>`
        id: String,
    },
}

#[tokio::main]
async fn main() {
    // stdout carries the protocol; logs go to stderr
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .target(Target::Stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve().await,
        Commands::Schema => run_schema(),
        Commands::ParseId { id } => run_parse_id(&id),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_serve() -> Result<(), String> {
    log::info!("Starting g42vbcloud plugin v{}", env!("CARGO_PKG_VERSION"));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Server::g42vbcloud()
        .serve(stdin, tokio::io::stdout())
        .await
        .map_err(|e| format!("Plugin I/O failed: {}", e))
}

fn run_schema() -> Result<(), String> {
    let document = serde_json::to_string_pretty(&schema_document()).map_err(|e| e.to_string())?;
    println!("{}", document);
    Ok(())
}

fn run_parse_id(id: &str) -> Result<(), String> {
    let association: AssociationId = id.parse().map_err(|e| format!("{}", e))?;
    println!("{} {}", "public_ip:  ".bold(), association.public_ip);
    println!("{} {}", "instance_id:".bold(), association.instance_id);
    match &association.fixed_ip {
        Some(fixed_ip) => println!("{} {}", "fixed_ip:   ".bold(), fixed_ip),
        None => println!("{} {}", "fixed_ip:   ".bold(), "(not pinned)".dimmed()),
    }
    Ok(())
}
