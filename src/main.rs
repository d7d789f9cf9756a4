//! bemcp - command line front end for the session manager
//!
//! Loads the servers file, connects, runs one command, cleans up.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::Level;

use bemcp::logging::{init_logging, LogFormat, LoggingConfig};
use bemcp::mcp::{format_tool_output, RetryPolicy, ServersFile, SessionManager, ToolDescriptor};

#[derive(Parser)]
#[command(name = "bemcp", about = "Resilient client for MCP servers")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Servers file (JSON `mcpServers` or TOML `[servers.<name>]`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Retries after a failed connect
    #[arg(long, global = true, default_value_t = 2)]
    retries: u32,

    /// Seconds between connect attempts
    #[arg(long, global = true, default_value_t = 1.0)]
    retry_delay: f64,

    /// Log format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    /// Also write logs to the daily log file
    #[arg(long, global = true)]
    log_file: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers without connecting
    Servers,
    /// List the tools of every server
    Tools {
        /// Print function-calling schemas as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the resources of every server
    Resources,
    /// Call a tool on one server
    Call {
        server: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Read a resource from one server
    Read { server: String, uri: String },
}

impl Commands {
    /// The only server this command needs, if it targets one.
    fn target(&self) -> Option<&str> {
        match self {
            Commands::Call { server, .. } | Commands::Read { server, .. } => Some(server),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LoggingConfig {
        level: if cli.verbose { Level::DEBUG } else { Level::WARN },
        format: LogFormat::from_str(&cli.log_format),
        file_output: cli.log_file,
        ..Default::default()
    });

    let file = ServersFile::load(cli.config.as_deref()).context("failed to load servers file")?;

    if let Commands::Servers = cli.command {
        for (name, config) in &file.servers {
            println!("{name}\t{}", config.endpoint());
        }
        return Ok(());
    }

    if file.is_empty() {
        bail!("no servers configured; pass --config or create .bemcp/servers.toml");
    }

    let retry = RetryPolicy::new(cli.retries, retry_delay(cli.retry_delay)?);
    let mut manager = SessionManager::new().with_retry_policy(retry);

    match cli.command.target() {
        Some(server) => {
            let config = file
                .servers
                .get(server)
                .with_context(|| format!("server '{server}' is not configured"))?;
            manager
                .add(server, config.clone())
                .await
                .with_context(|| format!("failed to connect to '{server}'"))?;
        }
        None => {
            for (name, e) in manager.add_all(&file).await {
                eprintln!("warning: skipping '{name}': {e}");
            }
        }
    }

    let result = run(&mut manager, cli.command).await;
    manager.cleanup().await;
    result
}

/// Parse `--retry-delay` seconds into a delay.
fn retry_delay(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) => Ok(delay),
        Err(e) => bail!("--retry-delay must be a non-negative number of seconds: {e}"),
    }
}

async fn run(manager: &mut SessionManager, command: Commands) -> Result<()> {
    match command {
        Commands::Servers => {}
        Commands::Tools { json } => {
            let tools = manager.list_all_tools().await;
            if json {
                let schemas: Vec<Value> = tools
                    .values()
                    .flatten()
                    .map(ToolDescriptor::to_function_schema)
                    .collect();
                println!("{}", serde_json::to_string_pretty(&schemas)?);
            } else {
                for (server, tools) in &tools {
                    println!("{server}:");
                    for tool in tools {
                        println!("  {} - {}", tool.name, tool.description.as_deref().unwrap_or(""));
                    }
                }
            }
        }
        Commands::Resources => {
            for (server, resources) in &manager.list_all_resources().await {
                println!("{server}:");
                for resource in resources {
                    println!("  {} ({})", resource.uri, resource.name);
                }
            }
        }
        Commands::Call { server, tool, args } => {
            let arguments: Map<String, Value> =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            let output = manager.call_tool(&server, &tool, arguments).await?;
            println!("{}", format_tool_output(&output));
            if output.is_error {
                bail!("tool '{tool}' reported an error");
            }
        }
        Commands::Read { server, uri } => {
            let readout = manager.read_resource(&server, &uri).await?;
            for block in &readout.contents {
                match block.as_text() {
                    Some(text) => println!("{text}"),
                    None => println!("[non-text content]"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_accepts_fractional_seconds() {
        assert_eq!(retry_delay(0.25).unwrap(), Duration::from_millis(250));
        assert_eq!(retry_delay(0.0).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_rejects_unrepresentable_values() {
        for secs in [-1.0, f64::NAN, f64::INFINITY, 1e20] {
            assert!(retry_delay(secs).is_err(), "{secs} should be rejected");
        }
    }
}
