//! kvpool CLI Client
//!
//! Command-line interface that runs commands through a connection pool.

use clap::{Parser, Subcommand};
use kvpool::{Command, ExecOptions, KvClient, PoolConfig, Reply};
use tracing_subscriber::{fmt, EnvFilter};

/// kvpool CLI
#[derive(Parser, Debug)]
#[command(name = "kvpool-cli")]
#[command(about = "Run commands against a key-value server through a connection pool")]
#[command(version)]
struct Args {
    /// Connection string
    #[arg(short, long, default_value = "redis://127.0.0.1:6379")]
    url: String,

    /// Number of pooled connections
    #[arg(short, long, default_value = "1")]
    pool_size: usize,

    /// Retries for transport faults
    #[arg(short, long, default_value = "0")]
    retries: u32,

    /// How long to wait for a free connection (ms)
    #[arg(long, default_value = "5000")]
    lease_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Ping the server
    Ping,

    /// Run an arbitrary command, e.g. `exec INCR counter`
    Exec {
        #[arg(required = true, num_args = 1..)]
        args: Vec<String>,
    },

    /// Run several commands as one pipeline, one quoted command per argument
    Pipe {
        #[arg(required = true, num_args = 1..)]
        commands: Vec<String>,
    },
}

fn main() {
    // Logs go to stderr so command output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,kvpool=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = PoolConfig::builder("cli", &args.url)
        .pool_size(args.pool_size)
        .health_check_interval_ms(0)
        .build();
    let options = ExecOptions::default()
        .lease_timeout_ms(args.lease_timeout_ms)
        .retry_count(args.retries);

    let client = match KvClient::connect(config) {
        Ok(client) => client.with_options(options),
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    };

    let outcome = match args.command {
        Commands::Get { key } => client.get(&key).map(|value| match value {
            Some(data) => Reply::Bulk(data),
            None => Reply::Nil,
        }),
        Commands::Set { key, value } => client.set(&key, &value).map(|_| Reply::status("OK")),
        Commands::Del { key } => client.del(&key).map(|removed| Reply::Integer(removed as i64)),
        Commands::Ping => client.ping().map(Reply::Status),
        Commands::Exec { args } => client.command(&Command::new(&args)),
        Commands::Pipe { commands } => {
            let commands: Vec<Command> = commands.iter().map(|line| Command::from_line(line)).collect();
            client.pipeline(&commands).map(Reply::Array)
        }
    };

    client.stop();

    match outcome {
        Ok(reply) => print_reply(&reply, 0),
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a reply the way interactive clients usually do
fn print_reply(reply: &Reply, indent: usize) {
    let pad = " ".repeat(indent);
    match reply {
        Reply::Nil => println!("{}(nil)", pad),
        Reply::Status(text) => println!("{}{}", pad, text),
        Reply::Integer(value) => println!("{}(integer) {}", pad, value),
        Reply::Bulk(data) => println!("{}\"{}\"", pad, String::from_utf8_lossy(data)),
        Reply::Error(message) => println!("{}(error) {}", pad, message),
        Reply::Array(items) if items.is_empty() => println!("{}(empty array)", pad),
        Reply::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                print!("{}{}) ", pad, i + 1);
                match item {
                    Reply::Array(_) => {
                        println!();
                        print_reply(item, indent + 3);
                    }
                    _ => print_reply(item, 0),
                }
            }
        }
    }
}
