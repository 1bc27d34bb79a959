use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tracing::{info, Level};

use redfish::{AuthConfig, CollectionWalker, Config, Payload, RedfishService, ServiceConfig};

#[derive(Parser)]
#[command(name = "redfish-cli")]
#[command(about = "Query and modify a Redfish service")]
#[command(version)]
struct Cli {
    /// TOML configuration file; command-line values take precedence
    #[arg(short, long)]
    config: Option<String>,

    /// The host to query, e.g. https://10.0.0.5
    #[arg(short = 'H', long)]
    host: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Use session based auth instead of basic auth
    #[arg(short = 'S', long)]
    session: bool,

    /// Token sent as X-Auth-Token instead of username/password auth
    #[arg(short = 'T', long)]
    token: Option<String>,

    /// Work around non-conforming services ("verdoc": no version document)
    #[arg(short = 'W', long)]
    workaround: Vec<String>,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print JSON without indentation
    #[arg(long)]
    compact: bool,

    /// Log more information (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the service root
    Root {
        #[arg(default_value = "")]
        version: String,
    },
    /// Show the version document
    Versions,
    /// Resolve a RedPath, e.g. /Systems[0]/Status
    Get { path: String },
    /// Print every member of the collection at a RedPath
    List { path: String },
    /// Set a string property on the resource at a RedPath
    Patch {
        path: String,
        property: String,
        value: String,
    },
    /// POST a JSON body to the resource at a RedPath
    Post { path: String, body: String },
    /// DELETE the resource at a RedPath
    Delete { path: String },
}

impl Cli {
    fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading {}", path))?
                .service,
            None => {
                let Some(host) = &self.host else {
                    bail!("a host is required (--host or --config)");
                };
                ServiceConfig::new(host.clone())
            }
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config.auth = if self.session {
                AuthConfig::Session {
                    username: username.clone(),
                    password: password.clone(),
                }
            } else {
                AuthConfig::Basic {
                    username: username.clone(),
                    password: password.clone(),
                }
            };
        } else if let Some(token) = &self.token {
            config.auth = AuthConfig::Token {
                token: token.clone(),
            };
        }
        for workaround in &self.workaround {
            match workaround.to_ascii_lowercase().as_str() {
                "verdoc" => config.no_version_doc = true,
                other => bail!("unknown workaround {}", other),
            }
        }
        if self.insecure {
            config.accept_invalid_certs = true;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.service_config()?;
    let service = RedfishService::from_config(&config)
        .await
        .with_context(|| format!("unable to connect to {}", config.host))?;

    info!("Connected to {}", config.host);

    let result = run(&cli, &service).await;
    service.close().await;
    result
}

async fn run(cli: &Cli, service: &RedfishService) -> Result<()> {
    let pretty = !cli.compact;
    let print = |payload: &Payload| println!("{}", payload.to_json_string(pretty));

    match &cli.command {
        Command::Root { version } => print(&service.service_root(version).await?),
        Command::Versions => {
            for (version, uri) in service.versions().await? {
                println!("{}\t{}", version, uri);
            }
        }
        Command::Get { path } => print(&service.payload_by_path(path).await?),
        Command::List { path } => {
            let collection = service.payload_by_path(path).await?;
            let walker = CollectionWalker::new(collection)?;
            let mut members = Box::pin(walker.iter());
            while let Some(member) = members.next().await {
                print(&member?);
            }
        }
        Command::Patch {
            path,
            property,
            value,
        } => {
            let target = service.payload_by_path(path).await?;
            print(&target.patch_string_property(property, value).await?);
        }
        Command::Post { path, body } => {
            let target = service.payload_by_path(path).await?;
            let body = service.payload_from_str(body)?;
            print(&target.post(&body).await?);
        }
        Command::Delete { path } => {
            let target = service.payload_by_path(path).await?;
            if !target.delete().await? {
                bail!("DELETE of {} was rejected", path);
            }
            println!("deleted {}", target.origin().unwrap_or(path));
        }
    }
    Ok(())
}
