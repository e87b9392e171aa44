mod config;
mod http;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use vmview::headless;
use vmview::platform::Transport;
use vmview::platform::memory::{MemoryPlatform, MemoryTransport};
use vmview::view_model::VIEW;
use vmview::{ComponentModel, Config, InstanceType, ViewModel};

#[derive(Parser)]
#[command(name = "vmview")]
#[command(about = "Headless driver for server-declared views")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: nearest vmview.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Endpoint navigation requests are posted to
    #[arg(long, global = true)]
    endpoint: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a saved response and print the mounted tree
    Replay {
        /// JSON file with a descriptor array
        file: PathBuf,
    },

    /// Request a reference from the endpoint and print the mounted tree
    Navigate {
        /// Reference to request (default: the configured entry)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// Request parameter as key=value, the value is parsed as JSON when it can be
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },

    /// Report every invalid field of a saved response
    Check {
        /// JSON file with a descriptor array
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    let mut loaded = config::detect_config(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        loaded.config.endpoint = endpoint;
    }
    log::info!("config from {}", loaded.source);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Replay { file } => {
            runtime.block_on(replay(loaded.config, &file))?;
        }

        Commands::Navigate { reference, params } => {
            runtime.block_on(navigate(loaded.config, reference, params))?;
        }

        Commands::Check { file } => {
            check(&file)?;
        }
    }

    Ok(())
}

struct Session {
    view_model: ViewModel,
    platform: Rc<MemoryPlatform>,
}

impl Session {
    /// A headless coordinator with the plain view already connected.
    async fn connect(config: Config, transport: Rc<dyn Transport>) -> Result<Self> {
        let platform = Rc::new(MemoryPlatform::new());
        let view_model = headless::view_model(config, transport, platform.clone());
        view_model.connect(InstanceType::element(VIEW)).await?;
        Ok(Self { view_model, platform })
    }

    async fn render(&self) -> Result<()> {
        let report = self.view_model.render().await?;
        log::info!(
            "{} reused, {} replaced, {} appended, {} removed",
            report.reused,
            report.replaced,
            report.appended,
            report.removed
        );
        Ok(())
    }

    fn print(&self) -> Result<()> {
        let document = self.platform.document();
        let output = json!({
            "current": self.view_model.current(),
            "design": self.view_model.design(),
            "document": {
                "title": document.title,
                "description": document.description,
                "language": document.language,
                "class": document.class,
                "icon": document.icon,
                "stylesheet": document.stylesheet,
            },
            "history": self.platform.entries(),
            "tree": self.view_model.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

async fn replay(config: Config, file: &Path) -> Result<()> {
    let raw = read_json(file)?;
    let session = Session::connect(config, Rc::new(MemoryTransport::new())).await?;
    session.view_model.update(&raw).await?;
    session.render().await?;
    session.print()
}

async fn navigate(config: Config, reference: Option<String>, params: Vec<(String, Value)>) -> Result<()> {
    let reference = reference.unwrap_or_else(|| config.entry.clone());
    let transport = Rc::new(http::HttpTransport::new(config.endpoint.clone()));
    let session = Session::connect(config, transport).await?;

    let parameters: Map<String, Value> = params.into_iter().collect();
    let parameters = (!parameters.is_empty()).then_some(parameters);
    session
        .view_model
        .navigate(&reference, parameters, None)
        .await
        .with_context(|| format!("Navigation to `{reference}` failed"))?;
    session.print()
}

fn check(file: &Path) -> Result<()> {
    let raw = read_json(file)?;
    let Some(descriptors) = raw.as_array() else {
        // Reports the shape problem the engine would raise.
        ComponentModel::parse_response(&raw)?;
        bail!("{} is not a descriptor array", file.display());
    };

    let mut count = 0;
    for (index, descriptor) in descriptors.iter().enumerate() {
        let problems = match ComponentModel::parse(descriptor) {
            Ok(model) => model.problems(),
            Err(error) => vec![error],
        };
        for problem in problems {
            println!("[{index}] {problem}");
            count += 1;
        }
    }

    if count > 0 {
        bail!("{count} problems in {}", file.display());
    }
    println!("{}: {} descriptors, no problems", file.display(), descriptors.len());
    Ok(())
}

fn read_json(file: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", file.display()))
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}
