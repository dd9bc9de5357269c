use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use service_launcher::{
    DockerEngine, LauncherConfig, LogLine, ManagedService, Service, ServiceConfig,
    ServiceContext,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "service-launcher", about = "Manage one compose service container")]
struct Cli {
    /// Network the service belongs to, used to derive the container name
    #[arg(long)]
    network: String,

    /// Service name as declared in the compose file
    service: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the container status
    Status,
    /// Exit 0 if the container is running, 1 otherwise
    Running,
    /// Print when the container last started
    StartedAt,
    /// Create the container without starting it
    Create,
    /// Create and start the container
    Up,
    Start,
    Stop,
    Restart,
    /// Force-remove the container and its volumes
    Remove,
    /// Delete the service's data directory
    RemoveData {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Print container logs
    Logs {
        #[arg(long, default_value = "")]
        since: String,
        #[arg(long, default_value = "all")]
        tail: String,
        #[arg(long, short)]
        follow: bool,
    },
    /// Run a command inside the container
    Exec {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let engine = DockerEngine::connect().context("Failed to connect to Docker daemon")?;
    let launcher = LauncherConfig::from_env();
    let mut service = Service::new(
        cli.service,
        ServiceContext::new(cli.network),
        Arc::new(engine),
        &launcher,
    );
    log::debug!("Managing {:?}", service);

    match cli.command {
        Command::Status => println!("{}", service.status().await?),
        Command::Running => {
            if !service.is_running().await {
                std::process::exit(1);
            }
        }
        Command::StartedAt => match service.started_at().await? {
            Some(started_at) => println!("{}", started_at.to_rfc3339()),
            None => println!("never started"),
        },
        Command::Create => service.create().await?,
        Command::Up => service.up().await?,
        Command::Start => service.start().await?,
        Command::Stop => service.stop().await?,
        Command::Restart => service.restart().await?,
        Command::Remove => service.remove().await?,
        Command::RemoveData { dir } => {
            service.apply(&ServiceConfig {
                dir,
                ..Default::default()
            });
            service
                .remove_data()
                .await
                .with_context(|| format!("Failed to remove data of {}", service.name()))?;
        }
        Command::Logs {
            since,
            tail,
            follow: false,
        } => {
            for line in service.get_logs(&since, &tail).await? {
                println!("{}", line);
            }
        }
        Command::Logs {
            since,
            tail,
            follow: true,
        } => follow(&service, &since, &tail).await?,
        Command::Exec { command, args } => {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match service.exec(&command, &args).await {
                Ok(output) => print!("{}", output),
                Err(e) => match e.exec_failure() {
                    Some(failure) => {
                        eprint!("{}", failure.output);
                        std::process::exit(i32::try_from(failure.exit_code).unwrap_or(1));
                    }
                    None => return Err(e.into()),
                },
            }
        }
    }

    Ok(())
}

async fn follow(service: &Service, since: &str, tail: &str) -> anyhow::Result<()> {
    let (mut lines, cancel) = service.follow_logs(since, tail).await?.into_stream();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping log follower");
                cancel.cancel();
            }
            line = lines.next() => match line {
                Some(LogLine::Line(line)) => println!("{}", line),
                Some(LogLine::EndOfStream) | None => break,
            }
        }
    }
    Ok(())
}
