//! Aspen - console controller for Sierra Aspen matrix routers
//!
//! Connects to a router (or a built-in virtual one), keeps its routing table
//! in view and accepts routing commands on stdin.

use std::collections::HashMap;

use anyhow::{Context, Result};
use aspen_protocol::OutputId;
use aspen_session::{spawn_session, SessionEvent, SessionHandle};
use aspen_sim::{serve_tcp, VirtualRouter, VirtualRouterCommand};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod console;
mod settings;

use crate::console::{parse_line, selector_name, ConsoleCommand, HELP};
use crate::settings::Settings;

/// Aspen - control a Sierra Aspen matrix router from the console
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Router IP address or host name
    #[arg(long, env = "ASPEN_HOST")]
    host: Option<String>,

    /// Router control port
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds between full status polls (0 disables polling)
    #[arg(long)]
    poll_secs: Option<f64>,

    /// Run against a built-in virtual router instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save: bool,

    /// Print raw protocol traffic
    #[arg(long)]
    traffic: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let mut settings = Settings::load();
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(poll_secs) = args.poll_secs {
        settings.poll_secs = poll_secs;
    }
    settings.show_traffic |= args.traffic;

    if args.save {
        let path = settings.save()?;
        info!("Settings saved to {}", path.display());
    }

    let mut config = settings.session_config();

    // Kept alive for the lifetime of the console
    let _sim_tx = if args.simulate {
        let (tx, addr) = start_simulator().await?;
        config.host = addr.ip().to_string();
        config.port = addr.port();
        Some(tx)
    } else {
        None
    };

    info!("Starting Aspen console for {}", config.address());

    let (session, events, task) = spawn_session(1024);
    session.init(config).await?;

    let mut console = Console {
        session: session.clone(),
        settings,
        shown: HashMap::new(),
    };
    console.run(events).await?;

    session.shutdown().await?;
    let _ = task.await;
    info!("Aspen console stopped");
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aspen=info,aspen_protocol=info,aspen_session=info,aspen_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Serve a virtual router on an ephemeral loopback port
async fn start_simulator() -> Result<(mpsc::Sender<VirtualRouterCommand>, std::net::SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind simulator listener")?;
    let addr = listener.local_addr()?;
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        if let Err(e) = serve_tcp(listener, VirtualRouter::new("Virtual Aspen"), rx).await {
            warn!("Simulator stopped: {}", e);
        }
    });

    info!("Simulated router listening on {}", addr);
    Ok((tx, addr))
}

/// Interactive front end over a session handle
struct Console {
    session: SessionHandle,
    settings: Settings,
    /// Last routing printed per output, to keep status polls quiet
    shown: HashMap<OutputId, String>,
}

impl Console {
    async fn run(&mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else {
                        break;
                    };
                    match parse_line(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => break,
                        Ok(Some(cmd)) => self.execute(cmd).await?,
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Session event stream closed");
                        break;
                    };
                    self.print_event(event);
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn execute(&mut self, cmd: ConsoleCommand) -> Result<()> {
        match cmd {
            ConsoleCommand::Connect { output, input } => self.session.connect(output, input).await?,
            ConsoleCommand::Crosspoint {
                output,
                input,
                level,
            } => self.session.crosspoint(output, input, level).await?,
            ConsoleCommand::MultiLevel { output, inputs } => {
                self.session.multi_level(output, inputs).await?
            }
            ConsoleCommand::Poll => self.session.poll_now().await?,
            ConsoleCommand::Show { output } => {
                let table = self.session.snapshot().await?;
                match output {
                    Some(output) => match table.get(output) {
                        Some(routing) => println!("Output {:>2}: {}", output, routing.display()),
                        None => println!("Output {:>2}: unknown", output),
                    },
                    None if table.is_empty() => println!("No routing reported yet"),
                    None => {
                        for (output, routing) in table.iter() {
                            println!("Output {:>2}: {}", output, routing.display());
                        }
                    }
                }
            }
            ConsoleCommand::Match {
                output,
                input,
                selector,
            } => {
                let routed = self.session.is_routed(output, input, selector).await?;
                println!(
                    "Input {} on output {} ({}): {}",
                    input,
                    output,
                    selector_name(selector),
                    if routed { "yes" } else { "no" }
                );
            }
            ConsoleCommand::Reconnect { host, port } => {
                self.settings.host = host;
                if let Some(port) = port {
                    self.settings.port = port;
                }
                self.shown.clear();
                self.session
                    .config_updated(self.settings.session_config())
                    .await?;
            }
            ConsoleCommand::Status => {
                let state = self.session.state().await?;
                let table = self.session.snapshot().await?;
                println!(
                    "{} ({}:{}), {} outputs known",
                    state.name(),
                    self.settings.host,
                    self.settings.port,
                    table.len()
                );
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    fn print_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged { status, detail } => match detail {
                Some(detail) => println!("Status: {} ({})", status.name(), detail),
                None => println!("Status: {}", status.name()),
            },
            SessionEvent::RoutingChanged {
                output, routing, ..
            } => {
                let text = routing.display();
                if self.shown.get(&output) != Some(&text) {
                    println!("Output {:>2}: {}", output, text);
                    self.shown.insert(output, text);
                }
            }
            SessionEvent::Warning { error } => println!("Warning: {}", error),
            SessionEvent::DataIn { data } if self.settings.show_traffic => {
                println!("<< {}", String::from_utf8_lossy(&data).trim_end());
            }
            SessionEvent::DataOut { data } if self.settings.show_traffic => {
                println!(">> {}", String::from_utf8_lossy(&data));
            }
            SessionEvent::DataIn { .. } | SessionEvent::DataOut { .. } => {}
        }
    }
}
