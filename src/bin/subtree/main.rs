//! subtree CLI tool
//!
//! Runs the SUB tree server and drives the controller against it from the command line.
//!
//! ## Commands
//!
//! - `serve`: run the HTTP server
//! - `list`: print dataset names
//! - `show <sub>`: print a dataset as an outline, optionally with a node selected
//! - `upload <file>`: upload a source file and print the resulting tree
//! - `edit <sub> <id>`: change fields of one node (persisted through the server)
//! - `state`: print the server-held session
//!
//! Client commands talk to `--base-url`, falling back to `SUBTREE_BASE_URL` and then the config
//! file.

use clap::{Parser, Subcommand};
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use subtree_core::{
    app::App,
    config::{AppConfig, ClientConfig},
    detail::{DetailForm, DetailView},
    gateway::{DatasetGateway, HttpGateway},
    render::{outline, StackedLayout},
    server::SubTreeServer,
};

#[derive(Parser)]
#[command(name = "subtree")]
#[command(author, version, about = "Serve and browse bill-of-materials SUB trees", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, default_value = "subtree.toml")]
    config: PathBuf,

    /// Server URL for client commands
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind (default: 127.0.0.1:9037)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Directory for persisted trees and session state
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// List dataset names
    List,

    /// Print a dataset as an outline
    Show {
        sub: String,

        /// Node id to mark as selected
        #[arg(long)]
        select: Option<String>,
    },

    /// Upload a source file
    Upload { file: PathBuf },

    /// Edit one node. Pass an empty string to clear vehicle, material or qty.
    Edit {
        sub: String,
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long = "type")]
        kind: Option<String>,

        #[arg(long)]
        vehicle: Option<String>,

        #[arg(long)]
        material: Option<String>,

        #[arg(long)]
        qty: Option<String>,
    },

    /// Print the server-held session state
    State,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Serve { bind, data_dir } => {
            let mut server_config = config.server;
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            if data_dir.is_some() {
                server_config.data_dir = data_dir;
            }
            let server = SubTreeServer::from_config(&server_config)?;

            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, Ordering::SeqCst);
            })?;

            let shutdown = async move {
                while running.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            };

            println!("Serving SUB trees at http://{}", server_config.bind);
            if let Some(dir) = &server_config.data_dir {
                println!("Data directory: {}", dir.display());
            }
            rt.block_on(server.serve(server_config.bind, shutdown))?;
            println!("Shutdown complete");
            Ok(())
        }
        command => {
            let client = client_config(config.client, cli.base_url);
            let gateway = Arc::new(HttpGateway::new(&client.base_url)?);
            rt.block_on(run_client(command, gateway))
        }
    }
}

/// Flag beats environment beats config file.
fn client_config(config: ClientConfig, flag: Option<String>) -> ClientConfig {
    let mut config = config.with_env();
    if let Some(url) = flag {
        config.base_url = url;
    }
    config
}

async fn run_client(
    command: Commands,
    gateway: Arc<HttpGateway>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::new(gateway.clone());
    match command {
        Commands::List => {
            for name in app.list_datasets().await? {
                println!("{name}");
            }
        }
        Commands::Show { sub, select } => {
            app.load_dataset(&sub).await?;
            if let Some(id) = select {
                app.select(id)?;
            }
            print_tree(&app);
            if let DetailView::Node { id, form } = app.detail() {
                println!();
                print_detail(&id.to_string(), &form);
            }
        }
        Commands::Upload { file } => {
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let bytes = std::fs::read(&file)?;
            app.upload(&filename, bytes).await?;
            print_tree(&app);
        }
        Commands::Edit {
            sub,
            id,
            name,
            kind,
            vehicle,
            material,
            qty,
        } => {
            app.load_dataset(&sub).await?;
            app.select(id.as_str())?;
            let DetailView::Node { mut form, .. } = app.detail() else {
                return Err(format!("node {id} is not in {sub}").into());
            };
            if let Some(name) = name {
                form.name = name;
            }
            if let Some(kind) = kind {
                form.kind = kind;
            }
            if let Some(vehicle) = vehicle {
                form.vehicle = vehicle;
            }
            if let Some(material) = material {
                form.material = material;
            }
            if let Some(qty) = qty {
                form.qty = qty;
            }
            app.apply_persisted(&form).await?;
            print_tree(&app);
        }
        Commands::State => {
            let state = gateway.get_session().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Serve { .. } => return Err("serve is not a client command".into()),
    }
    app.session().flush().await;
    Ok(())
}

fn print_tree(app: &App) {
    app.on_frame(|rendered| StackedLayout::default().measure(rendered));
    print!("{}", outline(&app.rendered()));
}

fn print_detail(id: &str, form: &DetailForm) {
    println!("Node {id}");
    println!("  name:     {}", form.name);
    println!("  type:     {}", form.kind);
    println!("  vehicle:  {}", form.vehicle);
    println!("  material: {}", form.material);
    println!("  qty:      {}", form.qty);
}
