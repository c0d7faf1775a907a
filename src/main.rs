use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::Parser;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use shift_roster::config::AppConfig;
use shift_roster::dashboard::{run_server, AppState};
use shift_roster::export::{self, ExportConfig};
use shift_roster::notify::{EmailSender, LogMailer, MailDispatcher, NotificationSender, ResendMailer};
use shift_roster::remote::{Backend, EmployeeDirectory, MemoryBackend, RestClient, ShiftRepository};
use shift_roster::schedule::calendar::align_to_week_start;
use shift_roster::schedule::{DateRange, ScheduleSession, WeekStart};
use shift_roster::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "shift-roster")]
#[command(version)]
#[command(about = "Shift scheduling grid with e-mail notifications")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the schedule API and run the mail dispatcher
    Serve(ServeArgs),

    /// Process the mail queue
    Dispatch(DispatchArgs),

    /// Write a code index of a source tree
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configured address port)
    #[arg(long)]
    port: Option<u16>,

    /// Keep all data in memory instead of the remote store
    #[arg(long)]
    in_memory: bool,

    /// First day of the initial grid (defaults to this week's Monday)
    #[arg(long)]
    start: Option<NaiveDate>,
}

#[derive(Parser, Debug)]
struct DispatchArgs {
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Run a single pass, print the summary as JSON and exit
    #[arg(long)]
    once: bool,

    /// Jobs per pass (defaults to the configured batch limit)
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Project root to walk
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// JSON export settings (defaults to <root>/code-export.json when present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, short = 'o', default_value = "code-export")]
    out: PathBuf,
}

fn mailer_for(config: &AppConfig) -> Result<Arc<dyn EmailSender>, Box<dyn std::error::Error>> {
    if config.mailer.api_key.is_empty() {
        tracing::warn!("MAIL_API_KEY not set, notifications are logged instead of sent");
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(ResendMailer::new(config.mailer.clone())?))
}

fn dispatcher_for<B: Backend + 'static>(
    backend: &Arc<B>,
    config: &AppConfig,
) -> Result<MailDispatcher, Box<dyn std::error::Error>> {
    Ok(MailDispatcher::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        mailer_for(config)?,
        config.dispatcher.clone(),
    )
    .with_dashboard_url(config.mailer.dashboard_url.clone()))
}

async fn serve<B: Backend + 'static>(
    backend: Arc<B>,
    config: AppConfig,
    start: NaiveDate,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = install_shutdown_handler();
    let wake = Arc::new(Notify::new());

    let range = DateRange::from_days(start, config.session.default_range_days);
    let employees = backend.list_employees().await?;
    let shifts = backend.fetch_shifts(&range).await?;
    let mut session = ScheduleSession::new(config.session.clone(), range);
    session.hydrate(employees, range, shifts);

    let (notifier, enqueue_task) = NotificationSender::spawn(
        backend.clone(),
        wake.clone(),
        config.dispatcher.enqueue_capacity,
    );

    let dispatcher = dispatcher_for(&backend, &config)?;
    let dispatch_task = {
        let token = token.clone();
        let wake = wake.clone();
        tokio::spawn(async move { dispatcher.run(token, wake).await })
    };

    let state = AppState::new(session, backend, notifier);
    let served = run_server(config.server.listen_addr, state, token.clone()).await;

    token.cancel();
    if let Err(e) = dispatch_task.await {
        tracing::error!(error = %e, "Dispatcher task panicked");
    }
    // Flush jobs still in the channel; the task ends once the last sender is gone.
    if let Err(e) = enqueue_task.await {
        tracing::error!(error = %e, "Enqueue task panicked");
    }
    served?;
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        let mut addr = config.server.listen_addr;
        addr.set_port(port);
        config = config.with_listen_addr(addr);
    }
    let start = args
        .start
        .unwrap_or_else(|| align_to_week_start(Local::now().date_naive(), WeekStart::Monday));

    tracing::info!(
        listen_addr = %config.server.listen_addr,
        in_memory = args.in_memory,
        remote = %config.remote.base_url,
        start = %start,
        "Starting shift-roster"
    );

    if args.in_memory {
        serve(Arc::new(MemoryBackend::new()), config, start).await
    } else {
        serve(Arc::new(RestClient::new(&config.remote)?), config, start).await
    }
}

async fn run_dispatch(args: DispatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.dispatcher.batch_limit = limit;
    }
    let backend = Arc::new(RestClient::new(&config.remote)?);
    let dispatcher = dispatcher_for(&backend, &config)?;

    if args.once {
        let summary = dispatcher
            .process_queue(config.dispatcher.batch_limit)
            .await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let token = install_shutdown_handler();
    dispatcher.run(token, Arc::new(Notify::new())).await;
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ExportConfig::load(&args.root, args.config.as_deref())?;
    let manifest = export::run(&args.root, &config, &args.out)?;
    println!(
        "Exported {} files ({} bytes), skipped {} -> {}",
        manifest.counts.files,
        manifest.counts.bytes,
        manifest.counts.skipped,
        args.out.join(export::INDEX_FILE).display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Serve(serve_args) => run_serve(serve_args).await?,
        Commands::Dispatch(dispatch_args) => run_dispatch(dispatch_args).await?,
        Commands::Export(export_args) => run_export(export_args)?,
    }

    Ok(())
}
