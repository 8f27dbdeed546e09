//! siaga-sync: resilient data-sync client for the SiagaAI disaster dashboard.
//!
//! Single-binary Tokio application that:
//! 1. Polls every dashboard resource on its own cadence, with retry
//! 2. Merges the latest results into per-view snapshots
//! 3. Reconciles the map layers incrementally
//! 4. Exposes the one-shot endpoints (chat, damage assessment, reports,
//!    admin moderation, login) as subcommands

mod config;
mod console;
mod journal;
mod render;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};

use common::config::SyncConfig;
use common::NewReport;
use siaga_client::{AuthSession, FileTokenStore, MemoryTokenStore, SiagaClient, TokenStore};
use sync_engine::{
    EntityCategory, MapLayerReconciler, MergedViewStore, PollingScheduler, ViewKind,
};

use journal::{record, resolve_journal_dir, CycleRecorder, SharedJournal, SyncJournal};
use render::{summarize, DrawnLayer, LogRenderer};

/// SiagaAI data-sync client
#[derive(Parser)]
#[command(name = "siaga-sync", about = "Resilient SiagaAI data-sync client")]
struct Cli {
    /// Active city (overrides SIAGA_CITY and the config file).
    #[arg(long, global = true)]
    city: Option<String>,

    /// Path to a TOML config file (default: ./config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll continuously until Ctrl+C (default).
    Run,
    /// Fetch every resource once, print each view and exit.
    Once,
    /// Ask the assistant a question about the active city.
    Chat { message: String },
    /// Assess damage in a photo.
    Assess {
        image: PathBuf,
        /// MIME type of the image.
        #[arg(long, default_value = "image/jpeg")]
        mime: String,
    },
    /// Submit a damage report.
    Report {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lng: f64,
        #[arg(long = "type", default_value = "damage")]
        kind: String,
        #[arg(long, default_value = "medium")]
        severity: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        reporter_name: String,
        #[arg(long, default_value = "")]
        reporter_phone: String,
        #[arg(long, default_value = "")]
        image_url: String,
    },
    /// Report moderation (needs SIAGA_ADMIN_SECRET).
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Google sign-in session management.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    List {
        /// pending, approved or rejected
        #[arg(long)]
        status: Option<String>,
    },
    Approve { id: String },
    Reject { id: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Exchange a Google ID token for a backend session.
    Login { credential: String },
    /// Check the stored session with the backend.
    Verify,
    Logout,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type MapState = Arc<Mutex<(MapLayerReconciler<DrawnLayer>, LogRenderer)>>;

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "siaga_sync=info,siaga_client=info,sync_engine=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(city) = &cli.city {
        let city = city.trim().to_ascii_lowercase();
        if city.is_empty() {
            error!("Configuration error: --city must not be empty");
            std::process::exit(1);
        }
        cfg.default_city = city;
    }

    let client = match SiagaClient::from_config(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build API client: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            run(cfg, client).await;
            Ok(())
        }
        Command::Once => {
            once(&cfg, &client).await;
            Ok(())
        }
        Command::Chat { message } => client
            .chat(&message, &cfg.default_city)
            .await
            .map(|r| println!("{}", r.response)),
        Command::Assess { image, mime } => match std::fs::read(&image) {
            Ok(bytes) => client.assess_damage(&bytes, &mime).await.map(|a| {
                println!(
                    "{} severity={} confidence={:.2}",
                    a.disaster_type.as_deref().unwrap_or("unknown"),
                    a.severity,
                    a.confidence
                );
                println!("{}", a.damage_description);
                for action in &a.recommended_actions {
                    println!("  - {}", action);
                }
            }),
            Err(e) => Err(common::Error::Io(format!("{}: {}", image.display(), e))),
        },
        Command::Report {
            lat,
            lng,
            kind,
            severity,
            description,
            reporter_name,
            reporter_phone,
            image_url,
        } => {
            let report = NewReport {
                lat,
                lng,
                city: cfg.default_city.clone(),
                kind,
                severity,
                description,
                image_url,
                reporter_name,
                reporter_phone,
            };
            client.submit_report(&report).await.map(|r| {
                let id = r
                    .report
                    .as_ref()
                    .and_then(|v| v.get("_id").or_else(|| v.get("id")))
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "?".into());
                println!("submitted={} id={}", r.success, id);
            })
        }
        Command::Admin { action } => admin(&client, action).await,
        Command::Auth { action } => {
            if cfg.token_path.is_empty() {
                auth(AuthSession::new(client, MemoryTokenStore::new()), action).await
            } else {
                let store = FileTokenStore::new(&cfg.token_path);
                auth(AuthSession::new(client, store), action).await
            }
        }
    };

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn open_journal() -> SharedJournal {
    let dir = resolve_journal_dir();
    let journal = match SyncJournal::open(dir) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to initialize sync journal: {}", e);
            std::process::exit(1);
        }
    };
    info!("Sync journal file: {}", journal.current_file().display());
    Arc::new(Mutex::new(journal))
}

fn build_scheduler(
    cfg: &SyncConfig,
    client: &SiagaClient,
    journal: Option<&SharedJournal>,
) -> (Arc<MergedViewStore>, Arc<PollingScheduler>) {
    let store = MergedViewStore::create(&cfg.default_city);
    let built = match journal {
        Some(j) => PollingScheduler::with_observer(
            cfg,
            client.transport(),
            Arc::clone(&store),
            Arc::new(CycleRecorder::new(j.clone())),
        ),
        None => PollingScheduler::new(cfg, client.transport(), Arc::clone(&store)),
    };
    match built {
        Ok(s) => (store, Arc::new(s)),
        Err(e) => {
            error!("Failed to build scheduler: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cfg: SyncConfig, client: SiagaClient) {
    info!("SiagaAI sync starting up...");
    info!("City: {}", cfg.default_city);
    info!(
        "Retry: attempts={} base={}ms timeout={}ms",
        cfg.retry.max_attempts, cfg.retry.base_delay_ms, cfg.request_timeout_ms
    );

    let sync_journal = open_journal();
    let (store, scheduler) = build_scheduler(&cfg, &client, Some(&sync_journal));
    record(
        &sync_journal,
        "sync_start",
        json!({
            "city": &cfg.default_city,
            "api_base_url": &cfg.api_base_url,
            "resources": scheduler.resource_names(),
            "layer_filter": format!("{:?}", cfg.layer_filter).to_ascii_lowercase()
        }),
    );

    // ── Subscriptions ────────────────────────────────────────────────
    let layer_filter = cfg.layer_filter;
    let map_state: MapState =
        Arc::new(Mutex::new((MapLayerReconciler::new(), LogRenderer::new())));
    let map_view = map_state.clone();
    let map_journal = sync_journal.clone();
    let _map_sub = store.subscribe(ViewKind::MapLayers, move |snapshot| {
        let Some(view) = snapshot.map_layers() else {
            return;
        };
        let mut guard = map_view.lock().unwrap_or_else(|p| p.into_inner());
        let (reconciler, renderer) = &mut *guard;
        let diff = reconciler.reconcile_view(view, layer_filter, renderer);
        if diff.is_empty() {
            return;
        }
        info!(
            "Map layers v{}: +{} ~{} -{} (zones={} evacuation={} reports={})",
            snapshot.version,
            diff.to_create.len(),
            diff.to_update.len(),
            diff.to_remove.len(),
            renderer.live_count(EntityCategory::Zone),
            renderer.live_count(EntityCategory::EvacuationPoint),
            renderer.live_count(EntityCategory::Report)
        );
        record(
            &map_journal,
            "map_reconcile",
            json!({
                "version": snapshot.version,
                "city": &snapshot.city,
                "created": diff.created_ids(),
                "updated": diff.updated_ids(),
                "removed": diff.removed_ids()
            }),
        );
    });

    let _risk_sub = store.subscribe(ViewKind::RiskWeather, |snapshot| {
        info!("{}", summarize(snapshot));
    });

    let _warning_sub = store.subscribe(ViewKind::EarlyWarnings, |snapshot| {
        info!("{}", summarize(snapshot));
    });

    // ── Spawn tasks ──────────────────────────────────────────────────
    scheduler.start();

    let console_handle = tokio::spawn(console::run(Arc::clone(&scheduler)));

    let hb_scheduler = Arc::clone(&scheduler);
    let hb_map = map_state.clone();
    let hb_journal = sync_journal.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let status = hb_scheduler.status();
            let with_value = status.iter().filter(|s| s.has_value).count();
            let stale = status.iter().filter(|s| s.is_stale).count();
            let failing: Vec<&str> = status
                .iter()
                .filter(|s| s.error.is_some())
                .map(|s| s.name.as_str())
                .collect();
            let drawn = {
                let guard = hb_map.lock().unwrap_or_else(|p| p.into_inner());
                guard.0.rendered_count()
            };
            info!(
                "HEARTBEAT: city={} resources={} loaded={} stale={} failing={:?} drawn={} paused={}",
                hb_scheduler.city(),
                status.len(),
                with_value,
                stale,
                failing,
                drawn,
                hb_scheduler.is_paused()
            );
            record(
                &hb_journal,
                "heartbeat",
                json!({
                    "city": hb_scheduler.city(),
                    "resources": status.len(),
                    "loaded": with_value,
                    "stale": stale,
                    "failing": failing,
                    "drawn": drawn,
                    "paused": hb_scheduler.is_paused()
                }),
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("SiagaAI sync is running. Type 'help' for commands, Ctrl+C to stop.");

    let shutdown_reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            "ctrl_c"
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
            "heartbeat_task_exit"
        }
        r = console_handle => {
            error!("Console task exited: {:?}", r);
            "console_task_exit"
        }
    };

    scheduler.stop();
    scheduler.join().await;
    store.dispose();

    record(
        &sync_journal,
        "sync_shutdown",
        json!({ "reason": shutdown_reason }),
    );
    info!("SiagaAI sync shut down.");
}

async fn once(cfg: &SyncConfig, client: &SiagaClient) {
    let (store, scheduler) = build_scheduler(cfg, client, None);
    let results = scheduler.refresh_all().await;
    for (name, result) in &results {
        match &result.error {
            Some(e) => warn!("{}: failed after {} attempt(s): {}", name, result.attempts, e),
            None => info!("{}: ok ({} attempt(s))", name, result.attempts),
        }
    }
    for kind in ViewKind::ALL {
        println!("{}", summarize(&store.get_snapshot(kind)));
    }
    scheduler.stop();
    store.dispose();
}

async fn admin(client: &SiagaClient, action: AdminAction) -> common::Result<()> {
    let result = match action {
        AdminAction::List { status } => {
            let queue = client.admin_reports(status.as_deref()).await?;
            println!(
                "pending={} approved={} rejected={}",
                queue.pending_count, queue.approved_count, queue.rejected_count
            );
            for r in &queue.reports {
                println!(
                    "{}  {:<8} {:<8} {:<10} {}",
                    r.id, r.status, r.severity, r.city, r.description
                );
            }
            return Ok(());
        }
        AdminAction::Approve { id } => client.approve_report(&id).await?,
        AdminAction::Reject { id } => client.reject_report(&id).await?,
        AdminAction::Delete { id } => client.delete_report(&id).await?,
    };
    println!("success={} {}", result.success, result.message);
    Ok(())
}

async fn auth<S: TokenStore>(
    mut session: AuthSession<S>,
    action: AuthAction,
) -> common::Result<()> {
    match action {
        AuthAction::Login { credential } => {
            let user = session.login_with_google(&credential).await?;
            println!("logged in as {} <{}> role={}", user.name, user.email, user.role);
        }
        AuthAction::Verify => match session.restore().await? {
            Some(user) => println!("session valid for {} <{}>", user.name, user.email),
            None => println!("no valid session"),
        },
        AuthAction::Logout => {
            session.logout().await?;
            println!("logged out");
        }
    }
    Ok(())
}
