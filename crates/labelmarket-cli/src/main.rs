//! `labelmarket`: drive the task leasing core against an in-memory store.
//!
//! Usage:
//!   labelmarket [--config <path>] demo [--tasks <n>]
//!   labelmarket [--config <path>] reaper [--tasks <n>]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use labelmarket_core::domain::{
    Actor, AnnotationPayload, AssetId, ContractId, ContractRecord, ContractStatus, Role,
    TaskRecord, UserId,
};
use labelmarket_core::impls::InMemoryStore;
use labelmarket_core::ports::{Clock, FixedClock, SystemClock};
use labelmarket_core::{App, AppBuilder, LeaseConfig, LeaseError};

/// Labeling marketplace task leasing.
#[derive(Parser, Debug)]
#[command(name = "labelmarket", about = "Task leasing core demo")]
struct Cli {
    /// Path to a JSON lease config. Falls back to LABELMARKET_* env vars.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk one contract through lease, expiry, QC and submission.
    Demo {
        #[arg(long, default_value_t = 3)]
        tasks: usize,
    },

    /// Lease every task for the minimum duration and reap until Ctrl-C.
    Reaper {
        #[arg(long, default_value_t = 10)]
        tasks: usize,
    },
}

/// Parties and tasks of the seeded contract.
struct Seeded {
    contract_id: ContractId,
    client: Actor,
    labeler: Actor,
    tasks: Vec<TaskRecord>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labelmarket_cli=info,labelmarket_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = LeaseConfig::load(cli.config.as_deref()).context("loading lease config")?;

    match cli.command {
        Command::Demo { tasks } => demo(config, tasks).await,
        Command::Reaper { tasks } => reaper(config, tasks).await,
    }
}

async fn seed<C: Clock>(
    app: &App<InMemoryStore>,
    clock: &C,
    tasks: usize,
) -> anyhow::Result<Seeded> {
    let client = Actor::new(UserId::random(), Role::Client);
    let labeler = Actor::new(UserId::random(), Role::Labeler);
    let contract = ContractRecord::new(
        ContractId::random(),
        "listing-demo",
        client.user_id,
        labeler.user_id,
        ContractStatus::Active,
    );
    app.store.insert_contract(contract.clone()).await;

    let assets: Vec<AssetId> = (0..tasks).map(|_| AssetId::random()).collect();
    let created = app
        .lifecycle
        .generate_tasks(&client, contract.id, &assets)
        .await?;
    info!(
        "Seeded contract {} with {} tasks at {}",
        contract.id,
        created.len(),
        clock.now()
    );

    Ok(Seeded {
        contract_id: contract.id,
        client,
        labeler,
        tasks: created,
    })
}

fn print_json<T: Serialize>(label: &str, value: &T) -> anyhow::Result<()> {
    println!("{label}: {}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn demo(config: LeaseConfig, tasks: usize) -> anyhow::Result<()> {
    anyhow::ensure!(tasks > 0, "--tasks must be at least 1");

    let clock = FixedClock::new(chrono::Utc::now());
    let app = AppBuilder::new(InMemoryStore::new())
        .clock(Arc::new(clock.clone()))
        .config(config)
        .build()?;
    let seeded = seed(&app, &clock, tasks).await?;
    let (client, labeler) = (seeded.client, seeded.labeler);

    let ids: Vec<_> = seeded.tasks.iter().map(|t| t.id).collect();
    let first = ids[0];

    // a stranger is turned away
    let stranger = Actor::new(UserId::random(), Role::Labeler);
    match app.leases.acquire(&stranger, first, None).await {
        Err(e @ LeaseError::Forbidden(_)) => info!("stranger acquire refused: {e}"),
        other => anyhow::bail!("expected Forbidden, got {other:?}"),
    }

    // lease, let it lapse, and watch submit fail
    let min = app.leases.config().min_lease_minutes;
    let grant = app.leases.acquire(&labeler, first, Some(min)).await?;
    print_json("grant", &grant)?;
    clock.advance(chrono::Duration::minutes(i64::from(min)) + chrono::Duration::seconds(1));

    let payload = AnnotationPayload::new(serde_json::json!({"label": "car"}))?;
    match app
        .leases
        .submit(&labeler, first, &grant.lease_token, payload.clone())
        .await
    {
        Err(e @ LeaseError::Expired { .. }) => info!("late submit refused: {e}"),
        other => anyhow::bail!("expected Expired, got {other:?}"),
    }
    print_json("sweep", &app.leases.sweep_expired().await?)?;

    // every task: lease, submit, review; the first one is rejected once
    for (i, task_id) in ids.iter().copied().enumerate() {
        let grant = app.leases.acquire(&labeler, task_id, None).await?;
        app.leases
            .submit(&labeler, task_id, &grant.lease_token, payload.clone())
            .await?;

        if i == 0 {
            app.lifecycle
                .reject(&client, task_id, Some("missing occluded objects".into()))
                .await?;
            let grant = app.leases.acquire(&labeler, task_id, None).await?;
            app.leases
                .submit(&labeler, task_id, &grant.lease_token, payload.clone())
                .await?;
        }
        let task = app.lifecycle.accept(&client, task_id).await?;
        print_json("accepted", &task)?;
    }

    let history = app.lifecycle.annotations(&client, first).await?;
    info!("task {first} has {} annotations", history.raw.len());

    let contract = app
        .lifecycle
        .submit_contract(&labeler, seeded.contract_id)
        .await?;
    print_json("contract", &contract)?;
    Ok(())
}

async fn reaper(config: LeaseConfig, tasks: usize) -> anyhow::Result<()> {
    anyhow::ensure!(tasks > 0, "--tasks must be at least 1");

    let clock = SystemClock;
    let app = AppBuilder::new(InMemoryStore::new())
        .clock(Arc::new(clock))
        .config(config)
        .build()?;
    let seeded = seed(&app, &clock, tasks).await?;

    let min = app.leases.config().min_lease_minutes;
    for task in &seeded.tasks {
        app.leases.acquire(&seeded.labeler, task.id, Some(min)).await?;
    }
    info!(
        "Leased {} tasks for {min} minutes; reaping every {}s (Ctrl-C to stop)",
        seeded.tasks.len(),
        app.leases.config().reaper_interval_secs
    );

    let handle = app.reaper()?.spawn();
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    handle.shutdown_and_join().await;

    let left = app.store.lease_count().await;
    info!("Shut down with {left} leases outstanding");
    Ok(())
}
