//! Popcorn engine console driver: reads game commands from stdin and prints every
//! announcement as a JSON line.

use std::{env, sync::Arc};

use anyhow::Context;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use popcorn_engine::{
    config::EngineConfig,
    dao::stats_store::JsonLinesStatsStore,
    dto::announcement::{Announcement, RoleAssignment},
    services::{
        commands::{GameCommand, dispatch},
        outbox::{DeliveryError, Messenger},
    },
    state::{ChannelId, GameRegistry, roster::ParticipantId},
};

/// The console plays every game in this one channel.
const CONSOLE_CHANNEL: ChannelId = ChannelId(1);
const DEFAULT_STATS_PATH: &str = "data/games.jsonl";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = EngineConfig::load();
    let stats_path = env::var("POPCORN_STATS_PATH").unwrap_or_else(|_| DEFAULT_STATS_PATH.into());
    info!(%stats_path, "recording finished games");

    let registry = GameRegistry::new(
        config,
        Arc::new(ConsoleMessenger),
        Arc::new(JsonLinesStatsStore::new(stats_path)),
    );

    tokio::select! {
        result = read_commands(&registry) => result?,
        _ = shutdown_signal() => info!("shutdown requested"),
    }

    registry.shutdown().await;
    Ok(())
}

/// Feed stdin lines to the dispatcher until EOF.
async fn read_commands(registry: &popcorn_engine::state::SharedRegistry) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Ok(command) => {
                let reply = dispatch(registry, CONSOLE_CHANNEL, command).await;
                println!("{}", serde_json::to_string(&reply).context("encoding reply")?);
            }
            Err(message) => warn!(%line, %message, "unrecognised command"),
        }
    }
    Ok(())
}

/// Parse `start <ids…>`, `shoot <actor> <target>`, `status`, `rolepm <id>` and `end <reason…>`.
fn parse_command(line: &str) -> Result<GameCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let rest = words.collect::<Vec<_>>();

    match (verb, rest.as_slice()) {
        ("start", ids) => Ok(GameCommand::Start {
            participants: ids.iter().map(|id| parse_id(id)).collect::<Result<_, _>>()?,
        }),
        ("shoot", [actor, target]) => Ok(GameCommand::Shoot {
            actor: parse_id(actor)?,
            target: parse_id(target)?,
        }),
        ("status", []) => Ok(GameCommand::Status),
        ("rolepm", [participant]) => Ok(GameCommand::RolePm {
            participant: parse_id(participant)?,
        }),
        ("end", reason) => Ok(GameCommand::ForceEnd {
            reason: if reason.is_empty() {
                "ended by the operator".into()
            } else {
                reason.join(" ")
            },
        }),
        _ => Err(format!("unknown command `{verb}`")),
    }
}

fn parse_id(raw: &str) -> Result<ParticipantId, String> {
    raw.trim_start_matches("<@")
        .trim_end_matches('>')
        .parse()
        .map(ParticipantId)
        .map_err(|_| format!("`{raw}` is not a user id"))
}

/// Messenger printing every outbound message to stdout.
struct ConsoleMessenger;

impl Messenger for ConsoleMessenger {
    fn notify_channel(
        &self,
        channel: ChannelId,
        announcement: Announcement,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        println!("{}", json!({ "channel": channel, "announcement": announcement }));
        future::ready(Ok(())).boxed()
    }

    fn notify_privately(
        &self,
        participant: ParticipantId,
        role: RoleAssignment,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        println!("{}", json!({ "to": participant, "role": role }));
        future::ready(Ok(())).boxed()
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
