mod config;
mod error;
mod link;
mod participant;
mod report;

use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use curling_core::net::channel::ChannelAuthority;
use curling_core::player::{Player, PlayerId};
use curling_match::{GameManager, MatchConfig};

use config::{SimConfig, SimMode};
use error::SimError;
use link::{LinkConfig, run_link};
use participant::Participant;
use report::{MirrorReport, Report};

const MASTER_SEAT: PlayerId = 1;
const MIRROR_SEAT: PlayerId = 2;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let sim = SimConfig::load();
    let match_config = MatchConfig::load();
    tracing::info!(mode = ?sim.mode, seed = sim.seed, latency_ms = sim.latency_ms, loss = sim.loss, "Curling sim starting");

    let mut builder = tokio::runtime::Builder::new_current_thread();
    builder.enable_time();
    if !sim.realtime {
        builder.start_paused(true);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build runtime");
            std::process::exit(1);
        },
    };

    let result = runtime.block_on(async {
        match sim.mode {
            SimMode::Local => run_local(&sim, match_config).await,
            SimMode::Networked => run_networked(&sim, match_config).await,
        }
    });

    match result.map(|report| serde_json::to_string_pretty(&report)) {
        Ok(Ok(json)) => println!("{json}"),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to render report");
            std::process::exit(1);
        },
        Err(e) => {
            tracing::error!(error = %e, "Simulation failed");
            std::process::exit(1);
        },
    }
}

/// Seat both bots and their brooms. On the master this starts the match.
fn seat_bots(game: &mut GameManager) -> Result<(), SimError> {
    for id in [MASTER_SEAT, MIRROR_SEAT] {
        game.register_player(Player::new(id, format!("Bot{id}")))?;
        game.register_broom(id)?;
    }
    Ok(())
}

async fn run_local(sim: &SimConfig, match_config: MatchConfig) -> Result<Report, SimError> {
    let timestep = match_config.rules.fixed_timestep;
    let mut game = GameManager::local(match_config);
    seat_bots(&mut game)?;

    let participant = Participant::new("local", game, vec![MASTER_SEAT, MIRROR_SEAT], None, sim.seed);
    let game = tokio::time::timeout(max_duration(sim), participant.run(timestep))
        .await
        .map_err(|_| SimError::Timeout {
            secs: sim.max_match_secs,
        })?;
    Ok(Report::new(sim.mode, sim.seed, &game, None))
}

async fn run_networked(sim: &SimConfig, match_config: MatchConfig) -> Result<Report, SimError> {
    let timestep = match_config.rules.fixed_timestep;
    let (master_auth, master_out) = ChannelAuthority::channel(true);
    let (mirror_auth, mirror_out) = ChannelAuthority::channel(false);
    let (to_mirror, mirror_in) = mpsc::unbounded_channel();
    let (to_master, master_in) = mpsc::unbounded_channel();

    let downlink = tokio::spawn(run_link(
        "downlink",
        LinkConfig::new(sim.latency_ms, sim.loss, sim.seed),
        master_out,
        to_mirror,
    ));
    let uplink = tokio::spawn(run_link(
        "uplink",
        LinkConfig::new(sim.latency_ms, sim.loss, sim.seed.wrapping_add(1)),
        mirror_out,
        to_master,
    ));

    // The mirror is seated first so it is listening when the master starts the match.
    let mut mirror = GameManager::new(
        match_config.clone(),
        Box::new(mirror_auth.with_local_player(MIRROR_SEAT)),
    );
    seat_bots(&mut mirror)?;
    let mut master = GameManager::new(
        match_config,
        Box::new(master_auth.with_local_player(MASTER_SEAT)),
    );
    seat_bots(&mut master)?;

    let master = tokio::spawn(
        Participant::new("master", master, vec![MASTER_SEAT], Some(master_in), sim.seed).run(timestep),
    );
    let mirror = tokio::spawn(
        Participant::new("mirror", mirror, vec![MIRROR_SEAT], Some(mirror_in), sim.seed.wrapping_add(2))
            .run(timestep),
    );
    let aborts = [master.abort_handle(), mirror.abort_handle()];

    let finished = tokio::time::timeout(max_duration(sim), async {
        Ok::<_, SimError>((master.await?, mirror.await?))
    })
    .await;
    let (master, mirror) = match finished {
        Ok(games) => games?,
        Err(_) => {
            aborts.iter().for_each(|a| a.abort());
            return Err(SimError::Timeout {
                secs: sim.max_match_secs,
            });
        },
    };

    let converged = master.serialize_state()? == mirror.serialize_state()?;
    if !converged {
        tracing::warn!(master = ?master.state(), mirror = ?mirror.state(), "Mirror diverged");
    }
    let report = Report::new(sim.mode, sim.seed, &master, None);
    // Closing both ends lets the links flush and exit.
    drop((master, mirror));
    Ok(Report {
        mirror: Some(MirrorReport {
            converged,
            downlink: downlink.await?,
            uplink: uplink.await?,
        }),
        ..report
    })
}

fn max_duration(sim: &SimConfig) -> Duration {
    Duration::from_secs_f64(sim.max_match_secs.max(0.0))
}
