//! Cube Merge headless harness
//!
//! Plays a short scripted round against the core with synthetic contacts
//! standing in for the physics engine, then prints a JSON summary.
//!
//! Usage: `cube-merge [config.json]`

#[cfg(not(target_arch = "wasm32"))]
use std::process::ExitCode;

#[cfg(not(target_arch = "wasm32"))]
use cube_merge::{
    CubePalette, GameEvent, GameplayConfig, Session,
    consts::SIM_DT,
    sim::{AutoMergeOutcome, CollisionRequest, CubeId},
};

#[cfg(not(target_arch = "wasm32"))]
use glam::Vec3;

/// Lateral positions the scripted player releases at
#[cfg(not(target_arch = "wasm32"))]
const THROWS: [f32; 6] = [-1.5, -0.5, 0.5, 1.5, 3.0, -3.0];

#[cfg(not(target_arch = "wasm32"))]
#[derive(serde::Serialize)]
struct CubeSummary {
    id: CubeId,
    value: u32,
    position: Vec3,
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(serde::Serialize)]
struct RoundSummary {
    seed: u64,
    phase: cube_merge::SessionPhase,
    score: cube_merge::score::ScoreSnapshot,
    merges: usize,
    auto_merge: &'static str,
    cubes: Vec<CubeSummary>,
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> ExitCode {
    env_logger::init();
    log::info!("Cube Merge (headless) starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => match GameplayConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("Failed to load {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        None => GameplayConfig::default(),
    };

    let session = match Session::new(config, CubePalette::default()) {
        Ok(session) => session,
        Err(err) => {
            log::error!("Invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let summary = play_round(&session);
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Failed to encode summary: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The core is a library; there is no browser entry point
}

#[cfg(not(target_arch = "wasm32"))]
fn play_round(session: &Session) -> RoundSummary {
    let merges = std::rc::Rc::new(std::cell::Cell::new(0usize));
    {
        let merges = std::rc::Rc::clone(&merges);
        session.bus().subscribe(
            cube_merge::EventKind::CubeMerged,
            cube_merge::bus::handler(move |_| {
                merges.set(merges.get() + 1);
                Ok(())
            }),
        );
    }

    session.load_scene(Vec3::new(0.0, 0.5, -4.0));

    // Throw, then let each cube "land" a little further down the lane
    let mut thrown = Vec::new();
    for (lane_slot, &x) in THROWS.iter().enumerate() {
        let Some(id) = throw_held_cube(session, x) else {
            break;
        };
        let landing = Vec3::new(x.clamp(-2.0, 2.0), 0.5, 2.0 + lane_slot as f32);
        session.with_cubes_mut(|cubes| {
            if let Some(cube) = cubes.cube_mut(id) {
                cube.body.position = landing;
                cube.body.stop();
            }
        });
        thrown.push(id);
    }

    // Neighbours bump into each other once each
    for pair in thrown.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let contact = session.with_cubes(|cubes| {
            let pa = cubes.cube(a)?.position();
            let pb = cubes.cube(b)?.position();
            Some((pa + pb) * 0.5)
        });
        if let Some(contact_point) = contact {
            session.report_collision(CollisionRequest {
                initiator: b,
                counterpart: Some(a),
                impact: Vec3::new(0.0, 0.0, -4.0),
                contact_point,
            });
        }
    }

    let auto_merge = match session.run_auto_merge() {
        Ok(()) => finish_auto_merge(session),
        Err(rejected) => {
            log::info!("Auto-merge not run: {}", rejected);
            "rejected"
        }
    };

    let cubes = session.with_cubes(|cubes| {
        cubes
            .active_cubes()
            .into_iter()
            .map(|cube| CubeSummary {
                id: cube.id(),
                value: cube.value(),
                position: cube.position(),
            })
            .collect()
    });

    RoundSummary {
        seed: session.config().seed,
        phase: session.phase(),
        score: session.score(),
        merges: merges.get(),
        auto_merge,
        cubes,
    }
}

/// Drag the held cube to `x`, release it and wait for the next spawn
#[cfg(not(target_arch = "wasm32"))]
fn throw_held_cube(session: &Session, x: f32) -> Option<CubeId> {
    let held = session.with_cubes(|cubes| cubes.active_cube_id())?;
    session.publish(GameEvent::TouchStarted { x: 0.0 });
    session.publish(GameEvent::TouchMoved { x });
    session.publish(GameEvent::TouchEnded { x });

    let timeout = (session.config().spawn_delay / SIM_DT).ceil() as usize + 2;
    for _ in 0..timeout {
        if session.tick(SIM_DT).spawned.is_some() {
            break;
        }
    }
    Some(held)
}

#[cfg(not(target_arch = "wasm32"))]
fn finish_auto_merge(session: &Session) -> &'static str {
    let budget = (session.config().auto_merge_duration / SIM_DT).ceil() as usize * 2 + 10;
    for _ in 0..budget {
        match session.tick(SIM_DT).auto_merge {
            Some(AutoMergeOutcome::Merged(record)) => {
                log::info!(
                    "Auto-merge produced {} at {}",
                    record.resulting_value, record.merge_position
                );
                return "merged";
            }
            Some(AutoMergeOutcome::Cancelled) => return "cancelled",
            Some(AutoMergeOutcome::Interrupted) => return "interrupted",
            None => {}
        }
    }
    log::warn!("Auto-merge still running after {} ticks", budget);
    "running"
}
