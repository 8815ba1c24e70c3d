//! Dollhouse Engine - offline demo entry point.
//!
//! Loads one scenario and plays it from stdin. Each line is a turn; a line starting with
//! `{` is taken as an already-classified intent. `/night`, `/reset`, `/state` and `/quit`
//! are commands. No model is attached, so every generator stage uses its fallback.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dollhouse_domain::{PlayerKey, ScenarioAssets};
use dollhouse_engine::infrastructure::offline::{ConcatNarrator, OfflineLlm, ScriptedClassifier};
use dollhouse_engine::infrastructure::settings::EngineSettings;
use dollhouse_engine::use_cases::TurnError;
use dollhouse_engine::App;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_files();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dollhouse_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Dollhouse Engine");

    let settings = EngineSettings::from_env();
    let scenario_path = settings.scenario_path.clone().unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test_data")
            .join("scenarios")
            .join("attic.json")
    });
    let raw = std::fs::read_to_string(&scenario_path)
        .with_context(|| format!("reading scenario {}", scenario_path.display()))?;
    let assets: ScenarioAssets = serde_json::from_str(&raw)
        .with_context(|| format!("parsing scenario {}", scenario_path.display()))?;
    let scenario_id = assets.scenario_id.clone();
    tracing::info!(path = %scenario_path.display(), scenario_id = %scenario_id, "Scenario loaded");

    let app = App::in_memory(
        settings,
        Arc::new(ScriptedClassifier),
        Arc::new(OfflineLlm),
        Arc::new(ConcatNarrator),
    );
    app.turns.register_scenario(assets);
    let key = PlayerKey::new("local", scenario_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/night" => {
                let night = app.turns.process_night(&key).await;
                match night {
                    Ok(night) => {
                        println!("{}", night.narrative);
                        if night.ending_info.is_some() {
                            println!("(the story has ended; /reset to play again)");
                        }
                    }
                    Err(e) => report(&e),
                }
            }
            "/reset" => {
                let world = app.turns.reset(&key).await?;
                println!("(reset to turn {})", world.turn);
            }
            "/state" => {
                let world = app.turns.state(&key).await?;
                println!("{}", serde_json::to_string_pretty(&world)?);
            }
            _ => match app.turns.process_turn(&key, input).await {
                Ok(result) => {
                    if let Some(rejection) = &result.rejection {
                        tracing::debug!(code = rejection.code.as_str(), "Item use rejected");
                    }
                    println!("{}", result.narrative);
                    if result.ending_info.is_some() {
                        println!("(the story has ended; /reset to play again)");
                    }
                }
                Err(e) => report(&e),
            },
        }
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}

fn report(error: &TurnError) {
    if error.is_session_ended() {
        println!("({}; /reset to play again)", error);
    } else {
        tracing::error!(error = %error, "Turn failed");
    }
}

/// `.env.local` then `.env` from the workspace root; earlier files win.
fn load_env_files() {
    let workspace = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    [".env.local", ".env"]
        .into_iter()
        .map(|name| workspace.join(name))
        .filter(|path| path.is_file())
        .for_each(|path| {
            if let Err(e) = dotenvy::from_path(&path) {
                eprintln!("ignoring {}: {e}", path.display());
            }
        });
}
