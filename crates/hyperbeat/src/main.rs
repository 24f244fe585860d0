//! Hyperbeat - Audio-reactive rhythm direction engine
//!
//! Headless driver: runs a direction session against the default capture
//! device (or a synthetic kick pattern when no device is available), then
//! prints and persists the run summary.

#![warn(missing_docs)]

mod logging_setup;

use anyhow::Result;
use hyperbeat_core::scores::persist_run;
use hyperbeat_core::{
    BufferSource, JsonScoreStore, LogConfig, RunTemplate, Session, SessionConfig,
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK_SECONDS: f32 = 1.0 / 60.0;
const DEMO_SECONDS: f32 = 30.0;

/// 120 BPM kick pattern used when no capture device can be opened.
fn synthetic_kicks(sample_rate: u32) -> Vec<f32> {
    let beat_samples = (sample_rate as f32 * 0.5) as usize;
    let mut samples = vec![0.0f32; beat_samples * 8];
    for beat in 0..8 {
        for i in 0..(sample_rate as usize / 10) {
            let t = i as f32 / sample_rate as f32;
            let envelope = (-t * 28.0).exp();
            samples[beat * beat_samples + i] =
                (t * 60.0 * std::f32::consts::TAU).sin() * envelope * 0.9;
        }
    }
    samples
}

fn main() -> Result<()> {
    let log_config = LogConfig::default();
    let _log_guard = logging_setup::init(&log_config)?;

    let config = SessionConfig {
        seed: 0xBEA7,
        geometry_index: 3.0,
        ..SessionConfig::default()
    };
    let audio_config = config.audio.clone();

    let mut session = Session::new(config);
    if let Err(e) = session.initialize_audio() {
        warn!("No capture device ({}), using synthetic kick pattern", e);
        let sample_rate = audio_config.sample_rate;
        session = Session::with_source(
            SessionConfig {
                seed: 0xBEA7,
                geometry_index: 3.0,
                ..SessionConfig::default()
            },
            Box::new(BufferSource::new(
                synthetic_kicks(sample_rate),
                sample_rate,
                audio_config.fft_size,
            )),
        );
    }

    session.start_run(RunTemplate {
        base_id: "demo".to_string(),
        ..RunTemplate::default()
    });
    info!("Session running for {:.0}s", DEMO_SECONDS);

    let tick = Duration::from_secs_f32(TICK_SECONDS);
    let mut elapsed = 0.0f32;
    while elapsed < DEMO_SECONDS {
        let started = Instant::now();
        let report = session.tick(TICK_SECONDS);

        if report.beat {
            info!(
                "beat {} | stage {} | {} live targets | interval {:.3}s",
                report.beat_count,
                report.director.stage,
                session.targets().len(),
                report.beat_interval
            );
        }
        for event in &report.director.events {
            info!("event: {:?}", event);
        }

        elapsed += TICK_SECONDS;
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    if let Some(summary) = session.complete_run() {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        match JsonScoreStore::default_location() {
            Ok(store) => {
                persist_run(&store, &summary);
            }
            Err(e) => warn!("Scores not persisted: {}", e),
        }
    }

    Ok(())
}
