//! Fork a generated 440 Hz tone to a WebSocket endpoint.
//!
//! Usage: `cargo run --example fork_tone -- ws://127.0.0.1:8080/audio [seconds]`
//!
//! Set `RUST_LOG=audiofork_rs=debug` to watch the worker.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use audiofork_rs::types::DEFAULT_SAMPLE_RATE;
use audiofork_rs::{
    Direction, ForkRegistry, Frame, RetryPolicy, SAMPLES_PER_FRAME, SessionDescriptor,
    channel_source,
};
use tracing_subscriber::EnvFilter;

const TONE_HZ: f32 = 440.0;

fn tone(frame_index: usize) -> Frame {
    let start = frame_index * SAMPLES_PER_FRAME;
    let payload: Vec<u8> = (start..start + SAMPLES_PER_FRAME)
        .flat_map(|i| {
            let t = i as f32 / DEFAULT_SAMPLE_RATE as f32;
            let sample = ((TAU * TONE_HZ * t).sin() * 8000.0) as i16;
            sample.to_le_bytes()
        })
        .collect();
    Frame::new(Direction::Out, payload)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:8080/audio".to_string());
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5);

    let registry = ForkRegistry::websocket();
    let (feeder, source) = channel_source("Local/tone-00000001", 50);
    let descriptor = SessionDescriptor::builder(endpoint)
        .with_retry(RetryPolicy::fixed(3, Duration::from_secs(2)))
        .build_for(&source)?;

    let id = registry.start(descriptor, Arc::new(source)).await?;
    println!("Fork {id} started");

    let frames = (seconds * 1000 / 20) as usize;
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    for index in 0..frames {
        ticker.tick().await;
        if feeder.send(tone(index)).await.is_err() {
            break;
        }
    }
    feeder.finish();

    let report = registry.join(id).await?;
    println!(
        "Fork {id} ended ({}): {} frames, {} bytes, {} reconnects",
        report.reason, report.frames_sent, report.stats.bytes_sent, report.stats.reconnect_count
    );
    Ok(())
}
