//! Monitor one channel and report demodulated audio.
//!
//! Tunes a single frequency, schedules the demodulated audio into
//! playback buffers, and prints per-buffer statistics. Wire the
//! scheduled buffers into an audio backend to actually hear them.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p airband --example monitor_audio -- airspy.local:5555 124.75
//! ```

use airband::{
    ClientOptions, ScheduledBuffer, SpyServerClient, SpyServerTuner, StreamPlayer, TcpTransport,
    Tuner, TunerOptions,
};
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:5555".to_string());
    let freq_mhz: f64 = args.next().as_deref().unwrap_or("124.75").parse()?;
    let freq_hz = (freq_mhz * 1e6).round() as u64;

    println!("Connecting to {}...", addr);
    let transport = TcpTransport::connect(&addr).await?;
    let client = SpyServerClient::connect(Box::new(transport), ClientOptions::default()).await?;
    let tuner = SpyServerTuner::new(client.clone(), TunerOptions::default());

    let player = Arc::new(Mutex::new(StreamPlayer::new(
        client.iq_sample_rate(),
        Box::new(|buffer: ScheduledBuffer| {
            let peak = buffer.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            println!(
                "buffer: {} samples, peak {:.3}, starts in {:?}",
                buffer.samples.len(),
                peak,
                buffer.start.saturating_duration_since(std::time::Instant::now()),
            );
        }),
    )));
    player.lock().unwrap().start();

    let audio_player = Arc::clone(&player);
    tuner.on_demodulated_audio(Box::new(move |samples| {
        if let Ok(mut player) = audio_player.lock() {
            player.push_samples(samples);
        }
    }));
    let rate_player = Arc::clone(&player);
    tuner.on_sample_rate_changed(Box::new(move |rate| {
        if let Ok(mut player) = rate_player.lock() {
            player.set_sample_rate(rate);
        }
    }));
    tuner.on_signal_detected(Box::new(|present| {
        if present {
            println!("squelch open");
        }
    }));

    client.start_streaming()?;
    println!("Tuning {:.3} MHz...", freq_mhz);
    tuner.tune(freq_hz).await?;

    tokio::signal::ctrl_c().await?;
    client.disconnect().await;
    Ok(())
}
