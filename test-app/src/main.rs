// airband test application -- CLI tool for exercising the SpyServer client
// against a real server on the network.
//
// Usage:
//   airband-test-app --host airspy.local:5555 info
//   airband-test-app --host airspy.local:5555 monitor --duration 30
//   airband-test-app --host airspy.local:5555 tune 124.75 --mode am
//   airband-test-app --host airspy.local:5555 scan 118.425 124.75 125.25

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use airband::{
    Channel, ChannelBank, ChannelList, ClientOptions, DemodMode, ScanState, Scanner, SessionEvent,
    SpyServerClient, SpyServerTuner, SquelchStrategy, StreamPlayer, TcpTransport, Tuner,
    TunerOptions,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// airband test application -- exercises the SpyServer session from the
/// command line.
#[derive(Parser)]
#[command(name = "airband-test-app", version, about)]
struct Cli {
    /// SpyServer address (e.g. airspy.local:5555 or 192.168.1.50:5555).
    #[arg(long)]
    host: String,

    /// TCP connect timeout in seconds.
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print device info and negotiated stream rates.
    Info,

    /// Subscribe to session events and print them in real time.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Tune a single frequency and report squelch and audio activity.
    Tune {
        /// Frequency in megahertz (e.g. 124.75).
        freq_mhz: f64,

        /// Demodulation mode.
        #[arg(long, default_value = "am", value_enum)]
        mode: Mode,

        /// Squelch strategy.
        #[arg(long, default_value = "phase-lock", value_enum)]
        squelch: Squelch,

        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Scan a set of frequencies round-robin, holding on active ones.
    Scan {
        /// Frequencies in megahertz (at least two).
        #[arg(required = true)]
        freq_mhz: Vec<f64>,

        /// Demodulation mode.
        #[arg(long, default_value = "am", value_enum)]
        mode: Mode,

        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Am,
    Fm,
}

impl From<Mode> for DemodMode {
    fn from(mode: Mode) -> DemodMode {
        match mode {
            Mode::Am => DemodMode::Am,
            Mode::Fm => DemodMode::Fm,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Squelch {
    PhaseLock,
    SpectralPeak,
}

impl From<Squelch> for SquelchStrategy {
    fn from(squelch: Squelch) -> SquelchStrategy {
        match squelch {
            Squelch::PhaseLock => SquelchStrategy::PhaseLock,
            Squelch::SpectralPeak => SquelchStrategy::SpectralPeak,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format a frequency in Hz as a human-readable MHz string.
fn format_freq(hz: u64) -> String {
    let mhz = hz as f64 / 1_000_000.0;
    format!("{mhz:.4} MHz")
}

/// Connect and open a session.
async fn connect_client(cli: &Cli) -> Result<Arc<SpyServerClient>> {
    let transport =
        TcpTransport::connect_with_timeout(&cli.host, Duration::from_secs(cli.connect_timeout))
            .await
            .with_context(|| format!("failed to connect to {}", cli.host))?;

    let client = SpyServerClient::connect(Box::new(transport), ClientOptions::default())
        .await
        .context("session handshake failed")?;

    println!("Connected to {}", cli.host);
    Ok(client)
}

/// Wait until device info arrives (or time out).
async fn wait_for_device(client: &SpyServerClient) -> Result<airband::proto::DeviceInfo> {
    let mut events = client.events();
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        if let Some(info) = client.device_info() {
            return Ok(info);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("timed out waiting for device info");
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(SessionEvent::Error { message })) => bail!("session error: {message}"),
            Ok(Ok(SessionEvent::Disconnected)) => bail!("server closed the connection"),
            Ok(Ok(_)) => {}
            Ok(Err(_)) => bail!("event channel closed"),
            Err(_) => bail!("timed out waiting for device info"),
        }
    }
}

/// Sleep for the requested duration, or until Ctrl-C when duration is 0.
async fn run_for(duration_secs: u64) -> Result<()> {
    if duration_secs > 0 {
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_info(client: &SpyServerClient) -> Result<()> {
    let info = wait_for_device(client).await?;

    println!();
    println!("Device Information");
    println!("  Device type:    {:?}", info.device_type);
    println!("  Serial:         0x{:08X}", info.device_serial);
    println!("  Max rate:       {} sps", info.max_sample_rate);
    println!("  Max bandwidth:  {} Hz", info.max_bandwidth);
    println!("  ADC resolution: {} bits", info.adc_resolution_bits);
    println!(
        "  Gain stages:    {} (max {})",
        info.gain_stages, info.max_gain
    );
    println!(
        "  Freq range:     {} - {}",
        format_freq(info.min_frequency as u64),
        format_freq(info.max_frequency as u64),
    );
    println!(
        "  Sample rates:   {}",
        info.available_sample_rates()
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
    println!("Session");
    println!("  IQ sample rate: {} sps", client.iq_sample_rate());
    if let Some(state) = client.receiver_state() {
        println!(
            "  Centre freq:    {}",
            format_freq(state.device_centre_frequency as u64)
        );
        println!("  Gain:           {}", state.gain);
        println!("  Controllable:   {}", state.can_control);
    } else {
        println!("  (no receiver state received yet)");
    }

    Ok(())
}

async fn cmd_monitor(client: &SpyServerClient, duration_secs: u64) -> Result<()> {
    let mut events = client.events();
    client.start_streaming()?;

    println!("Monitoring session events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            result = tokio::time::timeout(timeout, events.recv()) => match result {
                Ok(Ok(event)) => println!("[event] {event:?}"),
                Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                    println!("Event channel closed.");
                    break;
                }
                Err(_) => {
                    if deadline.is_some() {
                        println!("Monitor duration elapsed.");
                    }
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    Ok(())
}

async fn cmd_tune(
    client: Arc<SpyServerClient>,
    freq_mhz: f64,
    mode: Mode,
    squelch: Squelch,
    duration_secs: u64,
) -> Result<()> {
    let freq_hz = (freq_mhz * 1e6).round() as u64;

    let options = TunerOptions {
        mode: mode.into(),
        strategy: squelch.into(),
        ..TunerOptions::default()
    };
    let tuner = SpyServerTuner::new(client.clone(), options);

    // Track demodulated audio through the playback scheduler and count
    // what reaches the sink.
    let buffers_out = Arc::new(Mutex::new(0u64));
    let sink_count = Arc::clone(&buffers_out);
    let player = Arc::new(Mutex::new(StreamPlayer::new(
        client.iq_sample_rate(),
        Box::new(move |_buffer| {
            if let Ok(mut count) = sink_count.lock() {
                *count += 1;
            }
        }),
    )));
    if let Ok(mut player) = player.lock() {
        player.start();
    }

    let audio_player = Arc::clone(&player);
    tuner.on_demodulated_audio(Box::new(move |samples| {
        if let Ok(mut player) = audio_player.lock() {
            player.push_samples(samples);
        }
    }));
    let rate_player = Arc::clone(&player);
    tuner.on_sample_rate_changed(Box::new(move |rate| {
        println!("[rate] IQ sample rate now {rate} sps");
        if let Ok(mut player) = rate_player.lock() {
            player.set_sample_rate(rate);
        }
    }));
    tuner.on_signal_detected(Box::new(|present| {
        if present {
            println!("[squelch] open");
        } else {
            println!("[squelch] closed");
        }
    }));

    client.start_streaming()?;
    println!(
        "Tuning {} ({:?}/{:?})...",
        format_freq(freq_hz),
        mode,
        squelch
    );
    tuner.tune(freq_hz).await?;

    run_for(duration_secs).await?;

    client.stop_streaming()?;
    let count = buffers_out.lock().map(|c| *c).unwrap_or(0);
    println!("{count} audio buffer(s) scheduled.");
    Ok(())
}

async fn cmd_scan(
    client: Arc<SpyServerClient>,
    freqs_mhz: &[f64],
    mode: Mode,
    duration_secs: u64,
) -> Result<()> {
    if freqs_mhz.len() < 2 {
        bail!("scanning needs at least two frequencies");
    }

    let options = TunerOptions {
        mode: mode.into(),
        ..TunerOptions::default()
    };
    let tuner = SpyServerTuner::new(client.clone(), options);

    let mut channels = ChannelList::new();
    let mut bank = ChannelBank::new();
    for &mhz in freqs_mhz {
        let channel = Channel::from_mhz(format!("{mhz:.4} MHz"), mhz, 0);
        bank.add(channel.id());
        channels.add(channel);
    }

    let scanner = Arc::new(Scanner::new(tuner));

    // Print state transitions as the scanner moves through the bank.
    let mut state_rx = scanner.state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let line = match &*state_rx.borrow() {
                ScanState::Idle => "[scan] idle".to_string(),
                ScanState::Tuning(t) => format!("[scan] tuning {}", t.name),
                ScanState::Listening(t) => format!("[scan] listening {}", t.name),
                ScanState::Holding(t) => format!("[scan] holding {}", t.name),
            };
            println!("{line}");
        }
    });

    client.start_streaming()?;
    println!("Scanning {} channels (Ctrl-C to stop)...", freqs_mhz.len());

    let stopper = Arc::clone(&scanner);
    tokio::spawn(async move {
        if run_for(duration_secs).await.is_ok() {
            stopper.stop();
        }
    });

    scanner.scan(&channels, &bank).await?;
    client.stop_streaming()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = connect_client(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&client).await,
        Command::Monitor { duration } => cmd_monitor(&client, *duration).await,
        Command::Tune {
            freq_mhz,
            mode,
            squelch,
            duration,
        } => cmd_tune(client.clone(), *freq_mhz, *mode, *squelch, *duration).await,
        Command::Scan {
            freq_mhz,
            mode,
            duration,
        } => cmd_scan(client.clone(), freq_mhz, *mode, *duration).await,
    };

    client.disconnect().await;
    result
}
