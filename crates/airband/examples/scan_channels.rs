//! Scan a bank of airband channels.
//!
//! Connects to a SpyServer, builds a small channel bank, and runs the
//! scanner, printing state transitions as they happen. Stop with Ctrl-C.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p airband --example scan_channels -- airspy.local:5555
//! ```

use airband::{
    Channel, ChannelBank, ChannelList, ClientOptions, ScanState, Scanner, SpyServerClient,
    SpyServerTuner, TcpTransport, TunerOptions,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5555".to_string());

    println!("Connecting to {}...", addr);
    let transport = TcpTransport::connect(&addr).await?;
    let client = SpyServerClient::connect(Box::new(transport), ClientOptions::default()).await?;
    let tuner = SpyServerTuner::new(client.clone(), TunerOptions::default());
    client.start_streaming()?;

    let mut channels = ChannelList::new();
    let mut bank = ChannelBank::new();
    for (name, mhz) in [
        ("London FIS", 124.750),
        ("Farnborough LARS", 125.250),
        ("Gloster Tower", 122.902),
    ] {
        let channel = Channel::from_mhz(name, mhz, 10);
        bank.add(channel.id());
        channels.add(channel);
    }

    let scanner = Arc::new(Scanner::new(tuner));
    let mut state = scanner.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            match &*state.borrow() {
                ScanState::Idle => println!("[idle]"),
                ScanState::Tuning(t) => {
                    println!("tuning  {:>8.3} MHz  {}", t.frequency_hz as f64 / 1e6, t.name)
                }
                ScanState::Listening(t) => println!("listen  {}", t.name),
                ScanState::Holding(t) => println!("ACTIVE  {}", t.name),
            }
        }
    });

    let scan = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.scan(&channels, &bank).await })
    };

    tokio::signal::ctrl_c().await?;
    scanner.stop();
    scan.await??;
    client.disconnect().await;
    Ok(())
}
