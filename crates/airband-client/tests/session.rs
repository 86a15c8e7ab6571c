//! End-to-end session tests against the scripted mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airband_client::{ClientOptions, SpyServerClient, SpyServerTuner, TunerOptions};
use airband_core::{Error, SessionEvent, Tuner};
use airband_test_harness::frames::{self, DeviceProfile};
use airband_test_harness::MockSpyServer;
use airband_transport::TcpTransport;

const CMD_HELLO: u32 = 0;
const CMD_SET_SETTING: u32 = 2;
const SETTING_GAIN: u32 = 2;
const SETTING_IQ_FREQUENCY: u32 = 101;
const SETTING_IQ_DECIMATION: u32 = 102;
const SETTING_FFT_FREQUENCY: u32 = 201;
const SETTING_FFT_DECIMATION: u32 = 202;

const WAIT: Duration = Duration::from_secs(5);

async fn connect(server: &MockSpyServer) -> Arc<SpyServerClient> {
    let transport = TcpTransport::connect(&server.addr().to_string())
        .await
        .expect("connect to mock server");
    SpyServerClient::connect(Box::new(transport), ClientOptions::default())
        .await
        .expect("open session")
}

#[tokio::test]
async fn handshake_sends_hello_first() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;

    server.wait_for_command(CMD_HELLO, WAIT).await.expect("hello");
    let commands = server.received_commands().await;
    assert_eq!(commands[0].command_type, CMD_HELLO);
    // Protocol version leads the hello args.
    let version = commands[0].setting().unwrap();
    assert_eq!(version >> 24, 2);
    assert_eq!(version & 0xFFFF, 1700);
    // Client identifier follows as UTF-8.
    assert!(String::from_utf8(commands[0].args[4..].to_vec())
        .unwrap()
        .starts_with("airband"));

    client.disconnect().await;
}

#[tokio::test]
async fn device_info_drives_rate_negotiation() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;

    server.push_frame(frames::device_info(&DeviceProfile::default()));

    // Default profile: 10 MHz max, 11 stages. Desired 9375 -> stage 10,
    // desired 37500 -> stage 8 (39062).
    let iq_decimation = server
        .wait_for_setting(SETTING_IQ_DECIMATION, WAIT)
        .await
        .expect("iq decimation");
    assert_eq!(iq_decimation, 10);
    let fft_decimation = server
        .wait_for_setting(SETTING_FFT_DECIMATION, WAIT)
        .await
        .expect("fft decimation");
    assert_eq!(fft_decimation, 8);

    assert_eq!(client.iq_sample_rate(), 10_000_000 >> 10);
    let info = client.device_info().expect("device info cached");
    assert_eq!(info.max_gain, 21);

    client.disconnect().await;
}

#[tokio::test]
async fn client_sync_mirrors_receiver_state() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;
    let mut events = client.events();

    server.push_frame(frames::client_sync(14, 124_500_000, true));

    let synced = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(SessionEvent::Synced {
                gain,
                centre_frequency,
            }) = events.recv().await
            {
                break (gain, centre_frequency);
            }
        }
    })
    .await
    .expect("synced event");
    assert_eq!(synced, (14, 124_500_000));

    let state = client.receiver_state().expect("state mirror");
    assert!(state.can_control);
    assert_eq!(state.gain, 14);

    client.disconnect().await;
}

#[tokio::test]
async fn iq_frames_reach_watchers_under_fragmentation() {
    // Three-byte chunks force reassembly across every boundary.
    let server = MockSpyServer::start_fragmented(3).await.unwrap();
    let client = connect(&server).await;

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    client.watch_iq(Box::new(move |header, payload| {
        received2
            .lock()
            .unwrap()
            .push((header.sequence, payload.to_vec()));
    }));

    let payload: Vec<u8> = (0..64).collect();
    server.push_frame(frames::iq_samples(7, &payload));
    server.push_frame(frames::iq_samples(8, &payload));

    tokio::time::timeout(WAIT, async {
        loop {
            if received.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both frames reassembled");

    let frames_seen = received.lock().unwrap();
    assert_eq!(frames_seen[0].0, 7);
    assert_eq!(frames_seen[1].0, 8);
    assert_eq!(frames_seen[0].1, payload);

    client.disconnect().await;
}

#[tokio::test]
async fn set_centre_frequency_retunes_both_channels() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;

    client.set_centre_frequency(121_500_000).unwrap();

    let fft = server
        .wait_for_setting(SETTING_FFT_FREQUENCY, WAIT)
        .await
        .expect("fft frequency");
    let iq = server
        .wait_for_setting(SETTING_IQ_FREQUENCY, WAIT)
        .await
        .expect("iq frequency");
    assert_eq!(fft, 121_500_000);
    assert_eq!(iq, 121_500_000);

    // The sync request re-sends both stream formats after the retune.
    let commands = server.received_commands().await;
    let format_sets = commands
        .iter()
        .filter(|c| c.command_type == CMD_SET_SETTING)
        .filter(|c| c.setting() == Some(100) || c.setting() == Some(200))
        .count();
    assert!(format_sets >= 4, "handshake plus sync request formats");

    client.disconnect().await;
}

#[tokio::test]
async fn gain_is_rounded_to_integer_steps() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;

    client.set_gain(13.7).unwrap();
    let gain = server
        .wait_for_setting(SETTING_GAIN, WAIT)
        .await
        .expect("gain setting");
    assert_eq!(gain, 14);

    client.disconnect().await;
}

#[tokio::test]
async fn server_close_surfaces_error_and_disconnect() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;
    let mut events = client.events();

    // Make sure the session is fully up before tearing the server down.
    server.wait_for_command(CMD_HELLO, WAIT).await.expect("hello");
    drop(server);

    let saw_disconnect = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Disconnected) => break true,
                Ok(_) => continue,
                Err(_) => break false,
            }
        }
    })
    .await
    .expect("disconnect event");
    assert!(saw_disconnect);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn tune_rejects_frequencies_beyond_the_tuning_range() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;
    let tuner = SpyServerTuner::new(Arc::clone(&client), TunerOptions::default());

    let err = tuner.tune(5_000_000_000).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));

    client.disconnect().await;
}

#[tokio::test]
async fn late_watcher_sees_cached_device_info() {
    let server = MockSpyServer::start().await.unwrap();
    let client = connect(&server).await;

    server.push_frame(frames::device_info(&DeviceProfile::default()));
    server
        .wait_for_setting(SETTING_IQ_DECIMATION, WAIT)
        .await
        .expect("negotiation done");

    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    client.watch_device_info(Box::new(move |info| {
        assert_eq!(info.max_sample_rate, 10_000_000);
        seen2.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(seen.load(Ordering::SeqCst), 1, "cached info replays to late watchers");

    client.disconnect().await;
}
