//! Receiver → ring → processing against the loopback simulator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netft_core::filter::FilterCfg;
use netft_core::processing::{ProcessingStage, SoftZero};
use netft_core::receiver::{Receiver, ReceiverCfg};
use netft_core::ring::RawRing;
use netft_core::viz::VizBuffer;
use netft_core::CalibrationInfo;
use netft_proto::rdt::RdtClient;
use netft_sim::{SimConfig, SignalMode, Simulator};
use netft_traits::{Clock, MonotonicClock};

fn wait_until(deadline_ms: u64, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if probe() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn loopback_stream_converts_every_sample() {
    // S1: constant counts through the full acquisition + conversion path.
    let sim = Simulator::start(SimConfig {
        signal: SignalMode::Constant([1000, -1000, 5000, 100, -100, 50]),
        frame_limit: Some(10_000),
        sample_rate_hz: 5000, // loopback can sustain it; shortens the test
        ..SimConfig::default()
    })
    .unwrap();

    let clock = MonotonicClock::new();
    let epoch = clock.now();
    let ring = Arc::new(RawRing::new(60_000).unwrap());
    let viz = Arc::new(VizBuffer::new());
    let calibration = CalibrationInfo::new(1_000_000.0, 1_000_000.0).unwrap();

    let processing = ProcessingStage::spawn(
        Arc::clone(&ring),
        Arc::clone(&viz),
        calibration,
        FilterCfg::default(),
        5000,
        SoftZero::new(),
        clock,
    )
    .unwrap();

    let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(100)).unwrap();
    let receiver = Receiver::spawn(client, Arc::clone(&ring), ReceiverCfg::default(), clock, epoch)
        .unwrap();

    assert!(
        wait_until(10_000, || receiver.stats().packets_received >= 10_000),
        "did not receive 10000 datagrams; got {}",
        receiver.stats().packets_received
    );
    assert!(wait_until(2_000, || processing.stats().samples_processed >= 10_000));

    let recv_stats = receiver.stop(Duration::from_secs(2)).unwrap();
    assert_eq!(recv_stats.packets_received, 10_000);
    assert_eq!(recv_stats.packets_lost, 0, "contiguous stream must report no loss");
    assert_eq!(recv_stats.codec_errors, 0);

    // Ring holds all 10000 samples in reception order with monotonic sequences.
    let all = ring.latest(60_000);
    assert_eq!(all.len(), 10_000);
    assert_eq!(all.first().unwrap().rdt_sequence, 1);
    assert_eq!(all.last().unwrap().rdt_sequence, 10_000);
    assert!(all.windows(2).all(|w| w[1].rdt_sequence == w[0].rdt_sequence + 1));

    // Every converted value matches counts / cpf exactly.
    let series = viz.get_series(Duration::from_secs(3600), &[0, 1, 2, 3, 4, 5], usize::MAX);
    let expected = [0.001f32, -0.001, 0.005, 0.0001, -0.0001, 0.00005];
    for ch in &series.channels {
        assert!(!ch.min.is_empty());
        for (v, w) in ch.min.iter().zip(&ch.max) {
            assert_eq!(v, w);
            assert!((v - expected[ch.channel]).abs() <= f32::EPSILON);
        }
    }

    processing.stop(Duration::from_secs(2)).unwrap();
    sim.stop();
}

#[test]
fn sequence_gaps_count_as_lost_packets() {
    // S2: sequences {1,2,3,7,8} on the wire.
    let sim = Simulator::start(SimConfig {
        signal: SignalMode::Constant([0; 6]),
        drop_sequences: vec![4, 5, 6],
        frame_limit: Some(8),
        ..SimConfig::default()
    })
    .unwrap();

    let clock = MonotonicClock::new();
    let ring = Arc::new(RawRing::new(1024).unwrap());
    let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(100)).unwrap();
    let receiver =
        Receiver::spawn(client, Arc::clone(&ring), ReceiverCfg::default(), clock, clock.now())
            .unwrap();

    assert!(wait_until(5_000, || receiver.stats().packets_received >= 5));
    let stats = receiver.stop(Duration::from_secs(2)).unwrap();
    assert_eq!(stats.packets_received, 5);
    assert_eq!(stats.packets_lost, 3);

    let seqs: Vec<u32> = ring.latest(10).iter().map(|r| r.rdt_sequence).collect();
    assert_eq!(seqs, vec![1, 2, 3, 7, 8]);
    sim.stop();
}

#[test]
fn decimation_stores_every_nth_but_counts_all() {
    let sim = Simulator::start(SimConfig {
        signal: SignalMode::Constant([1; 6]),
        frame_limit: Some(100),
        sample_rate_hz: 2000,
        ..SimConfig::default()
    })
    .unwrap();

    let clock = MonotonicClock::new();
    let ring = Arc::new(RawRing::new(1024).unwrap());
    let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(100)).unwrap();
    let receiver = Receiver::spawn(
        client,
        Arc::clone(&ring),
        ReceiverCfg {
            decimation_factor: 10,
            ..ReceiverCfg::default()
        },
        clock,
        clock.now(),
    )
    .unwrap();

    assert!(wait_until(5_000, || receiver.stats().packets_received >= 100));
    let stats = receiver.stop(Duration::from_secs(2)).unwrap();
    assert_eq!(stats.packets_received, 100, "statistics count every datagram");
    assert_eq!(ring.stats().total_written, 10, "storage keeps every 10th");

    // The kept samples are the 10th, 20th, ... on the wire.
    let seqs: Vec<u32> = ring.latest(100).iter().map(|r| r.rdt_sequence).collect();
    assert_eq!(seqs, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    sim.stop();
}

#[test]
fn malformed_datagrams_are_counted_and_skipped() {
    // Hand-deliver a runt datagram between valid frames.
    let sim = Simulator::start(SimConfig {
        signal: SignalMode::Constant([7; 6]),
        frame_limit: Some(20),
        ..SimConfig::default()
    })
    .unwrap();

    let clock = MonotonicClock::new();
    let ring = Arc::new(RawRing::new(1024).unwrap());
    let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(100)).unwrap();
    let local = client.local_addr().unwrap();
    let receiver =
        Receiver::spawn(client, Arc::clone(&ring), ReceiverCfg::default(), clock, clock.now())
            .unwrap();

    // Inject garbage straight at the receiver's socket.
    let rogue = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    rogue.send_to(&[0u8; 12], ("127.0.0.1", local.port())).unwrap();
    rogue.send_to(&[0u8; 40], ("127.0.0.1", local.port())).unwrap();

    assert!(wait_until(5_000, || {
        let s = receiver.stats();
        s.packets_received >= 20 && s.codec_errors >= 2
    }));
    let stats = receiver.stop(Duration::from_secs(2)).unwrap();
    assert_eq!(stats.codec_errors, 2);
    assert_eq!(stats.packets_received, 20, "valid datagrams keep flowing");
    sim.stop();
}

#[test]
fn processing_applies_lowpass_without_transient() {
    let sim = Simulator::start(SimConfig {
        signal: SignalMode::Constant([500_000, 0, 0, 0, 0, 0]),
        frame_limit: Some(500),
        sample_rate_hz: 2000,
        ..SimConfig::default()
    })
    .unwrap();

    let clock = MonotonicClock::new();
    let ring = Arc::new(RawRing::new(4096).unwrap());
    let viz = Arc::new(VizBuffer::new());
    let calibration = CalibrationInfo::new(1_000_000.0, 1_000_000.0).unwrap();
    let processing = ProcessingStage::spawn(
        Arc::clone(&ring),
        Arc::clone(&viz),
        calibration,
        FilterCfg {
            enabled: true,
            cutoff_hz: 10.0,
        },
        2000,
        SoftZero::new(),
        clock,
    )
    .unwrap();
    let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(100)).unwrap();
    let receiver =
        Receiver::spawn(client, Arc::clone(&ring), ReceiverCfg::default(), clock, clock.now())
            .unwrap();

    assert!(wait_until(5_000, || processing.stats().samples_processed >= 500));
    receiver.stop(Duration::from_secs(2)).unwrap();
    processing.stop(Duration::from_secs(2)).unwrap();

    // DC input through a primed filter stays at the DC level throughout.
    let series = viz.get_series(Duration::from_secs(3600), &[0], usize::MAX);
    let ch = &series.channels[0];
    assert!(!ch.min.is_empty());
    for v in &ch.min {
        assert!((v - 0.5).abs() < 1e-4, "transient leaked: {v}");
    }
    sim.stop();
}
