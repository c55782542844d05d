//! Command implementations on top of the supervisor.

use std::net::IpAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use netft_core::formats::LogFormat;
use netft_core::supervisor::{BiasMode, Supervisor, SupervisorCfg};
use netft_core::PipelineStats;

const STATS_INTERVAL: Duration = Duration::from_secs(1);

fn supervisor_for(prefs: &netft_config::Preferences) -> Supervisor {
    Supervisor::new(SupervisorCfg::from(prefs))
}

fn print_stats(stats: &PipelineStats) {
    let writer_part = match &stats.writer {
        Some(w) => format!(
            ", written {} (dropped {}), {} bytes, {} rotations",
            w.samples_written, w.samples_dropped, w.bytes_written, w.rotations
        ),
        None => String::new(),
    };
    println!(
        "rx {} lost {} ({:.1}/s), buffer {:.0}%, app-dropped {}{}",
        stats.receiver.packets_received,
        stats.receiver.packets_lost,
        stats.samples_per_second,
        stats.buffer_fill_ratio() * 100.0,
        stats.processing.dropped_input,
        writer_part
    );
}

/// Stream until `seconds` elapse (or forever) printing one stats line per
/// second.
pub fn stream(prefs: &netft_config::Preferences, ip: IpAddr, seconds: Option<u64>) -> eyre::Result<()> {
    let mut sup = supervisor_for(prefs);
    sup.connect(ip)?;
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        std::thread::sleep(STATS_INTERVAL);
        print_stats(&sup.snapshot_stats());
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
    }
    sup.disconnect()?;
    Ok(())
}

/// Stream and record for `seconds`, then report the session.
pub fn record(
    prefs: &netft_config::Preferences,
    ip: IpAddr,
    output: &Path,
    format: LogFormat,
    prefix: &str,
    seconds: u64,
) -> eyre::Result<()> {
    let mut sup = supervisor_for(prefs);
    sup.connect(ip)?;
    sup.start_recording(output, format, prefix)?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(STATS_INTERVAL.min(remaining).max(Duration::from_millis(1)));
        print_stats(&sup.snapshot_stats());
    }

    let stats = sup.stop_recording()?;
    sup.disconnect()?;
    println!(
        "recorded {} rows ({} dropped) into {} part(s)",
        stats.samples_written,
        stats.samples_dropped,
        stats.parts.len()
    );
    for part in &stats.parts {
        println!("  {}", part.display());
    }
    Ok(())
}

/// Resolve and print calibration (HTTP preferred, TCP fallback).
pub fn calibration(prefs: &netft_config::Preferences, ip: IpAddr) -> eyre::Result<()> {
    let mut resolver = netft_proto::resolver::CalibrationResolver::new(
        prefs.connection.http_port,
        prefs.connection.tcp_port,
        Duration::from_millis(prefs.connection.connect_timeout_ms.max(1)),
    );
    let resolved = resolver
        .resolve(ip)
        .map_err(|e| netft_core::NetftError::from_proto(&e, &ip.to_string(), prefs.connection.tcp_port))?;
    let cal = &resolved.calibration;
    println!("source: {:?}", resolved.source);
    println!("counts_per_force: {}", cal.counts_per_force);
    println!("counts_per_torque: {}", cal.counts_per_torque);
    if let Some(serial) = &cal.serial {
        println!("serial: {serial}");
    }
    if let Some(firmware) = &cal.firmware {
        println!("firmware: {firmware}");
    }
    if let Some(http_error) = &resolved.http_error {
        println!("note: http path failed ({http_error}); values came from tcp");
    }
    Ok(())
}

/// Apply device or soft bias, showing the newest sample before and after.
pub fn bias(prefs: &netft_config::Preferences, ip: IpAddr, soft: bool, seconds: u64) -> eyre::Result<()> {
    let mut sup = supervisor_for(prefs);
    sup.connect(ip)?;
    std::thread::sleep(Duration::from_millis(300));

    let series = sup.get_series(1.0, &[0, 1, 2], 10);
    if let Some(ch) = series.channels.first() {
        if let Some(v) = ch.max.last() {
            println!("Fx before bias: {v:.6}");
        }
    }

    let mode = if soft { BiasMode::Soft } else { BiasMode::Device };
    sup.bias(mode)?;
    std::thread::sleep(Duration::from_secs(seconds.max(1)));

    let series = sup.get_series(0.1, &[0, 1, 2], 10);
    if let Some(ch) = series.channels.first() {
        if let Some(v) = ch.max.last() {
            println!("Fx after bias: {v:.6}");
        }
    }
    sup.disconnect()?;
    Ok(())
}

/// Write a tool transform to the sensor.
pub fn transform(
    prefs: &netft_config::Preferences,
    ip: IpAddr,
    transform: netft_core::ToolTransform,
) -> eyre::Result<()> {
    let mut sup = supervisor_for(prefs);
    // No stream needed; the command channel stands alone.
    sup.connect(ip)?;
    sup.set_tool_transform(transform)?;
    sup.disconnect()?;
    println!("tool transform written");
    Ok(())
}

/// Run the loopback simulator until killed.
pub fn simulate(
    udp_port: u16,
    tcp_port: u16,
    http_port: u16,
    rate: u32,
    cpf: u32,
    cpt: u32,
) -> eyre::Result<()> {
    let sim = netft_sim::Simulator::start(netft_sim::SimConfig {
        udp_port,
        tcp_port,
        http_port,
        sample_rate_hz: rate,
        counts_per_force: cpf,
        counts_per_torque: cpt,
        ..netft_sim::SimConfig::default()
    })?;
    println!("simulator listening:");
    println!("  udp  {}", sim.udp_addr());
    println!("  tcp  {}", sim.tcp_addr());
    println!("  http {}", sim.http_addr());
    println!("press Ctrl+C to stop");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
