//! Simulated ATI NETrs sensor for tests and demos.
//!
//! Implements the three device interfaces over loopback:
//! - UDP: answers start/stop/bias requests and streams 36-byte RDT frames at
//!   the configured rate with wrapping sequence numbers
//! - TCP: READCALINFO (24-byte reply), WRITETRANSFORM, READFT bias
//! - HTTP: the calibration XML document (status configurable so fallback
//!   paths can be exercised)
//!
//! All listeners bind ephemeral ports by default; tests read the bound
//! addresses from the running simulator. Sequence numbers restart from the
//! configured origin on every start request, which makes loss scenarios
//! reproducible.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use netft_proto::rdt;
use netft_proto::tcp as tcpproto;

/// What the simulated transducer measures.
#[derive(Debug, Clone)]
pub enum SignalMode {
    /// Every frame carries exactly these counts. Deterministic tests.
    Constant([i32; 6]),
    /// Six phase-offset sinusoids around zero, amplitude in counts.
    Sine { amplitude: f64, frequency_hz: f64 },
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Bind address for all three listeners; port 0 picks ephemeral ports.
    pub udp_port: u16,
    pub tcp_port: u16,
    pub http_port: u16,
    pub sample_rate_hz: u32,
    pub counts_per_force: u32,
    pub counts_per_torque: u32,
    pub serial: String,
    pub firmware: String,
    pub signal: SignalMode,
    /// First rdt_sequence of each streaming session.
    pub sequence_origin: u32,
    /// Drop (never send) frames whose sequence number is in this list.
    pub drop_sequences: Vec<u32>,
    /// Stop streaming after this many frames (None = until stop request).
    pub frame_limit: Option<u64>,
    /// HTTP status for the calibration endpoint; anything but 200 forces the
    /// TCP fallback in clients.
    pub http_status: u16,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            udp_port: 0,
            tcp_port: 0,
            http_port: 0,
            sample_rate_hz: 1000,
            counts_per_force: 1_000_000,
            counts_per_torque: 1_000_000,
            serial: "SIM-001".into(),
            firmware: "1.0.0".into(),
            signal: SignalMode::Sine {
                amplitude: 100_000.0,
                frequency_hz: 1.0,
            },
            sequence_origin: 1,
            drop_sequences: Vec::new(),
            frame_limit: None,
            http_status: 200,
        }
    }
}

struct SimState {
    running: AtomicBool,
    streaming: AtomicBool,
    frames_sent: AtomicU64,
    client: Mutex<Option<SocketAddr>>,
    bias_offset: Mutex<[i32; 6]>,
    transforms_received: AtomicU64,
}

/// Running simulator; stops on [`Simulator::stop`] or drop.
pub struct Simulator {
    config: SimConfig,
    state: Arc<SimState>,
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    http_addr: SocketAddr,
    threads: Vec<JoinHandle<()>>,
}

impl Simulator {
    pub fn start(config: SimConfig) -> std::io::Result<Self> {
        let state = Arc::new(SimState {
            running: AtomicBool::new(true),
            streaming: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
            client: Mutex::new(None),
            bias_offset: Mutex::new([0; 6]),
            transforms_received: AtomicU64::new(0),
        });

        let udp = UdpSocket::bind(("127.0.0.1", config.udp_port))?;
        udp.set_read_timeout(Some(Duration::from_millis(100)))?;
        let udp_addr = udp.local_addr()?;

        let tcp = TcpListener::bind(("127.0.0.1", config.tcp_port))?;
        tcp.set_nonblocking(true)?;
        let tcp_addr = tcp.local_addr()?;

        let http = TcpListener::bind(("127.0.0.1", config.http_port))?;
        http.set_nonblocking(true)?;
        let http_addr = http.local_addr()?;

        let mut threads = Vec::new();
        threads.push(spawn_udp(udp, Arc::clone(&state), config.clone()));
        threads.push(spawn_tcp(tcp, Arc::clone(&state), config.clone()));
        threads.push(spawn_http(http, Arc::clone(&state), config.clone()));

        tracing::debug!(%udp_addr, %tcp_addr, %http_addr, "simulator started");
        Ok(Self {
            config,
            state,
            udp_addr,
            tcp_addr,
            http_addr,
            threads,
        })
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn frames_sent(&self) -> u64 {
        self.state.frames_sent.load(Ordering::Relaxed)
    }

    pub fn transforms_received(&self) -> u64 {
        self.state.transforms_received.load(Ordering::Relaxed)
    }

    pub fn is_streaming(&self) -> bool {
        self.state.streaming.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.state.running.store(false, Ordering::Relaxed);
        self.state.streaming.store(false, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn generate_counts(config: &SimConfig, state: &SimState, elapsed: Duration) -> [i32; 6] {
    let bias = state
        .bias_offset
        .lock()
        .map(|g| *g)
        .unwrap_or([0; 6]);
    let mut counts = match &config.signal {
        SignalMode::Constant(c) => *c,
        SignalMode::Sine {
            amplitude,
            frequency_hz,
        } => {
            let t = elapsed.as_secs_f64();
            let mut out = [0i32; 6];
            for (ch, slot) in out.iter_mut().enumerate() {
                let phase = ch as f64 * std::f64::consts::PI / 3.0;
                let v = amplitude
                    * (2.0 * std::f64::consts::PI * frequency_hz * t + phase).sin();
                *slot = v as i32;
            }
            out
        }
    };
    for (c, b) in counts.iter_mut().zip(bias) {
        *c = c.saturating_sub(b);
    }
    counts
}

fn encode_frame(sequence: u32, ft_sequence: u32, counts: &[i32; 6]) -> [u8; rdt::RESPONSE_LEN] {
    let mut frame = [0u8; rdt::RESPONSE_LEN];
    frame[0..4].copy_from_slice(&sequence.to_be_bytes());
    frame[4..8].copy_from_slice(&ft_sequence.to_be_bytes());
    frame[8..12].copy_from_slice(&0u32.to_be_bytes());
    for (i, c) in counts.iter().enumerate() {
        frame[12 + i * 4..16 + i * 4].copy_from_slice(&c.to_be_bytes());
    }
    frame
}

fn spawn_udp(socket: UdpSocket, state: Arc<SimState>, config: SimConfig) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let started = Instant::now();
        let period = Duration::from_secs_f64(1.0 / f64::from(config.sample_rate_hz.max(1)));
        let mut sequence = config.sequence_origin;
        let mut ft_sequence = 0u32;
        let mut session_frames = 0u64;
        let mut next_send = Instant::now();
        let mut buf = [0u8; 64];

        while state.running.load(Ordering::Relaxed) {
            // Streaming has priority; poll the request socket in between.
            if state.streaming.load(Ordering::Relaxed) {
                let client = state.client.lock().map(|g| *g).unwrap_or(None);
                if let Some(client) = client {
                    let now = Instant::now();
                    if now >= next_send {
                        if !config.drop_sequences.contains(&sequence) {
                            let counts = generate_counts(&config, &state, started.elapsed());
                            let frame = encode_frame(sequence, ft_sequence, &counts);
                            let _ = socket.send_to(&frame, client);
                            state.frames_sent.fetch_add(1, Ordering::Relaxed);
                        }
                        sequence = sequence.wrapping_add(1);
                        ft_sequence = ft_sequence.wrapping_add(1);
                        session_frames += 1;
                        if let Some(limit) = config.frame_limit {
                            if session_frames >= limit {
                                state.streaming.store(false, Ordering::Relaxed);
                            }
                        }
                        next_send += period;
                        if next_send < now {
                            next_send = now + period;
                        }
                    } else {
                        std::thread::sleep((next_send - now).min(Duration::from_millis(1)));
                    }
                }
                // Check for control datagrams without blocking the stream.
                let _ = socket.set_read_timeout(Some(Duration::from_micros(10)));
            } else {
                let _ = socket.set_read_timeout(Some(Duration::from_millis(50)));
            }

            match socket.recv_from(&mut buf) {
                Ok((n, from)) if n == rdt::REQUEST_LEN => {
                    let header = u16::from_be_bytes([buf[0], buf[1]]);
                    if header != rdt::RDT_HEADER {
                        continue;
                    }
                    let command = u16::from_be_bytes([buf[2], buf[3]]);
                    match command {
                        c if c == rdt::RdtCommand::StartStreaming as u16 => {
                            if let Ok(mut client) = state.client.lock() {
                                *client = Some(from);
                            }
                            sequence = config.sequence_origin;
                            ft_sequence = 0;
                            session_frames = 0;
                            next_send = Instant::now();
                            state.streaming.store(true, Ordering::Relaxed);
                        }
                        c if c == rdt::RdtCommand::Stop as u16 => {
                            state.streaming.store(false, Ordering::Relaxed);
                        }
                        c if c == rdt::RdtCommand::SetBias as u16 => {
                            let counts = generate_counts(&config, &state, started.elapsed());
                            let current = {
                                let bias = state.bias_offset.lock().map(|g| *g).unwrap_or([0; 6]);
                                let mut raw = counts;
                                for (r, b) in raw.iter_mut().zip(bias) {
                                    *r = r.saturating_add(b);
                                }
                                raw
                            };
                            if let Ok(mut bias) = state.bias_offset.lock() {
                                *bias = current;
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    })
}

fn spawn_tcp(listener: TcpListener, state: Arc<SimState>, config: SimConfig) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while state.running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));
                    let mut request = [0u8; tcpproto::REQUEST_LEN];
                    if stream.read_exact(&mut request).is_err() {
                        continue;
                    }
                    match request[0] {
                        c if c == tcpproto::TcpCommand::ReadCalInfo as u8 => {
                            let mut response = Vec::with_capacity(tcpproto::CALINFO_RESPONSE_LEN);
                            response.extend_from_slice(&tcpproto::RESPONSE_HEADER.to_be_bytes());
                            response.push(2); // N
                            response.push(3); // N-m
                            response.extend_from_slice(&config.counts_per_force.to_be_bytes());
                            response.extend_from_slice(&config.counts_per_torque.to_be_bytes());
                            for _ in 0..6 {
                                response.extend_from_slice(&1u16.to_be_bytes());
                            }
                            let _ = stream.write_all(&response);
                        }
                        c if c == tcpproto::TcpCommand::ReadFt as u8 => {
                            let sys_commands = u16::from_be_bytes([request[18], request[19]]);
                            if sys_commands & 0x0001 != 0 {
                                if let Ok(mut bias) = state.bias_offset.lock() {
                                    *bias = match &config.signal {
                                        SignalMode::Constant(c) => *c,
                                        SignalMode::Sine { .. } => [0; 6],
                                    };
                                }
                            }
                        }
                        c if c == tcpproto::TcpCommand::WriteTransform as u8 => {
                            state.transforms_received.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {}
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(_) => break,
            }
        }
    })
}

fn calibration_xml(config: &SimConfig) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<netftapi2>\n    \
         <cfgcpf>{}</cfgcpf>\n    <cfgcpt>{}</cfgcpt>\n    <cfgfu>2</cfgfu>\n    \
         <cfgtu>3</cfgtu>\n    <setserial>{}</setserial>\n    <setfwver>{}</setfwver>\n\
         </netftapi2>",
        config.counts_per_force, config.counts_per_torque, config.serial, config.firmware
    )
}

fn spawn_http(listener: TcpListener, state: Arc<SimState>, config: SimConfig) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while state.running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let response = if config.http_status == 200 {
                        let body = calibration_xml(&config);
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/xml\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        format!(
                            "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            config.http_status
                        )
                    };
                    let _ = stream.write_all(response.as_bytes());
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use netft_proto::rdt::RdtClient;
    use netft_proto::tcp::TcpCommandClient;

    #[test]
    fn streams_constant_counts_on_request() {
        let sim = Simulator::start(SimConfig {
            signal: SignalMode::Constant([1000, -1000, 5000, 100, -100, 50]),
            frame_limit: Some(50),
            ..SimConfig::default()
        })
        .unwrap();

        let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(200)).unwrap();
        client.start_streaming().unwrap();

        let mut frames = Vec::new();
        while frames.len() < 50 {
            match client.recv_frame().unwrap() {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[0].rdt_sequence, 1);
        assert_eq!(frames[49].rdt_sequence, 50);
        assert!(frames
            .iter()
            .all(|f| f.counts == [1000, -1000, 5000, 100, -100, 50]));
        sim.stop();
    }

    #[test]
    fn dropped_sequences_are_skipped_not_renumbered() {
        let sim = Simulator::start(SimConfig {
            signal: SignalMode::Constant([0; 6]),
            drop_sequences: vec![4, 5, 6],
            frame_limit: Some(8),
            ..SimConfig::default()
        })
        .unwrap();

        let client = RdtClient::connect(sim.udp_addr(), Duration::from_millis(200)).unwrap();
        client.start_streaming().unwrap();

        let mut seqs = Vec::new();
        loop {
            match client.recv_frame().unwrap() {
                Some(frame) => seqs.push(frame.rdt_sequence),
                None => break,
            }
        }
        assert_eq!(seqs, vec![1, 2, 3, 7, 8]);
        sim.stop();
    }

    #[test]
    fn tcp_calibration_reply_carries_configured_factors() {
        let sim = Simulator::start(SimConfig {
            counts_per_force: 500_000,
            counts_per_torque: 800_000,
            ..SimConfig::default()
        })
        .unwrap();
        let mut client =
            TcpCommandClient::connect(sim.tcp_addr(), Duration::from_secs(1)).unwrap();
        let cal = client.read_calibration().unwrap();
        assert_eq!(cal.counts_per_force, 500_000.0);
        assert_eq!(cal.counts_per_torque, 800_000.0);
        sim.stop();
    }

    #[test]
    fn http_endpoint_serves_calibration_xml() {
        let sim = Simulator::start(SimConfig::default()).unwrap();
        let cal =
            netft_proto::http::fetch_calibration(sim.http_addr(), Duration::from_secs(1)).unwrap();
        assert_eq!(cal.counts_per_force, 1_000_000.0);
        assert_eq!(cal.serial.as_deref(), Some("SIM-001"));
        sim.stop();
    }

    #[test]
    fn write_transform_is_accepted() {
        let sim = Simulator::start(SimConfig::default()).unwrap();
        let mut client =
            TcpCommandClient::connect(sim.tcp_addr(), Duration::from_secs(1)).unwrap();
        client
            .write_transform(&netft_proto::ToolTransform {
                dx: 1.0,
                ..Default::default()
            })
            .unwrap();
        // The write has no reply; poll the counter briefly.
        let deadline = Instant::now() + Duration::from_secs(1);
        while sim.transforms_received() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sim.transforms_received(), 1);
        sim.stop();
    }
}
