//! UDP RDT (Raw Data Transfer) streaming protocol.
//!
//! Request datagram (8 bytes, big-endian): header 0x1234, command, sample
//! count (0 = infinite). Response datagram (36 bytes): rdt_sequence,
//! ft_sequence, status as u32, then six i32 counts in the order
//! Fx, Fy, Fz, Tx, Ty, Tz.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::{ProtoError, Result};

pub const RDT_PORT: u16 = 49152;
pub const RDT_HEADER: u16 = 0x1234;
pub const REQUEST_LEN: usize = 8;
pub const RESPONSE_LEN: usize = 36;

/// RDT command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RdtCommand {
    Stop = 0x0000,
    StartStreaming = 0x0002,
    StartBuffered = 0x0003,
    SetBias = 0x0042,
}

/// Decoded fields of one 36-byte response datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdtFrame {
    pub rdt_sequence: u32,
    pub ft_sequence: u32,
    pub status: u32,
    pub counts: [i32; 6],
}

/// Encode an 8-byte request datagram.
pub fn encode_request(command: RdtCommand, sample_count: u32) -> [u8; REQUEST_LEN] {
    let mut buf = [0u8; REQUEST_LEN];
    buf[0..2].copy_from_slice(&RDT_HEADER.to_be_bytes());
    buf[2..4].copy_from_slice(&(command as u16).to_be_bytes());
    buf[4..8].copy_from_slice(&sample_count.to_be_bytes());
    buf
}

/// Decode a response datagram. Anything other than exactly 36 bytes is a
/// malformed-packet error; the caller counts and drops it.
pub fn decode_response(data: &[u8]) -> Result<RdtFrame> {
    if data.len() != RESPONSE_LEN {
        return Err(ProtoError::BadLength {
            protocol: "RDT",
            expected: RESPONSE_LEN,
            actual: data.len(),
        });
    }
    let u32_at = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
    let i32_at = |i: usize| i32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
    Ok(RdtFrame {
        rdt_sequence: u32_at(0),
        ft_sequence: u32_at(4),
        status: u32_at(8),
        counts: [
            i32_at(12),
            i32_at(16),
            i32_at(20),
            i32_at(24),
            i32_at(28),
            i32_at(32),
        ],
    })
}

/// UDP client for the RDT stream.
///
/// Binds an ephemeral local port and talks to one sensor endpoint. The
/// receive timeout makes shutdown cooperative: `recv_frame` returns
/// `Ok(None)` on timeout so the owning loop can check its stop flag.
#[derive(Debug)]
pub struct RdtClient {
    socket: UdpSocket,
    sensor: SocketAddr,
}

impl RdtClient {
    pub fn connect(sensor: SocketAddr, recv_timeout: Duration) -> Result<Self> {
        let bind_addr: SocketAddr = if sensor.is_ipv4() {
            "0.0.0.0:0".parse().map_err(|_| ProtoError::Closed)?
        } else {
            "[::]:0".parse().map_err(|_| ProtoError::Closed)?
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(recv_timeout))?;
        Ok(Self { socket, sensor })
    }

    pub fn sensor_addr(&self) -> SocketAddr {
        self.sensor
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn send_command(&self, command: RdtCommand, sample_count: u32) -> Result<()> {
        let req = encode_request(command, sample_count);
        self.socket.send_to(&req, self.sensor)?;
        Ok(())
    }

    /// Request infinite real-time streaming.
    pub fn start_streaming(&self) -> Result<()> {
        tracing::debug!(sensor = %self.sensor, "rdt start streaming");
        self.send_command(RdtCommand::StartStreaming, 0)
    }

    pub fn stop_streaming(&self) -> Result<()> {
        tracing::debug!(sensor = %self.sensor, "rdt stop streaming");
        self.send_command(RdtCommand::Stop, 0)
    }

    /// Send the device bias (tare) command. No response is produced; the
    /// effect is observable only through subsequent sample values.
    pub fn send_bias(&self) -> Result<()> {
        tracing::debug!(sensor = %self.sensor, "rdt bias");
        self.send_command(RdtCommand::SetBias, 0)
    }

    /// Receive one datagram. Returns `Ok(None)` when the receive timeout
    /// elapses, a decoded frame on success, and a typed error for malformed
    /// datagrams or socket failures. Datagrams from other source ports on the
    /// bound socket are still decoded; the sensor may reply from any port.
    pub fn recv_frame(&self) -> Result<Option<RdtFrame>> {
        let mut buf = [0u8; 64];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _src)) => decode_response(&buf[..n]).map(Some),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(ProtoError::Io(e)),
        }
    }
}

/// Modular gap between a received sequence number and the expected successor.
///
/// Returns how many packets were lost between `last` and `current`
/// (0 when `current == last + 1`), treating wrap-around by taking the
/// difference modulo 2^32.
pub fn sequence_gap(last: u32, current: u32) -> u32 {
    current.wrapping_sub(last.wrapping_add(1))
}
