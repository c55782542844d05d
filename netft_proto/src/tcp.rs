//! TCP command interface: calibration read, tool transform, bias fallback.
//!
//! Requests are 20 bytes with the command code in byte 0; only READCALINFO
//! produces a response (24 bytes, header 0x1234). All values big-endian.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{ProtoError, Result};
use crate::model::{CalibrationInfo, ToolTransform};

pub const TCP_PORT: u16 = 49151;
pub const RESPONSE_HEADER: u16 = 0x1234;
pub const REQUEST_LEN: usize = 20;
pub const CALINFO_RESPONSE_LEN: usize = 24;

/// TCP command codes (byte 0 of every request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TcpCommand {
    ReadFt = 0x00,
    ReadCalInfo = 0x01,
    WriteTransform = 0x02,
}

/// Distance units code for WRITETRANSFORM (3 = millimeters).
pub const TRANSFORM_DIST_MM: u8 = 3;
/// Angle units code for WRITETRANSFORM (1 = degrees).
pub const TRANSFORM_ANGLE_DEG: u8 = 1;

/// READCALINFO request: command byte followed by 19 zero bytes.
pub fn encode_calinfo_request() -> [u8; REQUEST_LEN] {
    let mut buf = [0u8; REQUEST_LEN];
    buf[0] = TcpCommand::ReadCalInfo as u8;
    buf
}

/// Decode the 24-byte READCALINFO response:
/// u16 header, u8 force-units, u8 torque-units, u32 cpf, u32 cpt,
/// six u16 scale factors (ignored beyond validation of the frame length).
pub fn decode_calinfo_response(data: &[u8]) -> Result<CalibrationInfo> {
    if data.len() != CALINFO_RESPONSE_LEN {
        return Err(ProtoError::BadLength {
            protocol: "READCALINFO",
            expected: CALINFO_RESPONSE_LEN,
            actual: data.len(),
        });
    }
    let header = u16::from_be_bytes([data[0], data[1]]);
    if header != RESPONSE_HEADER {
        return Err(ProtoError::BadHeader {
            protocol: "READCALINFO",
            expected: RESPONSE_HEADER,
            actual: header,
        });
    }
    let force_units_code = data[2];
    let torque_units_code = data[3];
    let cpf = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let cpt = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

    let mut cal = CalibrationInfo::new(f64::from(cpf), f64::from(cpt))?;
    cal.force_units_code = Some(force_units_code);
    cal.torque_units_code = Some(torque_units_code);
    Ok(cal)
}

/// WRITETRANSFORM request: command, distance-units code, angle-units code,
/// six i16 values (value*100, big-endian), then 5 reserved zero bytes.
///
/// The angle frame beyond "degrees x100" is deliberately not interpreted
/// here; the sensor stores and applies the transform itself.
pub fn encode_transform_request(t: &ToolTransform) -> Result<[u8; REQUEST_LEN]> {
    let mut buf = [0u8; REQUEST_LEN];
    buf[0] = TcpCommand::WriteTransform as u8;
    buf[1] = TRANSFORM_DIST_MM;
    buf[2] = TRANSFORM_ANGLE_DEG;
    for (i, v) in t.as_array().iter().enumerate() {
        let scaled = (v * 100.0).round();
        if !(f64::from(i16::MIN)..=f64::from(i16::MAX)).contains(&scaled) {
            return Err(ProtoError::InvalidCalibration {
                field: "tool_transform",
                value: v.to_string(),
            });
        }
        let scaled = scaled as i16;
        buf[3 + i * 2..5 + i * 2].copy_from_slice(&scaled.to_be_bytes());
    }
    Ok(buf)
}

/// READFT request with the bias bit set: command 0x00, 15 zero bytes,
/// u16 MCEnable = 0 at offset 16, u16 sysCommands with bit 0 set at 18.
/// This is the TCP fallback for bias/tare when UDP bias is unavailable.
pub fn encode_bias_request() -> [u8; REQUEST_LEN] {
    let mut buf = [0u8; REQUEST_LEN];
    buf[0] = TcpCommand::ReadFt as u8;
    buf[16..18].copy_from_slice(&0u16.to_be_bytes());
    buf[18..20].copy_from_slice(&0x0001u16.to_be_bytes());
    buf
}

/// TCP command client with a bounded per-call timeout.
#[derive(Debug)]
pub struct TcpCommandClient {
    stream: TcpStream,
}

impl TcpCommandClient {
    pub fn connect(sensor: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&sensor, timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ProtoError::ConnectTimeout {
                    host: sensor.ip().to_string(),
                    port: sensor.port(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                ProtoError::Io(e)
            }
        })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self { stream })
    }

    fn send(&mut self, request: &[u8]) -> Result<()> {
        self.stream.write_all(request)?;
        Ok(())
    }

    fn send_receive(&mut self, request: &[u8], response_len: usize) -> Result<Vec<u8>> {
        self.send(request)?;
        let mut response = vec![0u8; response_len];
        let mut filled = 0;
        while filled < response_len {
            let n = self.stream.read(&mut response[filled..])?;
            if n == 0 {
                return Err(ProtoError::Closed);
            }
            filled += n;
        }
        Ok(response)
    }

    /// Read calibration via READCALINFO.
    pub fn read_calibration(&mut self) -> Result<CalibrationInfo> {
        let response = self.send_receive(&encode_calinfo_request(), CALINFO_RESPONSE_LEN)?;
        decode_calinfo_response(&response)
    }

    /// Write a tool transform. The sensor does not reply to this command.
    pub fn write_transform(&mut self, transform: &ToolTransform) -> Result<()> {
        let request = encode_transform_request(transform)?;
        tracing::debug!(?transform, "write tool transform");
        self.send(&request)
    }

    /// Bias fallback via READFT with the bias bit set.
    pub fn send_bias(&mut self) -> Result<()> {
        tracing::debug!("tcp bias fallback");
        self.send(&encode_bias_request())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calinfo_fixture(cpf: u32, cpt: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CALINFO_RESPONSE_LEN);
        buf.extend_from_slice(&RESPONSE_HEADER.to_be_bytes());
        buf.push(2); // N
        buf.push(3); // N-m
        buf.extend_from_slice(&cpf.to_be_bytes());
        buf.extend_from_slice(&cpt.to_be_bytes());
        for _ in 0..6 {
            buf.extend_from_slice(&1u16.to_be_bytes());
        }
        buf
    }

    #[test]
    fn calinfo_request_is_command_plus_zeros() {
        let req = encode_calinfo_request();
        assert_eq!(req.len(), 20);
        assert_eq!(req[0], 0x01);
        assert!(req[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn calinfo_response_parses_fields() {
        let cal = decode_calinfo_response(&calinfo_fixture(500_000, 800_000)).unwrap();
        assert_eq!(cal.counts_per_force, 500_000.0);
        assert_eq!(cal.counts_per_torque, 800_000.0);
        assert_eq!(cal.force_units_code, Some(2));
        assert_eq!(cal.torque_units_code, Some(3));
    }

    #[test]
    fn calinfo_response_rejects_bad_header() {
        let mut buf = calinfo_fixture(1, 1);
        buf[0] = 0xFF;
        assert!(matches!(
            decode_calinfo_response(&buf),
            Err(ProtoError::BadHeader { actual: 0xFF34, .. })
        ));
    }

    #[test]
    fn calinfo_response_rejects_short_frame() {
        assert!(matches!(
            decode_calinfo_response(&[0u8; 23]),
            Err(ProtoError::BadLength { actual: 23, .. })
        ));
    }

    #[test]
    fn transform_encoding_scales_by_100() {
        let t = ToolTransform {
            dx: 1.5,
            dy: -2.25,
            dz: 0.0,
            rx: 90.0,
            ry: -45.5,
            rz: 0.01,
        };
        let req = encode_transform_request(&t).unwrap();
        assert_eq!(req[0], 0x02);
        assert_eq!(req[1], TRANSFORM_DIST_MM);
        assert_eq!(req[2], TRANSFORM_ANGLE_DEG);
        let i16_at = |i: usize| i16::from_be_bytes([req[i], req[i + 1]]);
        assert_eq!(i16_at(3), 150);
        assert_eq!(i16_at(5), -225);
        assert_eq!(i16_at(7), 0);
        assert_eq!(i16_at(9), 9000);
        assert_eq!(i16_at(11), -4550);
        assert_eq!(i16_at(13), 1);
        assert!(req[15..].iter().all(|&b| b == 0));
    }

    #[test]
    fn transform_rejects_unrepresentable_values() {
        let t = ToolTransform {
            dx: 400.0, // 40000 > i16::MAX
            ..ToolTransform::default()
        };
        assert!(encode_transform_request(&t).is_err());
    }

    #[test]
    fn bias_request_sets_syscommands_bit() {
        let req = encode_bias_request();
        assert_eq!(req[0], 0x00);
        assert!(req[1..16].iter().all(|&b| b == 0));
        assert_eq!(&req[16..18], &[0x00, 0x00]); // MCEnable
        assert_eq!(&req[18..20], &[0x00, 0x01]); // sysCommands bias bit
    }
}
