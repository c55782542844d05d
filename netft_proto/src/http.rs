//! HTTP calibration retrieval.
//!
//! The sensor serves one XML document; a single GET with `Connection: close`
//! and a bounded timeout is all the protocol needs, so the request is issued
//! over a plain TCP stream rather than through an HTTP client stack.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{ProtoError, Result};
use crate::model::CalibrationInfo;

pub const HTTP_PORT: u16 = 80;
pub const CALIBRATION_PATH: &str = "/netftapi2.xml";

/// Perform a single-shot GET and return the response body.
///
/// Redirects are not followed; any status other than 200 is an error.
pub fn http_get(addr: SocketAddr, path: &str, timeout: Duration) -> Result<String> {
    let mut stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            ProtoError::ConnectTimeout {
                host: addr.ip().to_string(),
                port: addr.port(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            ProtoError::Io(e)
        }
    })?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path,
        addr.ip()
    );
    stream.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let text = String::from_utf8_lossy(&response);

    let (headers, body) = match text.split_once("\r\n\r\n") {
        Some(parts) => parts,
        None => match text.split_once("\n\n") {
            Some(parts) => parts,
            None => {
                return Err(ProtoError::Http(
                    "no header/body separator in response".into(),
                ))
            }
        },
    };

    let status_line = headers.lines().next().unwrap_or_default();
    if !status_line.contains(" 200") {
        return Err(ProtoError::Http(format!("status: {status_line}")));
    }

    Ok(body.to_string())
}

/// Return the text content of the first of `tags` present in `xml`.
fn tag_text<'a>(xml: &'a str, tags: &[&str]) -> Option<&'a str> {
    for tag in tags {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        if let Some(start) = xml.find(&open) {
            let rest = &xml[start + open.len()..];
            if let Some(end) = rest.find(&close) {
                return Some(rest[..end].trim());
            }
        }
    }
    None
}

/// Parse the calibration XML document.
///
/// Required: counts-per-force and counts-per-torque (accepted under the
/// `cfgcpf`/`countsPerForce`/`cpf` spellings and the torque analogs).
/// Optional: serial, firmware version, unit codes. Unknown fields ignored.
pub fn parse_calibration_xml(xml: &str) -> Result<CalibrationInfo> {
    let cpf_text = tag_text(xml, &["cfgcpf", "countsPerForce", "cpf"])
        .ok_or(ProtoError::MissingField("counts_per_force"))?;
    let cpt_text = tag_text(xml, &["cfgcpt", "countsPerTorque", "cpt"])
        .ok_or(ProtoError::MissingField("counts_per_torque"))?;

    let cpf: f64 = cpf_text
        .parse()
        .map_err(|_| ProtoError::InvalidCalibration {
            field: "counts_per_force",
            value: cpf_text.to_string(),
        })?;
    let cpt: f64 = cpt_text
        .parse()
        .map_err(|_| ProtoError::InvalidCalibration {
            field: "counts_per_torque",
            value: cpt_text.to_string(),
        })?;

    let mut cal = CalibrationInfo::new(cpf, cpt)?;
    cal.serial = tag_text(xml, &["setserial", "serial"]).map(str::to_string);
    cal.firmware = tag_text(xml, &["setfwver", "firmware"]).map(str::to_string);
    cal.force_units_code = tag_text(xml, &["cfgfu", "forceUnits"]).and_then(|t| t.parse().ok());
    cal.torque_units_code = tag_text(xml, &["cfgtu", "torqueUnits"]).and_then(|t| t.parse().ok());
    Ok(cal)
}

/// Fetch and parse the calibration document from `addr`.
pub fn fetch_calibration(addr: SocketAddr, timeout: Duration) -> Result<CalibrationInfo> {
    let body = http_get(addr, CALIBRATION_PATH, timeout)?;
    parse_calibration_xml(&body)
}
