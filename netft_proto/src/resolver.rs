//! Calibration resolution with HTTP-then-TCP fallback and caching.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[cfg(test)]
use crate::error::ProtoError;
use crate::error::Result;
use crate::http;
use crate::model::CalibrationInfo;
use crate::tcp::TcpCommandClient;

/// Which interface produced a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationSource {
    Http,
    Tcp,
}

/// Outcome of a resolve: the calibration plus where it came from and the
/// HTTP failure, if the HTTP path was tried and lost.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub calibration: CalibrationInfo,
    pub source: CalibrationSource,
    pub http_error: Option<String>,
}

/// Resolves calibration for sensor endpoints, caching per endpoint IP.
///
/// The HTTP path is preferred because it carries identity fields the TCP
/// reply lacks. Any HTTP failure category (connect refused, timeout, bad
/// status, parse failure, missing field) falls back to TCP READCALINFO.
#[derive(Debug)]
pub struct CalibrationResolver {
    http_port: u16,
    tcp_port: u16,
    timeout: Duration,
    cache: HashMap<IpAddr, CalibrationInfo>,
}

impl CalibrationResolver {
    pub fn new(http_port: u16, tcp_port: u16, timeout: Duration) -> Self {
        Self {
            http_port,
            tcp_port,
            timeout,
            cache: HashMap::new(),
        }
    }

    /// Resolve calibration for `ip`, consulting the cache first.
    pub fn resolve(&mut self, ip: IpAddr) -> Result<Resolved> {
        if let Some(cached) = self.cache.get(&ip) {
            tracing::debug!(%ip, "calibration cache hit");
            return Ok(Resolved {
                calibration: cached.clone(),
                source: CalibrationSource::Http,
                http_error: None,
            });
        }
        let resolved = self.resolve_uncached(ip)?;
        self.cache.insert(ip, resolved.calibration.clone());
        Ok(resolved)
    }

    /// Drop any cached calibration for `ip`, forcing the next resolve to hit
    /// the device. Used on reconnect and on explicit refresh.
    pub fn invalidate(&mut self, ip: IpAddr) {
        self.cache.remove(&ip);
    }

    fn resolve_uncached(&self, ip: IpAddr) -> Result<Resolved> {
        let http_addr = SocketAddr::new(ip, self.http_port);
        let http_error = match http::fetch_calibration(http_addr, self.timeout) {
            Ok(cal) => {
                tracing::info!(%ip, cpf = cal.counts_per_force, cpt = cal.counts_per_torque,
                    "calibration via http");
                return Ok(Resolved {
                    calibration: cal,
                    source: CalibrationSource::Http,
                    http_error: None,
                });
            }
            Err(e) => {
                tracing::warn!(%ip, error = %e, "http calibration failed, trying tcp");
                e.to_string()
            }
        };

        let tcp_addr = SocketAddr::new(ip, self.tcp_port);
        let mut client = TcpCommandClient::connect(tcp_addr, self.timeout)?;
        match client.read_calibration() {
            Ok(cal) => {
                tracing::info!(%ip, cpf = cal.counts_per_force, cpt = cal.counts_per_torque,
                    "calibration via tcp fallback");
                Ok(Resolved {
                    calibration: cal,
                    source: CalibrationSource::Tcp,
                    http_error: Some(http_error),
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for CalibrationResolver {
    fn default() -> Self {
        Self::new(http::HTTP_PORT, crate::tcp::TCP_PORT, Duration::from_secs(2))
    }
}
