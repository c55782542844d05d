//! Calibration resolver behavior against live loopback listeners.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use netft_proto::resolver::{CalibrationResolver, CalibrationSource};
use netft_proto::tcp::{CALINFO_RESPONSE_LEN, REQUEST_LEN, RESPONSE_HEADER};

/// HTTP listener answering every request with the given status line.
fn spawn_http(status_line: &'static str, body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind http");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let response = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    port
}

/// TCP listener answering READCALINFO with the given scale factors.
fn spawn_calinfo_tcp(cpf: u32, cpt: u32) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind tcp");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut request = [0u8; REQUEST_LEN];
            if stream.read_exact(&mut request).is_err() {
                continue;
            }
            if request[0] != 0x01 {
                continue;
            }
            let mut response = Vec::with_capacity(CALINFO_RESPONSE_LEN);
            response.extend_from_slice(&RESPONSE_HEADER.to_be_bytes());
            response.push(2);
            response.push(3);
            response.extend_from_slice(&cpf.to_be_bytes());
            response.extend_from_slice(&cpt.to_be_bytes());
            for _ in 0..6 {
                response.extend_from_slice(&1u16.to_be_bytes());
            }
            let _ = stream.write_all(&response);
        }
    });
    port
}

#[test]
fn http_500_falls_back_to_tcp() {
    let http_port = spawn_http("HTTP/1.1 500 Internal Server Error", "boom");
    let tcp_port = spawn_calinfo_tcp(500_000, 800_000);

    let mut resolver = CalibrationResolver::new(http_port, tcp_port, Duration::from_secs(2));
    let resolved = resolver.resolve("127.0.0.1".parse().unwrap()).expect("resolve");

    assert_eq!(resolved.source, CalibrationSource::Tcp);
    assert_eq!(resolved.calibration.counts_per_force, 500_000.0);
    assert_eq!(resolved.calibration.counts_per_torque, 800_000.0);
    let http_error = resolved.http_error.expect("http failure recorded");
    assert!(http_error.contains("500"), "unexpected http error: {http_error}");
}

#[test]
fn http_success_wins_and_is_cached() {
    let body = "<netftapi2><cfgcpf>1000000</cfgcpf><cfgcpt>2000000</cfgcpt>\
                <setserial>FT0001</setserial></netftapi2>";
    let http_port = spawn_http("HTTP/1.1 200 OK", body);
    // Nothing listening on the TCP port: fallback would fail if taken.
    let mut resolver = CalibrationResolver::new(http_port, 1, Duration::from_secs(2));

    let resolved = resolver.resolve("127.0.0.1".parse().unwrap()).expect("resolve");
    assert_eq!(resolved.source, CalibrationSource::Http);
    assert_eq!(resolved.calibration.counts_per_force, 1_000_000.0);
    assert_eq!(resolved.calibration.serial.as_deref(), Some("FT0001"));
    assert!(resolved.http_error.is_none());

    // Second resolve is served from the cache.
    let again = resolver.resolve("127.0.0.1".parse().unwrap()).expect("cached");
    assert_eq!(again.calibration, resolved.calibration);
}

#[test]
fn unparseable_xml_falls_back_to_tcp() {
    let http_port = spawn_http("HTTP/1.1 200 OK", "<netftapi2><cfgcpf>oops</cfgcpf></netftapi2>");
    let tcp_port = spawn_calinfo_tcp(123_456, 654_321);

    let mut resolver = CalibrationResolver::new(http_port, tcp_port, Duration::from_secs(2));
    let resolved = resolver.resolve("127.0.0.1".parse().unwrap()).expect("resolve");
    assert_eq!(resolved.source, CalibrationSource::Tcp);
    assert_eq!(resolved.calibration.counts_per_force, 123_456.0);
}
