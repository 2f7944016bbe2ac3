//! systemd readiness notification (`sd_notify` protocol).
//!
//! Sends a datagram such as `READY=1` to the socket named by
//! `NOTIFY_SOCKET`. Without that variable every call is a no-op.

use std::ffi::OsStr;
use std::io;

const NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";

/// Send `state` to the service manager. Returns `false` when not running
/// under one.
pub fn notify(state: &str) -> io::Result<bool> {
    match std::env::var_os(NOTIFY_SOCKET) {
        Some(socket) if !socket.is_empty() => notify_to(&socket, state).map(|()| true),
        _ => Ok(false),
    }
}

#[cfg(unix)]
fn notify_to(socket: &OsStr, state: &str) -> io::Result<()> {
    use std::os::unix::{ffi::OsStrExt, net::UnixDatagram};

    let sock = UnixDatagram::unbound()?;
    let bytes = socket.as_bytes();
    if let Some(name) = bytes.strip_prefix(b"@") {
        send_abstract(&sock, name, state)
    } else {
        sock.send_to(state.as_bytes(), std::path::Path::new(socket))
            .map(|_| ())
    }
}

#[cfg(target_os = "linux")]
fn send_abstract(sock: &std::os::unix::net::UnixDatagram, name: &[u8], state: &str) -> io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let addr = SocketAddr::from_abstract_name(name)?;
    sock.send_to_addr(state.as_bytes(), &addr).map(|_| ())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn send_abstract(_sock: &std::os::unix::net::UnixDatagram, _name: &[u8], _state: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract notify sockets are linux-only",
    ))
}

#[cfg(not(unix))]
fn notify_to(_socket: &OsStr, _state: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "sd_notify requires a unix platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::net::UnixDatagram;
    use tempfile::tempdir;

    #[test]
    fn sends_state_to_path_socket() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let listener = UnixDatagram::bind(&path).unwrap();

        notify_to(path.as_os_str(), "READY=1").unwrap();

        let mut buf = [0u8; 32];
        let n = listener.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"READY=1");
    }

    #[test]
    fn missing_socket_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        assert!(notify_to(path.as_os_str(), "READY=1").is_err());
    }
}
