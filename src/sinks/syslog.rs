//! Host system log sink
//!
//! Sends RFC 3164 datagrams either to the local syslog socket (`/dev/log`)
//! or over UDP to a syslog daemon.

use crate::core::{LogError, LogEvent, LogSink, Result, Severity};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

/// Largest datagram sent; longer messages are cut at a char boundary
const MAX_DATAGRAM_LEN: usize = 8 * 1024;

/// Syslog facility (RFC 5424)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyslogFacility {
    Kern,
    #[default]
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Cron,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl SyslogFacility {
    pub fn code(&self) -> u8 {
        match self {
            Self::Kern => 0,
            Self::User => 1,
            Self::Mail => 2,
            Self::Daemon => 3,
            Self::Auth => 4,
            Self::Syslog => 5,
            Self::Lpr => 6,
            Self::News => 7,
            Self::Uucp => 8,
            Self::Cron => 9,
            Self::Local0 => 16,
            Self::Local1 => 17,
            Self::Local2 => 18,
            Self::Local3 => 19,
            Self::Local4 => 20,
            Self::Local5 => 21,
            Self::Local6 => 22,
            Self::Local7 => 23,
        }
    }
}

/// Syslog severity code for an event severity
pub fn syslog_severity(severity: Severity) -> u8 {
    match severity {
        Severity::Error => 3,
        Severity::Warn => 4,
        Severity::Info => 6,
        Severity::Debug | Severity::Verbose => 7,
    }
}

/// Where datagrams go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyslogTransport {
    #[cfg(unix)]
    Unix(PathBuf),
    Udp(SocketAddr),
}

enum Socket {
    #[cfg(unix)]
    Unix(UnixDatagram),
    Udp(UdpSocket),
}

/// # Example
///
/// ```no_run
/// use rust_log_dispatcher::prelude::*;
/// use rust_log_dispatcher::sinks::{SyslogFacility, SystemLogSink};
///
/// let sink = SystemLogSink::local()
///     .with_facility(SyslogFacility::Local3)
///     .with_identity("myapp");
///
/// let dispatcher = Dispatcher::new().unwrap();
/// dispatcher.register_sink(sink, Severity::Warn, MessageFormatter).unwrap();
/// ```
pub struct SystemLogSink {
    name: String,
    transport: SyslogTransport,
    facility: SyslogFacility,
    identity: String,
    hostname: Option<String>,
    pid: u32,
    socket: Option<Socket>,
}

impl SystemLogSink {
    /// Local syslog socket at `/dev/log`
    #[cfg(unix)]
    pub fn local() -> Self {
        Self::unix_socket("/dev/log")
    }

    #[cfg(unix)]
    pub fn unix_socket(path: impl Into<PathBuf>) -> Self {
        Self::with_transport(SyslogTransport::Unix(path.into()))
    }

    /// Syslog daemon reachable over UDP
    pub fn udp(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| LogError::config("SystemLogSink", format!("cannot resolve address: {}", e)))?
            .next()
            .ok_or_else(|| LogError::config("SystemLogSink", "address resolved to nothing"))?;
        Ok(Self::with_transport(SyslogTransport::Udp(addr)))
    }

    pub fn with_transport(transport: SyslogTransport) -> Self {
        Self {
            name: "syslog".to_string(),
            transport,
            facility: SyslogFacility::default(),
            identity: default_identity(),
            hostname: None,
            pid: std::process::id(),
            socket: None,
        }
    }

    /// Rename the sink, needed when one dispatcher feeds several daemons
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_facility(mut self, facility: SyslogFacility) -> Self {
        self.facility = facility;
        self
    }

    /// Tag placed before the pid, usually the program name
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Include a HOSTNAME field; remote daemons generally want one
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn transport(&self) -> &SyslogTransport {
        &self.transport
    }

    pub fn facility(&self) -> SyslogFacility {
        self.facility
    }

    pub fn priority(&self, severity: Severity) -> u8 {
        self.facility.code() * 8 + syslog_severity(severity)
    }

    /// `<PRI>Mmm dd hh:mm:ss [HOSTNAME ]TAG[PID]: MSG`
    pub fn format_datagram(&self, event: &LogEvent, formatted: &str) -> String {
        let local: DateTime<Local> = DateTime::from(*event.timestamp());
        let mut datagram = format!("<{}>{} ", self.priority(event.severity()), local.format("%b %e %H:%M:%S"));
        if let Some(hostname) = &self.hostname {
            datagram.push_str(hostname);
            datagram.push(' ');
        }
        datagram.push_str(&format!("{}[{}]: {}", self.identity, self.pid, formatted));

        if datagram.len() > MAX_DATAGRAM_LEN {
            let mut cut = MAX_DATAGRAM_LEN;
            while !datagram.is_char_boundary(cut) {
                cut -= 1;
            }
            datagram.truncate(cut);
        }
        datagram
    }

    fn connect(&self) -> std::io::Result<Socket> {
        match &self.transport {
            #[cfg(unix)]
            SyslogTransport::Unix(path) => {
                let socket = UnixDatagram::unbound()?;
                socket.connect(path)?;
                Ok(Socket::Unix(socket))
            }
            SyslogTransport::Udp(addr) => {
                let bind = if addr.is_ipv4() {
                    SocketAddr::from(([0u8; 4], 0))
                } else {
                    SocketAddr::from(([0u16; 8], 0))
                };
                let socket = UdpSocket::bind(bind)?;
                socket.connect(addr)?;
                Ok(Socket::Udp(socket))
            }
        }
    }
}

fn default_identity() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "app".to_string())
}

impl LogSink for SystemLogSink {
    fn deliver(&mut self, event: &LogEvent, formatted: &str) -> Result<()> {
        let datagram = self.format_datagram(event, formatted);

        if self.socket.is_none() {
            let socket = self
                .connect()
                .map_err(|e| LogError::delivery(self.name.clone(), format!("cannot connect: {}", e)))?;
            self.socket = Some(socket);
        }

        let sent = match self.socket.as_ref() {
            #[cfg(unix)]
            Some(Socket::Unix(socket)) => socket.send(datagram.as_bytes()),
            Some(Socket::Udp(socket)) => socket.send(datagram.as_bytes()),
            None => return Ok(()),
        };

        if let Err(e) = sent {
            // Reconnect on the next event
            self.socket = None;
            return Err(LogError::delivery(self.name.clone(), format!("send failed: {}", e)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
