//! Endpoint addresses returned by the directory server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Address field as the server sends it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpField {
    /// IPv4 packed into an integer, least significant byte first
    Packed(u32),
    /// Already in dotted form
    Dotted(String),
}

impl IpField {
    /// Dotted-quad text. Packed values are read low byte first; text passes
    /// through unchanged.
    pub fn into_dotted(self) -> String {
        match self {
            IpField::Packed(raw) => packed_ipv4(raw).to_string(),
            IpField::Dotted(text) => text,
        }
    }
}

impl From<u32> for IpField {
    fn from(raw: u32) -> Self {
        IpField::Packed(raw)
    }
}

impl From<String> for IpField {
    fn from(text: String) -> Self {
        IpField::Dotted(text)
    }
}

impl From<&str> for IpField {
    fn from(text: &str) -> Self {
        IpField::Dotted(text.to_string())
    }
}

/// Unpack an IPv4 address whose first octet is in bits 0-7
pub fn packed_ipv4(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(raw.to_le_bytes())
}

/// Transfer server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Dotted-quad address
    pub address: String,
    /// TCP port
    pub port: u16,
}

impl ServerEntry {
    /// Create an entry
    pub fn new(address: impl Into<IpField>, port: u16) -> Self {
        Self {
            address: address.into().into_dotted(),
            port,
        }
    }

    /// Socket address, if the address is a valid IPv4 literal
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip: Ipv4Addr = self.address.parse().ok()?;
        Some(SocketAddr::V4(SocketAddrV4::new(ip, self.port)))
    }
}

impl fmt::Display for ServerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
