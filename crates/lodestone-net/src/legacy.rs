//! Pre-handshake legacy status probe.
//!
//! Very old clients open with a single `0xFE` byte (optionally followed by
//! `0x01` and more) instead of a framed handshake. They are answered with a
//! `0xFF` kick packet carrying a UTF-16BE status string, and the socket is
//! closed without ever entering the phase machine.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::status::ServerStatus;

/// First byte of a legacy status probe.
pub const LEGACY_PROBE: u8 = 0xFE;

/// Second byte of a 1.4+ style probe.
pub const LEGACY_PROBE_V1: u8 = 0x01;

/// Packet id of the legacy kick response.
pub const LEGACY_KICK: u8 = 0xFF;

/// Which flavour of probe was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyProbe {
    /// A bare `0xFE`: answered with `motd§online§max`.
    Beta,
    /// `0xFE 0x01`: answered with the `§1`-prefixed null-separated form.
    V1,
}

impl LegacyProbe {
    /// Classify the first bytes of a connection. `None` for normal traffic.
    pub fn detect(prefix: &[u8]) -> Option<Self> {
        match prefix {
            [LEGACY_PROBE, LEGACY_PROBE_V1, ..] => Some(LegacyProbe::V1),
            [LEGACY_PROBE, ..] => Some(LegacyProbe::Beta),
            _ => None,
        }
    }
}

/// The plain-text status string for a probe.
pub fn legacy_status_text(status: &ServerStatus, probe: LegacyProbe) -> String {
    match probe {
        LegacyProbe::Beta => {
            let motd: String = status
                .description
                .text
                .chars()
                .filter(|c| *c != '§')
                .collect();
            format!(
                "{motd}§{}§{}",
                status.players.online, status.players.max
            )
        }
        LegacyProbe::V1 => format!(
            "§1\0{}\0{}\0{}\0{}\0{}",
            status.version.protocol,
            status.version.name,
            status.description.text,
            status.players.online,
            status.players.max
        ),
    }
}

/// Encode the kick packet: `0xFF`, UTF-16 length as u16 BE, UTF-16BE text.
pub fn encode_legacy_response(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = u16::try_from(units.len()).unwrap_or(u16::MAX);
    let mut out = Vec::with_capacity(3 + units.len() * 2);
    out.push(LEGACY_KICK);
    out.extend_from_slice(&len.to_be_bytes());
    for unit in units.iter().take(usize::from(len)) {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Write the response for `probe` and shut the writer down.
pub async fn respond<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: &ServerStatus,
    probe: LegacyProbe,
) -> std::io::Result<()> {
    let response = encode_legacy_response(&legacy_status_text(status, probe));
    writer.write_all(&response).await?;
    writer.flush().await?;
    writer.shutdown().await
}
