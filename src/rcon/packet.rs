use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type + two terminating nulls
const MIN_PACKET_SIZE: i32 = 10;
const MAX_PACKET_SIZE: i32 = 64 * 1024;

/// Source RCON packet: `size | id | type | body \0 \0`, little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = (body.len() + MIN_PACKET_SIZE as usize) as i32;
        let mut buf = Vec::with_capacity(size as usize + 4);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let size = reader.read_i32_le().await.context("RCON connection closed")?;
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            bail!("invalid RCON packet size {size}");
        }

        let mut payload = vec![0u8; size as usize];
        reader
            .read_exact(&mut payload)
            .await
            .context("truncated RCON packet")?;

        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body_bytes = &payload[8..payload.len() - 2];
        let body = String::from_utf8_lossy(body_bytes)
            .trim_end_matches('\0')
            .to_string();

        Ok(Self { id, kind, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let bytes = Packet::new(7, SERVERDATA_EXECCOMMAND, "ListPlayers").encode();
        assert_eq!(&bytes[0..4], &21i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..23], b"ListPlayers");
        assert_eq!(&bytes[23..], &[0, 0]);
    }

    #[tokio::test]
    async fn reads_consecutive_packets() {
        let mut wire = Packet::new(1, SERVERDATA_RESPONSE_VALUE, "first").encode();
        wire.extend(Packet::new(-1, SERVERDATA_AUTH_RESPONSE, "").encode());
        let mut reader = wire.as_slice();

        let first = Packet::read_from(&mut reader).await.unwrap();
        assert_eq!(first, Packet::new(1, SERVERDATA_RESPONSE_VALUE, "first"));
        let second = Packet::read_from(&mut reader).await.unwrap();
        assert_eq!(second.id, -1);
        assert_eq!(second.kind, SERVERDATA_AUTH_RESPONSE);
    }

    #[tokio::test]
    async fn rejects_bad_size() {
        let wire = 4i32.to_le_bytes();
        let mut reader = wire.as_slice();
        assert!(Packet::read_from(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn truncated_packet_is_an_error() {
        let wire = Packet::new(1, SERVERDATA_RESPONSE_VALUE, "cut").encode();
        let mut reader = &wire[..wire.len() - 3];
        assert!(Packet::read_from(&mut reader).await.is_err());
    }
}
