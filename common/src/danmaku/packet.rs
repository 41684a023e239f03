use super::DanmakuError;
use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use std::io::{Cursor, Read};

pub const HEADER_LEN: usize = 16;
/// 压缩包里最多再套一层压缩包
const MAX_NESTING: usize = 2;

pub mod version {
    pub const JSON: u16 = 0;
    pub const INT: u16 = 1;
    pub const ZLIB: u16 = 2;
    pub const BROTLI: u16 = 3;
}

pub mod op {
    pub const HEARTBEAT: u32 = 2;
    pub const HEARTBEAT_REPLY: u32 = 3;
    pub const NOTIFICATION: u32 = 5;
    pub const AUTH: u32 = 7;
    pub const AUTH_REPLY: u32 = 8;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub version: u16,
    pub operation: u32,
    pub body: Vec<u8>,
}

/// 客户端发包统一用 version 1，sequence 1
pub fn encode(operation: u32, body: &[u8]) -> Vec<u8> {
    let total = HEADER_LEN + body.len();
    let mut buf = vec![0u8; HEADER_LEN];
    BigEndian::write_u32(&mut buf[0..4], total as u32);
    BigEndian::write_u16(&mut buf[4..6], HEADER_LEN as u16);
    BigEndian::write_u16(&mut buf[6..8], version::INT);
    BigEndian::write_u32(&mut buf[8..12], operation);
    BigEndian::write_u32(&mut buf[12..16], 1);
    buf.extend_from_slice(body);
    buf
}

#[inline]
pub fn heartbeat() -> Vec<u8> {
    encode(op::HEARTBEAT, b"[object Object]")
}

/// 解出一个 websocket 帧里的所有包，压缩包会展开成内层的包
#[inline]
pub fn decode(data: &[u8]) -> Result<Vec<Packet>, DanmakuError> {
    decode_nested(data, 0)
}

fn decode_nested(data: &[u8], depth: usize) -> Result<Vec<Packet>, DanmakuError> {
    let mut packets = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < HEADER_LEN {
            return Err(DanmakuError::Truncated(rest.len()));
        }
        let packet_len = BigEndian::read_u32(&rest[0..4]) as usize;
        let header_len = BigEndian::read_u16(&rest[4..6]) as usize;
        let version = BigEndian::read_u16(&rest[6..8]);
        let operation = BigEndian::read_u32(&rest[8..12]);
        if packet_len < header_len || header_len < HEADER_LEN || packet_len > rest.len() {
            return Err(DanmakuError::Truncated(rest.len()));
        }
        let body = &rest[header_len..packet_len];
        let compressed = version == version::ZLIB || version == version::BROTLI;
        if compressed && depth >= MAX_NESTING {
            return Err(DanmakuError::Decompress(format!(
                "compressed packets nested deeper than {} levels",
                MAX_NESTING
            )));
        }

        match version {
            version::ZLIB => {
                let mut decompressed = Vec::new();
                ZlibDecoder::new(body)
                    .read_to_end(&mut decompressed)
                    .map_err(|e| DanmakuError::Decompress(e.to_string()))?;
                packets.extend(decode_nested(&decompressed, depth + 1)?);
            }
            version::BROTLI => {
                let mut decompressed = Vec::new();
                brotli::BrotliDecompress(&mut Cursor::new(body), &mut decompressed)
                    .map_err(|e| DanmakuError::Decompress(e.to_string()))?;
                packets.extend(decode_nested(&decompressed, depth + 1)?);
            }
            _ => packets.push(Packet {
                version,
                operation,
                body: body.to_vec(),
            }),
        }
        offset += packet_len;
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    fn raw(version: u16, operation: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = encode(operation, body);
        BigEndian::write_u16(&mut buf[6..8], version);
        buf
    }

    #[test]
    fn test_encode() {
        let packet = encode(op::AUTH, b"{}");
        assert_eq!(packet.len(), 18);
        assert_eq!(BigEndian::read_u32(&packet[0..4]), 18);
        assert_eq!(BigEndian::read_u16(&packet[4..6]), 16);
        assert_eq!(BigEndian::read_u16(&packet[6..8]), 1);
        assert_eq!(BigEndian::read_u32(&packet[8..12]), op::AUTH);
        assert_eq!(BigEndian::read_u32(&packet[12..16]), 1);
        assert_eq!(&packet[16..], b"{}");
    }

    #[test]
    fn test_decode_multiple() -> Result<(), DanmakuError> {
        let mut frame = raw(version::INT, op::HEARTBEAT_REPLY, &[0, 0, 0, 9]);
        frame.extend(raw(version::JSON, op::NOTIFICATION, br#"{"cmd":"A"}"#));
        let packets = decode(&frame)?;
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].operation, op::HEARTBEAT_REPLY);
        assert_eq!(packets[1].body, br#"{"cmd":"A"}"#.to_vec());

        Ok(())
    }

    #[test]
    fn test_decode_zlib() -> Result<(), DanmakuError> {
        let mut inner = raw(version::JSON, op::NOTIFICATION, br#"{"cmd":"A"}"#);
        inner.extend(raw(version::JSON, op::NOTIFICATION, br#"{"cmd":"B"}"#));
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&inner).unwrap();
        let frame = raw(version::ZLIB, op::NOTIFICATION, &encoder.finish().unwrap());

        let packets = decode(&frame)?;
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].body, br#"{"cmd":"B"}"#.to_vec());

        Ok(())
    }

    #[test]
    fn test_decode_brotli() -> Result<(), DanmakuError> {
        let inner = raw(version::JSON, op::NOTIFICATION, br#"{"cmd":"C"}"#);
        let mut compressed = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            writer.write_all(&inner).unwrap();
        }
        let frame = raw(version::BROTLI, op::NOTIFICATION, &compressed);

        let packets = decode(&frame)?;
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body, br#"{"cmd":"C"}"#.to_vec());

        Ok(())
    }

    fn zlib_frame(inner: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(inner).unwrap();
        raw(version::ZLIB, op::NOTIFICATION, &encoder.finish().unwrap())
    }

    #[test]
    fn test_decode_nesting_limit() -> Result<(), DanmakuError> {
        let inner = raw(version::JSON, op::NOTIFICATION, br#"{"cmd":"D"}"#);
        let twice = zlib_frame(&zlib_frame(&inner));
        let packets = decode(&twice)?;
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body, br#"{"cmd":"D"}"#.to_vec());

        let three_times = zlib_frame(&twice);
        assert!(matches!(
            decode(&three_times),
            Err(DanmakuError::Decompress(_))
        ));

        Ok(())
    }

    #[test]
    fn test_decode_truncated() {
        let frame = encode(op::NOTIFICATION, b"hello");
        assert!(decode(&frame[..10]).is_err());
        assert!(decode(&frame[..18]).is_err());
    }
}
