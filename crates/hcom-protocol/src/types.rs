//! Common types used in the protocol.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::*;
use crate::error::*;

// ============================================================================
// Packet
// ============================================================================

/// A decoded HCOM packet: a 12-byte header followed by the payload.
///
/// ```text
/// +-----+-----+-----+-----+-----+-----+-----+-----+-----+-----+-----+-----+---------
/// |  sequence |  version  | msg type  | extra data|        user data      | payload
/// +-----+-----+-----+-----+-----+-----+-----+-----+-----+-----+-----+-----+---------
/// ```
///
/// All header fields are little-endian. Accessors read straight from the
/// underlying buffer; nothing is cached alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Bytes,
}

impl Packet {
    /// Write a header and payload into a new packet.
    pub fn build(
        sequence_number: u16,
        message_type: u16,
        extra_data: u16,
        user_data: u32,
        payload: &[u8],
    ) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
        buf.put_u16_le(sequence_number);
        buf.put_u16_le(PROTOCOL_VERSION);
        buf.put_u16_le(message_type);
        buf.put_u16_le(extra_data);
        buf.put_u32_le(user_data);
        buf.extend_from_slice(payload);
        Packet { bytes: buf.freeze() }
    }

    /// Wrap received bytes. Fails if they cannot hold a header.
    pub fn from_bytes(bytes: Bytes) -> ProtocolResult<Self> {
        if bytes.len() < HEADER_LENGTH {
            return Err(ProtocolError::PacketTooShort {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        }
        Ok(Packet { bytes })
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// Sequence number assigned by the sender.
    pub fn sequence_number(&self) -> u16 {
        self.read_u16(OFFSET_SEQUENCE_NUMBER)
    }

    /// Protocol version of the sender.
    pub fn protocol_version(&self) -> u16 {
        self.read_u16(OFFSET_PROTOCOL_VERSION)
    }

    /// Request type (host → device) or response type (device → host).
    pub fn message_type(&self) -> u16 {
        self.read_u16(OFFSET_MESSAGE_TYPE)
    }

    /// Per-message extra data (partition, parameter id, ...).
    pub fn extra_data(&self) -> u16 {
        self.read_u16(OFFSET_EXTRA_DATA)
    }

    /// Per-message user data.
    pub fn user_data(&self) -> u32 {
        let o = OFFSET_USER_DATA;
        u32::from_le_bytes([
            self.bytes[o],
            self.bytes[o + 1],
            self.bytes[o + 2],
            self.bytes[o + 3],
        ])
    }

    /// Bytes after the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LENGTH..]
    }

    /// Bytes after the header, without copying.
    pub fn payload_bytes(&self) -> Bytes {
        self.bytes.slice(HEADER_LENGTH..)
    }

    /// Payload interpreted as text. Invalid UTF-8 is replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(self.payload()).into_owned()
    }

    /// The whole packet.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total length including the header.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the packet has no payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == HEADER_LENGTH
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

// ============================================================================
// Device Information
// ============================================================================

/// Device information reported by the board.
///
/// Parsed from `key|value~key|value~` text. Keys keep their original spelling
/// for display but are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    fields: Vec<(String, String)>,
}

impl DeviceInfo {
    /// Parse the device information text.
    pub fn parse(text: &str) -> Self {
        let mut info = DeviceInfo::default();
        for field in text.split('~') {
            let Some((key, value)) = field.split_once('|') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            info.insert(key, value.trim());
        }
        info
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.fields.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.fields.push((key.to_string(), value.to_string())),
        }
    }

    /// Look up a field, ignoring key case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate fields in the order the device sent them.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields were parsed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// User-assigned device name.
    pub fn device_name(&self) -> Option<&str> {
        self.get("DeviceName")
    }

    /// Product name (e.g. `MeadowF7`).
    pub fn product(&self) -> Option<&str> {
        self.get("Product")
    }

    /// Board model.
    pub fn model(&self) -> Option<&str> {
        self.get("Model")
    }

    /// Operating system version.
    pub fn os_version(&self) -> Option<&str> {
        self.get("OSVersion")
    }

    /// Managed runtime version.
    pub fn runtime_version(&self) -> Option<&str> {
        self.get("MonoVersion")
    }

    /// Board serial number.
    pub fn serial_number(&self) -> Option<&str> {
        self.get("SerialNo")
    }

    /// Unique processor identifier.
    pub fn processor_id(&self) -> Option<&str> {
        self.get("ProcessorId")
    }

    /// Coprocessor firmware version.
    pub fn coprocessor_os_version(&self) -> Option<&str> {
        self.get("CoProcessorOs")
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "{}: {}", key, value)?;
        }
        Ok(())
    }
}

// ============================================================================
// File Listing
// ============================================================================

/// A file reported by a partition listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListEntry {
    /// File name.
    pub name: String,
    /// CRC32 of the file contents, when the listing included CRCs.
    pub crc: Option<u32>,
    /// File size in bytes, when reported.
    pub size: Option<u64>,
}

impl FileListEntry {
    /// Parse a list member line: `name` or `name [0xCRC] size`.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(open) = text.find('[') else {
            return FileListEntry {
                name: text.to_string(),
                crc: None,
                size: None,
            };
        };

        let name = text[..open].trim().to_string();
        let rest = &text[open + 1..];
        let (crc_text, tail) = rest.split_once(']').unwrap_or((rest, ""));
        let crc_text = crc_text.trim();
        let crc_text = crc_text
            .strip_prefix("0x")
            .or_else(|| crc_text.strip_prefix("0X"))
            .unwrap_or(crc_text);
        let crc = u32::from_str_radix(crc_text, 16).ok();
        let size = tail.split_whitespace().next().and_then(|s| s.parse().ok());

        FileListEntry { name, crc, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_field_extraction() {
        let packet = Packet::build(5, 0x0A, 3, 0xFFFF_FFFF, b"payload");

        assert_eq!(packet.sequence_number(), 5);
        assert_eq!(packet.protocol_version(), PROTOCOL_VERSION);
        assert_eq!(packet.message_type(), 0x0A);
        assert_eq!(packet.extra_data(), 3);
        assert_eq!(packet.user_data(), 0xFFFF_FFFF);
        assert_eq!(packet.payload(), b"payload");
        assert_eq!(packet.len(), HEADER_LENGTH + 7);
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let packet = Packet::build(0x0102, 0x0304, 0x0506, 0x0708_090A, &[]);
        assert_eq!(
            packet.as_bytes(),
            &[0x02, 0x01, 0x07, 0x00, 0x04, 0x03, 0x06, 0x05, 0x0A, 0x09, 0x08, 0x07]
        );
        assert!(packet.is_empty());
    }

    #[test]
    fn test_header_reads_foreign_version() {
        let mut raw = Packet::build(5, 0x0A, 3, 1, &[]).as_bytes().to_vec();
        raw[2] = 7;
        raw[3] = 0;
        let packet = Packet::from_bytes(Bytes::from(raw)).unwrap();
        assert_eq!(packet.protocol_version(), 7);
    }

    #[test]
    fn test_packet_too_short() {
        let err = Packet::from_bytes(Bytes::from_static(&[0; 11])).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PacketTooShort {
                expected: HEADER_LENGTH,
                actual: 11
            }
        );
    }

    #[test]
    fn test_device_info_case_insensitive() {
        let info = DeviceInfo::parse("name|MeadowF7~version|1.8.0.0~");
        assert_eq!(info.len(), 2);
        assert_eq!(info.get("name"), Some("MeadowF7"));
        assert_eq!(info.get("Name"), Some("MeadowF7"));
        assert_eq!(info.get("VERSION"), Some("1.8.0.0"));
        assert_eq!(info.get("missing"), None);
    }

    #[test]
    fn test_device_info_accessors_and_malformed_fields() {
        let info = DeviceInfo::parse(
            "Product|MeadowF7Micro~ OSVersion | 1.9.0 ~garbage~|novalue~SerialNo|ABC~serialno|XYZ",
        );
        assert_eq!(info.product(), Some("MeadowF7Micro"));
        assert_eq!(info.os_version(), Some("1.9.0"));
        assert_eq!(info.serial_number(), Some("XYZ"));
        assert_eq!(info.len(), 3);
        assert!(info.to_string().contains("Product: MeadowF7Micro"));
    }

    #[test]
    fn test_file_list_entry_parse() {
        assert_eq!(
            FileListEntry::parse("App.dll"),
            FileListEntry {
                name: "App.dll".into(),
                crc: None,
                size: None
            }
        );
        assert_eq!(
            FileListEntry::parse("App.dll [0xdeadBEEF] 1024"),
            FileListEntry {
                name: "App.dll".into(),
                crc: Some(0xDEAD_BEEF),
                size: Some(1024)
            }
        );
        let partial = FileListEntry::parse("meadow.log [zz]");
        assert_eq!(partial.name, "meadow.log");
        assert_eq!(partial.crc, None);
    }
}
