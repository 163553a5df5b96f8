//! Responses from the device.

use bytes::Bytes;
use tracing::trace;

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Responses received from the device.
///
/// Every variant owns only the interpretation of its own payload; header
/// fields stay on the [`Packet`] carried by [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The device rejected a request.
    TextRejected(String),

    /// The device accepted a request.
    TextAccepted(String),

    /// A request finished.
    TextConcluded {
        /// Request type that concluded.
        request_type: u16,
    },

    /// Error text from the device.
    TextError(String),

    /// Informational text.
    TextInformation(String),

    /// Start of a text list.
    TextListHeader(String),

    /// One entry of a text list.
    TextListMember(String),

    /// One entry of a text list carrying a CRC.
    TextCrcMember(String),

    /// Application standard output.
    TextStdout(String),

    /// Application standard error.
    TextStderr(String),

    /// OS trace message.
    TextTrace(String),

    /// Device information blob.
    DeviceInfo(DeviceInfo),

    /// The device is about to reset and the host must reopen the transport.
    ReconnectRequired(String),

    /// The device is ready to receive file data.
    FileWriteInitOk,

    /// The device refused a file write.
    FileWriteInitFailed {
        /// Most recent error text seen before the failure.
        last_error: Option<String>,
    },

    /// The device accepted a file read.
    FileReadInitOk,

    /// The device refused a file read.
    FileReadInitFailed {
        /// Most recent error text seen before the failure.
        last_error: Option<String>,
    },

    /// A chunk of file data for an in-progress read.
    UploadDataPacket(Bytes),

    /// The device finished sending a file.
    UploadCompleted,

    /// Debugger bytes from the device runtime.
    DebuggingData(Bytes),

    /// A response type this host does not know. Passed through untouched.
    Unknown {
        /// Response type from the header.
        response_type: u16,
        /// Raw payload.
        payload: Bytes,
    },
}

impl Response {
    /// Map a packet to its response variant. Never fails: unknown types
    /// become [`Response::Unknown`].
    pub fn decode(packet: &Packet) -> Self {
        let text = || packet.payload_text();

        match packet.message_type() {
            RESP_TEXT_REJECTED => Response::TextRejected(text()),
            RESP_TEXT_ACCEPTED => Response::TextAccepted(text()),
            RESP_TEXT_CONCLUDED => Response::TextConcluded {
                request_type: (packet.user_data() & 0xFFFF) as u16,
            },
            RESP_TEXT_ERROR => Response::TextError(text()),
            RESP_TEXT_INFORMATION => Response::TextInformation(text()),
            RESP_TEXT_LIST_HEADER => Response::TextListHeader(text()),
            RESP_TEXT_LIST_MEMBER => Response::TextListMember(text()),
            RESP_TEXT_CRC_MEMBER => Response::TextCrcMember(text()),
            RESP_TEXT_STDOUT => Response::TextStdout(text()),
            RESP_TEXT_STDERR => Response::TextStderr(text()),
            RESP_TEXT_TRACE => Response::TextTrace(text()),
            RESP_TEXT_DEVICE_INFO => Response::DeviceInfo(DeviceInfo::parse(&text())),
            RESP_TEXT_RECONNECT => Response::ReconnectRequired(text()),
            RESP_FILE_WRITE_INIT_OK => Response::FileWriteInitOk,
            RESP_FILE_WRITE_INIT_FAILED => Response::FileWriteInitFailed { last_error: None },
            RESP_FILE_READ_INIT_OK => Response::FileReadInitOk,
            RESP_FILE_READ_INIT_FAILED => Response::FileReadInitFailed { last_error: None },
            RESP_UPLOAD_DATA_PACKET => Response::UploadDataPacket(packet.payload_bytes()),
            RESP_UPLOAD_COMPLETED => Response::UploadCompleted,
            RESP_DEBUGGING_DATA => Response::DebuggingData(packet.payload_bytes()),
            response_type => Response::Unknown {
                response_type,
                payload: packet.payload_bytes(),
            },
        }
    }

    /// The response type this variant was decoded from.
    pub fn response_type(&self) -> u16 {
        match self {
            Response::TextRejected(_) => RESP_TEXT_REJECTED,
            Response::TextAccepted(_) => RESP_TEXT_ACCEPTED,
            Response::TextConcluded { .. } => RESP_TEXT_CONCLUDED,
            Response::TextError(_) => RESP_TEXT_ERROR,
            Response::TextInformation(_) => RESP_TEXT_INFORMATION,
            Response::TextListHeader(_) => RESP_TEXT_LIST_HEADER,
            Response::TextListMember(_) => RESP_TEXT_LIST_MEMBER,
            Response::TextCrcMember(_) => RESP_TEXT_CRC_MEMBER,
            Response::TextStdout(_) => RESP_TEXT_STDOUT,
            Response::TextStderr(_) => RESP_TEXT_STDERR,
            Response::TextTrace(_) => RESP_TEXT_TRACE,
            Response::DeviceInfo(_) => RESP_TEXT_DEVICE_INFO,
            Response::ReconnectRequired(_) => RESP_TEXT_RECONNECT,
            Response::FileWriteInitOk => RESP_FILE_WRITE_INIT_OK,
            Response::FileWriteInitFailed { .. } => RESP_FILE_WRITE_INIT_FAILED,
            Response::FileReadInitOk => RESP_FILE_READ_INIT_OK,
            Response::FileReadInitFailed { .. } => RESP_FILE_READ_INIT_FAILED,
            Response::UploadDataPacket(_) => RESP_UPLOAD_DATA_PACKET,
            Response::UploadCompleted => RESP_UPLOAD_COMPLETED,
            Response::DebuggingData(_) => RESP_DEBUGGING_DATA,
            Response::Unknown { response_type, .. } => *response_type,
        }
    }
}

/// A parsed packet together with its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    packet: Packet,
    response: Response,
}

impl Message {
    /// The packet the response was decoded from.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// The decoded response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Take the decoded response.
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Turns decoded frames into [`Message`]s.
///
/// Error text (`TextError`, `TextRejected`) is remembered so that init
/// failures, which carry no text of their own, can report it.
#[derive(Debug, Default)]
pub struct ResponseParser {
    last_error: Option<String>,
}

impl ResponseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        ResponseParser::default()
    }

    /// Parse one decoded frame.
    ///
    /// Returns `Ok(None)` for an empty buffer (no message available) and an
    /// error for a buffer too short to hold a header.
    pub fn parse(&mut self, buf: &[u8]) -> ProtocolResult<Option<Message>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let packet = Packet::from_bytes(Bytes::copy_from_slice(buf))?;
        Ok(Some(self.parse_packet(packet)))
    }

    /// Parse a packet that already holds a full header.
    pub fn parse_packet(&mut self, packet: Packet) -> Message {
        let mut response = Response::decode(&packet);

        match &mut response {
            Response::TextError(text) | Response::TextRejected(text) => {
                self.last_error = Some(text.clone());
            }
            Response::FileWriteInitFailed { last_error }
            | Response::FileReadInitFailed { last_error } => {
                *last_error = self.last_error.clone();
            }
            _ => {}
        }

        trace!(
            seq = packet.sequence_number(),
            response_type = packet.message_type(),
            len = packet.len(),
            "parsed response"
        );

        Message { packet, response }
    }

    /// Most recent error text seen.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
