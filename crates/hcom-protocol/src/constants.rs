//! Protocol constants
//!
//! These constants define the framing parameters, request type codes, and
//! response type codes used by the HCOM host/device protocol. The high byte of
//! every type code names its category; the low byte identifies the message.

// ============================================================================
// Framing
// ============================================================================

/// Byte that terminates every frame on the wire.
pub const FRAME_DELIMITER: u8 = 0x00;
/// Length of the fixed packet header.
pub const HEADER_LENGTH: usize = 12;
/// Protocol version the host stamps into every request.
pub const PROTOCOL_VERSION: u16 = 0x0007;
/// Largest decoded packet (header + payload) either side may send.
pub const MAX_PACKET_SIZE: usize = 8192;
/// Largest payload carried by a single file-data or debugger packet.
pub const MAX_CHUNK_SIZE: usize = MAX_PACKET_SIZE - HEADER_LENGTH;
/// Largest encoded frame, including COBS overhead and the delimiter.
pub const MAX_ENCODED_FRAME_SIZE: usize = MAX_PACKET_SIZE + MAX_PACKET_SIZE / 254 + 2;

// ============================================================================
// Header offsets
// ============================================================================

pub(crate) const OFFSET_SEQUENCE_NUMBER: usize = 0;
pub(crate) const OFFSET_PROTOCOL_VERSION: usize = 2;
pub(crate) const OFFSET_MESSAGE_TYPE: usize = 4;
pub(crate) const OFFSET_EXTRA_DATA: usize = 6;
pub(crate) const OFFSET_USER_DATA: usize = 8;

// ============================================================================
// Categories
// ============================================================================

/// Requests that consist of the header alone.
pub const CATEGORY_HEADER_ONLY: u16 = 0x0100;
/// Text responses and requests carrying a file name.
pub const CATEGORY_TEXT: u16 = 0x0200;
/// File transfer control and data.
pub const CATEGORY_FILE: u16 = 0x0300;
/// Debugger passthrough data.
pub const CATEGORY_DEBUGGER: u16 = 0x0400;

// ============================================================================
// Request Types (host → device)
// ============================================================================

/// Change the device trace level (level in UserData).
pub const REQ_CHANGE_TRACE_LEVEL: u16 = CATEGORY_HEADER_ONLY | 0x01;
/// Finish an in-progress file write.
pub const REQ_END_FILE_TRANSFER: u16 = CATEGORY_HEADER_ONLY | 0x03;
/// Restart the primary MCU.
pub const REQ_RESET_PRIMARY_MCU: u16 = CATEGORY_HEADER_ONLY | 0x04;
/// Verify that the flash has been erased.
pub const REQ_VERIFY_ERASED_FLASH: u16 = CATEGORY_HEADER_ONLY | 0x05;
/// Erase the whole external flash.
pub const REQ_BULK_FLASH_ERASE: u16 = CATEGORY_HEADER_ONLY | 0x09;
/// Reboot into the DFU bootloader.
pub const REQ_ENTER_DFU_MODE: u16 = CATEGORY_HEADER_ONLY | 0x0A;
/// List the files on a partition.
pub const REQ_LIST_PARTITION_FILES: u16 = CATEGORY_HEADER_ONLY | 0x0C;
/// List the files on a partition together with their CRCs.
pub const REQ_LIST_PARTITION_FILES_AND_CRC: u16 = CATEGORY_HEADER_ONLY | 0x0D;
/// Disable the managed runtime (device resets afterwards).
pub const REQ_RUNTIME_DISABLE: u16 = CATEGORY_HEADER_ONLY | 0x0E;
/// Enable the managed runtime (device resets afterwards).
pub const REQ_RUNTIME_ENABLE: u16 = CATEGORY_HEADER_ONLY | 0x0F;
/// Ask whether the managed runtime is enabled.
pub const REQ_RUNTIME_STATE: u16 = CATEGORY_HEADER_ONLY | 0x10;
/// Request the device information blob.
pub const REQ_GET_DEVICE_INFORMATION: u16 = CATEGORY_HEADER_ONLY | 0x11;
/// Stop forwarding trace output to the host.
pub const REQ_NO_TRACE_TO_HOST: u16 = CATEGORY_HEADER_ONLY | 0x13;
/// Forward trace output to the host.
pub const REQ_SEND_TRACE_TO_HOST: u16 = CATEGORY_HEADER_ONLY | 0x14;
/// Mirror trace output to the debug UART.
pub const REQ_SEND_TRACE_TO_UART: u16 = CATEGORY_HEADER_ONLY | 0x19;
/// Stop mirroring trace output to the debug UART.
pub const REQ_NO_TRACE_TO_UART: u16 = CATEGORY_HEADER_ONLY | 0x1A;
/// Start a debugging session (port in UserData).
pub const REQ_START_DEBUGGING_SESSION: u16 = CATEGORY_HEADER_ONLY | 0x1D;
/// Host is ready to receive file data after a read was accepted.
pub const REQ_START_FILE_DATA: u16 = CATEGORY_HEADER_ONLY | 0x1F;
/// Set a developer parameter (id in ExtraData, value in UserData).
pub const REQ_DEVELOPER_PARAMETER: u16 = CATEGORY_HEADER_ONLY | 0xF0;

/// Begin writing a file to the device.
pub const REQ_INIT_FILE_WRITE: u16 = CATEGORY_TEXT | 0x01;
/// Delete a file by name.
pub const REQ_DELETE_FILE_BY_NAME: u16 = CATEGORY_TEXT | 0x02;
/// Begin reading a file from the device.
pub const REQ_INIT_FILE_READ: u16 = CATEGORY_TEXT | 0x03;

/// A chunk of file data for an in-progress write.
pub const REQ_FILE_DATA: u16 = CATEGORY_FILE | 0x01;

/// Debugger bytes destined for the device runtime.
pub const REQ_DEBUGGER_DATA: u16 = CATEGORY_DEBUGGER | 0x01;

// ============================================================================
// Response Types (device → host)
// ============================================================================

/// The device rejected a request; payload explains why.
pub const RESP_TEXT_REJECTED: u16 = CATEGORY_TEXT | 0x01;
/// The device accepted a request.
pub const RESP_TEXT_ACCEPTED: u16 = CATEGORY_TEXT | 0x02;
/// A request finished; UserData holds the concluded request type.
pub const RESP_TEXT_CONCLUDED: u16 = CATEGORY_TEXT | 0x03;
/// Error text from the device.
pub const RESP_TEXT_ERROR: u16 = CATEGORY_TEXT | 0x04;
/// Informational text from the device.
pub const RESP_TEXT_INFORMATION: u16 = CATEGORY_TEXT | 0x05;
/// Start of a text list.
pub const RESP_TEXT_LIST_HEADER: u16 = CATEGORY_TEXT | 0x06;
/// One entry of a text list.
pub const RESP_TEXT_LIST_MEMBER: u16 = CATEGORY_TEXT | 0x07;
/// One entry of a text list carrying a CRC.
pub const RESP_TEXT_CRC_MEMBER: u16 = CATEGORY_TEXT | 0x08;
/// Application standard output.
pub const RESP_TEXT_STDOUT: u16 = CATEGORY_TEXT | 0x09;
/// Device information blob (`key|value~key|value~`).
pub const RESP_TEXT_DEVICE_INFO: u16 = CATEGORY_TEXT | 0x0A;
/// Trace message from the OS.
pub const RESP_TEXT_TRACE: u16 = CATEGORY_TEXT | 0x0B;
/// The device is about to reset; the host must reopen the transport.
pub const RESP_TEXT_RECONNECT: u16 = CATEGORY_TEXT | 0x0C;
/// Application standard error.
pub const RESP_TEXT_STDERR: u16 = CATEGORY_TEXT | 0x0D;

/// The device is ready to receive file data.
pub const RESP_FILE_WRITE_INIT_OK: u16 = CATEGORY_FILE | 0x01;
/// The device refused a file write.
pub const RESP_FILE_WRITE_INIT_FAILED: u16 = CATEGORY_FILE | 0x02;
/// The device accepted a file read.
pub const RESP_FILE_READ_INIT_OK: u16 = CATEGORY_FILE | 0x03;
/// The device refused a file read.
pub const RESP_FILE_READ_INIT_FAILED: u16 = CATEGORY_FILE | 0x04;
/// A chunk of file data for an in-progress read.
pub const RESP_UPLOAD_DATA_PACKET: u16 = CATEGORY_FILE | 0x05;
/// The device finished sending a file.
pub const RESP_UPLOAD_COMPLETED: u16 = CATEGORY_FILE | 0x06;

/// Debugger bytes from the device runtime.
pub const RESP_DEBUGGING_DATA: u16 = CATEGORY_DEBUGGER | 0x01;

/// Every response type the parser maps to a dedicated variant.
pub const KNOWN_RESPONSE_TYPES: [u16; 20] = [
    RESP_TEXT_REJECTED,
    RESP_TEXT_ACCEPTED,
    RESP_TEXT_CONCLUDED,
    RESP_TEXT_ERROR,
    RESP_TEXT_INFORMATION,
    RESP_TEXT_LIST_HEADER,
    RESP_TEXT_LIST_MEMBER,
    RESP_TEXT_CRC_MEMBER,
    RESP_TEXT_STDOUT,
    RESP_TEXT_DEVICE_INFO,
    RESP_TEXT_TRACE,
    RESP_TEXT_RECONNECT,
    RESP_TEXT_STDERR,
    RESP_FILE_WRITE_INIT_OK,
    RESP_FILE_WRITE_INIT_FAILED,
    RESP_FILE_READ_INIT_OK,
    RESP_FILE_READ_INIT_FAILED,
    RESP_UPLOAD_DATA_PACKET,
    RESP_UPLOAD_COMPLETED,
    RESP_DEBUGGING_DATA,
];

// ============================================================================
// Partitions
// ============================================================================

/// Default flash partition for file operations.
pub const DEFAULT_PARTITION: u16 = 0;
