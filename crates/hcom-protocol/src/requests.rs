//! Requests that can be sent to the device.

use bytes::Bytes;

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Requests that can be sent to the device.
///
/// The sender owns sequence numbering and supplies it to [`Request::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Restart the primary MCU.
    ResetDevice,

    /// Request the device information blob.
    GetDeviceInfo,

    /// List the files on a partition.
    ListFiles {
        /// Partition to list.
        partition: u16,
        /// Whether each entry should carry its CRC.
        include_crcs: bool,
    },

    /// Enable the managed runtime. The device resets afterwards.
    RuntimeEnable,

    /// Disable the managed runtime. The device resets afterwards.
    RuntimeDisable,

    /// Ask whether the managed runtime is enabled.
    RuntimeState,

    /// Erase the whole external flash.
    BulkFlashErase,

    /// Verify that the flash has been erased.
    VerifyErasedFlash,

    /// Reboot into the DFU bootloader.
    EnterDfuMode,

    /// Change the OS trace level.
    ChangeTraceLevel {
        /// New trace level.
        level: u32,
    },

    /// Turn trace forwarding to the host on or off.
    TraceToHost {
        /// Whether to forward.
        enabled: bool,
    },

    /// Turn trace mirroring to the debug UART on or off.
    TraceToUart {
        /// Whether to mirror.
        enabled: bool,
    },

    /// Set a developer parameter.
    DeveloperParameter {
        /// Parameter id.
        parameter: u16,
        /// Parameter value.
        value: u32,
    },

    /// Start a debugging session.
    StartDebuggingSession {
        /// Port the device-side debugger agent should use.
        port: u32,
    },

    /// Begin writing a file to the device.
    InitFileWrite {
        /// Destination partition.
        partition: u16,
        /// Destination file name.
        file_name: String,
        /// Total file size in bytes.
        file_size: u32,
        /// CRC32 of the file contents.
        crc: u32,
        /// Flash address for raw images; zero for regular files.
        flash_address: u32,
    },

    /// A chunk of file data for an in-progress write.
    FileData {
        /// Chunk contents.
        data: Bytes,
    },

    /// Finish an in-progress file write.
    EndFileTransfer,

    /// Begin reading a file from the device.
    InitFileRead {
        /// Source partition.
        partition: u16,
        /// Source file name.
        file_name: String,
    },

    /// Tell the device the host is ready for file data.
    StartFileData,

    /// Delete a file by name.
    DeleteFile {
        /// Partition holding the file.
        partition: u16,
        /// File to delete.
        file_name: String,
    },

    /// Debugger bytes destined for the device runtime.
    DebuggerData {
        /// Raw debugger protocol bytes.
        data: Bytes,
    },
}

impl Request {
    /// The request type written into the header.
    pub fn request_type(&self) -> u16 {
        match self {
            Request::ResetDevice => REQ_RESET_PRIMARY_MCU,
            Request::GetDeviceInfo => REQ_GET_DEVICE_INFORMATION,
            Request::ListFiles {
                include_crcs: false,
                ..
            } => REQ_LIST_PARTITION_FILES,
            Request::ListFiles {
                include_crcs: true,
                ..
            } => REQ_LIST_PARTITION_FILES_AND_CRC,
            Request::RuntimeEnable => REQ_RUNTIME_ENABLE,
            Request::RuntimeDisable => REQ_RUNTIME_DISABLE,
            Request::RuntimeState => REQ_RUNTIME_STATE,
            Request::BulkFlashErase => REQ_BULK_FLASH_ERASE,
            Request::VerifyErasedFlash => REQ_VERIFY_ERASED_FLASH,
            Request::EnterDfuMode => REQ_ENTER_DFU_MODE,
            Request::ChangeTraceLevel { .. } => REQ_CHANGE_TRACE_LEVEL,
            Request::TraceToHost { enabled: true } => REQ_SEND_TRACE_TO_HOST,
            Request::TraceToHost { enabled: false } => REQ_NO_TRACE_TO_HOST,
            Request::TraceToUart { enabled: true } => REQ_SEND_TRACE_TO_UART,
            Request::TraceToUart { enabled: false } => REQ_NO_TRACE_TO_UART,
            Request::DeveloperParameter { .. } => REQ_DEVELOPER_PARAMETER,
            Request::StartDebuggingSession { .. } => REQ_START_DEBUGGING_SESSION,
            Request::InitFileWrite { .. } => REQ_INIT_FILE_WRITE,
            Request::FileData { .. } => REQ_FILE_DATA,
            Request::EndFileTransfer => REQ_END_FILE_TRANSFER,
            Request::InitFileRead { .. } => REQ_INIT_FILE_READ,
            Request::StartFileData => REQ_START_FILE_DATA,
            Request::DeleteFile { .. } => REQ_DELETE_FILE_BY_NAME,
            Request::DebuggerData { .. } => REQ_DEBUGGER_DATA,
        }
    }

    /// Encode the request into a packet carrying `sequence_number`.
    ///
    /// Fails if the payload does not fit in a single packet; callers chunk
    /// file and debugger data to [`MAX_CHUNK_SIZE`].
    pub fn encode(&self, sequence_number: u16) -> ProtocolResult<Packet> {
        let request_type = self.request_type();
        let mut extra_data: u16 = 0;
        let mut user_data: u32 = 0;
        let mut payload = Vec::new();

        match self {
            Request::ListFiles { partition, .. } => {
                extra_data = *partition;
            }

            Request::ChangeTraceLevel { level } => {
                user_data = *level;
            }

            Request::DeveloperParameter { parameter, value } => {
                extra_data = *parameter;
                user_data = *value;
            }

            Request::StartDebuggingSession { port } => {
                user_data = *port;
            }

            Request::InitFileWrite {
                partition,
                file_name,
                file_size,
                crc,
                flash_address,
            } => {
                extra_data = *partition;
                payload.extend_from_slice(&file_size.to_le_bytes());
                payload.extend_from_slice(&crc.to_le_bytes());
                payload.extend_from_slice(&flash_address.to_le_bytes());
                payload.extend_from_slice(file_name.as_bytes());
            }

            Request::InitFileRead {
                partition,
                file_name,
            }
            | Request::DeleteFile {
                partition,
                file_name,
            } => {
                extra_data = *partition;
                payload.extend_from_slice(file_name.as_bytes());
            }

            Request::FileData { data } | Request::DebuggerData { data } => {
                payload.extend_from_slice(data);
            }

            Request::ResetDevice
            | Request::GetDeviceInfo
            | Request::RuntimeEnable
            | Request::RuntimeDisable
            | Request::RuntimeState
            | Request::BulkFlashErase
            | Request::VerifyErasedFlash
            | Request::EnterDfuMode
            | Request::TraceToHost { .. }
            | Request::TraceToUart { .. }
            | Request::EndFileTransfer
            | Request::StartFileData => {}
        }

        let total = HEADER_LENGTH + payload.len();
        if total > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLong {
                max: MAX_PACKET_SIZE,
                actual: total,
            });
        }

        Ok(Packet::build(
            sequence_number,
            request_type,
            extra_data,
            user_data,
            &payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_only_requests() {
        let packet = Request::ResetDevice.encode(9).unwrap();
        assert_eq!(packet.len(), HEADER_LENGTH);
        assert_eq!(packet.sequence_number(), 9);
        assert_eq!(packet.protocol_version(), PROTOCOL_VERSION);
        assert_eq!(packet.message_type(), REQ_RESET_PRIMARY_MCU);

        let packet = Request::TraceToHost { enabled: false }.encode(1).unwrap();
        assert_eq!(packet.message_type(), REQ_NO_TRACE_TO_HOST);
    }

    #[test]
    fn test_list_files_variants() {
        let plain = Request::ListFiles {
            partition: 2,
            include_crcs: false,
        };
        let with_crc = Request::ListFiles {
            partition: 2,
            include_crcs: true,
        };
        assert_eq!(plain.request_type(), REQ_LIST_PARTITION_FILES);
        assert_eq!(with_crc.request_type(), REQ_LIST_PARTITION_FILES_AND_CRC);
        assert_eq!(with_crc.encode(0).unwrap().extra_data(), 2);
    }

    #[test]
    fn test_argument_placement() {
        let packet = Request::DeveloperParameter {
            parameter: 4,
            value: 0xABCD,
        }
        .encode(3)
        .unwrap();
        assert_eq!(packet.extra_data(), 4);
        assert_eq!(packet.user_data(), 0xABCD);

        let packet = Request::ChangeTraceLevel { level: 2 }.encode(3).unwrap();
        assert_eq!(packet.user_data(), 2);

        let packet = Request::StartDebuggingSession { port: 4024 }.encode(3).unwrap();
        assert_eq!(packet.user_data(), 4024);
    }

    #[test]
    fn test_init_file_write_payload() {
        let packet = Request::InitFileWrite {
            partition: 1,
            file_name: "App.dll".into(),
            file_size: 0x0102_0304,
            crc: 0xDEAD_BEEF,
            flash_address: 0,
        }
        .encode(7)
        .unwrap();

        assert_eq!(packet.message_type(), REQ_INIT_FILE_WRITE);
        assert_eq!(packet.extra_data(), 1);
        let payload = packet.payload();
        assert_eq!(&payload[0..4], &0x0102_0304u32.to_le_bytes());
        assert_eq!(&payload[4..8], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&payload[8..12], &[0, 0, 0, 0]);
        assert_eq!(&payload[12..], b"App.dll");
    }

    #[test]
    fn test_file_name_requests() {
        let packet = Request::DeleteFile {
            partition: 0,
            file_name: "old.txt".into(),
        }
        .encode(1)
        .unwrap();
        assert_eq!(packet.message_type(), REQ_DELETE_FILE_BY_NAME);
        assert_eq!(packet.payload_text(), "old.txt");
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let data = Bytes::from(vec![0u8; MAX_CHUNK_SIZE]);
        assert!(Request::FileData { data }.encode(0).is_ok());

        let data = Bytes::from(vec![0u8; MAX_CHUNK_SIZE + 1]);
        let err = Request::FileData { data }.encode(0).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PacketTooLong {
                max: MAX_PACKET_SIZE,
                actual: MAX_PACKET_SIZE + 1
            }
        );
    }
}
