use thiserror::Error;

/// Errors that can occur in the bridge core
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Frame checksum did not match the received trailing checksum byte
    #[error("checksum mismatch: computed {computed:02X}, frame carries {received:02X}")]
    Checksum {
        /// Checksum recomputed over the frame contents
        computed: u8,
        /// Checksum byte carried by the frame
        received: u8,
    },

    /// Frame was structurally invalid (too short, bad start flag, ...)
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A TLV record length field points past the end of the response contents
    #[error("truncated record: needs {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Bytes the record header claims to carry
        needed: usize,
        /// Bytes actually left in the response contents
        available: usize,
    },

    /// Command name not present in the command registry
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Inbound control-point write carried no payload
    #[error("empty command payload")]
    InvalidCommand,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Check whether this error is local to one frame or command and the
    /// link can simply carry on (resynchronize, drop, or ignore)
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Checksum { .. }
                | Self::InvalidFrame(_)
                | Self::TruncatedRecord { .. }
                | Self::InvalidCommand
        )
    }

    /// Check whether this error came from decoding wire bytes
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Checksum { .. } | Self::InvalidFrame(_) | Self::TruncatedRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let checksum = BridgeError::Checksum {
            computed: 0xA5,
            received: 0x5A,
        };
        assert!(checksum.is_recoverable());
        assert!(checksum.is_protocol_error());

        let unknown = BridgeError::UnknownCommand("GetBogus".to_string());
        assert!(!unknown.is_recoverable());
        assert!(!unknown.is_protocol_error());

        let empty = BridgeError::InvalidCommand;
        assert!(empty.is_recoverable());
        assert!(!empty.is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let error = BridgeError::Checksum {
            computed: 0xA5,
            received: 0x5A,
        };
        let error_string = format!("{error}");
        assert!(error_string.contains("A5"));
        assert!(error_string.contains("5A"));

        let truncated = BridgeError::TruncatedRecord {
            needed: 8,
            available: 3,
        };
        assert!(format!("{truncated}").contains("needs 8 bytes"));
    }
}
