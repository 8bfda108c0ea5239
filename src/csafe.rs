//! CSAFE-style frame codec for serial rowing ergometers
//!
//! Wire format: `[start flag][contents...][checksum][stop flag]`, where the
//! checksum is an XOR fold over the unescaped contents and any byte inside
//! the frame that collides with a flag value is escaped as
//! `[stuff flag][byte & 0x0F]`.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Start flag for extended frames (source/destination addressed)
pub const EXTENDED_START_FLAG: u8 = 0xF0;
/// Start flag for standard frames
pub const STANDARD_START_FLAG: u8 = 0xF1;
/// Stop flag terminating every frame
pub const STOP_FLAG: u8 = 0xF2;
/// Escape marker for byte stuffing
pub const STUFF_FLAG: u8 = 0xF3;

/// Frame flavor, derived from the start flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Starts with [`STANDARD_START_FLAG`]
    Standard,
    /// Starts with [`EXTENDED_START_FLAG`]
    Extended,
}

/// XOR-fold checksum over a byte span; 0x00 for empty input
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0x00, |acc, &b| acc ^ b)
}

/// Escape the first unescaped flag-valued byte in the frame body
///
/// Scans between the leading start byte and the trailing stop byte, skipping
/// pairs that are already stuffed, and replaces the first flag-valued byte
/// with `[STUFF_FLAG, byte & 0x0F]`. Returns whether a replacement happened;
/// callers loop until it returns `false`, mirroring the one-escape-per-pass
/// shape of the source protocol.
///
/// The skip heuristic cannot tell a raw escape byte followed by a low-nibble
/// byte apart from an existing pair, so it only suits buffers that are partly
/// stuffed already. A builder that owns a known-clean body escapes it in one
/// pass instead ([`Command::build`] does).
pub fn stuff(buffer: &mut Vec<u8>) -> bool {
    if buffer.len() < 3 {
        return false;
    }
    let mut i = 1;
    while i < buffer.len() - 1 {
        let byte = buffer[i];
        if byte == STUFF_FLAG && i + 1 < buffer.len() - 1 && buffer[i + 1] <= 0x0F {
            // already an escape pair
            i += 2;
            continue;
        }
        if (EXTENDED_START_FLAG..=STUFF_FLAG).contains(&byte) {
            buffer[i] = STUFF_FLAG;
            buffer.insert(i + 1, byte & 0x0F);
            return true;
        }
        i += 1;
    }
    false
}

/// Escape every flag-valued byte in a known-clean body span
///
/// Single left-to-right pass for locally built frames, where every byte is
/// raw by construction and no skip heuristic is needed.
fn escape_body(body: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(body.len());
    for &byte in body {
        if (EXTENDED_START_FLAG..=STUFF_FLAG).contains(&byte) {
            escaped.push(STUFF_FLAG);
            escaped.push(byte & 0x0F);
        } else {
            escaped.push(byte);
        }
    }
    escaped
}

/// Undo byte stuffing in the frame body
///
/// Every `[STUFF_FLAG, x]` pair between the delimiters collapses to the
/// single byte `x | 0xF0`.
pub fn unstuff(buffer: &mut Vec<u8>) {
    let mut i = 1;
    while i + 1 < buffer.len() {
        if buffer[i] == STUFF_FLAG {
            let restored = buffer[i + 1] | 0xF0;
            buffer[i] = restored;
            buffer.remove(i + 1);
        }
        i += 1;
    }
}

/// A single delimited, checksum-validated protocol frame
///
/// Constructing a `Frame` from raw wire bytes unstuffs the body if an escape
/// marker is present, then validates the trailing checksum; both the stuffed
/// and already-clean forms of a valid frame construct successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    buffer: Vec<u8>,
    kind: FrameKind,
}

impl Frame {
    /// Parse and validate a raw frame buffer
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidFrame`] for a missing delimiter or a buffer too
    /// short to hold contents and checksum; [`BridgeError::Checksum`] when
    /// the recomputed checksum disagrees with the trailing checksum byte.
    pub fn parse(mut buffer: Vec<u8>) -> Result<Self> {
        let kind = match buffer.first() {
            Some(&STANDARD_START_FLAG) => FrameKind::Standard,
            Some(&EXTENDED_START_FLAG) => FrameKind::Extended,
            Some(&other) => {
                return Err(BridgeError::InvalidFrame(format!(
                    "unknown start flag {other:02X}"
                )))
            }
            None => return Err(BridgeError::InvalidFrame("empty buffer".to_string())),
        };

        if buffer.len() >= 2 && buffer[1..buffer.len() - 1].contains(&STUFF_FLAG) {
            unstuff(&mut buffer);
        }

        if buffer.len() < 3 {
            return Err(BridgeError::InvalidFrame(format!(
                "{} bytes is too short for a frame",
                buffer.len()
            )));
        }

        let frame = Self { buffer, kind };
        frame.validate()?;
        Ok(frame)
    }

    /// Frame flavor from the start flag
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Frame contents between the start flag and the checksum byte
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.buffer[1..self.buffer.len() - 2]
    }

    /// Checksum byte carried by the frame
    #[must_use]
    pub fn carried_checksum(&self) -> u8 {
        self.buffer[self.buffer.len() - 2]
    }

    fn validate(&self) -> Result<()> {
        let computed = checksum(self.contents());
        let received = self.carried_checksum();
        if computed == received {
            Ok(())
        } else {
            Err(BridgeError::Checksum { computed, received })
        }
    }
}

/// Payload shape of a registered command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Identifier byte only
    Fixed,
    /// Identifier byte followed by a length-prefixed payload
    Variable,
}

/// Registry entry: numeric identifier plus payload shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command identifier byte on the wire
    pub id: u8,
    /// Whether the command carries a payload
    pub kind: CommandKind,
}

/// Mapping from symbolic command names to wire identifiers
///
/// Supplied as data so new equipment commands slot in without touching the
/// codec. [`CommandRegistry::standard`] carries the public CSAFE command set
/// the bridged rowers use.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the standard public command set
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let fixed = [
            ("GetStatus", 0x80),
            ("Reset", 0x81),
            ("GoIdle", 0x82),
            ("GoHaveID", 0x83),
            ("GoInUse", 0x85),
            ("GoFinished", 0x86),
            ("GoReady", 0x87),
            ("BadID", 0x88),
            ("GetVersion", 0x91),
            ("GetID", 0x92),
            ("GetUnits", 0x93),
            ("GetSerial", 0x94),
            ("GetOdometer", 0x9B),
            ("GetErrorCode", 0x9C),
            ("GetWork", 0xA0),
            ("GetHorizontal", 0xA1),
            ("GetCalories", 0xA3),
            ("GetPace", 0xA6),
            ("GetCadence", 0xA7),
            ("GetHRCur", 0xB0),
            ("GetPower", 0xB4),
        ];
        for (name, id) in fixed {
            registry.insert(name, CommandSpec {
                id,
                kind: CommandKind::Fixed,
            });
        }
        let variable = [
            ("SetTime", 0x11),
            ("SetDate", 0x12),
            ("SetTimeout", 0x13),
            ("SetHorizontal", 0x21),
            ("SetProgram", 0x24),
            ("SetUserInfo", 0x2B),
        ];
        for (name, id) in variable {
            registry.insert(name, CommandSpec {
                id,
                kind: CommandKind::Variable,
            });
        }
        registry
    }

    /// Add or replace a command
    pub fn insert(&mut self, name: &'static str, spec: CommandSpec) {
        self.commands.insert(name, spec);
    }

    /// Look up a command by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CommandSpec> {
        self.commands.get(name).copied()
    }
}

/// An outbound command frame, built by symbolic name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    frame: Frame,
    wire: Vec<u8>,
}

impl Command {
    /// Build a command frame from the registry
    ///
    /// `data` is ignored for fixed commands. The wire form carries the
    /// stuffed body; the parsed frame holds the clean contents.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownCommand`] when `name` is not registered;
    /// [`BridgeError::InvalidFrame`] when a variable payload exceeds the
    /// one-byte length prefix. Other frame errors cannot occur for a locally
    /// built buffer but propagate if they somehow do.
    pub fn build(registry: &CommandRegistry, name: &str, data: &[u8]) -> Result<Self> {
        let spec = registry
            .get(name)
            .ok_or_else(|| BridgeError::UnknownCommand(name.to_string()))?;

        let mut contents = vec![spec.id];
        if spec.kind == CommandKind::Variable {
            let length = u8::try_from(data.len()).map_err(|_| {
                BridgeError::InvalidFrame(format!(
                    "{} byte payload exceeds the one-byte length prefix",
                    data.len()
                ))
            })?;
            contents.push(length);
            contents.extend_from_slice(data);
        }
        let mut body = contents;
        body.push(checksum(&body));

        let mut wire = Vec::with_capacity(body.len() + 2);
        wire.push(STANDARD_START_FLAG);
        wire.extend_from_slice(&escape_body(&body));
        wire.push(STOP_FLAG);

        let frame = Frame::parse(wire.clone())?;
        Ok(Self { frame, wire })
    }

    /// Bytes to put on the wire (stuffed form)
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// The validated frame behind this command
    #[must_use]
    pub const fn frame(&self) -> &Frame {
        &self.frame
    }
}

/// Status of the previously processed command, response status high nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrevStatus {
    /// Previous command accepted
    Ok,
    /// Previous command rejected
    Reject,
    /// Previous command was malformed
    Bad,
    /// Device was not ready for the previous command
    NotReady,
}

/// Device state machine position, response status low nibble
///
/// Value 4 is undefined in the source protocol and kept as an explicit
/// [`SlaveState::Reserved`] variant rather than folded into a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    /// Error state
    Error,
    /// Ready for commands
    Ready,
    /// Idle
    Idle,
    /// Has a user/workout identifier
    HaveId,
    /// Undefined in the protocol
    Reserved,
    /// Workout in use
    InUse,
    /// Workout paused
    Paused,
    /// Workout finished
    Finished,
    /// Manual mode
    Manual,
    /// Offline
    Offline,
}

impl SlaveState {
    /// Decode the low status nibble
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(Self::Error),
            1 => Some(Self::Ready),
            2 => Some(Self::Idle),
            3 => Some(Self::HaveId),
            4 => Some(Self::Reserved),
            5 => Some(Self::InUse),
            6 => Some(Self::Paused),
            7 => Some(Self::Finished),
            8 => Some(Self::Manual),
            9 => Some(Self::Offline),
            _ => None,
        }
    }
}

/// One TLV record inside a response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    /// Record identifier byte
    pub id: u8,
    /// Record payload
    pub data: Vec<u8>,
}

/// An inbound response frame: status byte followed by TLV records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    frame: Frame,
}

impl Response {
    /// Parse and validate a raw response buffer
    ///
    /// # Errors
    ///
    /// Frame parse/checksum errors, or [`BridgeError::InvalidFrame`] when the
    /// contents are empty (a response always carries at least a status byte).
    pub fn parse(buffer: Vec<u8>) -> Result<Self> {
        let frame = Frame::parse(buffer)?;
        if frame.contents().is_empty() {
            return Err(BridgeError::InvalidFrame(
                "response carries no status byte".to_string(),
            ));
        }
        Ok(Self { frame })
    }

    /// The validated frame behind this response
    #[must_use]
    pub const fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Status of the previously processed command (high nibble)
    #[must_use]
    pub fn prev_status(&self) -> PrevStatus {
        match (self.frame.contents()[0] >> 4) & 0x03 {
            0 => PrevStatus::Ok,
            1 => PrevStatus::Reject,
            2 => PrevStatus::Bad,
            _ => PrevStatus::NotReady,
        }
    }

    /// Device state machine position (low nibble)
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidFrame`] for nibble values outside the ten-entry
    /// enumeration.
    pub fn state(&self) -> Result<SlaveState> {
        let nibble = self.frame.contents()[0] & 0x0F;
        SlaveState::from_nibble(nibble).ok_or_else(|| {
            BridgeError::InvalidFrame(format!("undefined state nibble {nibble:X}"))
        })
    }

    /// TLV records following the status byte
    ///
    /// # Errors
    ///
    /// [`BridgeError::TruncatedRecord`] when a length field points past the
    /// end of the contents.
    pub fn records(&self) -> Result<Vec<TlvRecord>> {
        let contents = self.frame.contents();
        let mut records = Vec::new();
        let mut i = 1;
        while i < contents.len() {
            if i + 2 > contents.len() {
                return Err(BridgeError::TruncatedRecord {
                    needed: 2,
                    available: contents.len() - i,
                });
            }
            let id = contents[i];
            let length = contents[i + 1] as usize;
            i += 2;
            if i + length > contents.len() {
                return Err(BridgeError::TruncatedRecord {
                    needed: length,
                    available: contents.len() - i,
                });
            }
            records.push(TlvRecord {
                id,
                data: contents[i..i + length].to_vec(),
            });
            i += length;
        }
        Ok(records)
    }
}

/// What one [`FrameReader::feed`] call produced
#[derive(Debug)]
pub enum ReaderEvent {
    /// A complete, checksum-valid response
    Response(Response),
    /// A complete but malformed frame, discarded; the reader has already
    /// reset and will resynchronize on the next start flag
    Malformed(BridgeError),
}

/// Streaming frame reassembly over arbitrary byte chunks
///
/// Pure state machine: bytes in, at most one [`ReaderEvent`] out per feed.
/// Partial frames stay buffered indefinitely; timeout policy belongs to the
/// transport driving the reads.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    /// New reader with an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently buffered waiting for a stop flag
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk of raw serial bytes
    ///
    /// A start flag anywhere in the chunk discards any buffered partial frame
    /// and begins fresh at that flag; chunks arriving with no open buffer and
    /// no start flag are dropped. Once a stop flag lands, everything past it
    /// is discarded, the frame is validated and emitted, and the buffer
    /// resets. Checksum failures are non-fatal: the malformed frame comes
    /// back as [`ReaderEvent::Malformed`] and reassembly continues.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<ReaderEvent> {
        if let Some(start) = chunk.iter().position(|&b| b == STANDARD_START_FLAG) {
            if !self.buffer.is_empty() {
                debug!(
                    discarded = self.buffer.len(),
                    "new start flag, dropping partial frame"
                );
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&chunk[start..]);
        } else if !self.buffer.is_empty() {
            self.buffer.extend_from_slice(chunk);
        } else {
            // stray bytes with no frame open
            return None;
        }

        let stop = self.buffer.iter().position(|&b| b == STOP_FLAG)?;
        self.buffer.truncate(stop + 1);
        let raw = std::mem::take(&mut self.buffer);

        match Response::parse(raw) {
            Ok(response) => Some(ReaderEvent::Response(response)),
            Err(error) => {
                warn!(%error, "discarding malformed frame");
                Some(ReaderEvent::Malformed(error))
            }
        }
    }
}
