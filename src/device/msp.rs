//! `MultiWii` Serial Protocol (v1) framing.
//!
//! Requests are `$M<` `len` `cmd` `payload..` `checksum`, replies start with `$M>`
//! (or `$M!` when the board rejects the command). The checksum is the XOR of the
//! length, the command and every payload byte.

pub const MSP_RAW_IMU: u8 = 102;
pub const MSP_MOTOR: u8 = 104;
pub const MSP_ATTITUDE: u8 = 108;
pub const MSP_ANALOG: u8 = 110;
pub const MSP_SET_RAW_RC: u8 = 200;
pub const MSP_ACC_CALIBRATION: u8 = 205;

const PREAMBLE: [u8; 2] = [b'$', b'M'];
const TO_BOARD: u8 = b'<';
const FROM_BOARD: u8 = b'>';
const ERROR: u8 = b'!';
/// Preamble, direction, length and command.
const HEADER_LEN: usize = 5;

/// A reply frame received from the board.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MspFrame {
    pub cmd: u8,
    pub payload: Vec<u8>,
    /// Set when the board answered with `$M!`.
    pub rejected: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MspError {
    PayloadTooLong(usize),
    BadDirection(u8),
    BadChecksum { expected: u8, got: u8 },
}

impl MspError {
    pub fn reason(self) -> &'static str {
        match self {
            MspError::PayloadTooLong(_) => "payload exceeds 255 bytes",
            MspError::BadDirection(_) => "unexpected frame direction",
            MspError::BadChecksum { .. } => "checksum mismatch",
        }
    }
}

fn checksum(len: u8, cmd: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(len ^ cmd, |acc, b| acc ^ b)
}

/// Encodes a request frame.
pub fn encode_request(cmd: u8, payload: &[u8]) -> Result<Vec<u8>, MspError> {
    let len = u8::try_from(payload.len()).map_err(|_| MspError::PayloadTooLong(payload.len()))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    frame.extend_from_slice(&PREAMBLE);
    frame.push(TO_BOARD);
    frame.push(len);
    frame.push(cmd);
    frame.extend_from_slice(payload);
    frame.push(checksum(len, cmd, payload));
    Ok(frame)
}

/// Encodes the channels as little-endian `i16` values, as `SET_RAW_RC` expects.
/// Values outside the `i16` range saturate.
pub fn encode_channels(channels: &[i32]) -> Vec<u8> {
    channels
        .iter()
        .map(|&c| i16::try_from(c).unwrap_or(if c < 0 { i16::MIN } else { i16::MAX }))
        .flat_map(i16::to_le_bytes)
        .collect()
}

/// Tries to decode one reply from the front of `buf`.
///
/// Leading garbage up to the next preamble is skipped. Returns the frame and the
/// number of consumed bytes, or `Ok(None)` while the frame is still incomplete.
pub fn decode_reply(buf: &[u8]) -> Result<Option<(MspFrame, usize)>, MspError> {
    let Some(start) = buf.windows(2).position(|w| w == PREAMBLE) else {
        return Ok(None);
    };
    let frame = &buf[start..];
    if frame.len() < HEADER_LEN {
        return Ok(None);
    }
    let rejected = match frame[2] {
        FROM_BOARD => false,
        ERROR => true,
        other => return Err(MspError::BadDirection(other)),
    };
    let (len, cmd) = (frame[3], frame[4]);
    let total = HEADER_LEN + usize::from(len) + 1;
    if frame.len() < total {
        return Ok(None);
    }
    let payload = &frame[HEADER_LEN..total - 1];
    let expected = checksum(len, cmd, payload);
    let got = frame[total - 1];
    if expected != got {
        return Err(MspError::BadChecksum { expected, got });
    }
    Ok(Some((MspFrame { cmd, payload: payload.to_vec(), rejected }, start + total)))
}

/// Drops leading bytes that cannot be the start of a reply frame.
///
/// A trailing `$` is kept, its `M` may still be in flight.
pub fn discard_noise(buf: &mut Vec<u8>) {
    let keep_from = buf.windows(2).position(|w| w == PREAMBLE).unwrap_or_else(|| {
        if buf.last() == Some(&PREAMBLE[0]) { buf.len() - 1 } else { buf.len() }
    });
    buf.drain(..keep_from);
}

/// Reads little-endian `i16` words from a payload.
pub fn read_i16s(payload: &[u8]) -> Vec<i16> {
    payload.chunks_exact(2).map(|w| i16::from_le_bytes([w[0], w[1]])).collect()
}

/// Reads little-endian `u16` words from a payload.
pub fn read_u16s(payload: &[u8]) -> Vec<u16> {
    payload.chunks_exact(2).map(|w| u16::from_le_bytes([w[0], w[1]])).collect()
}
