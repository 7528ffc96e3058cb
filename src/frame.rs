//! Length-prefixed framing of [`Request`] messages.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload,
//! the `bincode` encoding of one [`Request`].

use std::io::{self, Read, Write};

use crate::error::{JHelpError, Result};
use crate::protocol::Request;

/// Largest payload accepted on the wire.
pub const MAX_FRAME_LEN: usize = 16 << 20;

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Encode `request`, write it as one frame and flush.
pub fn write_request(writer: &mut impl Write, request: &Request) -> Result<()> {
    let payload = bincode::serde::encode_to_vec(request, config())?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(JHelpError::ProtocolViolation(format!(
            "frame of {} bytes exceeds {MAX_FRAME_LEN}",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read the next frame.
///
/// Returns `Ok(None)` when the peer closed the stream between frames. A
/// payload that is not a [`Request`] is a [`JHelpError::ProtocolViolation`];
/// the whole frame has been consumed by then, so the caller may keep reading.
pub fn read_request(reader: &mut impl Read) -> Result<Option<Request>> {
    let mut len = [0u8; 4];
    // Only EOF before the first length byte is a clean close.
    loop {
        match reader.read(&mut len[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    reader.read_exact(&mut len[1..])?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        // The payload is never read, so the stream cannot be resynchronized.
        return Err(JHelpError::Transport(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let (request, _) = bincode::serde::decode_from_slice::<Request, _>(&payload, config())
        .map_err(|e| JHelpError::ProtocolViolation(format!("undecodable request: {e}")))?;
    Ok(Some(request))
}
