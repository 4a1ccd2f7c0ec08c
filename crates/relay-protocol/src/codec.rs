use bytes::{Buf, BytesMut};

use crate::envelope::Envelope;

const LENGTH_PREFIX_BYTES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("envelope payload too large to frame ({0} bytes)")]
    PayloadTooLarge(usize),
    #[error("failed to serialize envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Encodes `envelope` as a length-prefixed frame: a 4-byte big-endian length
/// followed by the JSON body.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(envelope)?;
    let len: u32 = body
        .len()
        .try_into()
        .map_err(|_| CodecError::PayloadTooLarge(body.len()))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Streaming frame parser. Owns an internal buffer so callers can feed it
/// arbitrary, possibly partial, byte chunks as they arrive off a socket.
///
/// A frame whose body fails to deserialize as an [`Envelope`] is logged and
/// dropped; the parser has already consumed that frame's length-prefixed
/// bytes and stays synchronized to read the next frame's length prefix.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Appends `chunk` to the internal buffer and drains as many complete
    /// frames as are available, in arrival order. Any trailing partial frame
    /// remains buffered for the next call.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<Envelope> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            if self.buf.len() < LENGTH_PREFIX_BYTES {
                break;
            }
            let len = u32::from_be_bytes(self.buf[..LENGTH_PREFIX_BYTES].try_into().unwrap())
                as usize;
            if self.buf.len() < LENGTH_PREFIX_BYTES + len {
                break;
            }
            self.buf.advance(LENGTH_PREFIX_BYTES);
            let frame = self.buf.split_to(len);
            match serde_json::from_slice::<Envelope>(&frame) {
                Ok(envelope) => out.push(envelope),
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed frame, resynchronizing");
                }
            }
        }
        out
    }
}
