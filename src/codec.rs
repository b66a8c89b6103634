//! Length-prefixed JSON framing
//!
//! Every frame is a 4-byte little-endian body length followed by one JSON
//! encoded message.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ServerError;

/// Largest accepted frame body: 32MB
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Decodes `D` frames and encodes `E` frames
#[derive(Debug)]
pub struct JsonFrameCodec<D, E> {
    _marker: PhantomData<fn(E) -> D>,
}

impl<D, E> JsonFrameCodec<D, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for JsonFrameCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E: Serialize> Encoder<E> for JsonFrameCodec<D, E> {
    type Error = ServerError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(ServerError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(LENGTH_PREFIX + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl<D: DeserializeOwned, E> Decoder for JsonFrameCodec<D, E> {
    type Item = D;
    type Error = ServerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LENGTH_PREFIX];
        len_bytes.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(ServerError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let body = src.split_to(len);

        Ok(Some(serde_json::from_slice(&body)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
