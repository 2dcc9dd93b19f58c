use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio::io::AsyncReadExt;

use super::{
    message::{message_type, BetRecord, BirthDate, Message},
    MAX_FRAME_LEN, MIN_BET_RECORD_LEN,
};

#[async_trait]
pub trait Deserialize: Sized {
    type Error;

    // Deserialize a structure from a reader
    async fn deserialize<R: AsyncReadExt + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self, Self::Error>;
}

/// Decodes a structure out of a frame that was already fully received
pub trait Decode: Sized {
    fn decode(frame: &mut Bytes) -> Result<Self, FrameError>;
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("{0}")]
    Utf(#[from] std::string::FromUtf8Error),

    #[error("expected {needed} more bytes, but the frame only holds {remaining}")]
    Short { needed: usize, remaining: usize },

    #[error("{0} unexpected bytes at the end of the frame")]
    TrailingBytes(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum DeserializeError {
    #[error("the peer disconnected")]
    Disconnected,

    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(u32),

    #[error("declared frame length {0} is over the limit")]
    FrameTooLarge(u32),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
}

fn ensure_remaining(frame: &Bytes, needed: usize) -> Result<(), FrameError> {
    if frame.remaining() < needed {
        return Err(FrameError::Short {
            needed,
            remaining: frame.remaining(),
        });
    }

    Ok(())
}

impl Decode for u32 {
    fn decode(frame: &mut Bytes) -> Result<Self, FrameError> {
        ensure_remaining(frame, 4)?;
        Ok(frame.get_u32())
    }
}

impl Decode for String {
    fn decode(frame: &mut Bytes) -> Result<Self, FrameError> {
        let length = u32::decode(frame)? as usize;
        ensure_remaining(frame, length)?;

        let raw = frame.split_to(length);
        Ok(String::from_utf8(raw.to_vec())?)
    }
}

impl Decode for BirthDate {
    fn decode(frame: &mut Bytes) -> Result<Self, FrameError> {
        Ok(BirthDate::from_packed(u32::decode(frame)?))
    }
}

impl Decode for BetRecord {
    fn decode(frame: &mut Bytes) -> Result<Self, FrameError> {
        Ok(Self {
            first_name: String::decode(frame)?,
            last_name: String::decode(frame)?,
            document: u32::decode(frame)?,
            birth_date: BirthDate::decode(frame)?,
            number: u32::decode(frame)?,
        })
    }
}

impl Decode for Vec<BetRecord> {
    fn decode(frame: &mut Bytes) -> Result<Self, FrameError> {
        let count = u32::decode(frame)? as usize;

        // never trust the count for the allocation, the frame bounds it anyway
        let mut bets = Vec::with_capacity(count.min(frame.remaining() / MIN_BET_RECORD_LEN));
        for _ in 0..count {
            bets.push(BetRecord::decode(frame)?);
        }

        Ok(bets)
    }
}

fn decode_batch(frame: &mut Bytes) -> Result<Message, FrameError> {
    Ok(Message::Batch {
        agency: u32::decode(frame)?,
        bets: Vec::decode(frame)?,
    })
}

fn decode_finished(frame: &mut Bytes) -> Result<Message, FrameError> {
    Ok(Message::Finished {
        agency: u32::decode(frame)?,
    })
}

fn decode_query_winners(frame: &mut Bytes) -> Result<Message, FrameError> {
    Ok(Message::QueryWinners {
        agency: u32::decode(frame)?,
    })
}

/// reads the 4-byte message type that opens every message.
///
/// reaching EOF before the first byte is a clean disconnect,
/// reaching it anywhere after that is an I/O error.
async fn read_message_type<R: AsyncReadExt + Unpin + Send>(
    reader: &mut R,
) -> Result<u32, DeserializeError> {
    let mut raw = [0u8; 4];
    let mut filled = 0;

    while filled < raw.len() {
        let rcount = reader.read(&mut raw[filled..]).await?;
        if rcount == 0 {
            if filled == 0 {
                return Err(DeserializeError::Disconnected);
            }

            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::UnexpectedEof,
                "reached EOF in the middle of a message type",
            )
            .into());
        }
        filled += rcount;
    }

    Ok(u32::from_be_bytes(raw))
}

/// reads the length-prefixed body of a message as a single frame
async fn read_frame<R: AsyncReadExt + Unpin + Send>(
    reader: &mut R,
) -> Result<Bytes, DeserializeError> {
    let length = reader.read_u32().await?;
    if length as usize > MAX_FRAME_LEN {
        return Err(DeserializeError::FrameTooLarge(length));
    }

    // let the buffer grow with the data that actually arrives
    let mut body = Vec::new();
    (&mut *reader)
        .take(length as u64)
        .read_to_end(&mut body)
        .await?;
    if body.len() != length as usize {
        return Err(tokio::io::Error::new(
            tokio::io::ErrorKind::UnexpectedEof,
            format!(
                "reached EOF after {} of {} frame bytes",
                body.len(),
                length
            ),
        )
        .into());
    }

    Ok(body.into())
}

#[async_trait]
impl Deserialize for Message {
    type Error = DeserializeError;

    async fn deserialize<R: AsyncReadExt + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self, Self::Error> {
        let ty = read_message_type(reader).await?;

        let decode: fn(&mut Bytes) -> Result<Message, FrameError> = match ty {
            message_type::BATCH => decode_batch,
            message_type::FINISHED => decode_finished,
            message_type::QUERY_WINNERS => decode_query_winners,

            _ => return Err(DeserializeError::UnknownType(ty)),
        };

        let mut frame = read_frame(reader).await?;
        let msg = decode(&mut frame)?;
        if frame.has_remaining() {
            return Err(FrameError::TrailingBytes(frame.remaining()).into());
        }

        Ok(msg)
    }
}
