use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncWriteExt;

use super::message::{status, BetRecord, Message, Response};

#[async_trait]
pub trait Serialize: Sized {
    type Error;

    /// Serialize a structure into a writer
    async fn serialize<W: AsyncWriteExt + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> Result<(), Self::Error>;
}

#[derive(thiserror::Error, Debug)]
pub enum SerializeError {
    #[error("The input is too long!")]
    TooLong,

    #[error("{0}")]
    Io(#[from] tokio::io::Error),
}

/// `OK` or `ERROR`, with no payload
pub fn encode_ack(ok: bool) -> Bytes {
    let status = if ok { status::OK } else { status::ERROR };
    Bytes::copy_from_slice(&[status])
}

/// `OK` followed by the count and the documents of the winners
pub fn encode_winners(documents: &[u32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 4 + documents.len() * 4);
    buf.put_u8(status::OK);
    // the documents come from our own store, one per accepted bet
    buf.put_u32(documents.len() as u32);
    for &document in documents {
        buf.put_u32(document);
    }

    buf.freeze()
}

fn put_str(buf: &mut BytesMut, text: &str) -> Result<(), SerializeError> {
    let length: u32 = text.len().try_into().map_err(|_| SerializeError::TooLong)?;

    buf.put_u32(length);
    buf.put_slice(text.as_bytes());

    Ok(())
}

fn put_bet(buf: &mut BytesMut, bet: &BetRecord) -> Result<(), SerializeError> {
    put_str(buf, &bet.first_name)?;
    put_str(buf, &bet.last_name)?;
    buf.put_u32(bet.document);
    buf.put_u32(bet.birth_date.packed());
    buf.put_u32(bet.number);

    Ok(())
}

/// Encodes a full message, envelope included, the way an agency sends it
pub fn encode_message(message: &Message) -> Result<Bytes, SerializeError> {
    let mut body = BytesMut::new();
    match message {
        Message::Batch { agency, bets } => {
            body.put_u32(*agency);
            let count: u32 = bets.len().try_into().map_err(|_| SerializeError::TooLong)?;
            body.put_u32(count);
            for bet in bets {
                put_bet(&mut body, bet)?;
            }
        }
        Message::Finished { agency } | Message::QueryWinners { agency } => body.put_u32(*agency),
    }

    let length: u32 = body.len().try_into().map_err(|_| SerializeError::TooLong)?;
    let mut buf = BytesMut::with_capacity(8 + body.len());
    buf.put_u32(message.message_type());
    buf.put_u32(length);
    buf.put(body);

    Ok(buf.freeze())
}

impl Response {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Response::Ack { ok } => encode_ack(*ok),
            Response::Winners { documents } => encode_winners(documents),
        }
    }
}

#[async_trait]
impl Serialize for Response {
    type Error = tokio::io::Error;

    async fn serialize<W: AsyncWriteExt + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> Result<(), Self::Error> {
        writer.write_all(&self.to_bytes()).await
    }
}

#[async_trait]
impl Serialize for Message {
    type Error = SerializeError;

    async fn serialize<W: AsyncWriteExt + Unpin + Send>(
        &self,
        writer: &mut W,
    ) -> Result<(), Self::Error> {
        let raw = encode_message(self)?;
        writer.write_all(&raw).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::{
        deserializer::Deserialize,
        message::{BetRecord, BirthDate, Message, Response},
        serializer::Serialize,
    };

    #[tokio::test]
    async fn serialize_responses() {
        let values = [
            Response::ok(),
            Response::error(),
            Response::winners(vec![]),
            Response::winners(vec![30904465, 28765432]),
        ];

        let mut serialized_values = Vec::with_capacity(values.len());
        for value in values {
            let mut raw = vec![];
            value.serialize(&mut raw).await.unwrap();
            serialized_values.push(raw);
        }

        let expected_values: [&[u8]; 4] = [
            b"\x00",
            b"\x01",
            b"\x00\x00\x00\x00\x00",
            b"\x00\x00\x00\x00\x02\x01\xd7\x90\x91\x01\xb6\xec\xf8",
        ];

        assert_eq!(serialized_values, expected_values)
    }

    #[tokio::test]
    async fn serialize_messages() {
        let values = [
            Message::Finished { agency: 1 },
            Message::QueryWinners { agency: 258 },
            Message::Batch {
                agency: 4,
                bets: vec![BetRecord {
                    first_name: "Ana".into(),
                    last_name: "Paz".into(),
                    document: 1,
                    birth_date: BirthDate::from_packed(20010830),
                    number: 5555,
                }],
            },
        ];

        let mut serialized_values = Vec::with_capacity(values.len());
        for value in values {
            let mut raw = vec![];
            value.serialize(&mut raw).await.unwrap();
            serialized_values.push(raw);
        }

        let expected_values: [&[u8]; 3] = [
            b"\x00\x00\x00\x02\x00\x00\x00\x04\x00\x00\x00\x01",
            b"\x00\x00\x00\x03\x00\x00\x00\x04\x00\x00\x01\x02",
            b"\x00\x00\x00\x01\x00\x00\x00\x22\x00\x00\x00\x04\x00\x00\x00\x01\
              \x00\x00\x00\x03\x41\x6e\x61\x00\x00\x00\x03\x50\x61\x7a\
              \x00\x00\x00\x01\x01\x31\x57\x4e\x00\x00\x15\xb3",
        ];

        assert_eq!(serialized_values, expected_values)
    }

    #[tokio::test]
    async fn batch_survives_the_wire_with_multibyte_names() {
        let batch = Message::Batch {
            agency: 3,
            bets: vec![
                BetRecord {
                    first_name: "José Ñandú".into(),
                    last_name: "Müller-李".into(),
                    document: 30904465,
                    birth_date: BirthDate::from_packed(19990317),
                    number: 7574,
                },
                BetRecord {
                    first_name: "Zoë".into(),
                    last_name: "Ångström 🎲".into(),
                    document: 4,
                    birth_date: BirthDate::from_packed(20231399),
                    number: 0,
                },
            ],
        };

        let mut raw = vec![];
        batch.serialize(&mut raw).await.unwrap();
        let decoded = Message::deserialize(&mut raw.as_slice()).await.unwrap();
        assert_eq!(decoded, batch);

        let Message::Batch { bets, .. } = decoded else {
            panic!("expected a batch");
        };
        assert_eq!(bets[0].birth_date.to_string(), "1999-03-17");
        assert_eq!(bets[1].birth_date.to_string(), "2023-13-99");
    }
}
