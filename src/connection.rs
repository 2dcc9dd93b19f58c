use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    sync::watch,
};

use crate::{
    lottery::coordinator::Handler,
    protocol::{
        deserializer::{Deserialize, DeserializeError},
        message::{Message, Response},
        serializer::Serialize,
    },
};

/// Serves a single agency until it disconnects, sends something we can't
/// parse, or the server starts shutting down.
///
/// `shutdown` is only honoured while no data is waiting, a message that
/// already started arriving is always answered.
pub async fn handle<S>(
    stream: S,
    coordinator: Handler,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    loop {
        // wait for the next message to start arriving, without consuming it.
        // pending data wins over shutdown
        let stopping = tokio::select! {
            biased;
            buffered = reader.fill_buf() => {
                buffered?;
                false
            }
            _ = shutdown.wait_for(|stop| *stop) => true,
        };
        if stopping {
            tracing::debug!("server is shutting down, closing the connection");
            break;
        }

        let message = match Message::deserialize(&mut reader).await {
            Ok(message) => message,
            Err(DeserializeError::Disconnected) => break,
            Err(DeserializeError::Io(err)) => {
                // the peer committed to a whole message, nothing left to answer
                tracing::warn!("connection lost in the middle of a message: {}", err);
                break;
            }
            Err(err) => {
                tracing::warn!("rejecting message: {}", err);
                Response::error().serialize(&mut writer).await?;
                writer.flush().await?;
                break;
            }
        };

        let response = dispatch(message, &coordinator).await;
        tracing::debug!("responded: {:?}", response);

        response.serialize(&mut writer).await?;
        writer.flush().await?;
    }

    if let Err(err) = writer.shutdown().await {
        tracing::debug!("failed to shut the connection down cleanly: {}", err);
    }

    Ok(())
}

async fn dispatch(message: Message, coordinator: &Handler) -> Response {
    match message {
        Message::Batch { agency, bets } => match coordinator.store(agency, bets).await {
            Ok(count) => {
                tracing::info!("stored a batch of {} bets from agency {}", count, agency);
                Response::ok()
            }
            Err(err) => {
                tracing::warn!("failed to store a batch from agency {}: {}", agency, err);
                Response::error()
            }
        },
        Message::Finished { agency } => match coordinator.mark_finished(agency).await {
            Ok(_) => Response::ok(),
            Err(err) => {
                tracing::warn!("failed to mark agency {} as finished: {}", agency, err);
                Response::error()
            }
        },
        Message::QueryWinners { agency } => match coordinator.winners(agency).await {
            Ok(Some(documents)) => {
                tracing::info!(
                    "returning {} winners to agency {}",
                    documents.len(),
                    agency
                );
                Response::winners(documents)
            }
            Ok(None) => {
                tracing::debug!("agency {} asked for winners before the draw", agency);
                Response::error()
            }
            Err(err) => {
                tracing::warn!("failed to find the winners of agency {}: {}", agency, err);
                Response::error()
            }
        },
    }
}
