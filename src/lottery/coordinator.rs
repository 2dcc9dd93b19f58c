use tokio::sync::{mpsc, oneshot};

use crate::protocol::message::{AgencyId, BetRecord};

use super::{store::StoreError, Lottery, LotteryError};

// every connection waits for its reply before sending another request,
// so the buffer only needs to cover a burst of agencies
const SYSTEM_BUFFER_SIZE: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    #[error("the lottery coordinator is no longer running")]
    Stopped,

    #[error("{0}")]
    Oneshot(#[from] oneshot::error::RecvError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

// Used for communication between the handler and the coordinator
enum InternalMessage {
    Store {
        agency: AgencyId,
        bets: Vec<BetRecord>,
        response: oneshot::Sender<Result<usize, StoreError>>,
    },
    MarkFinished {
        agency: AgencyId,
        response: oneshot::Sender<bool>,
    },
    Winners {
        agency: AgencyId,
        response: oneshot::Sender<Result<Option<Vec<u32>>, StoreError>>,
    },
}

/// Owns the lottery and applies every request to it, one at a time
pub struct Coordinator {
    lottery: Lottery,
}

impl Coordinator {
    /// Starts a new coordinator that owns the given lottery
    ///
    /// returns an handler that can be used to talk to it
    ///
    /// note: this function needs to be called from inside a tokio runtime context
    pub fn start(lottery: Lottery) -> Handler {
        let (tx, mut rx) = mpsc::channel(SYSTEM_BUFFER_SIZE);

        let mut this = Self { lottery };
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                this.handle(message).await;
            }

            tracing::debug!("all handlers are gone, stopping the coordinator");
        });

        Handler { sender: tx }
    }

    async fn handle(&mut self, message: InternalMessage) {
        // a dropped receiver only means the connection went away meanwhile
        match message {
            InternalMessage::Store {
                agency,
                bets,
                response,
            } => {
                let _ = response.send(self.lottery.store(agency, bets).await);
            }
            InternalMessage::MarkFinished { agency, response } => {
                let _ = response.send(self.mark_finished(agency));
            }
            InternalMessage::Winners { agency, response } => {
                let winners = match self.lottery.winners_for(agency).await {
                    Ok(winners) => Ok(Some(winners)),
                    Err(LotteryError::NotDrawn) => Ok(None),
                    Err(LotteryError::Store(err)) => Err(err),
                };
                let _ = response.send(winners);
            }
        }
    }

    fn mark_finished(&mut self, agency: AgencyId) -> bool {
        let drawn = self.lottery.mark_finished(agency);
        tracing::info!(
            "agency {} finished sending bets ({}/{})",
            agency,
            self.lottery.finished_count(),
            self.lottery.total_agencies()
        );

        if drawn {
            tracing::info!("every agency has finished, the draw took place");
        }

        drawn
    }
}

#[derive(Debug, Clone)]
pub struct Handler {
    sender: mpsc::Sender<InternalMessage>,
}

impl Handler {
    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> InternalMessage,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(message(tx))
            .await
            .map_err(|_| CoordinatorError::Stopped)?;

        Ok(rx.await?)
    }

    /// Stores a batch of bets for an agency,
    /// returns the number of bets that were stored
    pub async fn store(
        &self,
        agency: AgencyId,
        bets: Vec<BetRecord>,
    ) -> Result<usize, CoordinatorError> {
        let stored = self
            .request(|response| InternalMessage::Store {
                agency,
                bets,
                response,
            })
            .await??;

        Ok(stored)
    }

    /// Marks an agency as done sending bets,
    /// returns true if this was the report that triggered the draw
    pub async fn mark_finished(&self, agency: AgencyId) -> Result<bool, CoordinatorError> {
        self.request(|response| InternalMessage::MarkFinished { agency, response })
            .await
    }

    /// Returns the winners of an agency, or None if the draw didn't happen yet
    pub async fn winners(&self, agency: AgencyId) -> Result<Option<Vec<u32>>, CoordinatorError> {
        let winners = self
            .request(|response| InternalMessage::Winners { agency, response })
            .await??;

        Ok(winners)
    }
}
