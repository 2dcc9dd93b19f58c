use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::protocol::message::{AgencyId, BetRecord, BirthDate};

use store::{BetStore, StoreError};

pub mod coordinator;
pub mod store;

/// The number every agency's bets are drawn against unless configured otherwise
pub const DEFAULT_WINNING_NUMBER: u32 = 7574;

/// A single lottery entry, as it is kept in the bet store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    agency: AgencyId,
    first_name: String,
    last_name: String,
    document: u32,
    birth_date: BirthDate,
    number: u32,
}

impl Bet {
    pub fn new(agency: AgencyId, record: BetRecord) -> Self {
        Self {
            agency,
            first_name: record.first_name,
            last_name: record.last_name,
            document: record.document,
            birth_date: record.birth_date,
            number: record.number,
        }
    }

    pub fn agency(&self) -> AgencyId {
        self.agency
    }

    pub fn document(&self) -> u32 {
        self.document
    }

    pub fn has_won(&self, winning_number: u32) -> bool {
        self.number == winning_number
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawState {
    Accumulating,
    Drawn,
}

#[derive(thiserror::Error, Debug)]
pub enum LotteryError {
    #[error("the draw has not happened yet")]
    NotDrawn,

    #[error("{0}")]
    Store(#[from] StoreError),
}

/// Every piece of state shared between agencies.
///
/// The lottery itself does no locking, it expects a single owner
/// (see [`coordinator::Coordinator`]) to serialize access to it.
pub struct Lottery {
    store: Box<dyn BetStore>,
    total_agencies: usize,
    finished: HashSet<AgencyId>,
    state: DrawState,
    winning_number: u32,
}

impl Lottery {
    pub fn new(
        store: Box<dyn BetStore>,
        total_agencies: usize,
        winning_number: u32,
    ) -> Self {
        Self {
            store,
            total_agencies,
            finished: HashSet::default(),
            state: DrawState::Accumulating,
            winning_number,
        }
    }

    /// Appends a whole batch of bets for an agency,
    /// returns the number of bets that were stored
    pub async fn store(
        &mut self,
        agency: AgencyId,
        bets: Vec<BetRecord>,
    ) -> Result<usize, StoreError> {
        let count = bets.len();
        let bets = bets
            .into_iter()
            .map(|record| Bet::new(agency, record))
            .collect();

        self.store.append(bets).await?;

        Ok(count)
    }

    /// Records that an agency has sent all of its bets, and runs the draw
    /// once the last agency reports in.
    ///
    /// returns true only for the call that triggered the draw
    pub fn mark_finished(&mut self, agency: AgencyId) -> bool {
        self.finished.insert(agency);

        if self.state == DrawState::Accumulating && self.finished.len() >= self.total_agencies {
            self.state = DrawState::Drawn;
            return true;
        }

        false
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> DrawState {
        self.state
    }

    pub fn finished_count(&self) -> usize {
        self.finished.len()
    }

    pub fn total_agencies(&self) -> usize {
        self.total_agencies
    }

    /// Returns the documents of the agency's winning bets, in store order
    pub async fn winners_for(&self, agency: AgencyId) -> Result<Vec<u32>, LotteryError> {
        if self.state != DrawState::Drawn {
            return Err(LotteryError::NotDrawn);
        }

        let mut winners = vec![];
        let mut bets = self.store.all().await?;
        while let Some(bet) = bets.next().await {
            let bet = bet?;
            if bet.agency() == agency && bet.has_won(self.winning_number) {
                winners.push(bet.document());
            }
        }

        Ok(winners)
    }

    #[cfg(test)]
    pub(crate) async fn bets(&self) -> Result<Vec<Bet>, StoreError> {
        self.store.all().await?.collect().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::protocol::message::{BetRecord, BirthDate};

    use super::{store::MemoryStore, DrawState, Lottery, LotteryError, DEFAULT_WINNING_NUMBER};

    pub(crate) fn record(name: &str, document: u32, number: u32) -> BetRecord {
        BetRecord {
            first_name: name.into(),
            last_name: "Lorca".into(),
            document,
            birth_date: BirthDate::from_packed(19990317),
            number,
        }
    }

    fn lottery(agencies: usize) -> Lottery {
        Lottery::new(Box::<MemoryStore>::default(), agencies, DEFAULT_WINNING_NUMBER)
    }

    #[tokio::test]
    async fn batches_keep_their_order() {
        let mut lottery = lottery(2);
        lottery
            .store(1, vec![record("a", 1, 10), record("b", 2, 20)])
            .await
            .unwrap();
        lottery.store(2, vec![record("c", 3, 30)]).await.unwrap();
        lottery.store(1, vec![]).await.unwrap();

        let stored: Vec<_> = lottery
            .bets()
            .await
            .unwrap()
            .iter()
            .map(|bet| (bet.agency(), bet.document()))
            .collect();
        assert_eq!(stored, [(1, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn mark_finished_is_idempotent() {
        let mut lottery = lottery(3);
        assert!(!lottery.mark_finished(1));
        assert!(!lottery.mark_finished(1));
        assert_eq!(lottery.finished_count(), 1);
        assert_eq!(lottery.state(), DrawState::Accumulating);
    }

    #[test]
    fn draw_happens_exactly_once() {
        let mut lottery = lottery(2);
        assert!(!lottery.mark_finished(2));
        assert!(lottery.mark_finished(1));
        assert_eq!(lottery.state(), DrawState::Drawn);

        // later reports never draw again
        assert!(!lottery.mark_finished(1));
        assert!(!lottery.mark_finished(3));
        assert_eq!(lottery.state(), DrawState::Drawn);
    }

    #[tokio::test]
    async fn no_winners_before_the_draw() {
        let mut lottery = lottery(1);
        lottery
            .store(1, vec![record("a", 1, DEFAULT_WINNING_NUMBER)])
            .await
            .unwrap();

        assert!(matches!(lottery.winners_for(1).await, Err(LotteryError::NotDrawn)));
    }

    #[tokio::test]
    async fn winners_are_filtered_by_agency_and_number() {
        let mut lottery = lottery(3);

        lottery
            .store(
                1,
                vec![
                    record("a", 30904465, DEFAULT_WINNING_NUMBER),
                    record("b", 31234567, 1234),
                ],
            )
            .await
            .unwrap();
        lottery.store(2, vec![]).await.unwrap();
        lottery.mark_finished(2);
        lottery
            .store(3, vec![record("c", 29876543, DEFAULT_WINNING_NUMBER)])
            .await
            .unwrap();
        lottery.mark_finished(3);
        assert!(lottery.mark_finished(1));

        assert_eq!(lottery.winners_for(1).await.unwrap(), [30904465]);
        assert_eq!(lottery.winners_for(2).await.unwrap(), Vec::<u32>::new());
        assert_eq!(lottery.winners_for(3).await.unwrap(), [29876543]);
    }

    #[tokio::test]
    async fn custom_winning_number() {
        let mut lottery = Lottery::new(Box::<MemoryStore>::default(), 1, 1234);
        lottery
            .store(
                1,
                vec![
                    record("a", 1, 1234),
                    record("b", 2, DEFAULT_WINNING_NUMBER),
                    record("c", 3, 1234),
                ],
            )
            .await
            .unwrap();
        lottery.mark_finished(1);

        assert_eq!(lottery.winners_for(1).await.unwrap(), [1, 3]);
    }
}
