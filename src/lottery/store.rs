use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
};

use super::Bet;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only storage for bets
#[async_trait]
pub trait BetStore: Send + Sync {
    /// appends a batch of bets, keeping their order
    async fn append(&mut self, bets: Vec<Bet>) -> Result<(), StoreError>;

    /// starts a new pass over every bet appended so far, from the first one
    async fn all(&self) -> Result<Bets<'_>, StoreError>;
}

/// A lazy pass over the stored bets, in the order they were appended
pub enum Bets<'a> {
    Memory(std::slice::Iter<'a, Bet>),
    File(Lines<BufReader<File>>),
}

impl Bets<'_> {
    pub async fn next(&mut self) -> Option<Result<Bet, StoreError>> {
        match self {
            Bets::Memory(bets) => bets.next().cloned().map(Ok),
            Bets::File(lines) => match lines.next_line().await {
                Ok(Some(line)) => Some(serde_json::from_str(&line).map_err(StoreError::from)),
                Ok(None) => None,
                Err(err) => Some(Err(err.into())),
            },
        }
    }

    pub async fn collect(mut self) -> Result<Vec<Bet>, StoreError> {
        let mut bets = vec![];
        while let Some(bet) = self.next().await {
            bets.push(bet?);
        }

        Ok(bets)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore(Vec<Bet>);

#[async_trait]
impl BetStore for MemoryStore {
    async fn append(&mut self, bets: Vec<Bet>) -> Result<(), StoreError> {
        self.0.extend(bets);
        Ok(())
    }

    async fn all(&self) -> Result<Bets<'_>, StoreError> {
        Ok(Bets::Memory(self.0.iter()))
    }
}

/// Keeps the bets in a file, one JSON object per line
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
}

impl FileStore {
    /// Creates the store at the given path,
    /// discarding any bets left there by a previous run.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        File::create(&path).await?;
        let file = OpenOptions::new().append(true).open(&path).await?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BetStore for FileStore {
    async fn append(&mut self, bets: Vec<Bet>) -> Result<(), StoreError> {
        let mut buffer = vec![];
        for bet in &bets {
            serde_json::to_writer(&mut buffer, bet)?;
            buffer.push(b'\n');
        }

        // a batch goes in with a single write, if that fails cut the file
        // back so a half written batch never shows up in `all`
        let previous_len = self.file.metadata().await?.len();
        let written = match self.file.write_all(&buffer).await {
            Ok(()) => self.file.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            if let Err(truncate_err) = self.file.set_len(previous_len).await {
                tracing::error!(
                    "failed to roll back a partial batch in {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }

            return Err(err.into());
        }

        Ok(())
    }

    async fn all(&self) -> Result<Bets<'_>, StoreError> {
        let file = File::open(&self.path).await?;
        Ok(Bets::File(BufReader::new(file).lines()))
    }
}
