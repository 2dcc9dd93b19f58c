use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub type AgencyId = u32;

pub mod message_type {
    pub const BATCH: u32 = 1;
    pub const FINISHED: u32 = 2;
    pub const QUERY_WINNERS: u32 = 3;
}

pub mod status {
    pub const OK: u8 = 0;
    pub const ERROR: u8 = 1;
}

/// A birth date as it travels on the wire: `year * 10000 + month * 100 + day`.
///
/// No calendar validation happens anywhere, a month of 13 is carried and
/// rendered as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BirthDate(u32);

impl BirthDate {
    pub fn from_packed(packed: u32) -> Self {
        Self(packed)
    }

    pub fn packed(self) -> u32 {
        self.0
    }

    pub fn year(self) -> u32 {
        self.0 / 10000
    }

    pub fn month(self) -> u32 {
        (self.0 % 10000) / 100
    }

    pub fn day(self) -> u32 {
        self.0 % 100
    }
}

impl fmt::Display for BirthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid birth date: {0:?}")]
pub struct ParseBirthDateError(String);

impl FromStr for BirthDate {
    type Err = ParseBirthDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBirthDateError(s.to_owned());

        let mut parts = s.split('-').map(|part| part.parse::<u32>());
        let (Some(Ok(year)), Some(Ok(month)), Some(Ok(day)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        if month > 99 || day > 99 {
            return Err(err());
        }

        year.checked_mul(10000)
            .and_then(|packed| packed.checked_add(month * 100 + day))
            .map(Self)
            .ok_or_else(err)
    }
}

impl From<BirthDate> for String {
    fn from(date: BirthDate) -> Self {
        date.to_string()
    }
}

impl TryFrom<String> for BirthDate {
    type Error = ParseBirthDateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single bet as carried inside a batch frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetRecord {
    pub first_name: String,
    pub last_name: String,
    pub document: u32,
    pub birth_date: BirthDate,
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Batch {
        agency: AgencyId,
        bets: Vec<BetRecord>,
    },
    Finished {
        agency: AgencyId,
    },
    QueryWinners {
        agency: AgencyId,
    },
}

impl Message {
    pub fn message_type(&self) -> u32 {
        match self {
            Self::Batch { .. } => message_type::BATCH,
            Self::Finished { .. } => message_type::FINISHED,
            Self::QueryWinners { .. } => message_type::QUERY_WINNERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack { ok: bool },
    Winners { documents: Vec<u32> },
}

impl Response {
    pub fn ok() -> Self {
        Self::Ack { ok: true }
    }

    pub fn error() -> Self {
        Self::Ack { ok: false }
    }

    pub fn winners(documents: Vec<u32>) -> Self {
        Self::Winners { documents }
    }
}

#[cfg(test)]
mod tests {
    use super::BirthDate;

    #[test]
    fn birth_date_unpacking() {
        let date = BirthDate::from_packed(19990317);
        assert_eq!((date.year(), date.month(), date.day()), (1999, 3, 17));
        assert_eq!(date.to_string(), "1999-03-17");

        let date = BirthDate::from_packed(50101);
        assert_eq!(date.to_string(), "0005-01-01");
    }

    #[test]
    fn birth_date_is_not_validated() {
        let date = BirthDate::from_packed(20231399);
        assert_eq!(date.to_string(), "2023-13-99");
        assert_eq!("2023-13-99".parse::<BirthDate>(), Ok(date));
    }

    #[test]
    fn birth_date_parsing() {
        assert_eq!(
            "1987-11-15".parse::<BirthDate>(),
            Ok(BirthDate::from_packed(19871115))
        );

        for bad in ["", "1987-11", "1987-11-15-01", "1987-xx-15", "1987-100-01"] {
            assert!(bad.parse::<BirthDate>().is_err(), "{bad:?} should not parse");
        }
    }
}
