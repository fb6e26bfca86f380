//! Application-number allocation.
//!
//! Numbers come from a dedicated counter kept in the record store and advanced with an atomic
//! fetch-and-increment, never from the number of stored applications. The counter therefore
//! survives deletions, and two concurrent submissions can never draw the same value. Inserts
//! still run through [`SequenceAllocator::assign`], which retries with a fresh number when the
//! store reports a duplicate, so a counter that was seeded too low heals itself.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::repository::RepositoryError;

pub const APPLICATION_NUMBER_PREFIX: &str = "APP";
pub const APPLICATION_NUMBER_DIGITS: usize = 6;
/// Highest sequence that still renders in six digits.
pub const MAX_APPLICATION_SEQUENCE: u64 = 999_999;
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 5;

/// Human-facing identifier of the form `APP000123`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationNumber(u32);

impl ApplicationNumber {
    pub fn from_sequence(sequence: u64) -> Result<Self, AllocationError> {
        if sequence == 0 || sequence > MAX_APPLICATION_SEQUENCE {
            return Err(AllocationError::OutOfRange(sequence));
        }
        Ok(Self(sequence as u32))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.strip_prefix(APPLICATION_NUMBER_PREFIX)?;
        if digits.len() != APPLICATION_NUMBER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let sequence: u64 = digits.parse().ok()?;
        Self::from_sequence(sequence).ok()
    }

    pub fn sequence(self) -> u64 {
        u64::from(self.0)
    }
}

impl fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{APPLICATION_NUMBER_PREFIX}{:0width$}",
            self.0,
            width = APPLICATION_NUMBER_DIGITS
        )
    }
}

impl From<ApplicationNumber> for String {
    fn from(value: ApplicationNumber) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ApplicationNumber {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("'{value}' is not a valid application number"))
    }
}

/// Storage primitive behind the allocator.
pub trait SequenceCounter: Send + Sync {
    /// Atomically advance the application-number counter and return the new value.
    fn next_sequence(&self) -> Result<u64, RepositoryError>;
}

/// Errors raised while assigning an application number.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("application number sequence {0} is outside the six-digit range")]
    OutOfRange(u64),
    #[error("could not assign a unique application number after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Hands out application numbers and drives insert attempts until one sticks.
pub struct SequenceAllocator<C: ?Sized> {
    counter: Arc<C>,
    max_attempts: u32,
}

impl<C> SequenceAllocator<C>
where
    C: SequenceCounter + ?Sized,
{
    pub fn new(counter: Arc<C>) -> Self {
        Self::with_max_attempts(counter, DEFAULT_ALLOCATION_ATTEMPTS)
    }

    pub fn with_max_attempts(counter: Arc<C>, max_attempts: u32) -> Self {
        Self {
            counter,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw the next number without persisting anything.
    pub fn allocate(&self) -> Result<ApplicationNumber, AllocationError> {
        let sequence = self.counter.next_sequence()?;
        ApplicationNumber::from_sequence(sequence)
    }

    /// Run `attempt` with freshly drawn numbers until it succeeds, fails for a reason other than
    /// a duplicate number, or the attempt budget runs out.
    pub fn assign<T, F>(&self, mut attempt: F) -> Result<T, AllocationError>
    where
        F: FnMut(ApplicationNumber) -> Result<T, RepositoryError>,
    {
        for round in 1..=self.max_attempts {
            let number = self.allocate()?;
            match attempt(number) {
                Ok(value) => return Ok(value),
                Err(RepositoryError::DuplicateApplicationNumber(taken)) => {
                    warn!(
                        application_number = %taken,
                        attempt = round,
                        max_attempts = self.max_attempts,
                        "application number already taken, drawing another"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(AllocationError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
