pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reserving or issuing identifiers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected at construction; the allocator would never make progress.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The counter read could not be linearized against the store.
    #[error("counter read did not succeed")]
    ReadFailed,

    /// Another process advanced the counter between our read and write.
    #[error("lost reservation race at counter value {expected}")]
    LostRace { expected: u64 },

    /// The coordination store could not be reached or returned an error.
    #[error("coordination store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("counter value {value} cannot advance by {reservation}")]
    Overflow { value: u64, reservation: u64 },

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn store<E>(err: E) -> Error
    where
        E: Into<anyhow::Error>,
    {
        Error::Store(err.into())
    }

    /// Transient errors are worth another reservation attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ReadFailed | Error::LostRace { .. } | Error::Store(_)
        )
    }
}

pub fn is_retries_exhausted(e: &Error) -> bool {
    matches!(e, Error::RetriesExhausted { .. })
}

pub fn is_lost_race(e: &Error) -> bool {
    let mut cause = e;
    loop {
        match cause {
            Error::LostRace { .. } => return true,
            Error::RetriesExhausted { source, .. } => cause = source.as_ref(),
            _ => return false,
        }
    }
}
