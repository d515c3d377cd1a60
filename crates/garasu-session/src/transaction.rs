//! Transaction coordinator for one unit of work.
//!
//! A [`TransactionManager`] owns the commit/abort decision for everything
//! that joined it. Sessions join through
//! [`crate::get_unit_of_work_session`]; other resources implement
//! [`Participant`] and call [`TransactionManager::join`].
//!
//! [`TransactionManager::run`] drives a whole unit of work: it runs the
//! closure, commits, and on a transient storage failure aborts and tries
//! again, up to the configured number of attempts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use garasu_core::{Error, Result};
use parking_lot::Mutex;

use crate::session::{FactoryId, Session, SessionFactory};
use crate::settings::{DEFAULT_RETRY_ATTEMPTS, Settings};

/// A resource whose outcome is decided by a [`TransactionManager`].
pub trait Participant: Send + Sync + fmt::Debug {
    /// Make the participant's work durable.
    fn commit(&self) -> Result<()>;

    /// Discard the participant's work.
    fn abort(&self) -> Result<()>;
}

impl Participant for Session {
    fn commit(&self) -> Result<()> {
        Session::commit(self)
    }

    fn abort(&self) -> Result<()> {
        self.rollback()
    }
}

/// Lifecycle of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug)]
struct TxState {
    status: TransactionStatus,
    participants: Vec<Arc<dyn Participant>>,
    sessions: HashMap<FactoryId, Arc<Session>>,
}

/// Coordinator of one unit of work.
#[derive(Debug)]
pub struct TransactionManager {
    retry_attempts: usize,
    state: Mutex<TxState>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// Coordinator allowing [`DEFAULT_RETRY_ATTEMPTS`] attempts.
    pub fn new() -> Self {
        Self::with_retry_attempts(DEFAULT_RETRY_ATTEMPTS)
    }

    /// Coordinator allowing `attempts` attempts in total (at least one).
    pub fn with_retry_attempts(attempts: usize) -> Self {
        Self {
            retry_attempts: attempts.max(1),
            state: Mutex::new(TxState {
                status: TransactionStatus::Active,
                participants: Vec::new(),
                sessions: HashMap::new(),
            }),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_retry_attempts(settings.retry_attempts)
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }

    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    pub fn participant_count(&self) -> usize {
        self.state.lock().participants.len()
    }

    /// Add `participant` to the unit of work.
    pub fn join(&self, participant: Arc<dyn Participant>) {
        tracing::debug!(participant = ?participant, "Participant joined");
        self.state.lock().participants.push(participant);
    }

    /// The session of `factory` for this unit of work, opened and joined on
    /// first use.
    pub(crate) fn session_for(&self, factory: &SessionFactory) -> Arc<Session> {
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get(&factory.id()) {
            return Arc::clone(session);
        }
        let session = Arc::new(factory.open());
        state.sessions.insert(factory.id(), Arc::clone(&session));
        state.participants.push(Arc::clone(&session) as Arc<dyn Participant>);
        tracing::debug!(factory = ?factory.id(), "Session joined unit of work");
        session
    }

    fn participants(&self) -> Vec<Arc<dyn Participant>> {
        self.state.lock().participants.clone()
    }

    fn set_status(&self, status: TransactionStatus) {
        self.state.lock().status = status;
    }

    /// Commit every participant, in join order.
    ///
    /// Stops at the first failure and returns it; the caller is expected to
    /// [`abort`](Self::abort) afterwards.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&self) -> Result<()> {
        if self.status() != TransactionStatus::Active {
            return Err(Error::config("transaction is not active"));
        }
        for participant in self.participants() {
            participant.commit()?;
        }
        self.set_status(TransactionStatus::Committed);
        tracing::info!("Transaction committed");
        Ok(())
    }

    /// Abort every participant.
    ///
    /// All participants are aborted even when one fails; the first failure
    /// is returned.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn abort(&self) -> Result<()> {
        let mut first_error = None;
        for participant in self.participants() {
            if let Err(err) = participant.abort() {
                tracing::warn!(error = %err, "Participant failed to abort");
                first_error.get_or_insert(err);
            }
        }
        self.set_status(TransactionStatus::Aborted);
        tracing::info!("Transaction aborted");
        first_error.map_or(Ok(()), Err)
    }

    /// Run `work` as a unit of work and commit it.
    ///
    /// When `work` or the commit fails, every participant is aborted. A
    /// retryable error starts another attempt with the same participants
    /// until [`retry_attempts`](Self::retry_attempts) attempts were made;
    /// any other error is returned at once.
    pub fn run<T, F>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(&Self) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            self.set_status(TransactionStatus::Active);
            let outcome = work(self).and_then(|value| self.commit().map(|()| value));
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let Err(abort_err) = self.abort() {
                tracing::warn!(error = %abort_err, "Abort after failed attempt also failed");
            }
            if !err.is_retryable() || attempt >= self.retry_attempts {
                tracing::info!(attempt, error = %err, "Unit of work failed");
                return Err(err);
            }
            tracing::warn!(
                attempt,
                max_attempts = self.retry_attempts,
                error = %err,
                "Retrying unit of work after transient failure"
            );
            attempt += 1;
        }
    }
}
