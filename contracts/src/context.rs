//! Per-call execution context.

use thinkcoin_protocol::{AccountId, Clock, Timestamp};

/// The authenticated caller and the oracle time for a single operation.
///
/// The host builds one of these per call. Components never look anywhere
/// else for identity or time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Already-authenticated caller identity.
    pub caller: AccountId,
    /// Current Unix time from the oracle.
    pub now: Timestamp,
}

impl CallContext {
    /// Creates a context from explicit values.
    pub fn new(caller: AccountId, now: Timestamp) -> Self {
        Self { caller, now }
    }

    /// Creates a context stamped with the clock's current reading.
    pub fn at(caller: AccountId, clock: &dyn Clock) -> Self {
        Self {
            caller,
            now: clock.now(),
        }
    }

    /// The context a component uses when it calls another component under
    /// its own address. Time is preserved.
    pub fn as_contract(&self, contract: AccountId) -> Self {
        Self {
            caller: contract,
            now: self.now,
        }
    }
}
