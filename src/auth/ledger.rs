use std::{collections::HashMap, sync::Mutex};

use uuid::Uuid;

/// Consumed reset-token ids, kept until the token would have expired anyway.
#[derive(Debug, Default)]
pub struct ResetLedger {
    used: Mutex<HashMap<Uuid, i64>>,
}

impl ResetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `jti` as used. Returns `false` if it was already consumed.
    pub fn try_consume(&self, jti: Uuid, exp: i64, now: i64) -> bool {
        let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
        used.retain(|_, until| *until > now);
        if used.contains_key(&jti) {
            return false;
        }
        used.insert(jti, exp);
        true
    }

    /// Gives back a claim whose password write did not go through.
    pub fn release(&self, jti: Uuid) {
        let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
        used.remove(&jti);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.used.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_consume_is_refused() {
        let ledger = ResetLedger::new();
        let jti = Uuid::new_v4();
        assert!(ledger.try_consume(jti, 1_000, 0));
        assert!(!ledger.try_consume(jti, 1_000, 10));
    }

    #[test]
    fn released_id_can_be_consumed_again() {
        let ledger = ResetLedger::new();
        let jti = Uuid::new_v4();
        assert!(ledger.try_consume(jti, 1_000, 0));
        ledger.release(jti);
        assert_eq!(ledger.len(), 0);
        assert!(ledger.try_consume(jti, 1_000, 10));
        assert!(!ledger.try_consume(jti, 1_000, 20));
    }

    #[test]
    fn expired_entries_are_purged() {
        let ledger = ResetLedger::new();
        assert!(ledger.try_consume(Uuid::new_v4(), 100, 0));
        assert!(ledger.try_consume(Uuid::new_v4(), 500, 0));
        assert_eq!(ledger.len(), 2);

        assert!(ledger.try_consume(Uuid::new_v4(), 900, 200));
        assert_eq!(ledger.len(), 2);
    }
}
