use std::collections::HashMap;

use crate::domain::value_objects::{credits::CreditBalanceDto, enums::credit_types::CreditType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingDelta {
    credit_type: CreditType,
    delta: i32,
    seq: u64,
}

/// Client-side view of credit balances.
///
/// `confirmed` mirrors what the server last reported. Mutations that are in
/// flight are kept as deltas keyed by request id until the server answers, so
/// the displayed value can move immediately and be undone exactly.
///
/// Every applied request is stamped with a sequence number. Answers can come
/// back in any order, so `confirmed_seq` records the newest request whose
/// answer has been taken as the confirmed value.
#[derive(Debug, Clone, Default)]
pub struct OptimisticLedger {
    confirmed: HashMap<CreditType, i32>,
    pending: HashMap<String, PendingDelta>,
    confirmed_seq: HashMap<CreditType, u64>,
    next_seq: u64,
}

impl OptimisticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirmed(&self, credit_type: CreditType) -> i32 {
        self.confirmed.get(&credit_type).copied().unwrap_or(0)
    }

    /// Confirmed balance plus every in-flight delta, never below zero.
    pub fn displayed(&self, credit_type: CreditType) -> i32 {
        let pending: i32 = self
            .pending
            .values()
            .filter(|pending| pending.credit_type == credit_type)
            .map(|pending| pending.delta)
            .sum();
        (self.confirmed(credit_type) + pending).max(0)
    }

    pub fn has_pending(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Applying the same request id twice replaces the earlier delta.
    pub fn apply(&mut self, request_id: impl Into<String>, credit_type: CreditType, delta: i32) {
        self.next_seq += 1;
        self.pending.insert(
            request_id.into(),
            PendingDelta {
                credit_type,
                delta,
                seq: self.next_seq,
            },
        );
    }

    /// The server accepted the request and reported `server_balance`.
    ///
    /// An answer for a request older than one already confirmed is stale. A
    /// stale debit answer can still only lower the balance, so the smaller of
    /// the two values is kept. Other stale answers are ignored.
    pub fn confirm(&mut self, request_id: &str, credit_type: CreditType, server_balance: i32) {
        let Some(pending) = self.pending.remove(request_id) else {
            self.confirmed.insert(credit_type, server_balance);
            return;
        };

        let latest = self.confirmed_seq.get(&credit_type).copied().unwrap_or(0);
        if pending.seq > latest {
            self.confirmed_seq.insert(credit_type, pending.seq);
            self.confirmed.insert(credit_type, server_balance);
        } else if pending.delta < 0 {
            let current = self.confirmed(credit_type);
            self.confirmed.insert(credit_type, current.min(server_balance));
        }
    }

    /// The request failed; its delta is dropped and nothing else changes.
    pub fn rollback(&mut self, request_id: &str) -> bool {
        self.pending.remove(request_id).is_some()
    }

    pub fn set_confirmed(&mut self, credit_type: CreditType, balance: i32) {
        self.confirmed.insert(credit_type, balance);
    }

    /// Replaces confirmed balances with a full server snapshot. Types missing
    /// from the snapshot drop to zero. In-flight deltas stay until their
    /// request answers.
    pub fn reconcile(&mut self, balances: &[CreditBalanceDto]) {
        self.confirmed = balances
            .iter()
            .map(|balance| {
                let spendable = if balance.expired { 0 } else { balance.balance };
                (balance.credit_type, spendable)
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(credit_type: CreditType, balance: i32, expired: bool) -> CreditBalanceDto {
        CreditBalanceDto {
            credit_type,
            balance,
            used: 0,
            total: balance,
            expires_at: None,
            expired,
        }
    }

    #[test]
    fn test_pending_debit_is_visible_then_confirmed() {
        let mut ledger = OptimisticLedger::new();
        ledger.set_confirmed(CreditType::AiCredit, 10);

        ledger.apply("req-1", CreditType::AiCredit, -1);
        assert_eq!(ledger.displayed(CreditType::AiCredit), 9);
        assert_eq!(ledger.confirmed(CreditType::AiCredit), 10);

        ledger.confirm("req-1", CreditType::AiCredit, 9);
        assert_eq!(ledger.displayed(CreditType::AiCredit), 9);
        assert!(!ledger.has_pending("req-1"));
    }

    #[test]
    fn test_rollback_restores_the_confirmed_value() {
        let mut ledger = OptimisticLedger::new();
        ledger.set_confirmed(CreditType::ResumeView, 2);
        ledger.apply("req-1", CreditType::ResumeView, -1);
        ledger.apply("req-2", CreditType::ResumeView, -1);

        assert!(ledger.rollback("req-1"));
        assert!(!ledger.rollback("req-1"));
        assert_eq!(ledger.displayed(CreditType::ResumeView), 1);
    }

    #[test]
    fn test_late_answer_for_an_earlier_debit_does_not_raise_the_balance() {
        let mut ledger = OptimisticLedger::new();
        ledger.set_confirmed(CreditType::AiCredit, 10);
        ledger.apply("a", CreditType::AiCredit, -1);
        ledger.apply("b", CreditType::AiCredit, -1);
        assert_eq!(ledger.displayed(CreditType::AiCredit), 8);

        ledger.confirm("b", CreditType::AiCredit, 8);
        ledger.confirm("a", CreditType::AiCredit, 9);

        assert_eq!(ledger.confirmed(CreditType::AiCredit), 8);
        assert_eq!(ledger.displayed(CreditType::AiCredit), 8);
    }

    #[test]
    fn test_debits_served_out_of_order_settle_on_the_lowest_answer() {
        let mut ledger = OptimisticLedger::new();
        ledger.set_confirmed(CreditType::ResumeView, 5);
        ledger.apply("a", CreditType::ResumeView, -1);
        ledger.apply("b", CreditType::ResumeView, -1);

        // The server handled b first, so a carries the final balance.
        ledger.confirm("b", CreditType::ResumeView, 4);
        ledger.confirm("a", CreditType::ResumeView, 3);

        assert_eq!(ledger.displayed(CreditType::ResumeView), 3);
    }

    #[test]
    fn test_in_order_answers_follow_the_server() {
        let mut ledger = OptimisticLedger::new();
        ledger.set_confirmed(CreditType::JobPosting, 1);
        ledger.apply("debit", CreditType::JobPosting, -1);
        ledger.confirm("debit", CreditType::JobPosting, 0);
        ledger.apply("top-up", CreditType::JobPosting, 5);
        ledger.confirm("top-up", CreditType::JobPosting, 5);

        assert_eq!(ledger.displayed(CreditType::JobPosting), 5);
    }

    #[test]
    fn test_reconcile_keeps_in_flight_deltas() {
        let mut ledger = OptimisticLedger::new();
        ledger.set_confirmed(CreditType::JobPosting, 1);
        ledger.apply("req-1", CreditType::JobPosting, -1);

        ledger.reconcile(&[
            balance(CreditType::JobPosting, 6, false),
            balance(CreditType::FeaturedJob, 3, true),
        ]);

        assert_eq!(ledger.confirmed(CreditType::JobPosting), 6);
        assert_eq!(ledger.displayed(CreditType::JobPosting), 5);
        assert_eq!(ledger.displayed(CreditType::FeaturedJob), 0);
    }
}
