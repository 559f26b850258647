use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::api_client::{ClientError, EntitlementsApi},
    domain::value_objects::{enums::payment_statuses::PaymentStatus, payments::PaymentStatusResponse},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Final answer of a polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Payment succeeded. `already_processed` is set when fulfilment happened
    /// before this run observed it (webhook or an earlier check).
    Settled { already_processed: bool },
    Failed { reason: String },
    /// The attempt budget ran out while the payment was still in flight.
    StillProcessing,
}

impl PollOutcome {
    pub fn into_result(self, payment_intent_id: Uuid) -> Result<bool, ClientError> {
        match self {
            PollOutcome::Settled { already_processed } => Ok(already_processed),
            PollOutcome::Failed { reason } => Err(ClientError::PaymentProcessing(reason)),
            PollOutcome::StillProcessing => Err(ClientError::PaymentTimeout { payment_intent_id }),
        }
    }
}

/// Polling state. `Waiting` carries how many checks have been spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Waiting { attempts: u32 },
    Done(PollOutcome),
}

impl PollState {
    pub fn start() -> Self {
        PollState::Waiting { attempts: 0 }
    }

    /// Folds one status check into the state. Errors that are not retryable
    /// are returned to the caller untouched.
    pub fn advance(
        self,
        observed: Result<PaymentStatusResponse, ClientError>,
        max_attempts: u32,
    ) -> Result<PollState, ClientError> {
        let attempts = match self {
            PollState::Waiting { attempts } => attempts + 1,
            done @ PollState::Done(_) => return Ok(done),
        };

        let next = match observed {
            Ok(status) if status.already_processed || status.status == PaymentStatus::Succeeded => {
                PollState::Done(PollOutcome::Settled {
                    already_processed: status.already_processed,
                })
            }
            Ok(status) if status.status == PaymentStatus::Failed => PollState::Done(PollOutcome::Failed {
                reason: status.error.unwrap_or_else(|| "payment failed".to_string()),
            }),
            Ok(_) => PollState::Waiting { attempts },
            Err(err) if err.is_retryable() => PollState::Waiting { attempts },
            Err(err) => return Err(err),
        };

        match next {
            PollState::Waiting { attempts } if attempts >= max_attempts => {
                Ok(PollState::Done(PollOutcome::StillProcessing))
            }
            other => Ok(other),
        }
    }
}

/// Checks a payment intent on a fixed interval until it settles or the
/// attempt budget runs out.
pub struct PaymentPoller<A>
where
    A: EntitlementsApi + Send + Sync,
{
    api: Arc<A>,
    interval: Duration,
    max_attempts: u32,
}

impl<A> PaymentPoller<A>
where
    A: EntitlementsApi + Send + Sync,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn poll(&self, payment_intent_id: Uuid) -> Result<PollOutcome, ClientError> {
        let mut state = PollState::start();

        loop {
            let observed = self.api.payment_status(payment_intent_id).await;
            if let Err(err) = &observed {
                warn!(%payment_intent_id, error = %err, "payment poller: status check failed");
            }

            state = state.advance(observed, self.max_attempts)?;

            match &state {
                PollState::Done(outcome) => {
                    info!(%payment_intent_id, outcome = ?outcome, "payment poller: finished");
                    return Ok(outcome.clone());
                }
                PollState::Waiting { attempts } => {
                    debug!(%payment_intent_id, attempts, "payment poller: still processing");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api_client::{MockEntitlementsApi, error_from_body};
    use mockall::Sequence;
    use reqwest::StatusCode;

    fn status(status: PaymentStatus, already_processed: bool) -> PaymentStatusResponse {
        PaymentStatusResponse {
            success: true,
            payment_intent_id: Uuid::nil(),
            status,
            already_processed,
            processed: status == PaymentStatus::Succeeded,
            redirect_url: None,
            error: None,
        }
    }

    fn poller(api: MockEntitlementsApi, max_attempts: u32) -> PaymentPoller<MockEntitlementsApi> {
        PaymentPoller::new(Arc::new(api))
            .with_interval(Duration::ZERO)
            .with_max_attempts(max_attempts)
    }

    #[tokio::test]
    async fn test_redirect_payment_settles_after_a_few_checks() {
        let mut api = MockEntitlementsApi::new();
        let mut seq = Sequence::new();
        api.expect_payment_status()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(status(PaymentStatus::RequiresAction, false)));
        api.expect_payment_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(status(PaymentStatus::Succeeded, false)));

        let outcome = poller(api, 10).poll(Uuid::new_v4()).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Settled {
                already_processed: false
            }
        );
    }

    #[tokio::test]
    async fn test_already_processed_counts_as_settled() {
        let mut api = MockEntitlementsApi::new();
        api.expect_payment_status()
            .times(1)
            .returning(|_| Ok(status(PaymentStatus::Processing, true)));

        let outcome = poller(api, 10).poll(Uuid::new_v4()).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Settled {
                already_processed: true
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_still_processing() {
        let mut api = MockEntitlementsApi::new();
        api.expect_payment_status()
            .times(10)
            .returning(|_| Ok(status(PaymentStatus::Processing, false)));

        let id = Uuid::new_v4();
        let outcome = poller(api, 10).poll(id).await.unwrap();

        assert_eq!(outcome, PollOutcome::StillProcessing);
        assert_eq!(
            outcome.into_result(id),
            Err(ClientError::PaymentTimeout {
                payment_intent_id: id
            })
        );
    }

    #[tokio::test]
    async fn test_network_errors_are_retried_within_budget() {
        let mut api = MockEntitlementsApi::new();
        let mut seq = Sequence::new();
        api.expect_payment_status()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(ClientError::Network("connection reset".to_string())));
        api.expect_payment_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(status(PaymentStatus::Succeeded, false)));

        let outcome = poller(api, 3).poll(Uuid::new_v4()).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Settled { .. }));
    }

    #[tokio::test]
    async fn test_structured_gateway_errors_are_retried_within_budget() {
        let mut api = MockEntitlementsApi::new();
        let mut seq = Sequence::new();
        api.expect_payment_status()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(error_from_body(
                    StatusCode::BAD_GATEWAY,
                    r#"{"success":false,"code":"PROVIDER_UNAVAILABLE","error":"payment provider unavailable"}"#,
                ))
            });
        api.expect_payment_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(status(PaymentStatus::Succeeded, false)));

        let outcome = poller(api, 3).poll(Uuid::new_v4()).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Settled { .. }));
    }

    #[tokio::test]
    async fn test_provider_failure_is_terminal() {
        let mut api = MockEntitlementsApi::new();
        api.expect_payment_status().times(1).returning(|_| {
            Ok(PaymentStatusResponse {
                error: Some("Card was declined.".to_string()),
                ..status(PaymentStatus::Failed, false)
            })
        });

        let outcome = poller(api, 10).poll(Uuid::new_v4()).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: "Card was declined.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_retryable_errors_stop_polling() {
        let mut api = MockEntitlementsApi::new();
        api.expect_payment_status().times(1).returning(|_| {
            Err(ClientError::Api {
                status: 404,
                code: "NOT_FOUND".to_string(),
                message: "payment intent not found".to_string(),
            })
        });

        let result = poller(api, 10).poll(Uuid::new_v4()).await;

        assert!(matches!(result, Err(ClientError::Api { status: 404, .. })));
    }

    #[test]
    fn test_done_state_is_absorbing() {
        let done = PollState::Done(PollOutcome::StillProcessing);

        let next = done
            .clone()
            .advance(Ok(status(PaymentStatus::Succeeded, false)), 10)
            .unwrap();

        assert_eq!(next, done);
    }
}
