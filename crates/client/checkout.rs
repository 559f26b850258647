use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    client::{
        api_client::{ClientError, EntitlementsApi},
        poller::{PaymentPoller, PollOutcome},
    },
    domain::value_objects::payments::{
        BillingDetails, CreatePaymentMethodRequest, PaymentMethodDetails, ProcessPaymentRequest,
    },
};

/// Where a checkout stands after the payment was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStep {
    /// Paid and fulfilled.
    Completed,
    /// The payer must finish on the provider's page, then call
    /// [`Checkout::await_settlement`].
    Redirect { redirect_url: String },
    /// Submitted but not settled yet; poll with [`Checkout::await_settlement`].
    Processing,
}

/// Client-side payment flow: attach a method, submit, then reconcile.
pub struct Checkout<A>
where
    A: EntitlementsApi + Send + Sync,
{
    api: Arc<A>,
    poller: PaymentPoller<A>,
}

impl<A> Checkout<A>
where
    A: EntitlementsApi + Send + Sync,
{
    pub fn new(api: Arc<A>, poller: PaymentPoller<A>) -> Self {
        Self { api, poller }
    }

    pub async fn pay(
        &self,
        payment_intent_id: Uuid,
        details: PaymentMethodDetails,
        billing: Option<BillingDetails>,
        return_url: Option<String>,
    ) -> Result<CheckoutStep, ClientError> {
        let method_type = details.kind();
        let method = self
            .api
            .create_payment_method(CreatePaymentMethodRequest { details, billing })
            .await?;

        let processed = self
            .api
            .process_payment(ProcessPaymentRequest {
                payment_intent_id,
                payment_method_id: method.payment_method_id,
                method_type: Some(method_type),
                return_url,
            })
            .await?;

        if let Some(error) = processed.error.filter(|_| !processed.success) {
            return Err(ClientError::PaymentProcessing(error));
        }

        let step = if processed.processed {
            CheckoutStep::Completed
        } else if let Some(redirect_url) = processed.redirect_url.filter(|_| processed.requires_action) {
            CheckoutStep::Redirect { redirect_url }
        } else {
            CheckoutStep::Processing
        };

        info!(%payment_intent_id, step = ?step, "checkout: payment submitted");
        Ok(step)
    }

    /// Polls until the payment settles. Timeouts surface as
    /// [`ClientError::PaymentTimeout`] and leave the payment untouched.
    pub async fn await_settlement(&self, payment_intent_id: Uuid) -> Result<bool, ClientError> {
        let outcome: PollOutcome = self.poller.poll(payment_intent_id).await?;
        outcome.into_result(payment_intent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{
        client::api_client::MockEntitlementsApi,
        domain::value_objects::{
            enums::payment_statuses::PaymentStatus,
            payments::{
                CardDetails, CreatePaymentMethodResponse, PaymentStatusResponse, ProcessOutcome,
                ProcessPaymentResponse,
            },
        },
    };

    fn checkout(api: MockEntitlementsApi) -> Checkout<MockEntitlementsApi> {
        let api = Arc::new(api);
        let poller = PaymentPoller::new(Arc::clone(&api)).with_interval(Duration::ZERO);
        Checkout::new(api, poller)
    }

    fn expect_method(api: &mut MockEntitlementsApi, id: &'static str) {
        api.expect_create_payment_method().times(1).returning(move |_| {
            Ok(CreatePaymentMethodResponse {
                success: true,
                payment_method_id: id.to_string(),
            })
        });
    }

    #[tokio::test]
    async fn test_card_payment_completes_immediately() {
        let intent_id = Uuid::new_v4();
        let mut api = MockEntitlementsApi::new();
        expect_method(&mut api, "pm_card");
        api.expect_process_payment()
            .withf(|req| req.payment_method_id == "pm_card")
            .times(1)
            .returning(move |req| {
                Ok(ProcessPaymentResponse::from_outcome(
                    req.payment_intent_id,
                    &ProcessOutcome::Succeeded,
                ))
            });
        api.expect_payment_status().never();

        let card = PaymentMethodDetails::Card(CardDetails {
            card_number: "4343434343434345".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
        });
        let step = checkout(api).pay(intent_id, card, None, None).await.unwrap();

        assert_eq!(step, CheckoutStep::Completed);
    }

    #[tokio::test]
    async fn test_gcash_redirects_then_settles_by_polling() {
        let intent_id = Uuid::new_v4();
        let mut api = MockEntitlementsApi::new();
        expect_method(&mut api, "pm_gcash");
        api.expect_process_payment().times(1).returning(|req| {
            Ok(ProcessPaymentResponse::from_outcome(
                req.payment_intent_id,
                &ProcessOutcome::RequiresAction {
                    redirect_url: "https://pm.link/gcash/auth".to_string(),
                },
            ))
        });
        api.expect_payment_status().times(1).returning(|id| {
            Ok(PaymentStatusResponse {
                success: true,
                payment_intent_id: id,
                status: PaymentStatus::Succeeded,
                already_processed: true,
                processed: true,
                redirect_url: None,
                error: None,
            })
        });

        let checkout = checkout(api);
        let step = checkout
            .pay(intent_id, PaymentMethodDetails::GCash, None, Some("https://app/return".into()))
            .await
            .unwrap();
        assert_eq!(
            step,
            CheckoutStep::Redirect {
                redirect_url: "https://pm.link/gcash/auth".to_string()
            }
        );

        let already_processed = checkout.await_settlement(intent_id).await.unwrap();
        assert!(already_processed);
    }

    #[tokio::test]
    async fn test_failed_processing_is_reported() {
        let mut api = MockEntitlementsApi::new();
        expect_method(&mut api, "pm_card");
        api.expect_process_payment().times(1).returning(|req| {
            Ok(ProcessPaymentResponse::from_outcome(
                req.payment_intent_id,
                &ProcessOutcome::Failed {
                    reason: "Card was declined.".to_string(),
                },
            ))
        });

        let result = checkout(api)
            .pay(Uuid::new_v4(), PaymentMethodDetails::GCash, None, None)
            .await;

        assert_eq!(
            result,
            Err(ClientError::PaymentProcessing("Card was declined.".to_string()))
        );
    }
}
