use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    client::{
        api_client::{ClientError, EntitlementsApi},
        optimistic::OptimisticLedger,
    },
    domain::value_objects::{
        credits::{ConsumeCreditsRequest, ConsumeCreditsResponse},
        enums::credit_types::CreditType,
    },
};

/// Credit balances as seen by one signed-in client.
pub struct CreditWallet<A>
where
    A: EntitlementsApi + Send + Sync,
{
    api: Arc<A>,
    ledger: Mutex<OptimisticLedger>,
}

impl<A> CreditWallet<A>
where
    A: EntitlementsApi + Send + Sync,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            ledger: Mutex::new(OptimisticLedger::new()),
        }
    }

    /// Pulls every balance from the server.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let balances = self.api.balances(None).await?;
        self.ledger.lock().await.reconcile(&balances);
        Ok(())
    }

    pub async fn balance(&self, credit_type: CreditType) -> i32 {
        self.ledger.lock().await.displayed(credit_type)
    }

    pub async fn has_enough(&self, credit_type: CreditType, amount: i32) -> bool {
        self.balance(credit_type).await >= amount
    }

    /// Debits `amount` credits. Fails locally without calling the server when
    /// the cached balance is already too low. `reference_id` doubles as the
    /// optimistic request id and the server-side dedupe key.
    pub async fn consume(
        &self,
        credit_type: CreditType,
        amount: i32,
        reference_id: Option<String>,
    ) -> Result<ConsumeCreditsResponse, ClientError> {
        let request_id = reference_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        {
            let mut ledger = self.ledger.lock().await;
            let available = ledger.displayed(credit_type);
            if available < amount {
                return Err(ClientError::InsufficientCredits {
                    requested: amount,
                    available,
                });
            }
            ledger.apply(request_id.clone(), credit_type, -amount);
        }

        let result = self
            .api
            .consume(ConsumeCreditsRequest {
                credit_type,
                amount,
                reference_id,
            })
            .await;

        let mut ledger = self.ledger.lock().await;
        match result {
            Ok(response) => {
                ledger.confirm(&request_id, credit_type, response.balance);
                info!(
                    credit_type = %credit_type,
                    balance = response.balance,
                    already_consumed = response.already_consumed,
                    "credit wallet: consumption confirmed"
                );
                Ok(response)
            }
            Err(err) => {
                ledger.rollback(&request_id);
                if let ClientError::InsufficientCredits { available, .. } = &err {
                    ledger.set_confirmed(credit_type, *available);
                }
                warn!(credit_type = %credit_type, error = %err, "credit wallet: consumption rolled back");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::api_client::MockEntitlementsApi, domain::value_objects::credits::CreditBalanceDto,
    };

    fn balances(balance: i32) -> Vec<CreditBalanceDto> {
        vec![CreditBalanceDto {
            credit_type: CreditType::AiCredit,
            balance,
            used: 10 - balance,
            total: 10,
            expires_at: None,
            expired: false,
        }]
    }

    #[tokio::test]
    async fn test_ai_credit_is_debited_and_confirmed() {
        let mut api = MockEntitlementsApi::new();
        api.expect_balances().returning(|_| Ok(balances(10)));
        api.expect_consume()
            .withf(|req| {
                req.credit_type == CreditType::AiCredit
                    && req.amount == 1
                    && req.reference_id.as_deref() == Some("match-42")
            })
            .times(1)
            .returning(|req| {
                Ok(ConsumeCreditsResponse {
                    success: true,
                    credit_type: req.credit_type,
                    balance: 9,
                    already_consumed: false,
                })
            });

        let wallet = CreditWallet::new(Arc::new(api));
        wallet.refresh().await.unwrap();

        let response = wallet
            .consume(CreditType::AiCredit, 1, Some("match-42".to_string()))
            .await
            .unwrap();

        assert_eq!(response.balance, 9);
        assert_eq!(wallet.balance(CreditType::AiCredit).await, 9);
    }

    #[tokio::test]
    async fn test_empty_wallet_blocks_without_network_call() {
        let mut api = MockEntitlementsApi::new();
        api.expect_balances().returning(|_| Ok(balances(0)));
        api.expect_consume().never();

        let wallet = CreditWallet::new(Arc::new(api));
        wallet.refresh().await.unwrap();

        let result = wallet.consume(CreditType::AiCredit, 1, None).await;

        assert_eq!(
            result.unwrap_err(),
            ClientError::InsufficientCredits {
                requested: 1,
                available: 0
            }
        );
    }

    #[tokio::test]
    async fn test_server_rejection_rolls_back_to_server_balance() {
        let mut api = MockEntitlementsApi::new();
        api.expect_balances().returning(|_| Ok(balances(2)));
        api.expect_consume().times(1).returning(|_| {
            Err(ClientError::InsufficientCredits {
                requested: 2,
                available: 1,
            })
        });

        let wallet = CreditWallet::new(Arc::new(api));
        wallet.refresh().await.unwrap();

        let result = wallet.consume(CreditType::AiCredit, 2, None).await;

        assert!(matches!(result, Err(ClientError::InsufficientCredits { .. })));
        assert_eq!(wallet.balance(CreditType::AiCredit).await, 1);
    }

    #[tokio::test]
    async fn test_network_failure_restores_displayed_balance() {
        let mut api = MockEntitlementsApi::new();
        api.expect_balances().returning(|_| Ok(balances(5)));
        api.expect_consume()
            .times(1)
            .returning(|_| Err(ClientError::Network("timed out".to_string())));

        let wallet = CreditWallet::new(Arc::new(api));
        wallet.refresh().await.unwrap();

        assert!(wallet.consume(CreditType::AiCredit, 1, None).await.is_err());
        assert_eq!(wallet.balance(CreditType::AiCredit).await, 5);
    }
}
