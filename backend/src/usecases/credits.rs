use std::sync::Arc;

use chrono::{Duration, Utc};
use entitlements::domain::{
    repositories::{
        credit_ledger::CreditLedgerRepository, credit_packages::CreditPackageRepository,
    },
    value_objects::{
        credits::{
            BalancesResponse, ConsumeCreditsRequest, ConsumeCreditsResponse, ConsumeOutcome,
            CreditBalanceDto, CreditOutcome, CreditPackageDto, CreditPackagesResponse,
            GrantCreditsRequest, GrantCreditsResponse, PurchaseCreditsRequest,
            PurchaseCreditsResponse, TransactionsResponse,
        },
        enums::credit_types::CreditType,
        iam::SessionContext,
        payments::PaymentTarget,
    },
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::usecases::payments::{Checkout, PaymentError};

#[derive(Debug, Error)]
pub enum CreditError {
    #[error("amount must be at least 1, got {0}")]
    InvalidAmount(i32),
    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: i32, available: i32 },
    #[error("only administrators can grant credits")]
    Forbidden,
    #[error("credit package not found")]
    PackageNotFound,
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CreditError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            CreditError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            CreditError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            CreditError::Forbidden => StatusCode::FORBIDDEN,
            CreditError::PackageNotFound => StatusCode::NOT_FOUND,
            CreditError::Payment(err) => err.status_code(),
            CreditError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, CreditError>;

pub struct CreditUseCase<L, K, C>
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    ledger_repo: Arc<L>,
    package_repo: Arc<K>,
    checkout: Arc<C>,
    transactions_limit: i64,
}

impl<L, K, C> CreditUseCase<L, K, C>
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    pub fn new(
        ledger_repo: Arc<L>,
        package_repo: Arc<K>,
        checkout: Arc<C>,
        transactions_limit: i64,
    ) -> Self {
        Self {
            ledger_repo,
            package_repo,
            checkout,
            transactions_limit,
        }
    }

    /// Every credit type is reported; types the user never held show zero.
    pub async fn get_balances(
        &self,
        session: &SessionContext,
        credit_type: Option<CreditType>,
    ) -> UseCaseResult<BalancesResponse> {
        let rows = self
            .ledger_repo
            .list_balances(session.user_id)
            .await
            .map_err(|err| {
                error!(user_id = %session.user_id, db_error = ?err, "credits: failed to list balances");
                CreditError::Internal(err)
            })?;

        let now = Utc::now();
        let balances = CreditType::ALL
            .into_iter()
            .filter(|kind| credit_type.is_none_or(|wanted| wanted == *kind))
            .map(|kind| {
                rows.iter()
                    .find(|row| row.credit_type() == Some(kind))
                    .map(|row| CreditBalanceDto::from_entity(kind, row, now))
                    .unwrap_or(CreditBalanceDto {
                        credit_type: kind,
                        balance: 0,
                        used: 0,
                        total: 0,
                        expires_at: None,
                        expired: false,
                    })
            })
            .collect();

        Ok(BalancesResponse {
            success: true,
            balances,
        })
    }

    pub async fn has_enough(
        &self,
        session: &SessionContext,
        credit_type: CreditType,
        amount: i32,
    ) -> UseCaseResult<bool> {
        let balance = self
            .ledger_repo
            .find_balance(session.user_id, credit_type)
            .await
            .map_err(CreditError::Internal)?;

        let available = balance.map(|row| row.available_at(Utc::now())).unwrap_or(0);
        Ok(available >= amount)
    }

    pub async fn consume(
        &self,
        session: &SessionContext,
        request: ConsumeCreditsRequest,
    ) -> UseCaseResult<ConsumeCreditsResponse> {
        if request.amount < 1 {
            return Err(CreditError::InvalidAmount(request.amount));
        }

        let outcome = self
            .ledger_repo
            .consume(
                session.user_id,
                request.credit_type,
                request.amount,
                request.reference_id.clone(),
                Utc::now(),
            )
            .await
            .map_err(|err| {
                error!(
                    user_id = %session.user_id,
                    credit_type = %request.credit_type,
                    db_error = ?err,
                    "credits: consume failed"
                );
                CreditError::Internal(err)
            })?;

        let (balance, already_consumed) = match outcome {
            ConsumeOutcome::Consumed { balance } => (balance, false),
            ConsumeOutcome::AlreadyConsumed { balance } => (balance, true),
            ConsumeOutcome::Insufficient { available } => {
                warn!(
                    user_id = %session.user_id,
                    credit_type = %request.credit_type,
                    requested = request.amount,
                    available,
                    "credits: insufficient balance"
                );
                return Err(CreditError::InsufficientCredits {
                    requested: request.amount,
                    available,
                });
            }
        };

        info!(
            user_id = %session.user_id,
            credit_type = %request.credit_type,
            amount = request.amount,
            balance,
            already_consumed,
            "credits: consumed"
        );

        Ok(ConsumeCreditsResponse {
            success: true,
            credit_type: request.credit_type,
            balance,
            already_consumed,
        })
    }

    pub async fn grant(
        &self,
        session: &SessionContext,
        request: GrantCreditsRequest,
    ) -> UseCaseResult<GrantCreditsResponse> {
        if !session.is_admin {
            warn!(user_id = %session.user_id, "credits: non-admin grant attempt");
            return Err(CreditError::Forbidden);
        }
        if request.amount < 1 {
            return Err(CreditError::InvalidAmount(request.amount));
        }

        let expires_at = request
            .validity_days
            .filter(|days| *days > 0)
            .and_then(|days| Utc::now().checked_add_signed(Duration::days(days.into())));

        let outcome = self
            .ledger_repo
            .credit(
                request.user_id,
                request.credit_type,
                request.amount,
                expires_at,
                request.reference_id,
            )
            .await
            .map_err(|err| {
                error!(user_id = %request.user_id, db_error = ?err, "credits: grant failed");
                CreditError::Internal(err)
            })?;

        info!(
            admin_id = %session.user_id,
            user_id = %request.user_id,
            credit_type = %request.credit_type,
            amount = request.amount,
            balance = outcome.balance(),
            "credits: granted"
        );

        Ok(GrantCreditsResponse {
            success: true,
            credit_type: request.credit_type,
            balance: outcome.balance(),
            already_credited: matches!(outcome, CreditOutcome::AlreadyCredited { .. }),
        })
    }

    pub async fn list_packages(&self) -> UseCaseResult<CreditPackagesResponse> {
        let packages = self
            .package_repo
            .list_active_packages()
            .await
            .map_err(CreditError::Internal)?
            .into_iter()
            .filter_map(CreditPackageDto::from_entity)
            .collect();

        Ok(CreditPackagesResponse {
            success: true,
            packages,
        })
    }

    /// Opens a payment intent for a package. Credits are added once the
    /// payment settles.
    pub async fn purchase(
        &self,
        session: &SessionContext,
        request: PurchaseCreditsRequest,
    ) -> UseCaseResult<PurchaseCreditsResponse> {
        let package = self
            .package_repo
            .find_active_package_by_id(request.package_id)
            .await
            .map_err(CreditError::Internal)?
            .filter(|package| package.credit_type().is_some())
            .ok_or(CreditError::PackageNotFound)?;

        let intent = self
            .checkout
            .open_intent(
                session.user_id,
                PaymentTarget::CreditPackage {
                    package_id: package.id,
                },
                package.price_minor,
                package.currency.clone(),
                package.name.clone(),
            )
            .await?;

        Ok(PurchaseCreditsResponse {
            success: true,
            payment_intent: intent.into(),
        })
    }

    pub async fn transactions(
        &self,
        session: &SessionContext,
        limit: Option<i64>,
    ) -> UseCaseResult<TransactionsResponse> {
        let limit = limit
            .filter(|limit| *limit > 0)
            .map(|limit| limit.min(self.transactions_limit))
            .unwrap_or(self.transactions_limit);

        let transactions = self
            .ledger_repo
            .list_transactions(session.user_id, limit)
            .await
            .map_err(CreditError::Internal)?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(TransactionsResponse {
            success: true,
            transactions,
        })
    }
}
