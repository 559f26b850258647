use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::credit_packages::CreditPackageEntity;

#[automock]
#[async_trait]
pub trait CreditPackageRepository {
    async fn list_active_packages(&self) -> Result<Vec<CreditPackageEntity>>;
    async fn find_active_package_by_id(&self, package_id: Uuid) -> Result<Option<CreditPackageEntity>>;
    /// Includes packages deactivated after they were bought.
    async fn find_by_id(&self, package_id: Uuid) -> Result<Option<CreditPackageEntity>>;
}
