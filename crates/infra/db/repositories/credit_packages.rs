use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain;
use crate::infra::db::postgres::{postgres_connection::PgPoolSquad, schema::credit_packages};
use domain::{
    entities::credit_packages::CreditPackageEntity,
    repositories::credit_packages::CreditPackageRepository,
};

pub struct CreditPackagePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CreditPackagePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CreditPackageRepository for CreditPackagePostgres {
    async fn list_active_packages(&self) -> Result<Vec<CreditPackageEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let packages = credit_packages::table
            .filter(credit_packages::is_active.eq(true))
            .order((
                credit_packages::credit_type.asc(),
                credit_packages::price_minor.asc(),
            ))
            .select(CreditPackageEntity::as_select())
            .load::<CreditPackageEntity>(&mut conn)?;

        Ok(packages)
    }

    async fn find_active_package_by_id(
        &self,
        package_id: Uuid,
    ) -> Result<Option<CreditPackageEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let package = credit_packages::table
            .filter(credit_packages::id.eq(package_id))
            .filter(credit_packages::is_active.eq(true))
            .select(CreditPackageEntity::as_select())
            .first::<CreditPackageEntity>(&mut conn)
            .optional()?;

        Ok(package)
    }

    async fn find_by_id(&self, package_id: Uuid) -> Result<Option<CreditPackageEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let package = credit_packages::table
            .find(package_id)
            .select(CreditPackageEntity::as_select())
            .first::<CreditPackageEntity>(&mut conn)
            .optional()?;

        Ok(package)
    }
}
