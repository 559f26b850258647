use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain;
use crate::infra::db::postgres::{postgres_connection::PgPoolSquad, schema::plans};
use domain::{
    entities::plans::{PlanEntity, PlanRow},
    repositories::plans::PlanRepository,
};

pub struct PlanPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PlanPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PlanRepository for PlanPostgres {
    async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = plans::table
            .filter(plans::id.eq(plan_id))
            .select(PlanRow::as_select())
            .first::<PlanRow>(&mut conn)
            .optional()?;

        row.map(PlanEntity::try_from).transpose()
    }

    async fn find_active_plan_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = plans::table
            .filter(plans::id.eq(plan_id))
            .filter(plans::is_active.eq(true))
            .select(PlanRow::as_select())
            .first::<PlanRow>(&mut conn)
            .optional()?;

        row.map(PlanEntity::try_from).transpose()
    }

    async fn list_active_plans(&self) -> Result<Vec<PlanEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = plans::table
            .filter(plans::is_active.eq(true))
            .order((plans::price_monthly_minor.asc(), plans::name.asc()))
            .select(PlanRow::as_select())
            .load::<PlanRow>(&mut conn)?;

        rows.into_iter().map(PlanEntity::try_from).collect()
    }
}
