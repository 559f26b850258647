//! Setup for repository tests against a live database. Those tests are
//! `#[ignore]`d and expect `DATABASE_URL` to point at a database with the
//! migrations applied:
//!
//! `DATABASE_URL=postgres://... cargo test -p entitlements -- --ignored`

use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::infra::db::postgres::{
    postgres_connection::{PgPoolSquad, establish_connection},
    schema::plans,
};

/// `None` when no database is configured, so the caller can skip.
pub(crate) fn pool() -> Option<Arc<PgPoolSquad>> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping");
        return None;
    };
    Some(Arc::new(
        establish_connection(&database_url, 8).expect("database should be reachable"),
    ))
}

pub(crate) fn insert_plan(pool: &PgPoolSquad) -> Uuid {
    let mut conn = pool.get().expect("pooled connection");
    insert_into(plans::table)
        .values((
            plans::name.eq("Basic"),
            plans::tier.eq("basic"),
            plans::price_monthly_minor.eq(49900),
        ))
        .returning(plans::id)
        .get_result::<Uuid>(&mut conn)
        .expect("plan row")
}
