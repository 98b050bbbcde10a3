use sqlx::PgPool;

/// Executes the query messages defined in [`crate::entities`] against the pool.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
