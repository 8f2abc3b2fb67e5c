pub mod cart_service;
pub mod discount_service;
pub mod membership_service;
pub mod notification_service;
pub mod order_service;

pub use cart_service::*;
pub use discount_service::*;
pub use membership_service::*;
pub use notification_service::*;
pub use order_service::*;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::database::DbPool;
    use crate::error::AppResult;
    use crate::external::Mailer;
    use crate::models::DiscountType;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    pub fn utc(s: &str) -> DateTime<Utc> {
        s.parse().expect("timestamp literal")
    }

    /// Fresh in-memory database with the real migrations applied. One
    /// connection, so every query in a test sees the same database.
    pub async fn test_pool() -> DbPool {
        let pool = crate::database::connect_pool("sqlite::memory:", 1)
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    /// Mailer that records what would have been sent.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        pub fn subjects(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, subject)| subject.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> AppResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    pub async fn insert_user(pool: &DbPool, email: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO users (email, full_name, created_at) VALUES (?, 'Test User', ?) \
             RETURNING id",
        )
        .bind(email)
        .bind(utc("2026-01-01T00:00:00Z"))
        .fetch_one(pool)
        .await
        .expect("insert user")
    }

    pub async fn insert_product(pool: &DbPool, name: &str, price: i64, quantity: i64) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO products (name, description, price, quantity, created_at) \
             VALUES (?, '', ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(price)
        .bind(quantity)
        .bind(utc("2026-01-01T00:00:00Z"))
        .fetch_one(pool)
        .await
        .expect("insert product")
    }

    pub async fn insert_plan(pool: &DbPool, name: &str, duration_months: i64, price: i64) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO membership_plans \
             (name, description, duration_months, price, is_active, features, created_at) \
             VALUES (?, '', ?, ?, 1, '[]', ?) RETURNING id",
        )
        .bind(name)
        .bind(duration_months)
        .bind(price)
        .bind(utc("2026-01-01T00:00:00Z"))
        .fetch_one(pool)
        .await
        .expect("insert plan")
    }

    pub struct DiscountCodeFixture {
        code: String,
        discount_type: DiscountType,
        discount_value: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        is_active: bool,
        usage_limit: Option<i64>,
        used_count: i64,
        minimum_order_amount: Option<i64>,
    }

    impl DiscountCodeFixture {
        pub fn new(code: &str) -> Self {
            Self {
                code: code.to_string(),
                discount_type: DiscountType::Percentage,
                discount_value: 10,
                valid_from: utc("2026-01-01T00:00:00Z"),
                valid_until: utc("2026-12-31T00:00:00Z"),
                is_active: true,
                usage_limit: None,
                used_count: 0,
                minimum_order_amount: None,
            }
        }

        pub fn percentage(mut self, value: i64) -> Self {
            self.discount_type = DiscountType::Percentage;
            self.discount_value = value;
            self
        }

        pub fn valid(mut self, from: &str, until: &str) -> Self {
            self.valid_from = utc(from);
            self.valid_until = utc(until);
            self
        }

        pub fn active(mut self, is_active: bool) -> Self {
            self.is_active = is_active;
            self
        }

        pub fn usage(mut self, limit: Option<i64>, used: i64) -> Self {
            self.usage_limit = limit;
            self.used_count = used;
            self
        }

        pub fn minimum(mut self, minimum: Option<i64>) -> Self {
            self.minimum_order_amount = minimum;
            self
        }
    }

    pub async fn insert_discount_code(pool: &DbPool, fixture: DiscountCodeFixture) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO discount_codes \
             (code, discount_type, discount_value, valid_from, valid_until, is_active, \
              usage_limit, used_count, minimum_order_amount, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&fixture.code)
        .bind(fixture.discount_type)
        .bind(fixture.discount_value)
        .bind(fixture.valid_from)
        .bind(fixture.valid_until)
        .bind(fixture.is_active)
        .bind(fixture.usage_limit)
        .bind(fixture.used_count)
        .bind(fixture.minimum_order_amount)
        .bind(utc("2026-01-01T00:00:00Z"))
        .fetch_one(pool)
        .await
        .expect("insert discount code")
    }
}
