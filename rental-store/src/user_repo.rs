use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_core::identity::{CustomerProfile, Profile, Role, User, VendorProfile};
use rental_core::repository::UserRepository;
use rental_core::{CoreError, CoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{parse_column, storage_error};

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    is_active: bool,
    email_verified: bool,
    verification_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: parse_column::<Role>("role", &row.role)?,
            is_active: row.is_active,
            email_verified: row.email_verified,
            verification_token: row.verification_token,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VendorProfileRow {
    user_id: Uuid,
    business_name: String,
    gstin: Option<String>,
    phone: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CustomerProfileRow {
    user_id: Uuid,
    phone: Option<String>,
    address: Option<String>,
}

const USER_COLUMNS: &str = "id, email, password_hash, name, role, is_active, email_verified, verification_token, created_at";

impl PgUserRepository {
    async fn fetch_one_where(&self, clause: &str, value: &str) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, clause);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: &User, profile: &Profile) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, is_active, email_verified, verification_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(&user.verification_token)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match storage_error(e) {
            CoreError::Conflict(_) => CoreError::Conflict("email already registered".to_string()),
            other => other,
        })?;

        match profile {
            Profile::Vendor(p) => {
                sqlx::query(
                    "INSERT INTO vendor_profiles (user_id, business_name, gstin, phone) VALUES ($1, $2, $3, $4)",
                )
                .bind(user.id)
                .bind(&p.business_name)
                .bind(&p.gstin)
                .bind(&p.phone)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
            }
            Profile::Customer(p) => {
                sqlx::query(
                    "INSERT INTO customer_profiles (user_id, phone, address) VALUES ($1, $2, $3)",
                )
                .bind(user.id)
                .bind(&p.phone)
                .bind(&p.address)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
            }
            Profile::None => {}
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.fetch_one_where("email", &email.trim().to_lowercase()).await
    }

    async fn find_by_verification_token(&self, token: &str) -> CoreResult<Option<User>> {
        self.fetch_one_where("verification_token", token).await
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, password_hash = $3, is_active = $4, email_verified = $5, verification_token = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(&user.verification_token)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn list_users(&self, role: Option<Role>) -> CoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE ($1::TEXT IS NULL OR role = $1) ORDER BY created_at",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn get_vendor_profile(&self, user_id: Uuid) -> CoreResult<Option<VendorProfile>> {
        let row = sqlx::query_as::<_, VendorProfileRow>(
            "SELECT user_id, business_name, gstin, phone FROM vendor_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|r| VendorProfile {
            user_id: r.user_id,
            business_name: r.business_name,
            gstin: r.gstin,
            phone: r.phone,
        }))
    }

    async fn upsert_vendor_profile(&self, profile: &VendorProfile) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vendor_profiles (user_id, business_name, gstin, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET business_name = EXCLUDED.business_name, gstin = EXCLUDED.gstin, phone = EXCLUDED.phone
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.business_name)
        .bind(&profile.gstin)
        .bind(&profile.phone)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_customer_profile(&self, user_id: Uuid) -> CoreResult<Option<CustomerProfile>> {
        let row = sqlx::query_as::<_, CustomerProfileRow>(
            "SELECT user_id, phone, address FROM customer_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|r| CustomerProfile {
            user_id: r.user_id,
            phone: r.phone,
            address: r.address,
        }))
    }
}
