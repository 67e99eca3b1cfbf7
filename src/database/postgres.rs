//! Postgres account store (the migration target)
//!
//! Reads are served from here; the legacy MySQL store only receives
//! mirrored writes until it is retired.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use super::account::{Account, Gender, Hwid, LoginState, NewAccount};
use super::{AccountStore, StoreError};

const ACCOUNT_COLUMNS: &str = "id, name, password, pin, pic, birthdate, gender, tos_accepted, \
     chr_slots, login_state, last_login, banned, ban_reason, ban_description, temp_banned_until";

type AccountRow = (
    i32,
    String,
    String,
    String,
    String,
    NaiveDate,
    Option<i16>,
    bool,
    i16,
    i16,
    Option<DateTime<Utc>>,
    bool,
    i16,
    Option<String>,
    Option<DateTime<Utc>>,
);

fn map_row(row: AccountRow) -> Result<Account, StoreError> {
    let (
        id,
        name,
        password,
        pin,
        pic,
        birthdate,
        gender,
        tos_accepted,
        chr_slots,
        login_state,
        last_login,
        banned,
        ban_reason,
        ban_description,
        temp_banned_until,
    ) = row;
    Account::from_row_parts(
        id,
        name,
        password,
        pin,
        pic,
        birthdate,
        gender,
        tos_accepted,
        chr_slots,
        login_state,
        last_login,
        banned,
        ban_reason,
        ban_description,
        temp_banned_until,
    )
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, account: &NewAccount) -> Result<i32, StoreError> {
        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO accounts (name, password, pin, pic, birthdate, gender, chr_slots, login_state) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id",
        )
        .bind(&account.name)
        .bind(&account.password)
        .bind(&account.pin)
        .bind(&account.pic)
        .bind(account.birthdate)
        .bind(account.gender.map(Gender::value))
        .bind(account.chr_slots as i16)
        .bind(account.login_state.value())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(name) = lower($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_row).transpose()
    }

    async fn set_login_state(
        &self,
        id: i32,
        state: LoginState,
        last_login: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET login_state = $1, last_login = $2 WHERE id = $3")
            .bind(state.value())
            .bind(last_login)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_pin(&self, id: i32, pin: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET pin = $1 WHERE id = $2")
            .bind(pin)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_pic(&self, id: i32, pic: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET pic = $1 WHERE id = $2")
            .bind(pic)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_gender(&self, id: i32, gender: Gender) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET gender = $1 WHERE id = $2")
            .bind(gender.value())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_chr_slots(&self, id: i32, slots: u8) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET chr_slots = $1 WHERE id = $2")
            .bind(slots as i16)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_tos(&self, id: i32, accepted: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET tos_accepted = $1 WHERE id = $2")
            .bind(accepted)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_hwid(&self, id: i32, hwid: &Hwid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET hwid = $1 WHERE id = $2")
            .bind(hwid.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
