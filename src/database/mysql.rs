//! Legacy MySQL account store
//!
//! The original schema, kept write-hot during the migration. Column names
//! predate the Postgres layout (`loggedin`, `lastlogin`, `tos`,
//! `characterslots`, `greason`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::MySqlPool;

use super::account::{Account, Gender, Hwid, LoginState, NewAccount};
use super::{AccountStore, StoreError};

const ACCOUNT_COLUMNS: &str = "id, name, password, pin, pic, birthday, gender, tos, \
     characterslots, loggedin, lastlogin, banned, greason, banreason, tempban";

type AccountRow = (
    i32,
    String,
    String,
    String,
    String,
    NaiveDate,
    Option<i8>,
    bool,
    i8,
    i8,
    Option<NaiveDateTime>,
    bool,
    i8,
    Option<String>,
    Option<NaiveDateTime>,
);

fn map_row(row: AccountRow) -> Result<Account, StoreError> {
    let (
        id,
        name,
        password,
        pin,
        pic,
        birthday,
        gender,
        tos,
        characterslots,
        loggedin,
        lastlogin,
        banned,
        greason,
        banreason,
        tempban,
    ) = row;
    Account::from_row_parts(
        id,
        name,
        password,
        pin,
        pic,
        birthday,
        gender.map(i16::from),
        tos,
        i16::from(characterslots),
        i16::from(loggedin),
        lastlogin.map(|t| t.and_utc()),
        banned,
        i16::from(greason),
        banreason,
        tempban.map(|t| t.and_utc()),
    )
}

pub struct MySqlAccountStore {
    pool: MySqlPool,
}

impl MySqlAccountStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for MySqlAccountStore {
    async fn insert(&self, account: &NewAccount) -> Result<i32, StoreError> {
        let result = sqlx::query(
            "INSERT INTO accounts (name, password, pin, pic, birthday, gender, characterslots, loggedin) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.name)
        .bind(&account.password)
        .bind(&account.pin)
        .bind(&account.pic)
        .bind(account.birthdate)
        .bind(account.gender.map(|g| g.value() as i8))
        .bind(account.chr_slots as i8)
        .bind(account.login_state.value() as i8)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i32)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE LOWER(name) = LOWER(?)"
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
        // The server clock is authoritative here; letting SQL NOW() stamp
        // lastlogin can break transition staleness checks.
        let result = sqlx::query("UPDATE accounts SET loggedin = ?, lastlogin = ? WHERE id = ?")
            .bind(state.value() as i8)
            .bind(last_login.naive_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_pin(&self, id: i32, pin: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET pin = ? WHERE id = ?")
            .bind(pin)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_pic(&self, id: i32, pic: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET pic = ? WHERE id = ?")
            .bind(pic)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_gender(&self, id: i32, gender: Gender) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET gender = ? WHERE id = ?")
            .bind(gender.value() as i8)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_chr_slots(&self, id: i32, slots: u8) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET characterslots = ? WHERE id = ?")
            .bind(slots as i8)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_tos(&self, id: i32, accepted: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET tos = ? WHERE id = ?")
            .bind(accepted)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_hwid(&self, id: i32, hwid: &Hwid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET hwid = ? WHERE id = ?")
            .bind(hwid.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
