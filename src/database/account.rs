//! Account row model
//!
//! The account is owned by the persistence layer; sessions only hold a
//! read-through cache of these fields. Stored enum values are validated on
//! the way in - an unknown value is corrupt data and fails loudly instead
//! of defaulting.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::StoreError;

/// How long a `ServerTransition` row stays valid before a read treats it
/// as a crashed handoff and heals it back to `NotLoggedIn`.
pub const TRANSITION_WINDOW_SECS: i64 = 30;

/// Persisted authentication status of an account.
///
/// The stored representation is a small integer and is part of the data
/// contract: 0 = not logged in, 1 = server transition, 2 = logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    NotLoggedIn,
    ServerTransition,
    LoggedIn,
}

impl LoginState {
    /// Decode a stored value. Anything outside 0..=2 is corrupt data.
    pub fn from_value(value: i16) -> Result<Self, StoreError> {
        match value {
            0 => Ok(LoginState::NotLoggedIn),
            1 => Ok(LoginState::ServerTransition),
            2 => Ok(LoginState::LoggedIn),
            other => Err(StoreError::InvalidLoginState(other)),
        }
    }

    /// The stored representation.
    pub fn value(self) -> i16 {
        match self {
            LoginState::NotLoggedIn => 0,
            LoginState::ServerTransition => 1,
            LoginState::LoggedIn => 2,
        }
    }
}

/// Account gender. Stored as 0 = male, 1 = female, SQL NULL = not chosen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn from_value(value: i16) -> Result<Self, StoreError> {
        match value {
            0 => Ok(Gender::Male),
            1 => Ok(Gender::Female),
            other => Err(StoreError::InvalidGender(other)),
        }
    }

    pub fn value(self) -> i16 {
        match self {
            Gender::Male => 0,
            Gender::Female => 1,
        }
    }
}

/// Hardware fingerprint reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hwid(String);

impl Hwid {
    pub fn new(hwid: impl Into<String>) -> Self {
        Self(hwid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hwid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One account row.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    pub name: String,
    /// bcrypt hash, never the plaintext
    pub password: String,
    pub pin: String,
    pub pic: String,
    pub birthdate: NaiveDate,
    pub gender: Option<Gender>,
    pub tos_accepted: bool,
    pub chr_slots: u8,
    pub login_state: LoginState,
    pub last_login: Option<DateTime<Utc>>,
    pub banned: bool,
    pub ban_reason: u8,
    pub ban_description: Option<String>,
    pub temp_banned_until: Option<DateTime<Utc>>,
}

impl Account {
    /// Build an account from raw column values, validating the stored
    /// enums. Both store implementations funnel through here so a corrupt
    /// row fails the same way no matter which backend served it.
    #[allow(clippy::too_many_arguments)]
    pub fn from_row_parts(
        id: i32,
        name: String,
        password: String,
        pin: String,
        pic: String,
        birthdate: NaiveDate,
        gender: Option<i16>,
        tos_accepted: bool,
        chr_slots: i16,
        login_state: i16,
        last_login: Option<DateTime<Utc>>,
        banned: bool,
        ban_reason: i16,
        ban_description: Option<String>,
        temp_banned_until: Option<DateTime<Utc>>,
    ) -> Result<Self, StoreError> {
        let gender = gender.map(Gender::from_value).transpose()?;
        let login_state = LoginState::from_value(login_state)?;
        Ok(Self {
            id,
            name,
            password,
            pin,
            pic,
            birthdate,
            gender,
            tos_accepted,
            chr_slots: chr_slots as u8,
            login_state,
            last_login,
            banned,
            ban_reason: ban_reason as u8,
            ban_description,
            temp_banned_until,
        })
    }

    /// True when a `ServerTransition` row has outlived the handoff window
    /// and should be healed back to `NotLoggedIn`. A missing last-login
    /// timestamp counts as expired.
    pub fn transition_expired(&self, now: DateTime<Utc>) -> bool {
        match self.last_login {
            None => true,
            Some(last) => last + Duration::seconds(TRANSITION_WINDOW_SECS) < now,
        }
    }
}

/// Fields supplied when inserting a fresh account; the database generates
/// the rest (id, timestamps).
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    /// bcrypt hash
    pub password: String,
    pub pin: String,
    pub pic: String,
    pub birthdate: NaiveDate,
    pub gender: Option<Gender>,
    pub chr_slots: u8,
    pub login_state: LoginState,
}
