//! Ban list checks
//!
//! Point-in-time predicates consulted before and during authentication.
//! No caching contract: every call hits the backing tables, which still
//! live in the legacy MySQL store.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::MySqlPool;

use super::account::Hwid;

/// IP / hardware-id / MAC ban checks, plus the MAC-ban writer used when an
/// account is banned.
#[async_trait]
pub trait BanList: Send + Sync {
    async fn is_ip_banned(&self, ip: &str) -> bool;

    async fn is_hwid_banned(&self, hwid: &Hwid) -> bool;

    async fn is_mac_banned(&self, macs: &HashSet<String>) -> bool;

    /// Returns false if the insert failed (e.g. the MAC is already banned).
    async fn save_mac_ban(&self, account_id: i32, mac: &str) -> bool;
}

pub struct SqlBanList {
    pool: MySqlPool,
}

impl SqlBanList {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanList for SqlBanList {
    async fn is_ip_banned(&self, ip: &str) -> bool {
        // Rows store prefixes, so the ban "10.1." covers the whole range.
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COUNT(*) FROM ipbans WHERE ? LIKE CONCAT(ip, '%')")
                .bind(ip)
                .fetch_optional(&self.pool)
                .await
                .unwrap_or(None);
        row.map(|(n,)| n > 0).unwrap_or(false)
    }

    async fn is_hwid_banned(&self, hwid: &Hwid) -> bool {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COUNT(*) FROM hwidbans WHERE hwid LIKE ?")
                .bind(hwid.as_str())
                .fetch_optional(&self.pool)
                .await
                .unwrap_or(None);
        row.map(|(n,)| n > 0).unwrap_or(false)
    }

    async fn is_mac_banned(&self, macs: &HashSet<String>) -> bool {
        if macs.is_empty() {
            return false;
        }

        let placeholders = vec!["?"; macs.len()].join(", ");
        let sql = format!("SELECT COUNT(*) FROM macbans WHERE mac IN ({placeholders})");

        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for mac in macs {
            query = query.bind(mac);
        }

        let row = query.fetch_optional(&self.pool).await.unwrap_or(None);
        row.map(|(n,)| n > 0).unwrap_or(false)
    }

    async fn save_mac_ban(&self, account_id: i32, mac: &str) -> bool {
        let result = sqlx::query("INSERT INTO macbans (mac, aid) VALUES (?, ?)")
            .bind(mac)
            .bind(account_id)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    "[ban] [mac_ban_insert_failed] account={} mac={} err={}",
                    account_id,
                    mac,
                    e
                );
                false
            }
        }
    }
}
