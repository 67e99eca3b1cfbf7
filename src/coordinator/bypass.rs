//! PIN/PIC login bypass grants
//!
//! A correct PIN or PIC entry earns the (hardware id, account) pair a
//! short grace period during which re-login skips the prompt. Entries are
//! checked for expiry at read time; nothing actively prunes them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::database::Hwid;

/// How long a grant lasts.
const BYPASS_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy)]
struct BypassEntry {
    pin: bool,
    pic: bool,
    expires_at: Instant,
}

#[derive(Default)]
pub struct LoginBypassRegistry {
    entries: Mutex<HashMap<(String, i32), BypassEntry>>,
}

impl LoginBypassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a grant. A PIC grant implies the PIN one, since the PIC
    /// prompt sits deeper in the login flow.
    pub fn register(&self, hwid: &Hwid, account_id: i32, pic: bool) {
        let key = (hwid.as_str().to_string(), account_id);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key).or_insert(BypassEntry {
            pin: false,
            pic: false,
            expires_at: Instant::now() + BYPASS_TTL,
        });
        entry.pin = true;
        entry.pic = entry.pic || pic;
        entry.expires_at = Instant::now() + BYPASS_TTL;
    }

    /// Whether the pair currently holds a grant of the requested kind.
    pub fn can_bypass(&self, hwid: &Hwid, account_id: i32, pic: bool) -> bool {
        let key = (hwid.as_str().to_string(), account_id);
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                if pic {
                    entry.pic
                } else {
                    entry.pin
                }
            }
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }
}
