use chrono::{DateTime, Duration, Utc};
use oauth2::{AccessToken, Scope};

/// Tokens are considered expired this long before their actual expiration
const EXPIRATION_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct TokenEntry {
    scopes_hash: u64,
    scopes: Vec<Scope>,
    access_token: AccessToken,
    expiration: DateTime<Utc>,
}

/// In-memory cache of access tokens, keyed by scope set
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: Vec<TokenEntry>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, scopes: &[Scope], access_token: AccessToken, expires_in: Duration) {
        self.insert_at(scopes, access_token, expires_in, Utc::now())
    }

    pub fn get(&self, scopes: &[Scope]) -> Option<AccessToken> {
        self.get_at(scopes, Utc::now())
    }

    fn insert_at(
        &mut self,
        scopes: &[Scope],
        access_token: AccessToken,
        expires_in: Duration,
        now: DateTime<Utc>,
    ) {
        let scopes = {
            let mut scopes = scopes.to_vec();
            scopes.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
            scopes
        };
        log::trace!("caching token for scopes {scopes:?}, expires in {expires_in}");

        let scopes_hash = {
            use std::hash::{Hash, Hasher};
            let mut state = std::collections::hash_map::DefaultHasher::new();
            scopes.hash(&mut state);
            state.finish()
        };
        let entry = TokenEntry {
            scopes_hash,
            scopes,
            access_token,
            expiration: now + expires_in - Duration::seconds(EXPIRATION_MARGIN_SECS),
        };
        match self
            .entries
            .iter_mut()
            .find(|ent| ent.scopes_hash == entry.scopes_hash)
        {
            Some(ent) => *ent = entry,
            None => self.entries.push(entry),
        }
    }

    fn get_at(&self, scopes: &[Scope], now: DateTime<Utc>) -> Option<AccessToken> {
        // first unexpired hit holding all the required scopes
        self.entries
            .iter()
            .filter(|ent| scopes.iter().all(|s| ent.scopes.contains(s)))
            .find(|ent| ent.expiration > now)
            .map(|ent| ent.access_token.clone())
    }
}
