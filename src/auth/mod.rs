//! C7 AuthService: validates api-key, tracks bounded per-team session
//! lists, stamps last-activity (§4.2, §5 "per-team locks").
//!
//! Grounded on the reference backend's `auth::middleware` (request ->
//! identity extraction) and `auth::rate_limit` (`DashMap`-per-entity +
//! capacity cap) idioms, re-pointed at an api-key -> team lookup instead of
//! JWT/wallet-signature verification (DESIGN.md C7).

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Team;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
}

struct TeamSessions {
    sockets: Vec<Uuid>,
}

/// Tracks, per team, which socket ids are currently logged in. Session
/// admission is capped at `max_sessions_per_team`; the oldest socket is
/// evicted on overflow (§3 "Up to 5 per team; oldest evicted on
/// overflow") rather than refusing the new login.
pub struct AuthService {
    store: Arc<Store>,
    sessions: DashMap<String, TeamSessions>,
    max_sessions_per_team: usize,
}

impl AuthService {
    pub fn new(store: Arc<Store>, max_sessions_per_team: usize) -> Self {
        Self {
            store,
            sessions: DashMap::new(),
            max_sessions_per_team,
        }
    }

    /// `LOGIN {token}`: `token` is the team's api-key (§6, §B "api-key ->
    /// team mapping"). Auth failures never disclose which check failed
    /// (§7): any lookup miss collapses to `InvalidToken`. On success,
    /// returns the socket id evicted to make room, if any, so the caller
    /// can tear down that connection.
    pub async fn login(&self, token: &str, socket_id: Uuid) -> Result<(Team, Option<Uuid>), AuthError> {
        let team = self
            .store
            .team_by_api_key(token)
            .await
            .map_err(|_| AuthError::InvalidToken)?
            .ok_or(AuthError::InvalidToken)?;

        let evicted = {
            let mut entry = self.sessions.entry(team.team_name.clone()).or_insert_with(|| TeamSessions { sockets: Vec::new() });
            let evicted = if entry.sockets.len() >= self.max_sessions_per_team {
                Some(entry.sockets.remove(0))
            } else {
                None
            };
            entry.sockets.push(socket_id);
            evicted
        };

        let _ = self.store.touch_last_login(&team.team_name).await;
        Ok((team, evicted))
    }

    pub fn end_session(&self, team_name: &str, socket_id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(team_name) {
            entry.sockets.retain(|id| *id != socket_id);
        }
    }

    pub fn session_count(&self, team_name: &str) -> usize {
        self.sessions.get(team_name).map(|e| e.sockets.len()).unwrap_or(0)
    }

    pub fn connected_team_count(&self) -> usize {
        self.sessions.iter().filter(|e| !e.sockets.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_rejects_unknown_token() {
        let store = Arc::new(Store::new_in_memory());
        let auth = AuthService::new(store, 8);
        let err = auth.login("nope", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn login_evicts_oldest_session_on_overflow() {
        let store = Arc::new(Store::new_in_memory());
        store
            .seed_team(Team {
                team_name: "teamA".to_string(),
                api_key: "key-a".to_string(),
                species: "guacamole".to_string(),
                initial_balance: 1000.0,
                current_balance: 1000.0,
                inventory: Default::default(),
                authorized_products: Default::default(),
                recipes: Default::default(),
                role: crate::models::Role {
                    branches: 1.0,
                    max_depth: 1,
                    decay: 0.5,
                    budget: 1.0,
                    base_energy: 1.0,
                    level_energy: 1.0,
                },
                last_login: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let auth = AuthService::new(store, 1);
        let first_socket = Uuid::new_v4();
        let (_, evicted) = auth.login("key-a", first_socket).await.unwrap();
        assert!(evicted.is_none());

        let (_, evicted) = auth.login("key-a", Uuid::new_v4()).await.unwrap();
        assert_eq!(evicted, Some(first_socket));
        assert_eq!(auth.session_count("teamA"), 1);
    }
}
