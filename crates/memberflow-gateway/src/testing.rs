//! Scripted in-memory provider for tests.
//!
//! Lookups answer from registered entities; invitations succeed unless an
//! error has been scripted for the user. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use memberflow_core::Account;

use crate::client::{Connector, ProviderClient, ProviderResult};
use crate::entity::{Dialog, Entity, IdShape};
use crate::error::ProviderError;

#[derive(Default)]
struct ScriptState {
    usernames: HashMap<String, Entity>,
    ids: HashMap<(i64, IdShape), Entity>,
    contacts: Vec<Entity>,
    dialogs: Vec<Dialog>,
    participants: HashMap<i64, Vec<Entity>>,
    group_error: Option<ProviderError>,
    listing_error: Option<ProviderError>,
    listing_once: VecDeque<ProviderError>,
    invite_errors: HashMap<i64, ProviderError>,
    direct_errors: HashMap<i64, ProviderError>,
    invite_once: HashMap<i64, VecDeque<ProviderError>>,
    all_invites_error: Option<ProviderError>,
    invited: Vec<i64>,
    invite_attempts: Vec<i64>,
    calls: Vec<String>,
    connected: bool,
    reconnects: u32,
}

pub struct ScriptedClient {
    state: Mutex<ScriptState>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                connected: true,
                ..ScriptState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Script setup ────────────────────────────────────────

    /// Resolvable by `resolve_username`.
    pub fn add_username(&self, entity: Entity) {
        if let Some(u) = &entity.username {
            self.state().usernames.insert(u.to_ascii_lowercase(), entity.clone());
        }
    }

    pub fn add_id(&self, shape: IdShape, entity: Entity) {
        self.state().ids.insert((entity.id, shape), entity);
    }

    pub fn add_contact(&self, entity: Entity) {
        self.state().contacts.push(entity);
    }

    pub fn add_dialog(&self, dialog: Dialog) {
        self.state().dialogs.push(dialog);
    }

    pub fn add_participants(&self, group_id: i64, members: Vec<Entity>) {
        self.state().participants.entry(group_id).or_default().extend(members);
    }

    pub fn fail_group(&self, err: ProviderError) {
        self.state().group_error = Some(err);
    }

    /// Contacts, dialogs and participants listings fail with `err`.
    pub fn fail_listing(&self, err: ProviderError) {
        self.state().listing_error = Some(err);
    }

    pub fn fail_listing_once(&self, err: ProviderError) {
        self.state().listing_once.push_back(err);
    }

    /// Every invitation call for `user_id` fails with `err`.
    pub fn fail_invites(&self, user_id: i64, err: ProviderError) {
        self.state().invite_errors.insert(user_id, err);
    }

    /// Only `invite_to_channel` fails for `user_id`.
    pub fn fail_direct(&self, user_id: i64, err: ProviderError) {
        self.state().direct_errors.insert(user_id, err);
    }

    /// The next invitation call for `user_id` fails with `err`.
    pub fn fail_invite_once(&self, user_id: i64, err: ProviderError) {
        self.state().invite_once.entry(user_id).or_default().push_back(err);
    }

    pub fn fail_all_invites(&self, err: ProviderError) {
        self.state().all_invites_error = Some(err);
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    // ── Recordings ──────────────────────────────────────────

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Users successfully invited, in order.
    pub fn invited(&self) -> Vec<i64> {
        self.state().invited.clone()
    }

    /// Users of every invitation call, successful or not.
    pub fn invite_attempts(&self) -> Vec<i64> {
        self.state().invite_attempts.clone()
    }

    pub fn reconnect_count(&self) -> u32 {
        self.state().reconnects
    }

    fn listing(&self, call: &str) -> ProviderResult<()> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        if let Some(err) = state.listing_once.pop_front() {
            return Err(err);
        }
        match &state.listing_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn invitation(&self, call: &str, user: &Entity, direct: bool) -> ProviderResult<()> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        state.invite_attempts.push(user.id);

        if let Some(err) = state.invite_once.get_mut(&user.id).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        if let Some(err) = &state.all_invites_error {
            return Err(err.clone());
        }
        if let Some(err) = state.invite_errors.get(&user.id) {
            return Err(err.clone());
        }
        if direct && let Some(err) = state.direct_errors.get(&user.id) {
            return Err(err.clone());
        }
        state.invited.push(user.id);
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    async fn resolve_username(&self, username: &str) -> ProviderResult<Entity> {
        let mut state = self.state();
        state.calls.push("resolve_username".into());
        let key = username.trim_start_matches('@').to_ascii_lowercase();
        state
            .usernames
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::Transient("400: USERNAME_NOT_OCCUPIED".into()))
    }

    async fn resolve_id(&self, id: i64, shape: IdShape) -> ProviderResult<Entity> {
        let mut state = self.state();
        state.calls.push(format!("resolve_id:{shape:?}"));
        state
            .ids
            .get(&(id, shape))
            .cloned()
            .ok_or_else(|| ProviderError::Transient("400: PEER_ID_INVALID".into()))
    }

    async fn resolve_group(&self, group_id: &str) -> ProviderResult<Entity> {
        let mut state = self.state();
        state.calls.push("resolve_group".into());
        if let Some(err) = &state.group_error {
            return Err(err.clone());
        }
        Ok(Entity::channel(group_id.parse().unwrap_or_default(), group_id))
    }

    async fn list_contacts(&self) -> ProviderResult<Vec<Entity>> {
        self.listing("list_contacts")?;
        Ok(self.state().contacts.clone())
    }

    async fn list_dialogs(&self, limit: usize) -> ProviderResult<Vec<Dialog>> {
        self.listing("list_dialogs")?;
        Ok(self.state().dialogs.iter().take(limit).cloned().collect())
    }

    async fn list_participants(&self, group: &Entity, limit: usize) -> ProviderResult<Vec<Entity>> {
        self.listing("list_participants")?;
        Ok(self
            .state()
            .participants
            .get(&group.id)
            .map(|m| m.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn invite_to_channel(&self, _group: &Entity, user: &Entity) -> ProviderResult<()> {
        self.invitation("invite_to_channel", user, true)
    }

    async fn add_chat_user(&self, _group: &Entity, user: &Entity) -> ProviderResult<()> {
        self.invitation("add_chat_user", user, false)
    }

    async fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn reconnect(&self) -> ProviderResult<()> {
        let mut state = self.state();
        state.reconnects += 1;
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        self.state().connected = false;
    }
}

/// Hands out one shared [`ScriptedClient`] to every account.
pub struct ScriptedConnector {
    client: Option<Arc<ScriptedClient>>,
    connects: AtomicU32,
}

impl ScriptedConnector {
    pub fn new(client: Arc<ScriptedClient>) -> Self {
        Self {
            client: Some(client),
            connects: AtomicU32::new(0),
        }
    }

    /// Every connect attempt fails.
    pub fn failing() -> Self {
        Self {
            client: None,
            connects: AtomicU32::new(0),
        }
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _account: &Account) -> ProviderResult<Arc<dyn ProviderClient>> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        match &self.client {
            Some(client) => {
                client.set_connected(true);
                Ok(client.clone() as Arc<dyn ProviderClient>)
            }
            None => Err(ProviderError::Transient("AUTH_KEY_UNREGISTERED".into())),
        }
    }
}
