//! Deterministic in-memory implementation of the shared `chat_backend` contract.
//!
//! This crate contains no transport logic. It mirrors the backend's observable
//! rules (token issuance, field validation, ascending message feed) and adds
//! test controls: scripted failures, revoked credentials, an offline switch,
//! replication lag on the feed, and per-operation gates that hold requests in
//! flight until released.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chat_backend::{
    utf16_len, Account, AuthResponse, AuthToken, Author, BackendError, ChatBackend, FieldErrors,
    LoginRequest, Message, MessagePage, PageRequest, Profile, ProfileUpdate, RegisterRequest,
    MESSAGE_TEXT_MAX_UNITS,
};
use time::OffsetDateTime;
use tokio::sync::Semaphore;

/// Unix timestamp of the first generated record; later records add one second per id.
const EPOCH_BASE_SECS: i64 = 1_771_000_000;
const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 150;
const PASSWORD_MIN_CHARS: usize = 6;

/// Backend request kinds, used to address counters, gates, and scripted failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Login,
    Logout,
    ListMessages,
    CreateMessage,
    GetProfile,
    UpdateProfile,
}

#[derive(Debug, Clone)]
struct MockAccount {
    id: u64,
    username: String,
    email: Option<String>,
    password: String,
    created_at: OffsetDateTime,
}

impl MockAccount {
    fn account(&self) -> Account {
        Account {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    fn profile(&self) -> Profile {
        Profile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    accounts: Vec<MockAccount>,
    tokens: HashMap<String, u64>,
    messages: Vec<Message>,
    next_account_id: u64,
    next_message_id: u64,
    next_token: u64,
    scripted_failures: HashMap<Operation, VecDeque<BackendError>>,
    calls: HashMap<Operation, usize>,
    offline: bool,
    window_lag: usize,
}

impl MockState {
    fn account_for_token(&self, token: &AuthToken) -> Result<&MockAccount, BackendError> {
        let account_id = self
            .tokens
            .get(token.as_str())
            .ok_or_else(|| BackendError::unauthorized("Invalid token."))?;
        self.accounts
            .iter()
            .find(|account| account.id == *account_id)
            .ok_or_else(|| BackendError::unauthorized("Invalid token."))
    }

    fn issue_token(&mut self, account_id: u64) -> String {
        self.next_token += 1;
        let token = format!("mock-token-{:04}", self.next_token);
        self.tokens.insert(token.clone(), account_id);
        token
    }

    fn username_taken(&self, username: &str, except: Option<u64>) -> bool {
        self.accounts
            .iter()
            .any(|account| account.username == username && Some(account.id) != except)
    }

    fn email_taken(&self, email: &str, except: Option<u64>) -> bool {
        self.accounts.iter().any(|account| {
            account.email.as_deref() == Some(email) && Some(account.id) != except
        })
    }

    fn push_account(&mut self, username: &str, email: &str, password: &str) -> MockAccount {
        self.next_account_id += 1;
        let account = MockAccount {
            id: self.next_account_id,
            username: username.to_owned(),
            email: Some(email.to_owned()),
            password: password.to_owned(),
            created_at: timestamp(self.next_account_id),
        };
        self.accounts.push(account.clone());
        account
    }

    fn push_message(&mut self, author: Option<Author>, text: &str) -> Message {
        self.next_message_id += 1;
        let message = Message {
            id: self.next_message_id,
            text: text.to_owned(),
            author,
            created_at: timestamp(self.next_message_id),
        };
        self.messages.push(message.clone());
        message
    }
}

/// Scripted in-memory messaging backend.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    gates: Mutex<HashMap<Operation, Arc<Semaphore>>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account directly, bypassing validation.
    pub fn add_account(&self, username: &str, email: &str, password: &str) -> Account {
        lock_unpoisoned(&self.state)
            .push_account(username, email, password)
            .account()
    }

    /// Issues a fresh valid token for an existing account.
    pub fn issue_token(&self, username: &str) -> Option<AuthToken> {
        let mut state = lock_unpoisoned(&self.state);
        let account_id = state
            .accounts
            .iter()
            .find(|account| account.username == username)?
            .id;
        AuthToken::parse(state.issue_token(account_id))
    }

    /// Appends a message to the feed as if another client had posted it.
    pub fn seed_message(&self, author_username: Option<&str>, text: &str) -> Message {
        let mut state = lock_unpoisoned(&self.state);
        let author = author_username.and_then(|username| {
            state
                .accounts
                .iter()
                .find(|account| account.username == username)
                .map(|account| Author::new(account.id, account.username.clone()))
        });
        state.push_message(author, text)
    }

    /// Invalidates every issued token; later authenticated calls answer `401`.
    pub fn revoke_all_tokens(&self) {
        lock_unpoisoned(&self.state).tokens.clear();
    }

    pub fn token_is_valid(&self, token: &AuthToken) -> bool {
        lock_unpoisoned(&self.state)
            .tokens
            .contains_key(token.as_str())
    }

    /// Queues `error` as the result of the next `operation` request.
    pub fn fail_next(&self, operation: Operation, error: BackendError) {
        lock_unpoisoned(&self.state)
            .scripted_failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// While offline, every request fails as a transient network error.
    pub fn set_offline(&self, offline: bool) {
        lock_unpoisoned(&self.state).offline = offline;
    }

    /// Hides the newest `lag` messages from feed reads, simulating replication lag.
    pub fn set_window_lag(&self, lag: usize) {
        lock_unpoisoned(&self.state).window_lag = lag;
    }

    /// Number of `operation` requests received, counted on arrival.
    pub fn calls(&self, operation: Operation) -> usize {
        lock_unpoisoned(&self.state)
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn messages(&self) -> Vec<Message> {
        lock_unpoisoned(&self.state).messages.clone()
    }

    /// Holds subsequent `operation` requests in flight until released.
    pub fn pause(&self, operation: Operation) {
        lock_unpoisoned(&self.gates).insert(operation, Arc::new(Semaphore::new(0)));
    }

    /// Lets exactly one held `operation` request proceed.
    pub fn release_one(&self, operation: Operation) {
        if let Some(gate) = lock_unpoisoned(&self.gates).get(&operation) {
            gate.add_permits(1);
        }
    }

    /// Releases every held `operation` request and stops holding new ones.
    pub fn resume(&self, operation: Operation) {
        if let Some(gate) = lock_unpoisoned(&self.gates).remove(&operation) {
            gate.close();
        }
    }

    async fn enter(&self, operation: Operation) -> Result<(), BackendError> {
        *lock_unpoisoned(&self.state)
            .calls
            .entry(operation)
            .or_insert(0) += 1;

        let gate = lock_unpoisoned(&self.gates).get(&operation).cloned();
        if let Some(gate) = gate {
            // A closed gate means the operation was resumed; proceed either way.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state
            .scripted_failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if state.offline {
            return Err(BackendError::network("backend unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, BackendError> {
        self.enter(Operation::Register).await?;
        let mut state = lock_unpoisoned(&self.state);

        let mut errors = FieldErrors::new();
        let username_chars = request.username.chars().count();
        if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username_chars) {
            errors.push(
                "username",
                format!("Ensure this field has at least {USERNAME_MIN_CHARS} characters."),
            );
        } else if state.username_taken(&request.username, None) {
            errors.push("username", "A user with that username already exists.");
        }
        if !request.email.contains('@') {
            errors.push("email", "Enter a valid email address.");
        } else if state.email_taken(&request.email, None) {
            errors.push("email", "A user with that email already exists.");
        }
        if request.password.chars().count() < PASSWORD_MIN_CHARS {
            errors.push(
                "password",
                format!("Ensure this field has at least {PASSWORD_MIN_CHARS} characters."),
            );
        }
        if !errors.is_empty() {
            return Err(BackendError::Validation(errors));
        }

        let account = state.push_account(&request.username, &request.email, &request.password);
        let token = state.issue_token(account.id);
        Ok(AuthResponse {
            token: Some(token),
            id: Some(account.id),
            username: Some(account.username),
            email: account.email,
            ..AuthResponse::default()
        })
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, BackendError> {
        self.enter(Operation::Login).await?;
        let mut state = lock_unpoisoned(&self.state);

        let account = state
            .accounts
            .iter()
            .find(|account| {
                account.username == request.username && account.password == request.password
            })
            .map(MockAccount::account)
            .ok_or_else(|| BackendError::validation("error", "Invalid credentials"))?;

        // Login replaces any token the account already held.
        state.tokens.retain(|_, owner| *owner != account.id);
        let token = state.issue_token(account.id);
        Ok(AuthResponse {
            token: Some(token),
            user: Some(account),
            ..AuthResponse::default()
        })
    }

    async fn logout(&self, token: &AuthToken) -> Result<(), BackendError> {
        self.enter(Operation::Logout).await?;
        let mut state = lock_unpoisoned(&self.state);
        state.account_for_token(token)?;
        state.tokens.remove(token.as_str());
        Ok(())
    }

    async fn list_messages(
        &self,
        token: &AuthToken,
        page: PageRequest,
    ) -> Result<MessagePage, BackendError> {
        self.enter(Operation::ListMessages).await?;
        let state = lock_unpoisoned(&self.state);
        state.account_for_token(token)?;

        let visible = state.messages.len().saturating_sub(state.window_lag);
        let results = state.messages[..visible]
            .iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok(MessagePage {
            count: Some(visible as u64),
            results,
        })
    }

    async fn create_message(&self, token: &AuthToken, text: &str) -> Result<Message, BackendError> {
        self.enter(Operation::CreateMessage).await?;
        let mut state = lock_unpoisoned(&self.state);
        let account = state.account_for_token(token)?;
        let author = Author::new(account.id, account.username.clone());

        if text.is_empty() {
            return Err(BackendError::validation(
                "text",
                "This field may not be blank.",
            ));
        }
        if utf16_len(text) > MESSAGE_TEXT_MAX_UNITS {
            return Err(BackendError::validation(
                "text",
                format!("Ensure this field has no more than {MESSAGE_TEXT_MAX_UNITS} characters."),
            ));
        }

        Ok(state.push_message(Some(author), text))
    }

    async fn get_profile(&self, token: &AuthToken) -> Result<Profile, BackendError> {
        self.enter(Operation::GetProfile).await?;
        let state = lock_unpoisoned(&self.state);
        Ok(state.account_for_token(token)?.profile())
    }

    async fn update_profile(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        self.enter(Operation::UpdateProfile).await?;
        let mut state = lock_unpoisoned(&self.state);
        let account_id = state.account_for_token(token)?.id;

        let mut errors = FieldErrors::new();
        if let Some(username) = &update.username {
            if state.username_taken(username, Some(account_id)) {
                errors.push("username", "A user with that username already exists.");
            }
        }
        if let Some(email) = &update.email {
            if state.email_taken(email, Some(account_id)) {
                errors.push("email", "A user with that email already exists.");
            }
        }
        if !errors.is_empty() {
            return Err(BackendError::Validation(errors));
        }

        let account = state
            .accounts
            .iter_mut()
            .find(|account| account.id == account_id)
            .ok_or_else(|| BackendError::unauthorized("Invalid token."))?;
        if let Some(username) = &update.username {
            account.username = username.clone();
        }
        if let Some(email) = &update.email {
            account.email = Some(email.clone());
        }
        Ok(account.profile())
    }
}

fn timestamp(offset: u64) -> OffsetDateTime {
    let offset = i64::try_from(offset).unwrap_or(0);
    OffsetDateTime::from_unix_timestamp(EPOCH_BASE_SECS + offset)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
