//! In-memory `AuthBackend` for session, auth, and flow tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use super::*;

struct Account {
    password: String,
    user: AuthUser,
}

/// Scripted backend. Accounts and profiles live in memory; every call is
/// counted so tests can assert on network traffic.
pub struct MockBackend {
    accounts: Mutex<HashMap<String, Account>>,
    profiles: Mutex<Vec<ProfileRow>>,
    current: Mutex<Option<AuthUser>>,
    fetch_delay: Mutex<Duration>,
    events: broadcast::Sender<AuthEvent>,
    next_id: AtomicUsize,
    pub get_user_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub sign_up_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub find_calls: AtomicUsize,
    pub fail_profile_insert: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub fail_update: AtomicBool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            profiles: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            fetch_delay: Mutex::new(Duration::ZERO),
            events,
            next_id: AtomicUsize::new(1),
            get_user_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            find_calls: AtomicUsize::new(0),
            fail_profile_insert: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    /// Register a confirmed account with a matching profile row.
    #[must_use]
    pub fn with_account(self, email: &str, password: &str, full_name: &str, phone: &str) -> Self {
        let user = self.make_user(email, full_name);
        let username = email.split('@').next().unwrap_or_default().to_owned();
        self.profiles.lock().unwrap().push(ProfileRow {
            id: format!("p-{}", user.id),
            username: Some(username),
            full_name: Some(full_name.to_owned()),
            phone: Some(phone.to_owned()),
            created_at: None,
            user_id: Some(user.id.clone()),
        });
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_owned(), Account { password: password.to_owned(), user });
        self
    }

    /// Pretend a session already exists for `email`.
    pub fn sign_in_as(&self, email: &str) {
        let user = self.accounts.lock().unwrap().get(email).map(|a| a.user.clone());
        *self.current.lock().unwrap() = user;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Push an event as if another tab changed the auth state.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.current.lock().unwrap().clone()
    }

    #[must_use]
    pub fn password_of(&self, email: &str) -> Option<String> {
        self.accounts.lock().unwrap().get(email).map(|a| a.password.clone())
    }

    #[must_use]
    pub fn profiles(&self) -> Vec<ProfileRow> {
        self.profiles.lock().unwrap().clone()
    }

    #[must_use]
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn make_user(&self, email: &str, full_name: &str) -> AuthUser {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut metadata = HashMap::new();
        metadata.insert("full_name".to_owned(), serde_json::json!(full_name));
        metadata.insert(
            "username".to_owned(),
            serde_json::json!(email.split('@').next().unwrap_or_default()),
        );
        AuthUser {
            id: format!("u-{id}"),
            email: Some(email.to_owned()),
            phone: None,
            user_metadata: metadata,
            email_confirmed_at: None,
            created_at: None,
        }
    }
}

fn session_for(user: AuthUser) -> Session {
    Session {
        access_token: format!("token-{}", user.id),
        refresh_token: "refresh".into(),
        token_type: "bearer".into(),
        expires_in: 3600,
        expires_at: None,
        user,
    }
}

#[async_trait::async_trait]
impl AuthBackend for MockBackend {
    async fn get_user(&self) -> Result<Option<AuthUser>, BackendError> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.current_user())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let user = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(BackendError::new(
                        Some(400),
                        Some("invalid_credentials".into()),
                        "Invalid login credentials",
                    ));
                }
            }
        };
        *self.current.lock().unwrap() = Some(user.clone());
        self.emit(AuthEvent::SignedIn(user.clone()));
        Ok(session_for(user))
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpResponse, BackendError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.accounts.lock().unwrap().contains_key(&request.email) {
            return Err(BackendError::new(Some(422), None, "User already registered"));
        }
        let user = self.make_user(&request.email, &request.metadata.full_name);
        self.accounts.lock().unwrap().insert(
            request.email.clone(),
            Account { password: request.password.clone(), user: user.clone() },
        );
        Ok(SignUpResponse { user: Some(user), session: None })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(BackendError::transport("error sending request"));
        }
        *self.current.lock().unwrap() = None;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn reset_password_for_email(&self, _email: &str, _redirect_to: Option<&str>) -> Result<(), BackendError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, BackendError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let Some(user) = self.current_user() else {
            return Err(BackendError::session_missing());
        };
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(BackendError::new(
                Some(422),
                Some("same_password".into()),
                "New password should be different from the old password.",
            ));
        }
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.values_mut().find(|a| a.user.id == user.id) {
            account.password = new_password.to_owned();
        }
        drop(accounts);
        self.emit(AuthEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    async fn insert_profile(&self, profile: &NewProfile, _access_token: Option<&str>) -> Result<(), BackendError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_profile_insert.load(Ordering::SeqCst) {
            return Err(BackendError::new(
                Some(403),
                Some("42501".into()),
                "new row violates row-level security policy for table \"user_profiles\"",
            ));
        }
        let mut profiles = self.profiles.lock().unwrap();
        let id = format!("p-{}", profiles.len() + 1);
        profiles.push(ProfileRow {
            id,
            username: Some(profile.username.clone()),
            full_name: Some(profile.full_name.clone()),
            phone: profile.phone.clone(),
            created_at: None,
            user_id: Some(profile.user_id.clone()),
        });
        Ok(())
    }

    async fn find_profile(&self, filter: &ProfileFilter) -> Result<Option<ProfileRow>, BackendError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let pairs = filter.pairs();
        let profiles = self.profiles.lock().unwrap();
        let matches: Vec<&ProfileRow> = profiles
            .iter()
            .filter(|row| {
                pairs.iter().all(|(column, value)| {
                    let field = match *column {
                        "username" => row.username.as_deref(),
                        "full_name" => row.full_name.as_deref(),
                        "phone" => row.phone.as_deref(),
                        _ => None,
                    };
                    field == Some(*value)
                })
            })
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some((*row).clone())),
            _ => Err(BackendError::new(
                Some(406),
                Some("PGRST116".into()),
                "JSON object requested, multiple (or no) rows returned",
            )),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
