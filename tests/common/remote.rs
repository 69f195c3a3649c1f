//! Scriptable remote service
//!
//! Counts every call, can be switched between accepting and refusing, and can
//! hold post replays behind a gate so tests can overlap two drains.

use async_trait::async_trait;
use offline_relay::shared::{
    AuthResponse, LoginPayload, PostPayload, RegisterPayload, RemoteService, SyncError,
    SyncResult, UserInfo,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

#[derive(Debug)]
pub struct MockRemote {
    fail: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
    pub logins: AtomicUsize,
    pub registers: AtomicUsize,
    pub posts: AtomicUsize,
    pub token: Mutex<Option<String>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            fail: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            logins: AtomicUsize::new(0),
            registers: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
            token: Mutex::new(None),
        }
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every call with a network failure
    pub fn failing() -> Self {
        let remote = Self::default();
        remote.set_failing(true);
        remote
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold post replays until `release` is called
    pub fn gate_posts(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn post_calls(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn current_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn check(&self) -> SyncResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(SyncError::network("connection refused"))
        } else {
            Ok(())
        }
    }

    fn auth(email: &str) -> AuthResponse {
        AuthResponse {
            token: format!("token-for-{}", email),
            user: UserInfo {
                id: serde_json::json!(1),
                username: "alice".to_string(),
                email: email.to_string(),
            },
        }
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn login(&self, login: &LoginPayload) -> SyncResult<AuthResponse> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Self::auth(&login.email))
    }

    async fn register(&self, register: &RegisterPayload) -> SyncResult<AuthResponse> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Self::auth(&register.email))
    }

    async fn create_post(&self, _post: &PostPayload) -> SyncResult<serde_json::Value> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
        self.check()?;
        Ok(serde_json::json!({ "id": 1 }))
    }

    async fn health(&self) -> SyncResult<()> {
        self.check()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }
}
