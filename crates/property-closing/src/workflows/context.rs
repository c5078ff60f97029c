//! Request-scoped context shared by every workflow operation.
//!
//! Callers pass the acting identity and the moment of the action explicitly instead of relying on
//! session state, so the engine stays a set of pure transformations over a record.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for agents, buyers, and notaries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles that can act on a buying transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Agent,
    Buyer,
    Notary,
    System,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Buyer => "buyer",
            Self::Notary => "notary",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The identity performing an action together with the role it acts under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Agent)
    }

    pub fn buyer(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Buyer)
    }

    pub fn notary(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Notary)
    }

    pub fn system() -> Self {
        Self {
            id: UserId::system(),
            role: ActorRole::System,
        }
    }
}

/// Who is acting and when. Every mutating engine call takes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub actor: Actor,
    pub now: DateTime<Utc>,
}

impl ActionContext {
    pub fn new(actor: Actor, now: DateTime<Utc>) -> Self {
        Self { actor, now }
    }

    pub fn system(now: DateTime<Utc>) -> Self {
        Self::new(Actor::system(), now)
    }
}

/// Time source used for all timestamping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and scripted demos.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Source of opaque identifiers for new records.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// Random identifiers, used by the running service.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }
}

/// Monotonic identifiers (`txn-000001`, `doc-000002`, ...), handy for demos and tests.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, prefix: &str) -> String {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{id:06}")
    }
}
