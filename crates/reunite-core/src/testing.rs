//! Shared fixtures for engine tests: in-memory store, seeded users, and
//! publisher doubles.

use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use reunite_db::Database;
use reunite_types::events::{ChannelId, GatewayEvent};
use reunite_types::models::{Actor, User};

use crate::Publisher;

pub(crate) fn test_db() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

pub(crate) fn seed_user(db: &Database, username: &str) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        display_name: None,
        is_staff: false,
        created_at: Utc::now(),
    };
    db.insert_user(&user).expect("seed user");
    user
}

pub(crate) fn seed_staff(db: &Database, username: &str) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        display_name: None,
        is_staff: true,
        created_at: Utc::now(),
    };
    db.insert_user(&user).expect("seed staff");
    user
}

pub(crate) fn actor_for(user: &User) -> Actor {
    Actor {
        id: user.id,
        username: user.username.clone(),
        is_staff: user.is_staff,
    }
}

/// Captures every publish for assertions.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    published: Mutex<Vec<(String, GatewayEvent)>>,
}

impl RecordingPublisher {
    pub(crate) fn channel_names(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub(crate) fn events(&self) -> Vec<(String, GatewayEvent)> {
        self.published.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, channel: &ChannelId, event: &GatewayEvent) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((channel.name(), event.clone()));
        Ok(())
    }
}

/// Always errors, for the push-failure-is-swallowed paths.
pub(crate) struct FailingPublisher;

impl Publisher for FailingPublisher {
    fn publish(&self, _channel: &ChannelId, _event: &GatewayEvent) -> anyhow::Result<()> {
        anyhow::bail!("broker unavailable")
    }
}
