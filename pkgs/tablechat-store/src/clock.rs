//! Server-side timestamp source for conversation ordering

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, QueryOrder};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::entities::{conversation_messages, conversations};
use crate::models::from_millis;

/// Issues millisecond timestamps that never go backwards, even if the wall
/// clock does. Equal timestamps are possible; storage order breaks the tie.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_millis: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock that will not issue anything older than `millis`
    pub fn starting_at(millis: i64) -> Self {
        Self {
            last_millis: AtomicI64::new(millis),
        }
    }

    /// Create a clock seeded from the newest timestamp already persisted
    pub async fn seeded_from(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let latest_message = conversation_messages::Entity::find()
            .order_by_desc(conversation_messages::Column::CreatedAt)
            .one(db)
            .await?
            .map(|m| m.created_at)
            .unwrap_or(0);

        let latest_conversation = conversations::Entity::find()
            .order_by_desc(conversations::Column::LastMessageAt)
            .one(db)
            .await?
            .map(|c| c.last_message_at.max(c.created_at))
            .unwrap_or(0);

        let seed = latest_message.max(latest_conversation);
        debug!("Clock seeded at {}", seed);
        Ok(Self::starting_at(seed))
    }

    /// Next timestamp in milliseconds
    pub fn now_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let previous = self.last_millis.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }

    pub fn now(&self) -> DateTime<Utc> {
        from_millis(self.now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut previous = clock.now_millis();
        for _ in 0..1000 {
            let next = clock.now_millis();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn test_clock_ahead_of_wall_time_holds_its_value() {
        let ahead = Utc::now().timestamp_millis() + 60_000;
        let clock = MonotonicClock::starting_at(ahead);
        assert_eq!(clock.now_millis(), ahead);
        assert_eq!(clock.now_millis(), ahead);
    }
}
