// src/services/live.rs

use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, postgres::PgListener};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    error::AppResult,
    models::{participant::Participant, room::Room},
    repositories::{ExamStore, RoomFilter},
};

/// Postgres channel carrying change events between server instances.
pub const NOTIFY_CHANNEL: &str = "exam_engine_changes";

/// A write accepted by the store, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "doc", rename_all = "snake_case")]
pub enum ChangeEvent {
    Room(Room),
    Participant(Participant),
    /// Notifications may have been missed; every query reloads.
    Resync,
}

/// A filtered view an examiner or participant screen can watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveQuery {
    Rooms(RoomFilter),
    Participants { room_id: String },
}

impl LiveQuery {
    /// Whether `event` may change the result of this query.
    pub fn touches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            // A room leaving `waiting` also changes the open list.
            (LiveQuery::Rooms(RoomFilter::Open), ChangeEvent::Room(_)) => true,
            (LiveQuery::Rooms(RoomFilter::OwnedBy(examiner_id)), ChangeEvent::Room(room)) => {
                &room.examiner_id == examiner_id
            }
            (LiveQuery::Rooms(RoomFilter::All), ChangeEvent::Room(_)) => true,
            (LiveQuery::Participants { room_id }, ChangeEvent::Participant(p)) => {
                &p.room_id == room_id
            }
            (_, ChangeEvent::Resync) => true,
            _ => false,
        }
    }

    async fn load(&self, store: &dyn ExamStore) -> AppResult<Snapshot> {
        match self {
            LiveQuery::Rooms(filter) => Ok(Snapshot::Rooms(store.list_rooms(filter).await?)),
            LiveQuery::Participants { room_id } => Ok(Snapshot::Participants(
                store.list_participants(room_id).await?,
            )),
        }
    }
}

/// Full result of a query at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Rooms(Vec<Room>),
    Participants(Vec<Participant>),
}

#[derive(Clone)]
enum Relay {
    /// Events stay inside this process.
    Local,
    /// Events go out through `pg_notify` and come back, from every instance,
    /// through the listener task.
    Postgres(PgPool),
}

/// Push-based fan-out of store writes to every live subscriber.
///
/// Each accepted write publishes exactly one event. There is no debouncing.
#[derive(Clone)]
pub struct LiveHub {
    tx: broadcast::Sender<ChangeEvent>,
    relay: Relay,
}

impl LiveHub {
    /// Hub for a single process backed by the in-memory store.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            relay: Relay::Local,
        }
    }

    /// Hub shared by every instance using the same database: writes are
    /// published with `NOTIFY` and delivered from a `LISTEN` connection.
    pub async fn with_postgres(capacity: usize, pool: PgPool) -> AppResult<Self> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let (tx, _rx) = broadcast::channel(capacity.max(1));
        tokio::spawn(forward_notifications(listener, tx.clone()));
        tracing::info!("Live updates relayed through Postgres channel {}", NOTIFY_CHANNEL);

        Ok(Self {
            tx,
            relay: Relay::Postgres(pool),
        })
    }

    pub fn publish(&self, event: ChangeEvent) {
        match &self.relay {
            Relay::Local => self.send_local(event),
            Relay::Postgres(pool) => {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Failed to encode change event: {}", e);
                        return;
                    }
                };
                let pool = pool.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let sent = sqlx::query("SELECT pg_notify($1, $2)")
                        .bind(NOTIFY_CHANNEL)
                        .bind(&payload)
                        .execute(&pool)
                        .await;
                    if let Err(e) = sent {
                        tracing::warn!("NOTIFY failed, delivering locally only: {}", e);
                        let _ = tx.send(event);
                    }
                });
            }
        }
    }

    fn send_local(&self, event: ChangeEvent) {
        // Err only means nobody is watching right now.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Registers interest in `query`. Events published after this call are
    /// never missed by the returned subscription.
    pub fn subscribe(&self, store: Arc<dyn ExamStore>, query: LiveQuery) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            store,
            query,
            primed: false,
        }
    }
}

/// Feeds notifications from the shared database into the local channel.
async fn forward_notifications(mut listener: PgListener, tx: broadcast::Sender<ChangeEvent>) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(e) => tracing::warn!("Ignoring malformed change notification: {}", e),
                }
            }
            // Connection lost; the next call reconnects.
            Ok(None) => {
                tracing::warn!("Store notification connection lost, reconnecting");
                let _ = tx.send(ChangeEvent::Resync);
            }
            Err(e) => {
                tracing::error!("Store notification listener failed: {}", e);
                let _ = tx.send(ChangeEvent::Resync);
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        }
    }
}

/// One registered live query. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    store: Arc<dyn ExamStore>,
    query: LiveQuery,
    primed: bool,
}

impl Subscription {
    pub fn query(&self) -> &LiveQuery {
        &self.query
    }

    /// Waits for the next snapshot: the current state on the first call, then
    /// one fresh snapshot per relevant change. `None` once the hub is gone.
    pub async fn next_snapshot(&mut self) -> Option<AppResult<Snapshot>> {
        if !self.primed {
            self.primed = true;
            return Some(self.query.load(self.store.as_ref()).await);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) if self.query.touches(&event) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Live subscriber lagged by {} events, resending snapshot",
                        skipped
                    );
                    break;
                }
                Err(RecvError::Closed) => return None,
            }
        }

        Some(self.query.load(self.store.as_ref()).await)
    }

    /// Consumes the subscription into a stream of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = AppResult<Snapshot>> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next_snapshot().await.map(|snapshot| (snapshot, sub))
        })
    }

    /// Explicit cancellation.
    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{participant::ParticipantStatus, room::RoomStatus},
        repositories::MemoryStore,
    };
    use chrono::Utc;
    use futures::StreamExt;
    use std::time::Duration;

    fn room(id: &str, examiner: &str, status: RoomStatus) -> Room {
        Room {
            id: id.into(),
            category_id: "M1".into(),
            category_name: "Motorcycle".into(),
            name: "Morning".into(),
            examiner_id: examiner.into(),
            examiner_name: "Teacher".into(),
            status,
            created_at: Utc::now(),
        }
    }

    fn participant(room_id: &str, user_id: &str) -> Participant {
        Participant {
            room_id: room_id.into(),
            user_id: user_id.into(),
            display_name: user_id.into(),
            email: String::new(),
            status: ParticipantStatus::Waiting,
            score: 0,
            total_questions: 0,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_touches_filters_by_document_set() {
        let owned = LiveQuery::Rooms(RoomFilter::OwnedBy("t1".into()));
        assert!(owned.touches(&ChangeEvent::Room(room("R1", "t1", RoomStatus::Waiting))));
        assert!(!owned.touches(&ChangeEvent::Room(room("R2", "t2", RoomStatus::Waiting))));
        assert!(!owned.touches(&ChangeEvent::Participant(participant("R1", "u1"))));

        let open = LiveQuery::Rooms(RoomFilter::Open);
        assert!(open.touches(&ChangeEvent::Room(room("R1", "t1", RoomStatus::Finished))));

        let detail = LiveQuery::Participants { room_id: "R1".into() };
        assert!(detail.touches(&ChangeEvent::Participant(participant("R1", "u1"))));
        assert!(!detail.touches(&ChangeEvent::Participant(participant("R2", "u1"))));
    }

    #[test]
    fn test_resync_reaches_every_query() {
        for query in [
            LiveQuery::Rooms(RoomFilter::Open),
            LiveQuery::Rooms(RoomFilter::OwnedBy("t1".into())),
            LiveQuery::Participants { room_id: "R1".into() },
        ] {
            assert!(query.touches(&ChangeEvent::Resync));
        }
    }

    #[test]
    fn test_notification_payload_is_tagged() {
        let event = ChangeEvent::Participant(participant("R1", "u1"));
        let payload = serde_json::to_value(&event).unwrap();
        assert_eq!(payload["kind"], "participant");
        assert_eq!(payload["doc"]["roomId"], "R1");

        let decoded: ChangeEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_subscription_pushes_snapshot_per_change() {
        let store: Arc<dyn ExamStore> = Arc::new(MemoryStore::new());
        let hub = LiveHub::new(16);
        let mut sub = hub.subscribe(store.clone(), LiveQuery::Rooms(RoomFilter::Open));

        let first = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(first, Snapshot::Rooms(vec![]));

        let r1 = room("R1", "t1", RoomStatus::Waiting);
        store.insert_room(&r1).await.unwrap();
        hub.publish(ChangeEvent::Room(r1.clone()));

        let second = tokio::time::timeout(Duration::from_secs(1), sub.next_snapshot())
            .await
            .expect("snapshot should be pushed")
            .unwrap()
            .unwrap();
        assert_eq!(second, Snapshot::Rooms(vec![r1]));
    }

    #[tokio::test]
    async fn test_unrelated_events_are_skipped() {
        let store: Arc<dyn ExamStore> = Arc::new(MemoryStore::new());
        let hub = LiveHub::new(16);
        let mut sub = hub.subscribe(
            store.clone(),
            LiveQuery::Participants { room_id: "R1".into() },
        );
        sub.next_snapshot().await.unwrap().unwrap();

        hub.publish(ChangeEvent::Participant(participant("R2", "u9")));
        let p = participant("R1", "u1");
        store.upsert_participant(&p).await.unwrap();
        hub.publish(ChangeEvent::Participant(p.clone()));

        let next = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(next, Snapshot::Participants(vec![p]));
    }

    #[tokio::test]
    async fn test_stream_ends_when_hub_dropped() {
        let store: Arc<dyn ExamStore> = Arc::new(MemoryStore::new());
        let hub = LiveHub::new(4);
        let sub = hub.subscribe(store, LiveQuery::Rooms(RoomFilter::All));
        assert_eq!(hub.subscriber_count(), 1);
        drop(hub);

        let snapshots: Vec<_> = sub.into_stream().collect().await;
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_receiver() {
        let store: Arc<dyn ExamStore> = Arc::new(MemoryStore::new());
        let hub = LiveHub::new(4);
        let sub = hub.subscribe(store, LiveQuery::Rooms(RoomFilter::Open));
        assert_eq!(hub.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
    }
}
