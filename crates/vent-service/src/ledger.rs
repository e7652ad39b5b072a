//! Session ledger.
//!
//! Opens and closes sessions. The single-open-session rule is enforced by the store
//! (`sessions_one_open_per_user`); a violation on start means another request won
//! the race, and the caller resumes the winner's session. Closing is conditional on
//! the session still being open, so explicit ends, media-server webhooks and the
//! reaper converge on one close and one usage charge.
//!
//! Every session carries a deadline fixed at start: the maximum duration, or the
//! trial seconds left when those run out sooner. Nothing is charged past it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use vent_core::{Room, RoomCondition, Session, SessionId, UserId, VentError};
use vent_store::schema::constraint;
use vent_store::{Store, UsageCharge};

use crate::agent::AgentDispatcher;
use crate::deadline::{bounded, within};
use crate::media::{MediaGrant, MediaIssuer};
use crate::meter::UsageMeter;
use crate::rooms::RoomRegistry;

/// Overdue sessions closed per reaper pass.
const REAP_BATCH_SIZE: usize = 100;

/// Closes in flight at once during a reaper pass.
const REAP_CONCURRENCY: usize = 8;

/// A started or resumed session with its media grant.
#[derive(Debug, Clone)]
pub struct StartedSession {
    /// The open session.
    pub session: Session,
    /// The room it runs in.
    pub room: Room,
    /// Media access for the room.
    pub grant: MediaGrant,
    /// Whether an already open session was returned.
    pub resumed: bool,
}

/// Outcome of ending a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// This call closed the session and charged its usage.
    Closed,
    /// The session was already closed; nothing changed.
    AlreadyClosed,
}

/// Opens, resumes and closes sessions.
#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn Store>,
    timeout: Duration,
    rooms: RoomRegistry,
    meter: UsageMeter,
    media: Arc<dyn MediaIssuer>,
    agents: Arc<dyn AgentDispatcher>,
}

impl SessionLedger {
    /// Create a ledger.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        timeout: Duration,
        rooms: RoomRegistry,
        meter: UsageMeter,
        media: Arc<dyn MediaIssuer>,
        agents: Arc<dyn AgentDispatcher>,
    ) -> Self {
        Self {
            store,
            timeout,
            rooms,
            meter,
            media,
            agents,
        }
    }

    /// Open a new session for the user and dispatch the agent into its room.
    ///
    /// # Errors
    ///
    /// - `AlreadyActive` if the user has an open session.
    /// - `QuotaExceeded` if the usage meter denies the start; nothing is written.
    /// - `Unavailable` if storage, the media issuer or the agent dispatcher cannot
    ///   be reached. No session is left open and nothing is charged.
    pub async fn start(&self, user_id: UserId) -> Result<StartedSession, VentError> {
        let (_, mut room) = self.rooms.ensure_user(user_id).await?;

        if let Some(open) = self.open_session(user_id).await? {
            if !open.is_overdue(Utc::now()) {
                return Err(VentError::AlreadyActive { session: open.id });
            }
            // Orphaned past its deadline; close it before starting afresh.
            self.close(&open, open.deadline_at).await?;
            tracing::info!(user_id = %user_id, session_id = %open.id, "Reaped overdue session on start");
        }

        let quota = self.meter.check_quota(user_id).await?;
        if !quota.allowed {
            tracing::info!(
                user_id = %user_id,
                remaining = quota.remaining,
                status = quota.status.as_str(),
                "Session start denied by quota"
            );
            return Err(VentError::QuotaExceeded {
                remaining: quota.remaining,
                status: quota.status.as_str().to_string(),
            });
        }

        let session = Session::open(
            user_id,
            room.id,
            quota.charge_to,
            self.meter.session_limit(&quota),
        );
        match within(self.timeout, self.store.open_session(&session)).await? {
            Ok(()) => {}
            Err(e) if e.violates(constraint::ONE_OPEN_SESSION) => {
                tracing::debug!(user_id = %user_id, "Session start race lost");
                let open = self.open_session(user_id).await?.ok_or_else(|| {
                    VentError::Unavailable("concurrent session closed during start".into())
                })?;
                return Err(VentError::AlreadyActive { session: open.id });
            }
            Err(e) => return Err(e.into()),
        }

        let grant = match self.media.issue_token(&user_id, &room.room_name).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(user_id = %user_id, session_id = %session.id, error = %e, "Media token unavailable, aborting session");
                self.abort(&session).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.agents.dispatch(&room.room_name).await {
            tracing::warn!(user_id = %user_id, session_id = %session.id, error = %e, "Agent dispatch failed, aborting session");
            self.abort(&session).await;
            self.release_agent(&room.room_name).await;
            return Err(e.into());
        }

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            room_name = %room.room_name,
            deadline_at = %session.deadline_at,
            metered = if session.subscription_id.is_some() { "subscription" } else { "trial" },
            "Session started"
        );

        room.condition = RoomCondition::On;
        Ok(StartedSession {
            session,
            room,
            grant,
            resumed: false,
        })
    }

    /// Return the user's open session with a fresh media grant, dispatching the
    /// agent again if it left the room.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session is open. A session past its deadline is
    /// closed at the deadline and reported as not found.
    pub async fn resume(&self, user_id: UserId) -> Result<StartedSession, VentError> {
        let (_, room) = self.rooms.ensure_user(user_id).await?;
        let not_found = || VentError::NotFound {
            entity: "open session",
            id: user_id.to_string(),
        };
        let session = self.open_session(user_id).await?.ok_or_else(not_found)?;

        if session.is_overdue(Utc::now()) {
            if self.close(&session, session.deadline_at).await?.is_some() {
                tracing::info!(user_id = %user_id, session_id = %session.id, "Overdue session closed on resume");
                self.release_agent(&room.room_name).await;
            }
            return Err(not_found());
        }

        let grant = self.media.issue_token(&user_id, &room.room_name).await?;
        self.agents.dispatch(&room.room_name).await?;
        tracing::info!(user_id = %user_id, session_id = %session.id, "Session resumed");
        Ok(StartedSession {
            session,
            room,
            grant,
            resumed: true,
        })
    }

    /// Start a session, resuming the open one if there is one.
    ///
    /// Client reconnects call this repeatedly; a session closing between the two
    /// steps is retried once.
    pub async fn start_or_resume(&self, user_id: UserId) -> Result<StartedSession, VentError> {
        for _ in 0..2 {
            match self.start(user_id).await {
                Err(VentError::AlreadyActive { .. }) => match self.resume(user_id).await {
                    Err(VentError::NotFound { .. }) => continue,
                    other => return other,
                },
                other => return other,
            }
        }
        Err(VentError::Unavailable(
            "session state changed during start, retry".into(),
        ))
    }

    /// End a session owned by `user_id`. Ending a closed session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session does not exist or belongs to
    /// someone else.
    pub async fn end(&self, user_id: UserId, session_id: SessionId) -> Result<EndOutcome, VentError> {
        self.end_at(user_id, session_id, Utc::now()).await
    }

    /// End a session as of `at`, clamped between its start and its deadline.
    pub async fn end_at(
        &self,
        user_id: UserId,
        session_id: SessionId,
        at: DateTime<Utc>,
    ) -> Result<EndOutcome, VentError> {
        let session = bounded(self.timeout, self.store.get_session(&session_id))
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(VentError::SessionNotFound(session_id))?;

        if !session.is_open() {
            tracing::debug!(session_id = %session_id, "Session already closed");
            return Ok(EndOutcome::AlreadyClosed);
        }

        let end = session.end_at(at.max(session.started_at));
        Ok(match self.close(&session, end).await? {
            Some(closed) => {
                tracing::info!(
                    user_id = %user_id,
                    session_id = %session_id,
                    duration_seconds = closed.elapsed_seconds(end),
                    "Session ended"
                );
                self.release_agent_of(&closed).await;
                EndOutcome::Closed
            }
            None => {
                tracing::debug!(session_id = %session_id, "Session closed concurrently");
                EndOutcome::AlreadyClosed
            }
        })
    }

    /// Close the open session in a media room, e.g. when the media server reports
    /// the room finished, and release the room's agent. Returns the closed
    /// session, if this call closed one.
    pub async fn close_room(&self, room_name: &str) -> Result<Option<Session>, VentError> {
        let Some(room) = self.rooms.find_by_name(room_name).await? else {
            tracing::debug!(room_name = %room_name, "Unknown room");
            return Ok(None);
        };

        let open = self
            .open_session(room.user_id)
            .await?
            .filter(|s| s.room_id == room.id);

        let closed = match open {
            Some(open) => {
                let closed = self.close(&open, open.end_at(Utc::now())).await?;
                if closed.is_some() {
                    tracing::info!(room_name = %room_name, session_id = %open.id, "Session closed by media server");
                }
                closed
            }
            None => None,
        };

        self.release_agent(room_name).await;
        Ok(closed)
    }

    /// Close open sessions past their deadline, as ended at the deadline.
    /// Returns how many this pass closed.
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<usize, VentError> {
        let overdue = bounded(
            self.timeout,
            self.store.list_overdue_sessions(now, REAP_BATCH_SIZE),
        )
        .await?;

        let reaped = stream::iter(overdue)
            .map(|session| async move {
                match self.close(&session, session.deadline_at).await {
                    Ok(Some(closed)) => {
                        tracing::info!(
                            user_id = %closed.user_id,
                            session_id = %closed.id,
                            started_at = %closed.started_at,
                            deadline_at = %closed.deadline_at,
                            "Reaped overdue session"
                        );
                        self.release_agent_of(&closed).await;
                        1
                    }
                    Ok(None) => 0,
                    Err(e) => {
                        tracing::warn!(session_id = %session.id, error = %e, "Failed to reap session");
                        0
                    }
                }
            })
            .buffer_unordered(REAP_CONCURRENCY)
            .fold(0, |total, n| async move { total + n })
            .await;
        Ok(reaped)
    }

    /// The user's open sessions (at most one).
    pub async fn active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, VentError> {
        Ok(self.open_session(user_id).await?.into_iter().collect())
    }

    async fn open_session(&self, user_id: UserId) -> Result<Option<Session>, VentError> {
        bounded(self.timeout, self.store.get_open_session(&user_id)).await
    }

    async fn close(
        &self,
        session: &Session,
        end: DateTime<Utc>,
    ) -> Result<Option<Session>, VentError> {
        let charge = UsageMeter::usage_charge(session, end);
        bounded(
            self.timeout,
            self.store.close_session(&session.id, end, charge),
        )
        .await
    }

    /// Close a session that never became usable, without charging it.
    async fn abort(&self, session: &Session) {
        let charge = match session.subscription_id {
            Some(subscription_id) => UsageCharge::Sessions {
                subscription_id,
                count: 0,
            },
            None => UsageCharge::TrialSeconds { seconds: 0 },
        };
        if let Err(e) = bounded(
            self.timeout,
            self.store.close_session(&session.id, Utc::now(), charge),
        )
        .await
        {
            tracing::error!(session_id = %session.id, error = %e, "Failed to abort session; the reaper will close it");
        }
    }

    /// Release the agent from a closed session's room.
    async fn release_agent_of(&self, session: &Session) {
        match bounded(self.timeout, self.store.get_room_by_user(&session.user_id)).await {
            Ok(Some(room)) => self.release_agent(&room.room_name).await,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Room lookup failed, agent not released");
            }
        }
    }

    /// Agents left behind leave with the room's empty timeout; failures only warn.
    async fn release_agent(&self, room_name: &str) {
        if let Err(e) = self.agents.release(room_name).await {
            tracing::warn!(room_name = %room_name, error = %e, "Failed to release agent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDispatch, AgentError};
    use crate::media::MediaError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use vent_core::{Plan, PlanId, QuotaPolicy, Subscription, SubscriptionStatus, User};
    use vent_store::MemoryStore;

    #[derive(Default)]
    struct StubIssuer {
        down: AtomicBool,
    }

    #[async_trait]
    impl MediaIssuer for StubIssuer {
        async fn issue_token(
            &self,
            user_id: &UserId,
            room_name: &str,
        ) -> Result<MediaGrant, MediaError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(MediaError::Unavailable("stub down".into()));
            }
            Ok(MediaGrant {
                token: format!("token:{user_id}:{room_name}"),
                url: "wss://stub".into(),
                expires_at: Utc::now() + chrono::Duration::minutes(10),
            })
        }

        fn server_url(&self) -> &str {
            "wss://stub"
        }
    }

    #[derive(Default)]
    struct StubAgents {
        rooms: Mutex<HashSet<String>>,
        down: AtomicBool,
    }

    impl StubAgents {
        fn in_room(&self, room_name: &str) -> bool {
            self.rooms.lock().unwrap().contains(room_name)
        }
    }

    #[async_trait]
    impl AgentDispatcher for StubAgents {
        async fn dispatch(&self, room_name: &str) -> Result<AgentDispatch, AgentError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(AgentError::NotConfigured);
            }
            self.rooms.lock().unwrap().insert(room_name.to_string());
            Ok(AgentDispatch {
                id: format!("AD_{room_name}"),
                agent_name: "vent-agent".into(),
                room: room_name.to_string(),
            })
        }

        async fn release(&self, room_name: &str) -> Result<usize, AgentError> {
            Ok(usize::from(self.rooms.lock().unwrap().remove(room_name)))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        media: Arc<StubIssuer>,
        agents: Arc<StubAgents>,
        ledger: SessionLedger,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let media = Arc::new(StubIssuer::default());
        let agents = Arc::new(StubAgents::default());
        let timeout = Duration::from_secs(1);
        let max = chrono::Duration::hours(2);
        let rooms = RoomRegistry::new(store.clone(), timeout);
        let meter = UsageMeter::new(store.clone(), timeout, QuotaPolicy::default(), max);
        let ledger = SessionLedger::new(
            store.clone(),
            timeout,
            rooms,
            meter,
            media.clone(),
            agents.clone(),
        );
        Fixture {
            store,
            media,
            agents,
            ledger,
        }
    }

    async fn subscribe(store: &MemoryStore, user_id: UserId, limit: i64, used: i64) -> Subscription {
        let plan = Plan {
            id: PlanId::generate(),
            name: "Monthly".into(),
            price_cents: 49900,
            session_limit: limit,
            gateway_plan_id: format!("plan_{user_id}"),
        };
        let mut sub = Subscription::new(user_id, &plan, None, format!("sub_{user_id}"));
        sub.status = SubscriptionStatus::Active;
        sub.session_used = used;
        store.insert_subscription(&sub).await.unwrap();
        sub
    }

    async fn trial_user(store: &MemoryStore, used: i64) -> UserId {
        let mut user = User::new(UserId::generate());
        user.trial_seconds_used = used;
        store.insert_user_if_absent(&user).await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn trial_session_lifecycle() {
        let f = fixture();
        let user_id = UserId::generate();

        let started = f.ledger.start(user_id).await.unwrap();
        assert!(!started.resumed);
        assert_eq!(started.room.condition, RoomCondition::On);
        assert!(started.grant.token.contains(&started.room.room_name));
        assert!(f.agents.in_room(&started.room.room_name));

        let outcome = f.ledger.end(user_id, started.session.id).await.unwrap();
        assert_eq!(outcome, EndOutcome::Closed);
        let again = f.ledger.end(user_id, started.session.id).await.unwrap();
        assert_eq!(again, EndOutcome::AlreadyClosed);

        let room = f.store.get_room_by_user(&user_id).await.unwrap().unwrap();
        assert_eq!(room.condition, RoomCondition::Off);
        assert!(!f.agents.in_room(&room.room_name));
    }

    #[tokio::test]
    async fn ending_a_trial_session_charges_elapsed_seconds() {
        let f = fixture();
        let user_id = trial_user(&f.store, 100).await;
        let started = f.ledger.start(user_id).await.unwrap();

        let at = started.session.started_at + chrono::Duration::seconds(90);
        f.ledger.end_at(user_id, started.session.id, at).await.unwrap();

        let user = f.store.get_user(&user_id).await.unwrap().unwrap();
        assert_eq!(user.trial_seconds_used, 190);
        let quota = f.ledger.meter.check_quota(user_id).await.unwrap();
        assert_eq!(quota.remaining, 410);
    }

    #[tokio::test]
    async fn trial_session_deadline_is_the_remaining_trial() {
        let f = fixture();
        let user_id = trial_user(&f.store, 599).await;

        let started = f.ledger.start(user_id).await.unwrap();
        assert_eq!(
            started.session.deadline_at - started.session.started_at,
            chrono::Duration::seconds(1)
        );

        let reaped = f
            .ledger
            .reap(Utc::now() + chrono::Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(reaped, 1);
        let user = f.store.get_user(&user_id).await.unwrap().unwrap();
        assert_eq!(user.trial_seconds_used, 600);
        assert!(!f.agents.in_room(&started.room.room_name));
    }

    #[tokio::test]
    async fn late_end_of_trial_session_stops_at_deadline() {
        let f = fixture();
        let user_id = trial_user(&f.store, 570).await;
        let started = f.ledger.start(user_id).await.unwrap();

        let late = started.session.started_at + chrono::Duration::minutes(45);
        f.ledger.end_at(user_id, started.session.id, late).await.unwrap();

        let user = f.store.get_user(&user_id).await.unwrap().unwrap();
        assert_eq!(user.trial_seconds_used, 600);
        let err = f.ledger.start(user_id).await.unwrap_err();
        assert!(matches!(err, VentError::QuotaExceeded { remaining: 0, .. }));
    }

    #[tokio::test]
    async fn second_start_reports_already_active_and_resume_returns_it() {
        let f = fixture();
        let user_id = UserId::generate();
        let first = f.ledger.start(user_id).await.unwrap();

        let err = f.ledger.start(user_id).await.unwrap_err();
        assert!(matches!(err, VentError::AlreadyActive { session } if session == first.session.id));

        f.agents.release(&first.room.room_name).await.unwrap();
        let resumed = f.ledger.start_or_resume(user_id).await.unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.session.id, first.session.id);
        assert!(f.agents.in_room(&first.room.room_name));
    }

    #[tokio::test]
    async fn concurrent_starts_open_one_session() {
        let f = fixture();
        let user_id = UserId::generate();
        f.ledger.rooms.ensure_user(user_id).await.unwrap();

        let (a, b) = tokio::join!(
            f.ledger.start_or_resume(user_id),
            f.ledger.start_or_resume(user_id)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.session.id, b.session.id);
        assert!(a.resumed ^ b.resumed);
    }

    #[tokio::test]
    async fn exhausted_plan_writes_nothing() {
        let f = fixture();
        let user_id = UserId::generate();
        subscribe(&f.store, user_id, 5, 5).await;

        let err = f.ledger.start(user_id).await.unwrap_err();
        assert!(matches!(err, VentError::QuotaExceeded { remaining: 0, .. }));
        assert!(f.store.get_open_session(&user_id).await.unwrap().is_none());
        let room = f.store.get_room_by_user(&user_id).await.unwrap().unwrap();
        assert_eq!(room.condition, RoomCondition::Off);
    }

    #[tokio::test]
    async fn media_outage_aborts_without_charge() {
        let f = fixture();
        let user_id = UserId::generate();
        let sub = subscribe(&f.store, user_id, 5, 1).await;
        f.media.down.store(true, Ordering::SeqCst);

        let err = f.ledger.start(user_id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.store.get_open_session(&user_id).await.unwrap().is_none());
        let stored = f.store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.session_used, 1);
    }

    #[tokio::test]
    async fn agent_dispatch_failure_aborts_without_charge() {
        let f = fixture();
        let user_id = UserId::generate();
        let sub = subscribe(&f.store, user_id, 5, 2).await;
        f.agents.down.store(true, Ordering::SeqCst);

        let err = f.ledger.start(user_id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.store.get_open_session(&user_id).await.unwrap().is_none());
        let stored = f.store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.session_used, 2);
    }

    #[tokio::test]
    async fn paid_session_runs_to_the_maximum_duration() {
        let f = fixture();
        let user_id = UserId::generate();
        subscribe(&f.store, user_id, 5, 0).await;

        let started = f.ledger.start(user_id).await.unwrap();
        assert_eq!(
            started.session.deadline_at - started.session.started_at,
            chrono::Duration::hours(2)
        );
        assert_eq!(f.ledger.reap(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reaper_and_end_race_charges_once() {
        let f = fixture();
        let user_id = UserId::generate();
        let sub = subscribe(&f.store, user_id, 5, 0).await;
        let started = f.ledger.start(user_id).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(3);
        let (reaped, ended) = tokio::join!(
            f.ledger.reap(later),
            f.ledger.end(user_id, started.session.id)
        );
        let closed_by_reaper = reaped.unwrap() == 1;
        let closed_by_end = ended.unwrap() == EndOutcome::Closed;
        assert!(closed_by_reaper ^ closed_by_end);

        let stored = f.store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.session_used, 1);
    }

    #[tokio::test]
    async fn ending_someone_elses_session_is_not_found() {
        let f = fixture();
        let owner = UserId::generate();
        let started = f.ledger.start(owner).await.unwrap();

        let err = f
            .ledger
            .end(UserId::generate(), started.session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, VentError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn room_finished_closes_open_session_and_releases_agent() {
        let f = fixture();
        let user_id = UserId::generate();
        let started = f.ledger.start(user_id).await.unwrap();

        let closed = f.ledger.close_room(&started.room.room_name).await.unwrap();
        assert_eq!(closed.map(|s| s.id), Some(started.session.id));
        assert!(!f.agents.in_room(&started.room.room_name));
        assert!(f.ledger.close_room(&started.room.room_name).await.unwrap().is_none());
        assert!(f.ledger.active_sessions(user_id).await.unwrap().is_empty());
    }
}
