//! Sync client: composition root for the real-time state layer
//!
//! Wires the session provider, the transport connection manager, the room
//! controller, and the three stores together. All store mutation driven by
//! push events flows through one dispatch loop, which is what serializes
//! event application; mutations driven by local REST round-trips are
//! epoch-gated so results resolving after a session change are discarded.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::session::{SessionProvider, TokenStore};
use crate::store::{AlertFeed, MetricsBuffer, TaskStore};
use crate::transport::{ConnectionManager, RoomSubscriptions};
use crate::types::{
    BlockStatus, ClientEvent, Identity, InspectionResult, LoginCredentials, NewTask,
    RegisterCredentials, Result, ServerEvent, SyncError, Task, TaskPatch, TaskStatus,
};

/// Which tasks a fetch replaces the collection with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    /// Tasks assigned to the authenticated user
    Mine,
    /// Every task visible to the role
    All,
}

/// The real-time sync client
pub struct SyncClient {
    api: ApiClient,
    session: Arc<SessionProvider>,
    transport: Arc<ConnectionManager>,
    rooms: RoomSubscriptions,
    tasks: Arc<TaskStore>,
    metrics: Arc<MetricsBuffer>,
    alerts: Arc<AlertFeed>,
    blocks: DashMap<String, BlockStatus>,
}

impl SyncClient {
    pub fn new(config: &SyncConfig, tokens: Arc<dyn TokenStore>) -> Result<Arc<Self>> {
        let api = ApiClient::new(config)?;
        let session = Arc::new(SessionProvider::new(api.clone(), tokens));
        let transport = Arc::new(ConnectionManager::new(config));

        Ok(Arc::new(Self {
            api,
            session,
            transport,
            rooms: RoomSubscriptions::new(),
            tasks: Arc::new(TaskStore::new()),
            metrics: Arc::new(MetricsBuffer::new()),
            alerts: Arc::new(AlertFeed::new()),
            blocks: DashMap::new(),
        }))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn session(&self) -> &SessionProvider {
        &self.session
    }

    pub fn transport(&self) -> &ConnectionManager {
        &self.transport
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn metrics(&self) -> &MetricsBuffer {
        &self.metrics
    }

    pub fn alerts(&self) -> &AlertFeed {
        &self.alerts
    }

    /// Last known operational status per block
    pub fn block_status(&self, block_id: &str) -> Option<BlockStatus> {
        self.blocks.get(block_id).map(|s| *s)
    }

    fn require_identity(&self) -> Result<Identity> {
        self.session
            .identity()
            .ok_or_else(|| SyncError::Unauthorized("not authenticated".into()))
    }

    // ========================================================================
    // Auth
    // ========================================================================

    pub async fn login(&self, credentials: LoginCredentials) -> Result<Identity> {
        self.session.login(credentials).await
    }

    pub async fn register(&self, credentials: RegisterCredentials) -> Result<Identity> {
        self.session.register(credentials).await
    }

    pub async fn restore(&self) -> Option<Identity> {
        self.session.restore().await
    }

    /// Log out. Transport teardown is requested before the session call
    /// returns; the caller observes the connection gone when this resolves.
    pub async fn logout(&self) {
        self.rooms.leave_all(&self.transport).await;
        self.transport.teardown().await;
        self.session.logout().await;
    }

    // ========================================================================
    // Task operations (optimistic + server-confirmed)
    // ========================================================================

    /// Replace the local collection with a fresh server fetch.
    /// Supersedes unconfirmed optimistic edits.
    pub async fn fetch_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let identity = self.require_identity()?;
        let epoch = self.session.epoch();

        let assigned_to = match filter {
            TaskFilter::Mine => Some(identity.user.id.clone()),
            TaskFilter::All => None,
        };

        match self
            .api
            .fetch_tasks(&identity.token, assigned_to.as_deref())
            .await
        {
            Ok(fetched) => {
                self.gate(epoch)?;
                self.tasks.replace_all(fetched.clone());
                Ok(fetched)
            }
            Err(e) => Err(self.session.classify(e)),
        }
    }

    /// Create a task. No optimistic insert: the server is the id authority,
    /// so the local state is untouched until the canonical record returns.
    pub async fn create_task(&self, task: NewTask) -> Result<Task> {
        let identity = self.require_identity()?;
        let epoch = self.session.epoch();

        match self.api.create_task(&identity.token, &task).await {
            Ok(created) => {
                self.gate(epoch)?;
                self.tasks.insert(created.clone());
                Ok(created)
            }
            Err(e) => Err(self.session.classify(e)),
        }
    }

    /// Optimistically patch a task, then confirm with the server.
    ///
    /// The patch is visible to synchronous reads before the request
    /// resolves. On success the server record replaces the local one
    /// wholesale. On failure the optimistic patch stays applied and the
    /// error goes to the caller (no automatic rollback).
    pub async fn mutate_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let identity = self.require_identity()?;
        let epoch = self.session.epoch();

        if self.tasks.apply_patch(id, &patch).is_none() {
            return Err(SyncError::Invalid(format!("unknown task: {}", id)));
        }

        // Let other dashboards see the transition without waiting for the
        // REST round-trip.
        if let Some(status) = patch.status {
            let event = ClientEvent::TaskStatusUpdate {
                task_id: id.to_string(),
                status,
            };
            if let Err(e) = self.transport.send(event).await {
                debug!("Status event not sent: {}", e);
            }
        }

        match self.api.update_task(&identity.token, id, &patch).await {
            Ok(canonical) => self.apply_confirmed_task(epoch, canonical),
            Err(e) => Err(self.session.classify(e)),
        }
    }

    /// Move a pending task to in-progress
    pub async fn start_task(&self, id: &str) -> Result<Task> {
        self.mutate_task(id, TaskPatch::status(TaskStatus::InProgress))
            .await
    }

    /// Complete a task, optionally attaching the proof image and its
    /// inspection result. Same confirm path as any other mutation.
    pub async fn complete_task(
        &self,
        id: &str,
        image_url: Option<String>,
        inspection: Option<InspectionResult>,
    ) -> Result<Task> {
        let mut patch = TaskPatch::status(TaskStatus::Completed);
        patch.completed_at = Some(Utc::now());
        patch.image_url = image_url;
        if let Some(inspection) = inspection {
            patch.inspection_score = Some(inspection.score);
            patch.inspection_label = Some(inspection.label);
        }
        self.mutate_task(id, patch).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let identity = self.require_identity()?;
        let epoch = self.session.epoch();

        match self.api.delete_task(&identity.token, id).await {
            Ok(()) => {
                self.gate(epoch)?;
                self.tasks.remove(id);
                Ok(())
            }
            Err(e) => Err(self.session.classify(e)),
        }
    }

    /// Apply a server-confirmed task record, unless the session changed
    /// while the request was in flight.
    fn apply_confirmed_task(&self, epoch: u64, canonical: Task) -> Result<Task> {
        self.gate(epoch)?;
        self.tasks.apply_canonical(canonical.clone());
        Ok(canonical)
    }

    /// Discard results whose originating epoch no longer matches
    fn gate(&self, epoch: u64) -> Result<()> {
        if self.session.epoch() != epoch {
            debug!("Discarding stale result (session epoch changed)");
            return Err(SyncError::Closed("session changed".into()));
        }
        Ok(())
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    /// Acknowledge an alert locally and notify the server best-effort.
    /// Idempotent; unknown ids are a no-op and emit nothing.
    pub async fn acknowledge_alert(&self, alert_id: &str) {
        if !self.alerts.acknowledge(alert_id) {
            return;
        }
        let event = ClientEvent::AcknowledgeAlert {
            alert_id: alert_id.to_string(),
        };
        if let Err(e) = self.transport.send(event).await {
            debug!("Acknowledge event not sent: {}", e);
        }
    }

    // ========================================================================
    // Supervision loop
    // ========================================================================

    /// Run the sync loop: gate the transport on authentication, join rooms
    /// on every (re)connect, and dispatch push events into the stores.
    ///
    /// Runs until the session provider is dropped. Spawn it once per
    /// client.
    pub async fn run(self: Arc<Self>) {
        let mut identity_rx = self.session.subscribe();
        let mut state_rx = self.transport.state();
        let mut events = self.transport.subscribe();

        // Token behind the live connection; a published identity with a
        // different token means the transport must be recycled.
        let mut active_token: Option<String> = None;

        // The session may already be authenticated (restore before run).
        // The watch guard must not be held across the connect await.
        let initial = identity_rx.borrow_and_update().clone();
        if let Some(identity) = initial {
            if let Err(e) = self.transport.connect(&identity.token).await {
                warn!("Initial connect failed: {}", e);
            }
            active_token = Some(identity.token);
        }

        loop {
            tokio::select! {
                changed = identity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let identity = identity_rx.borrow_and_update().clone();
                    match identity {
                        Some(identity) => {
                            // A second login without a logout in between
                            // leaves the previous identity's connection and
                            // room set live; it must not survive the change.
                            if active_token.is_some()
                                && active_token.as_deref() != Some(identity.token.as_str())
                            {
                                info!("Identity changed; recycling transport");
                                self.rooms.leave_all(&self.transport).await;
                                self.transport.teardown().await;
                            }
                            info!(user = %identity.user.id, "Authenticated; starting transport");
                            if let Err(e) = self.transport.connect(&identity.token).await {
                                warn!("Connect failed: {}", e);
                            }
                            active_token = Some(identity.token);
                        }
                        None => {
                            info!("Unauthenticated; stopping transport");
                            self.rooms.reset();
                            self.transport.teardown().await;
                            active_token = None;
                        }
                    }
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = state_rx.borrow_and_update().clone();
                    if state.is_connected() {
                        if let Some(identity) = self.session.identity() {
                            self.rooms.join_for(&self.transport, &identity.user).await;
                        }
                    } else {
                        // Server-side membership died with the connection
                        self.rooms.reset();
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => self.apply_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Event dispatch lagged; samples dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = self.transport.subscribe();
                        }
                    }
                }
            }
        }

        debug!("Sync loop ended");
    }

    /// Apply one push event to its store. Runs to completion per event;
    /// the single dispatch loop is what keeps event application serialized
    /// relative to other events.
    fn apply_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::HygieneTick(sample) => {
                self.metrics.ingest(sample);
            }
            ServerEvent::AlertCreated(alert) => {
                info!(
                    alert = %alert.id,
                    block = %alert.block_id,
                    severity = ?alert.severity,
                    "Alert received"
                );
                self.alerts.ingest(alert);
            }
            ServerEvent::TaskUpdated(event) => {
                self.tasks.apply_remote_event(&event);
            }
            ServerEvent::BlockStatusChanged(event) => {
                debug!(block = %event.block_id, status = ?event.status, "Block status changed");
                self.blocks.insert(event.block_id, event.status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryTokenStore;
    use crate::types::{
        Alert, AlertKind, AlertSeverity, BlockStatusEvent, HygieneSample, Role, SensorBreakdown,
        TaskPriority, TaskUpdatedEvent, User,
    };

    fn client() -> Arc<SyncClient> {
        SyncClient::new(&SyncConfig::default(), Arc::new(MemoryTokenStore::default())).unwrap()
    }

    fn sample(block: &str, score: f64) -> HygieneSample {
        HygieneSample {
            block_id: block.to_string(),
            score,
            timestamp: Utc::now(),
            sensors: SensorBreakdown {
                cleanliness: score,
                odor: score,
                usage: score,
                maintenance: score,
            },
        }
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: "Clean block".to_string(),
            description: "Routine".to_string(),
            assigned_to: "u1".to_string(),
            block_id: "b1".to_string(),
            priority: TaskPriority::Low,
            status: TaskStatus::Pending,
            due_date: Utc::now(),
            completed_at: None,
            image_url: None,
            inspection_score: None,
            inspection_label: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_event_routes_to_stores() {
        let client = client();

        client.apply_event(ServerEvent::HygieneTick(sample("b1", 72.0)));
        client.apply_event(ServerEvent::HygieneTick(sample("b1", 81.0)));
        assert_eq!(client.metrics().current_score("b1"), Some(81.0));
        assert_eq!(client.metrics().history("b1").len(), 2);

        client.apply_event(ServerEvent::AlertCreated(Alert {
            id: "a1".to_string(),
            kind: AlertKind::Emergency,
            block_id: "b1".to_string(),
            severity: AlertSeverity::Critical,
            message: "Flooding".to_string(),
            timestamp: Utc::now(),
            acknowledged: false,
            assigned_to: None,
        }));
        assert_eq!(client.alerts().len(), 1);

        client.tasks().insert(task("t1"));
        client.apply_event(ServerEvent::TaskUpdated(TaskUpdatedEvent {
            task_id: "t1".to_string(),
            status: TaskStatus::InProgress,
            completed_by: None,
            completed_at: None,
        }));
        assert_eq!(
            client.tasks().get("t1").unwrap().status,
            TaskStatus::InProgress
        );

        client.apply_event(ServerEvent::BlockStatusChanged(BlockStatusEvent {
            block_id: "b1".to_string(),
            status: BlockStatus::Maintenance,
            timestamp: Utc::now(),
        }));
        assert_eq!(client.block_status("b1"), Some(BlockStatus::Maintenance));
    }

    #[test]
    fn test_stale_epoch_result_does_not_mutate_store() {
        let client = client();
        client.tasks().insert(task("t1"));

        let epoch = client.session().epoch();

        // Session changes while the request was in flight
        let user = User {
            id: "u1".to_string(),
            name: "Demo".to_string(),
            email: "demo@demo.com".to_string(),
            role: Role::Cleaner,
            block_id: Some("b1".to_string()),
            last_active: None,
        };
        client
            .session()
            .install("tok".to_string(), user)
            .unwrap();
        client.session().force_sign_out();

        let mut stale = task("t1");
        stale.status = TaskStatus::Completed;
        let err = client.apply_confirmed_task(epoch, stale).unwrap_err();
        assert!(matches!(err, SyncError::Closed(_)));
        assert_eq!(client.tasks().get("t1").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_operations_require_authentication() {
        let client = client();
        let err = client.fetch_tasks(TaskFilter::All).await.unwrap_err();
        assert!(err.is_unauthorized());

        let err = client.start_task("t1").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_alert_is_silent() {
        let client = client();
        // No alert, no connection: must not error or panic
        client.acknowledge_alert("missing").await;
        assert!(client.alerts().is_empty());
    }

    fn cleaner(id: &str, block: &str) -> User {
        User {
            id: id.to_string(),
            name: "Demo".to_string(),
            email: format!("{}@demo.com", id),
            role: Role::Cleaner,
            block_id: Some(block.to_string()),
            last_active: None,
        }
    }

    async fn wait_for_join(frames: &Arc<tokio::sync::Mutex<Vec<String>>>, room: &str) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            {
                let frames = frames.lock().await;
                let seen = frames.iter().any(|f| {
                    serde_json::from_str::<serde_json::Value>(f)
                        .map(|v| v["event"] == "join_room" && v["data"]["room"] == room)
                        .unwrap_or(false)
                });
                if seen {
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("join for {} not observed", room);
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_second_login_recycles_connection_and_rooms() {
        use futures_util::StreamExt;
        use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Server: accept every connection and record its text frames
        let frames: Arc<tokio::sync::Mutex<Vec<String>>> = Arc::default();
        let recorded = Arc::clone(&frames);
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let mut ws = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            recorded.lock().await.push(text);
                        }
                    }
                });
            }
        });

        let config = SyncConfig {
            socket_url: format!("ws://{}", addr),
            ..SyncConfig::default()
        };
        let client =
            SyncClient::new(&config, Arc::new(MemoryTokenStore::default())).unwrap();
        let sync = tokio::spawn(Arc::clone(&client).run());

        client
            .session()
            .install("tok-a".to_string(), cleaner("ua", "b1"))
            .unwrap();
        wait_for_join(&frames, "block:b1").await;

        // Logging in again as someone else must not leave the new identity
        // riding the old token's connection or room set
        client
            .session()
            .install("tok-b".to_string(), cleaner("ub", "b2"))
            .unwrap();
        wait_for_join(&frames, "block:b2").await;
        assert_eq!(client.rooms.joined(), vec!["block:b2".to_string()]);

        client.logout().await;
        sync.abort();
    }
}
