#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use taskboard_common::{
    AuthUser, Comment, Identity, Notification, ProjectId, ProjectSummary, Task, TaskDraft, TaskId,
    TaskStatus,
};
use taskboard_sync::api::TaskApi;
use taskboard_sync::error::{ApiError, GatewayError};
use taskboard_sync::gateway::frame::{self, Command, Frame, HeartBeat};
use taskboard_sync::gateway::{Channel, ChannelConfig, Connector, Link, LinkEvent};

// ---------------------------------------------------------------------------
// In-memory gateway
// ---------------------------------------------------------------------------

/// The server side of one link opened by [`MockConnector`].
pub struct ServerEnd {
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub to_client: mpsc::UnboundedSender<LinkEvent>,
}

impl ServerEnd {
    /// Next non-heartbeat frame the client sent.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            let text = time::timeout(Duration::from_secs(30), self.from_client.recv())
                .await
                .expect("timeout waiting for client frame")
                .expect("client link closed");
            if let Some(frame) = frame::decode(&text).expect("client sent a malformed frame") {
                return frame;
            }
        }
    }

    pub async fn expect(&mut self, command: Command) -> Frame {
        let frame = self.next_frame().await;
        assert_eq!(frame.command, command, "unexpected frame: {frame:?}");
        frame
    }

    /// Read CONNECT and answer CONNECTED with the given heart-beat header.
    pub async fn accept_with_heartbeat(&mut self, heart_beat: &str) -> Frame {
        let connect = self.expect(Command::Connect).await;
        self.send(
            Frame::new(Command::Connected)
                .with_header("version", "1.2")
                .with_header("heart-beat", heart_beat),
        );
        connect
    }

    /// Read CONNECT and answer CONNECTED with heartbeats disabled.
    pub async fn accept(&mut self) -> Frame {
        self.accept_with_heartbeat("0,0").await
    }

    /// Read a SUBSCRIBE and return its (id, destination).
    pub async fn expect_subscribe(&mut self) -> (String, String) {
        let frame = self.expect(Command::Subscribe).await;
        (
            frame.header("id").expect("id header").to_string(),
            frame.header("destination").expect("destination header").to_string(),
        )
    }

    pub fn send(&self, frame: Frame) {
        let _ = self.to_client.send(LinkEvent::Text(frame.encode()));
    }

    pub fn message(&self, subscription: &str, destination: &str, body: &str) {
        self.send(
            Frame::new(Command::Message)
                .with_header("subscription", subscription)
                .with_header("destination", destination)
                .with_header("message-id", "m-1")
                .with_body(body),
        );
    }

    pub fn close(&self, reason: &str) {
        let _ = self.to_client.send(LinkEvent::Closed(Some(reason.to_string())));
    }
}

/// A connector whose links are in-memory channels handed to the test.
pub struct MockConnector {
    attempts: Mutex<Vec<Instant>>,
    refuse: AtomicBool,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
            servers,
        });
        (connector, rx)
    }

    /// Every open fails until [`MockConnector::set_refuse`] turns it off.
    pub fn refusing() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (connector, rx) = Self::new();
        connector.set_refuse(true);
        (connector, rx)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _url: &str) -> Result<Link, GatewayError> {
        self.attempts.lock().push(Instant::now());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(GatewayError::Connect("connection refused".into()));
        }
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let _ = self.servers.send(ServerEnd {
            from_client,
            to_client,
        });
        Ok(Link { outbound, inbound })
    }
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    time::timeout(Duration::from_secs(60), servers.recv())
        .await
        .expect("timeout waiting for a connection attempt")
        .expect("connector dropped")
}

pub fn channel_config() -> ChannelConfig {
    ChannelConfig {
        url: "ws://taskboard.test/ws/websocket".to_string(),
        reconnect_delay: Duration::from_millis(5000),
        heartbeat: HeartBeat::symmetric(Duration::from_millis(4000)),
        handshake_timeout: Duration::from_secs(10),
    }
}

/// A channel connected to an in-memory server with heartbeats disabled.
pub async fn connected_channel() -> (Channel, ServerEnd, Arc<MockConnector>) {
    let (connector, mut servers) = MockConnector::new();
    let channel = Channel::new(channel_config(), connector.clone());
    channel.connect("test-token", Default::default());
    let mut server = next_server(&mut servers).await;
    server.accept().await;
    let watched = channel.clone();
    wait_until(move || watched.is_connected()).await;
    (channel, server, connector)
}

/// Poll `condition` until it holds. Works with paused time.
pub async fn wait_until(condition: impl Fn() -> bool) {
    time::timeout(Duration::from_secs(60), async {
        while !condition() {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    tasks: Vec<Task>,
    project_tasks: HashMap<ProjectId, Vec<Task>>,
    notifications: Vec<Notification>,
    unread_count: u64,
    comments: HashMap<TaskId, Vec<Comment>>,
    next_id: i64,
    fetch_delay: Duration,
}

/// A [`TaskApi`] backed by plain vectors, counting the calls it serves.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
    pub task_fetches: AtomicUsize,
    pub project_fetches: AtomicUsize,
    pub unread_fetches: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let api = Self::default();
        api.state.lock().next_id = 1000;
        Arc::new(api)
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.state.lock().tasks = tasks;
    }

    pub fn set_project_tasks(&self, project: ProjectId, tasks: Vec<Task>) {
        self.state.lock().project_tasks.insert(project, tasks);
    }

    pub fn set_unread_count(&self, count: u64) {
        self.state.lock().unread_count = count;
    }

    /// Delay every all-tasks fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = delay;
    }

    pub fn set_notifications(&self, notifications: Vec<Notification>) {
        self.state.lock().notifications = notifications;
    }

    fn next_id(&self) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.next_id
    }
}

#[async_trait]
impl TaskApi for FakeApi {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.task_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().fetch_delay;
        if !delay.is_zero() {
            time::sleep(delay).await;
        }
        Ok(self.state.lock().tasks.clone())
    }

    async fn fetch_project_tasks(&self, project: ProjectId) -> Result<Vec<Task>, ApiError> {
        self.project_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .project_tasks
            .get(&project)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let mut created = task(self.next_id(), &draft.title, draft.project_id);
        created.status = draft.status.unwrap_or(TaskStatus::Todo);
        self.state.lock().tasks.insert(0, created.clone());
        Ok(created)
    }

    async fn update_task(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, ApiError> {
        let mut state = self.state.lock();
        let existing = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ApiError::not_found("Task not found"))?;
        existing.title = draft.title.clone();
        if let Some(status) = draft.status {
            existing.status = status;
        }
        Ok(existing.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        if state.tasks.len() == before {
            return Err(ApiError::not_found("Task not found"));
        }
        Ok(())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        Ok(self.state.lock().notifications.clone())
    }

    async fn fetch_unread_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        Ok(self
            .state
            .lock()
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .cloned()
            .collect())
    }

    async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        self.unread_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unread_count)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if let Some(n) = state.notifications.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
        }
        state.unread_count = state.unread_count.saturating_sub(1);
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        for n in state.notifications.iter_mut() {
            n.is_read = true;
        }
        state.unread_count = 0;
        Ok(())
    }

    async fn fetch_comments(&self, task: TaskId) -> Result<Vec<Comment>, ApiError> {
        Ok(self.state.lock().comments.get(&task).cloned().unwrap_or_default())
    }

    async fn create_comment(&self, task: TaskId, content: &str) -> Result<Comment, ApiError> {
        let created = comment(self.next_id(), content);
        self.state
            .lock()
            .comments
            .entry(task)
            .or_default()
            .insert(0, created.clone());
        Ok(created)
    }

    async fn delete_comment(&self, task: TaskId, comment: i64) -> Result<(), ApiError> {
        if let Some(thread) = self.state.lock().comments.get_mut(&task) {
            thread.retain(|c| c.id != comment);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn task(id: TaskId, title: &str, project: Option<ProjectId>) -> Task {
    Task {
        id,
        title: title.to_string(),
        description: None,
        status: TaskStatus::Todo,
        priority: None,
        due_date: None,
        project: project.map(|id| ProjectSummary {
            id,
            name: format!("Project {id}"),
        }),
        created_by: None,
        assigned_to: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn notification(id: i64, is_read: bool) -> Notification {
    Notification {
        id,
        title: format!("Notification {id}"),
        message: String::new(),
        kind: Some("TASK_ASSIGNED".to_string()),
        is_read,
        task: None,
        project: None,
        created_at: None,
    }
}

pub fn comment(id: i64, content: &str) -> Comment {
    Comment {
        id,
        content: content.to_string(),
        user: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn identity(user_id: i64, token: &str) -> Identity {
    Identity {
        token: token.to_string(),
        user: AuthUser {
            id: user_id,
            username: format!("user{user_id}"),
            email: None,
            full_name: None,
        },
    }
}
