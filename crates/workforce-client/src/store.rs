use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, watch};

use workforce_core::model::{Agent, MetricsSnapshot, Task};

use crate::api::User;
use crate::notifications::{Notification, NotificationId, NotificationKind, NotificationQueue};

/// Maximum tasks held by the store; the oldest fall off the end.
pub const MAX_TASKS: usize = 100;

/// Dashboard section currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Dashboard,
    Agents,
    Tasks,
    Analytics,
}

/// Client-side state for one dashboard session.
///
/// Tasks are held newest first behind `Arc`s so a reconcile pass that finds
/// nothing new leaves every entry pointer-identical. `revision` increases on
/// every mutation that changes what a view would render.
#[derive(Debug, Default)]
pub struct Store {
    agents: Vec<Agent>,
    tasks: Vec<Arc<Task>>,
    metrics: Option<Arc<MetricsSnapshot>>,
    notifications: NotificationQueue,
    token: Option<String>,
    user: Option<User>,
    active_tab: Tab,
    selected_agent: Option<String>,
    deploy_modal_open: bool,
    revision: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts with a saved token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // --- agents ---

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn replace_agents(&mut self, agents: Vec<Agent>) {
        self.agents = agents;
        self.touch();
    }

    /// Drop an agent locally after it was terminated.
    pub fn remove_agent(&mut self, id: &str) -> bool {
        let before = self.agents.len();
        self.agents.retain(|a| a.id != id);
        let removed = self.agents.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    // --- tasks ---

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Apply a pushed task: replace the stored record with the same id in
    /// place, or prepend it when the id is new.
    pub fn merge_task(&mut self, task: Task) {
        let task = Arc::new(task);
        match self.tasks.iter().position(|t| t.id == task.id) {
            Some(index) => self.tasks[index] = task,
            None => {
                self.tasks.insert(0, task);
                self.tasks.truncate(MAX_TASKS);
            },
        }
        self.touch();
    }

    /// Reconcile against a polled task list. Returns whether anything changed.
    ///
    /// A stored task is replaced only when its status, result, or error
    /// differs, and never when that would move it backwards through its
    /// lifecycle (a stale poll cannot turn `running` back into `queued`). Unknown tasks are prepended in fetched order. When
    /// nothing changes the store is left exactly as it was.
    pub fn reconcile_tasks(&mut self, fresh: Vec<Task>) -> bool {
        let mut by_id: HashMap<&str, &Task> = HashMap::with_capacity(fresh.len());
        for task in &fresh {
            by_id.entry(task.id.as_str()).or_insert(task);
        }

        let mut changed = false;
        let merged: Vec<Arc<Task>> = self
            .tasks
            .iter()
            .map(|stored| match by_id.get(stored.id.as_str()) {
                Some(incoming)
                    if incoming.sync_differs(stored) && !stored.would_regress_to(incoming) =>
                {
                    changed = true;
                    Arc::new((*incoming).clone())
                },
                _ => Arc::clone(stored),
            })
            .collect();

        let mut tasks: Vec<Arc<Task>> = {
            let mut known: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
            fresh
                .iter()
                .filter(|t| known.insert(t.id.as_str()))
                .map(|t| Arc::new(t.clone()))
                .collect()
        };
        if !tasks.is_empty() {
            changed = true;
        }
        if !changed {
            return false;
        }

        tasks.extend(merged);
        tasks.truncate(MAX_TASKS);
        self.tasks = tasks;
        self.touch();
        true
    }

    /// Replace the task list from an explicit full fetch.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks.into_iter().take(MAX_TASKS).map(Arc::new).collect();
        self.touch();
    }

    // --- metrics ---

    pub fn metrics(&self) -> Option<&Arc<MetricsSnapshot>> {
        self.metrics.as_ref()
    }

    pub fn replace_metrics(&mut self, metrics: MetricsSnapshot) {
        self.metrics = Some(Arc::new(metrics));
        self.touch();
    }

    // --- notifications ---

    pub fn notifications(&self) -> &[Notification] {
        self.notifications.items()
    }

    pub fn push_notification(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        agent_id: Option<String>,
    ) -> NotificationId {
        let id = self.notifications.push(kind, message, agent_id);
        self.touch();
        id
    }

    pub fn dismiss_notification(&mut self, id: NotificationId) -> bool {
        let removed = self.notifications.dismiss(id);
        if removed {
            self.touch();
        }
        removed
    }

    // --- session ---

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        if self.token != token {
            self.token = token;
            self.touch();
        }
    }

    pub fn set_session(&mut self, token: String, user: User) {
        self.token = Some(token);
        self.user = Some(user);
        self.touch();
    }

    /// Log out: forget the token and user along with the agents and tasks
    /// fetched under them.
    pub fn clear_session(&mut self) {
        self.token = None;
        self.user = None;
        self.agents.clear();
        self.tasks.clear();
        self.touch();
    }

    // --- ui ---

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn set_active_tab(&mut self, tab: Tab) {
        self.active_tab = tab;
        self.touch();
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected_agent.as_deref()
    }

    pub fn set_selected_agent(&mut self, agent_id: Option<String>) {
        self.selected_agent = agent_id;
        self.touch();
    }

    pub fn deploy_modal_open(&self) -> bool {
        self.deploy_modal_open
    }

    pub fn set_deploy_modal_open(&mut self, open: bool) {
        self.deploy_modal_open = open;
        self.touch();
    }
}

/// A `Store` shared between the sync tasks and the UI.
///
/// Every `update` that bumps the store revision is published on a watch
/// channel so views can re-render when, and only when, something changed.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<Store>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new(Store::new())
    }
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        let (revision, _) = watch::channel(store.revision());
        Self {
            inner: Arc::new(RwLock::new(store)),
            revision: Arc::new(revision),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.read().await
    }

    /// Mutate the store under its write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        let mut store = self.inner.write().await;
        let out = f(&mut store);
        let current = store.revision();
        self.revision.send_if_modified(|rev| {
            let modified = *rev != current;
            *rev = current;
            modified
        });
        out
    }

    /// Watch the store revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
