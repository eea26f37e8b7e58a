use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use workforce_core::model::Agent;

use crate::api::{
    ApiClient, ApiError, AuthSession, DeployRequest, DeployResponse, SubmitRequest, SubmitResponse,
    User,
};
use crate::config::SyncConfig;
use crate::notifications::{NotificationId, NotificationKind, Notifier};
use crate::push::{ConnectionState, PushClient, generate_client_id, push_url};
use crate::reconcile;
use crate::store::{SharedStore, Store};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no session token; log in first")]
    MissingToken,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Background sync running for one token.
struct Mounted {
    token: String,
    cancel: CancellationToken,
    tracker: TaskTracker,
    connection: watch::Receiver<ConnectionState>,
}

/// One dashboard session: the store, the REST client, and, while mounted,
/// the push channel, heartbeat, and reconciliation poll keeping the store
/// current.
pub struct Session {
    config: SyncConfig,
    api: ApiClient,
    store: SharedStore,
    client_id: String,
    notifier: Notifier,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    mounted: Option<Mounted>,
}

impl Session {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_store(config, Store::new())
    }

    /// Start from an existing store, e.g. one holding a saved token.
    pub fn with_store(config: SyncConfig, store: Store) -> Self {
        let store = SharedStore::new(store);
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let notifier = Notifier::new(
            store.clone(),
            config.notification_ttl,
            tracker.clone(),
            shutdown.clone(),
        );
        Self {
            api: ApiClient::new(config.api_base_url()),
            config,
            store,
            client_id: generate_client_id(),
            notifier,
            tracker,
            shutdown,
            mounted: None,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether background sync is running. A mount stopped from inside, by a
    /// rejected token, no longer counts.
    pub fn is_mounted(&self) -> bool {
        self.mounted
            .as_ref()
            .is_some_and(|m| !m.cancel.is_cancelled())
    }

    /// Push-channel state, `Closed` while unmounted.
    pub fn connection_state(&self) -> ConnectionState {
        self.mounted
            .as_ref()
            .map_or(ConnectionState::Closed, |m| *m.connection.borrow())
    }

    /// Watch the push-channel state of the current mount.
    pub fn watch_connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.mounted.as_ref().map(|m| m.connection.clone())
    }

    async fn token(&self) -> Result<String, SyncError> {
        self.store
            .read()
            .await
            .token()
            .map(str::to_owned)
            .ok_or(SyncError::MissingToken)
    }

    /// Start the push channel, heartbeat, and reconciliation poll for the
    /// current token. Mounting twice is a no-op.
    pub async fn mount(&mut self) -> Result<(), SyncError> {
        if self.is_mounted() {
            return Ok(());
        }
        self.unmount().await;
        let token = self.token().await?;

        let cancel = self.shutdown.child_token();
        let tracker = TaskTracker::new();
        let url = push_url(&self.config.ws_base_url(), &self.client_id, &token);
        let push = PushClient::new(
            url,
            self.store.clone(),
            self.notifier.clone(),
            self.config.reconnect,
        );
        let heartbeat = push.heartbeat();
        let connection = push.state();

        tracker.spawn(push.run(cancel.clone()));
        tracker.spawn(heartbeat.run(self.config.heartbeat_interval, cancel.clone()));
        tracker.spawn(reconcile::run(
            self.api.clone(),
            token.clone(),
            self.store.clone(),
            self.config.poll_interval,
            cancel.clone(),
        ));
        tracker.close();

        tracing::info!(client_id = %self.client_id, "Session mounted");
        self.mounted = Some(Mounted {
            token,
            cancel,
            tracker,
            connection,
        });
        Ok(())
    }

    /// Stop all background sync and wait for it to finish. No connection
    /// attempt happens after this returns.
    pub async fn unmount(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.cancel.cancel();
            mounted.tracker.wait().await;
            tracing::info!(client_id = %self.client_id, "Session unmounted");
        }
    }

    /// Replace the session token, remounting if sync was running under a
    /// different one.
    pub async fn set_token(&mut self, token: Option<String>) -> Result<(), SyncError> {
        let unchanged = self
            .mounted
            .as_ref()
            .map(|m| Some(&m.token) == token.as_ref() && !m.cancel.is_cancelled());
        if unchanged == Some(true) {
            return Ok(());
        }
        let was_mounted = unchanged.is_some();
        self.unmount().await;
        let has_token = token.is_some();
        self.store.update(|s| s.set_token(token)).await;
        if was_mounted && has_token {
            self.mount().await?;
        }
        Ok(())
    }

    /// Stop everything, including pending notification expiry timers.
    pub async fn shutdown(mut self) {
        self.unmount().await;
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    // --- auth ---

    async fn adopt(&mut self, auth: AuthSession) -> Result<User, SyncError> {
        let user = auth.user.clone();
        let was_mounted = self.mounted.is_some();
        if self
            .mounted
            .as_ref()
            .is_some_and(|m| m.token != auth.access_token || m.cancel.is_cancelled())
        {
            self.unmount().await;
        }
        self.store
            .update(|s| s.set_session(auth.access_token, auth.user))
            .await;
        if was_mounted {
            self.mount().await?;
        }
        tracing::info!(user_id = %user.id, org = %user.org, "Signed in");
        Ok(user)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, SyncError> {
        let auth = self.api.login(email, password).await?;
        self.adopt(auth).await
    }

    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        org_name: Option<&str>,
    ) -> Result<User, SyncError> {
        let auth = self.api.register(email, password, org_name).await?;
        self.adopt(auth).await
    }

    pub async fn login_demo(&mut self) -> Result<User, SyncError> {
        let auth = self.api.login_demo().await?;
        self.adopt(auth).await
    }

    /// Stop syncing and drop the token, user, agents, and tasks.
    pub async fn logout(&mut self) {
        self.unmount().await;
        self.store.update(Store::clear_session).await;
        tracing::info!("Signed out");
    }

    /// Log out when the gateway rejected the session token.
    async fn check<T>(&mut self, result: Result<T, ApiError>) -> Result<T, SyncError> {
        if let Err(ApiError::Unauthorized(message)) = &result {
            tracing::warn!(reason = %message, "Session rejected by gateway, logging out");
            self.logout().await;
        }
        Ok(result?)
    }

    // --- agents ---

    /// Refresh the agent list. Failures are logged and leave the store as is.
    pub async fn fetch_agents(&mut self) {
        if let Err(e) = self.try_fetch_agents().await {
            tracing::warn!(error = %e, "Failed to fetch agents");
        }
    }

    async fn try_fetch_agents(&mut self) -> Result<Vec<Agent>, SyncError> {
        let token = self.token().await?;
        let result = self.api.list_agents(&token).await;
        let agents = self.check(result).await?;
        self.store.update(|s| s.replace_agents(agents.clone())).await;
        Ok(agents)
    }

    /// Deploy an agent, then refresh the agent list.
    pub async fn deploy_agent(&mut self, req: &DeployRequest) -> Result<DeployResponse, SyncError> {
        let token = self.token().await?;
        let result = self.api.deploy_agent(&token, req).await;
        let deployed = self.check(result).await?;
        self.fetch_agents().await;
        Ok(deployed)
    }

    /// Terminate an agent and drop it from the local list.
    pub async fn terminate_agent(&mut self, agent_id: &str) -> Result<(), SyncError> {
        let token = self.token().await?;
        let result = self.api.terminate_agent(&token, agent_id).await;
        self.check(result).await?;
        self.store.update(|s| s.remove_agent(agent_id)).await;
        Ok(())
    }

    // --- tasks ---

    /// Replace the task list with a fresh fetch, optionally for one agent.
    /// Failures are logged and leave the store as is.
    pub async fn fetch_tasks(&mut self, agent_id: Option<&str>) {
        let token = match self.token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch tasks");
                return;
            },
        };
        let result = self.api.list_tasks(&token, agent_id).await;
        match self.check(result).await {
            Ok(tasks) => self.store.update(|s| s.replace_tasks(tasks)).await,
            Err(e) => tracing::warn!(error = %e, "Failed to fetch tasks"),
        }
    }

    pub async fn submit_task(&mut self, req: &SubmitRequest) -> Result<SubmitResponse, SyncError> {
        let token = self.token().await?;
        let result = self.api.submit_task(&token, req).await;
        self.check(result).await
    }

    // --- metrics ---

    /// Refresh metrics. Errors are swallowed.
    pub async fn fetch_metrics(&mut self) {
        let Ok(token) = self.token().await else {
            return;
        };
        let result = self.api.metrics(&token).await;
        match self.check(result).await {
            Ok(metrics) => self.store.update(|s| s.replace_metrics(metrics)).await,
            Err(e) => tracing::debug!(error = %e, "Failed to fetch metrics"),
        }
    }

    // --- notifications ---

    pub async fn notify(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        agent_id: Option<String>,
    ) -> NotificationId {
        self.notifier.notify(kind, message, agent_id).await
    }

    pub async fn dismiss(&self, id: NotificationId) -> bool {
        self.notifier.dismiss(id).await
    }
}

impl Drop for Session {
    /// Dropping a session stops its background sync and expiry timers; each
    /// mount token is a child of `shutdown`.
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
