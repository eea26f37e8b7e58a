use std::collections::HashMap;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use workforce_client::notifications::NotificationId;
use workforce_client::{Session, Store, SyncConfig};
use workforce_core::model::TaskStatus;

/// Follow a Workforce gateway from the terminal: task transitions,
/// notifications, and metrics as the dashboard would see them.
#[derive(Parser, Debug)]
#[command(name = "workforce-watch", version, about)]
struct Args {
    /// Gateway base URL; overrides WORKFORCE_SERVER_URL.
    #[arg(long)]
    server: Option<String>,

    /// Sign in as this user instead of the demo account.
    #[arg(long, env = "WORKFORCE_EMAIL", requires = "password")]
    email: Option<String>,

    #[arg(long, env = "WORKFORCE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

fn init_tracing() {
    let builder = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    if std::env::var("WORKFORCE_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// What has already been reported, so each change is logged once.
#[derive(Default)]
struct Seen {
    tasks: HashMap<String, TaskStatus>,
    last_notification: Option<NotificationId>,
    metrics_seen: Option<(usize, usize)>,
}

impl Seen {
    fn report(&mut self, store: &Store) {
        for task in store.tasks().iter().rev() {
            if self.tasks.get(&task.id) == Some(&task.status) {
                continue;
            }
            self.tasks.insert(task.id.clone(), task.status);
            tracing::info!(
                task_id = %task.id,
                agent_id = %task.agent_id,
                task_type = %task.task_type,
                status = %task.status,
                "Task"
            );
        }

        let newest = store.notifications().first().map(|n| n.id);
        for n in store.notifications().iter().rev() {
            if self.last_notification.is_some_and(|last| n.id <= last) {
                continue;
            }
            tracing::info!(kind = ?n.kind, agent_id = ?n.agent_id, "{}", n.message);
        }
        if newest.is_some() {
            self.last_notification = newest;
        }

        if let Some(m) = store.metrics() {
            let key = (m.tasks.completed, m.tasks.failed);
            if self.metrics_seen != Some(key) {
                self.metrics_seen = Some(key);
                tracing::info!(
                    agents = m.agents.total,
                    running = m.tasks.running,
                    completed = m.tasks.completed,
                    failed = m.tasks.failed,
                    success_rate = m.tasks.success_rate,
                    per_minute = m.throughput.per_minute,
                    "Metrics"
                );
            }
        }
    }
}

/// Report store changes until `stop` resolves or sync ends.
async fn follow(session: &Session, stop: impl Future<Output = ()>) {
    let mut revisions = session.store().subscribe();
    let mut seen = Seen::default();
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let store = session.store().read().await;
                seen.report(&store);
                if !store.is_authenticated() {
                    tracing::warn!("Session signed out, stopping");
                    break;
                }
            },
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    let mut config = SyncConfig::from_env();
    if let Some(server) = args.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }
    let server_url = config.server_url.clone();
    let mut session = Session::new(config);

    let signed_in = match (&args.email, &args.password) {
        (Some(email), Some(password)) => session.login(email, password).await,
        _ => session.login_demo().await,
    };
    let user = match signed_in {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, server = %server_url, "Sign-in failed");
            std::process::exit(1);
        },
    };
    tracing::info!(email = %user.email, org = %user.org, "Watching {server_url}");

    session.fetch_agents().await;
    session.fetch_metrics().await;
    if let Err(e) = session.mount().await {
        tracing::error!(error = %e, "Failed to start sync");
        std::process::exit(1);
    }

    follow(&session, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    tracing::info!("Shutting down");
    session.shutdown().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn stop_signal_survives_store_churn() {
        let session = Session::with_store(SyncConfig::default(), Store::with_token("tok"));
        let store = session.store().clone();
        let churn = tokio::spawn(async move {
            for i in 0.. {
                store.update(|s| s.set_token(Some(format!("tok-{i}")))).await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        // Store changes arrive far more often than the stop deadline
        tokio::time::timeout(
            Duration::from_secs(2),
            follow(&session, tokio::time::sleep(Duration::from_millis(100))),
        )
        .await
        .expect("follow never observed the stop signal");
        churn.abort();
    }
}
