//! Agent health derived from the link and pipeline lifecycle
//!
//! The registry tracks three fixed components. Link health follows the
//! poller's published `LinkStatus`; poller and analyzer health follow their
//! task lifecycle. `/healthz` reports the worst of the three and `/readyz`
//! additionally requires the agent to be marked ready.

use crate::poller::LinkStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, but readings may be delayed
    Degraded,
    Unhealthy,
}

/// The parts of the agent that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Link,
    Poller,
    Analyzer,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Link, Component::Poller, Component::Analyzer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Link => "link",
            Component::Poller => "poller",
            Component::Analyzer => "analyzer",
        }
    }
}

/// Status of one component and when it last changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }
}

/// Health of the link component for an observed link status
pub fn link_health(status: &LinkStatus) -> (ComponentStatus, Option<String>) {
    match status {
        LinkStatus::Connected => (ComponentStatus::Healthy, None),
        LinkStatus::Disconnected => (
            ComponentStatus::Degraded,
            Some("link disconnected".to_string()),
        ),
        LinkStatus::Reconnecting { attempt } => (
            ComponentStatus::Degraded,
            Some(format!("reconnecting (attempt {})", attempt)),
        ),
        LinkStatus::Cooldown { retry_in_secs } => (
            ComponentStatus::Unhealthy,
            Some(format!(
                "retries exhausted, next attempt in {}s",
                retry_in_secs
            )),
        ),
        LinkStatus::Stopped => (ComponentStatus::Unhealthy, Some("link closed".to_string())),
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct HealthState {
    link: ComponentHealth,
    poller: ComponentHealth,
    analyzer: ComponentHealth,
    ready: bool,
    shutting_down: bool,
}

impl HealthState {
    fn slot(&mut self, component: Component) -> &mut ComponentHealth {
        match component {
            Component::Link => &mut self.link,
            Component::Poller => &mut self.poller,
            Component::Analyzer => &mut self.analyzer,
        }
    }

    fn get(&self, component: Component) -> &ComponentHealth {
        match component {
            Component::Link => &self.link,
            Component::Poller => &self.poller,
            Component::Analyzer => &self.analyzer,
        }
    }

    /// Keeps `since` unless the status or message actually changed
    fn set(&mut self, component: Component, status: ComponentStatus, message: Option<String>) {
        let slot = self.slot(component);
        if slot.status != status || slot.message != message {
            *slot = ComponentHealth::new(status, message);
        }
    }

    fn task_exit_status(&self) -> ComponentStatus {
        if self.shutting_down {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Unhealthy
        }
    }

    fn worst(&self) -> (Component, ComponentStatus) {
        Component::ALL
            .iter()
            .map(|c| (*c, self.get(*c).status))
            .max_by_key(|(_, status)| *status)
            .unwrap_or((Component::Link, ComponentStatus::Healthy))
    }
}

/// Shared health state of the agent
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// All components start degraded until their task reports in
    pub fn new() -> Self {
        let starting = || ComponentHealth::new(ComponentStatus::Degraded, Some("starting".into()));
        Self {
            state: Arc::new(RwLock::new(HealthState {
                link: ComponentHealth::new(
                    ComponentStatus::Degraded,
                    Some("awaiting first connection".into()),
                ),
                poller: starting(),
                analyzer: starting(),
                ready: false,
                shutting_down: false,
            })),
        }
    }

    /// Map a published link status onto the link component. `Stopped` also
    /// means the poller task has ended.
    pub async fn apply_link_status(&self, status: &LinkStatus) {
        let (link_status, message) = link_health(status);
        let mut state = self.state.write().await;
        state.set(Component::Link, link_status, message);
        if matches!(status, LinkStatus::Stopped) {
            let exit = state.task_exit_status();
            state.set(Component::Poller, exit, Some("poller stopped".into()));
        }
    }

    /// The component's task is running
    pub async fn task_started(&self, component: Component) {
        self.state
            .write()
            .await
            .set(component, ComponentStatus::Healthy, None);
    }

    /// The component's task ended; fatal while the agent is not shutting down
    pub async fn task_stopped(&self, component: Component, reason: impl Into<String>) {
        let mut state = self.state.write().await;
        let status = state.task_exit_status();
        state.set(component, status, Some(reason.into()));
    }

    /// Gate readiness on agent startup
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    /// Withdraw readiness for good; later task exits are expected
    pub async fn begin_shutdown(&self) {
        let mut state = self.state.write().await;
        state.ready = false;
        state.shutting_down = true;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let (_, status) = state.worst();
        let components = Component::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), state.get(*c).clone()))
            .collect();
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if state.shutting_down {
            Some("agent shutting down".to_string())
        } else if !state.ready {
            Some("agent not yet initialized".to_string())
        } else {
            match state.worst() {
                (component, ComponentStatus::Unhealthy) => {
                    let detail = state.get(component).message.clone().unwrap_or_default();
                    Some(format!("{} unhealthy: {}", component.as_str(), detail))
                }
                _ => None,
            }
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn running() -> HealthRegistry {
        let registry = HealthRegistry::new();
        registry.task_started(Component::Poller).await;
        registry.task_started(Component::Analyzer).await;
        registry.apply_link_status(&LinkStatus::Connected).await;
        registry
    }

    #[tokio::test]
    async fn test_starts_degraded_with_all_components() {
        let health = HealthRegistry::new().health().await;

        assert_eq!(health.status, ComponentStatus::Degraded);
        let names: Vec<&str> = health.components.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["analyzer", "link", "poller"]);
        assert_eq!(
            health.components["link"].message.as_deref(),
            Some("awaiting first connection")
        );
    }

    #[tokio::test]
    async fn test_healthy_once_tasks_run_and_link_connects() {
        let health = running().await.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.values().all(|c| c.message.is_none()));
    }

    #[tokio::test]
    async fn test_link_status_mapping() {
        let registry = running().await;

        registry
            .apply_link_status(&LinkStatus::Reconnecting { attempt: 3 })
            .await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components["link"].message.as_deref(),
            Some("reconnecting (attempt 3)")
        );

        registry
            .apply_link_status(&LinkStatus::Cooldown { retry_in_secs: 30 })
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.apply_link_status(&LinkStatus::Connected).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_link_stopped_marks_poller_unhealthy() {
        let registry = running().await;
        registry.apply_link_status(&LinkStatus::Stopped).await;

        let health = registry.health().await;
        assert_eq!(health.components["poller"].status, ComponentStatus::Unhealthy);
        assert_eq!(
            health.components["poller"].message.as_deref(),
            Some("poller stopped")
        );
    }

    #[tokio::test]
    async fn test_since_kept_for_repeated_status() {
        let registry = running().await;
        registry
            .apply_link_status(&LinkStatus::Reconnecting { attempt: 1 })
            .await;
        let first = registry.health().await.components["link"].since;

        registry
            .apply_link_status(&LinkStatus::Reconnecting { attempt: 1 })
            .await;
        assert_eq!(registry.health().await.components["link"].since, first);
    }

    #[tokio::test]
    async fn test_readiness_requires_ready_flag() {
        let registry = running().await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("agent not yet initialized"));

        registry.set_ready(true).await;
        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_component() {
        let registry = running().await;
        registry.set_ready(true).await;
        registry.task_stopped(Component::Analyzer, "task panicked").await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("analyzer unhealthy: task panicked")
        );
    }

    #[tokio::test]
    async fn test_task_exit_during_shutdown_is_not_fatal() {
        let registry = running().await;
        registry.set_ready(true).await;
        registry.begin_shutdown().await;
        registry.task_stopped(Component::Analyzer, "shut down").await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("agent shutting down"));
    }
}
