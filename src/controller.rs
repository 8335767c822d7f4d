//! Reconciliation driver
//!
//! One pass gathers the inputs (container reachability, the cookie key, the
//! dependency snapshots), renders the layer, hands it to the supervisor and
//! publishes our own relation data. A pass either completes or is abandoned
//! with [`Action::Defer`] and redone on the next event; the host owns event
//! dispatch and retries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::CharmConfig;
use crate::integrations::Dependencies;
use crate::layer::{render_layer, Layer, LayerInputs};
use crate::relation::{PeerStore, RelationData, Relations};
use crate::secret::{ensure_cookie_key, CookieKey};
use crate::workload::{plan_layer, workload_version, Supervisor};
use crate::{
    Error, APPLICATION_NAME, LOGIN_UI_ENDPOINT_RELATION_NAME, PUBLIC_ROUTE_RELATION_NAME,
};

/// Status message while the workload container is unreachable
pub const WAITING_FOR_CONTAINER: &str = "Waiting to connect to Login_UI container";
/// Status message while the peer relation is missing
pub const WAITING_FOR_PEER: &str = "Waiting for peer relation";
/// Status message while a follower waits for the leader's cookie key
pub const WAITING_FOR_COOKIE_KEY: &str = "Waiting for leader unit to generate the cookie key";
/// Status message after the supervisor rejected the plan
pub const REPLAN_FAILED: &str = "Failed to replan, please consult the logs";

/// Unit status reported to the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    /// The workload runs the current plan
    Active,
    /// Waiting on a dependency; the pass will be retried
    Waiting(String),
    /// Needs operator attention
    Blocked(String),
}

/// What the host should do after the pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The pass completed (successfully or not); wait for the next event
    Done,
    /// The pass was abandoned; re-run it on the next event
    Defer,
}

/// Result of one reconciliation pass
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileOutcome {
    /// Status to report
    pub status: UnitStatus,
    /// Whether to re-run the pass
    pub action: Action,
    /// Layer handed to the supervisor, if the pass got that far
    pub layer: Option<Layer>,
    /// Workload version reported by the binary
    pub workload_version: Option<String>,
    /// Container resource limits for the resource patcher
    pub resource_limits: BTreeMap<String, String>,
}

impl ReconcileOutcome {
    fn failed(status: UnitStatus, action: Action) -> Self {
        Self {
            status,
            action,
            layer: None,
            workload_version: None,
            resource_limits: BTreeMap::new(),
        }
    }
}

/// Inputs and collaborators of a pass
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(relations, peers, supervisor)
///     .config(config)
///     .leader(true)
///     .model("identity")
///     .build();
/// ```
pub struct Context {
    /// Relation data access
    pub relations: Arc<dyn Relations>,
    /// Peer store holding the cookie key
    pub peers: Arc<dyn PeerStore>,
    /// Process supervisor of the workload container
    pub supervisor: Arc<dyn Supervisor>,
    /// Operator configuration
    pub config: CharmConfig,
    /// Whether this unit is the leader
    pub is_leader: bool,
    /// Model (namespace) the application is deployed in
    pub model: String,
    /// Application name
    pub app: String,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(
        relations: Arc<dyn Relations>,
        peers: Arc<dyn PeerStore>,
        supervisor: Arc<dyn Supervisor>,
    ) -> ContextBuilder {
        ContextBuilder::new(relations, peers, supervisor)
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    relations: Arc<dyn Relations>,
    peers: Arc<dyn PeerStore>,
    supervisor: Arc<dyn Supervisor>,
    config: CharmConfig,
    is_leader: bool,
    model: String,
    app: String,
}

impl ContextBuilder {
    fn new(
        relations: Arc<dyn Relations>,
        peers: Arc<dyn PeerStore>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Self {
        Self {
            relations,
            peers,
            supervisor,
            config: CharmConfig::default(),
            is_leader: false,
            model: "default".to_string(),
            app: APPLICATION_NAME.to_string(),
        }
    }

    /// Set the operator configuration
    pub fn config(mut self, config: CharmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set whether this unit is the leader
    pub fn leader(mut self, is_leader: bool) -> Self {
        self.is_leader = is_leader;
        self
    }

    /// Set the model name
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the application name
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            relations: self.relations,
            peers: self.peers,
            supervisor: self.supervisor,
            config: self.config,
            is_leader: self.is_leader,
            model: self.model,
            app: self.app,
        }
    }
}

/// Run one reconciliation pass
#[instrument(skip(ctx), fields(app = %ctx.app, leader = ctx.is_leader))]
pub async fn reconcile(ctx: &Context) -> ReconcileOutcome {
    info!("reconciling workload");
    match try_reconcile(ctx).await {
        Ok(outcome) => outcome,
        Err(e) => error_policy(&e),
    }
}

async fn try_reconcile(ctx: &Context) -> Result<ReconcileOutcome, Error> {
    if !ctx.supervisor.can_connect().await {
        return Err(Error::container_unavailable(crate::WORKLOAD_CONTAINER_NAME));
    }

    ctx.config.validate()?;

    let cookie_key = ensure_cookie_key(ctx.peers.as_ref(), ctx.is_leader)?;
    if let CookieKey::Created(_) = cookie_key {
        debug!("cookie key created on this pass");
    }

    let dependencies = Dependencies::load(ctx.relations.as_ref());
    let layer = render_layer(LayerInputs {
        config: &ctx.config,
        cookie_key: cookie_key.value(),
        dependencies: &dependencies,
    });

    plan_layer(ctx.supervisor.as_ref(), &layer).await?;
    info!("pebble plan updated with new configuration");

    if ctx.is_leader {
        publish_relation_data(ctx, &dependencies);
    }

    let version = workload_version(ctx.supervisor.as_ref()).await;

    Ok(ReconcileOutcome {
        status: UnitStatus::Active,
        action: Action::Done,
        layer: Some(layer),
        workload_version: version,
        resource_limits: ctx.config.resource_limits(),
    })
}

/// Map a failed pass to the status and action reported to the host
pub fn error_policy(error: &Error) -> ReconcileOutcome {
    if error.is_retryable() {
        let message = match error {
            Error::ContainerUnavailable { .. } => WAITING_FOR_CONTAINER.to_string(),
            Error::PeerStoreUnavailable { .. } => WAITING_FOR_PEER.to_string(),
            Error::SecretPending { .. } => WAITING_FOR_COOKIE_KEY.to_string(),
            other => other.to_string(),
        };
        info!(error = %error, "deferring reconciliation");
        return ReconcileOutcome::failed(UnitStatus::Waiting(message), Action::Defer);
    }

    error!(error = %error, "reconciliation failed");
    let message = match error {
        Error::Supervisor { .. } => REPLAN_FAILED.to_string(),
        Error::Validation { field, .. } => format!("Invalid configuration: {field}"),
        _ => "Reconciliation failed, please consult the logs".to_string(),
    };
    ReconcileOutcome::failed(UnitStatus::Blocked(message), Action::Done)
}

/// Publish our endpoint and the public route configuration (leader only)
///
/// Failures are logged and do not fail the pass: the workload is already
/// running the new plan.
fn publish_relation_data(ctx: &Context, dependencies: &Dependencies) {
    let route = &dependencies.public_route;

    if ctx.relations.is_established(LOGIN_UI_ENDPOINT_RELATION_NAME) {
        let endpoint = route.domain_url();
        let data = RelationData::from([("endpoint".to_string(), endpoint.clone())]);
        match ctx
            .relations
            .update_app_data(LOGIN_UI_ENDPOINT_RELATION_NAME, &data)
        {
            Ok(()) => info!(endpoint = %endpoint, "sent login ui endpoint info"),
            Err(e) => warn!(error = %e, "failed to publish login ui endpoint"),
        }
    }

    if route.ready {
        let published = route
            .route_config(&ctx.model, &ctx.app)
            .and_then(|config| {
                let data = RelationData::from([("config".to_string(), config)]);
                ctx.relations
                    .update_app_data(PUBLIC_ROUTE_RELATION_NAME, &data)
            });
        if let Err(e) = published {
            warn!(error = %e, "failed to submit public route configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::EnvValue;
    use crate::relation::{MockPeerStore, MockRelations};
    use crate::workload::MockSupervisor;
    use crate::{
        COOKIES_KEY, HYDRA_RELATION_NAME, KRATOS_RELATION_NAME, PEER_RELATION_NAME,
        TRACING_RELATION_NAME,
    };

    const EXISTING_KEY: &str = "00112233445566778899aabbccddeeff";

    /// Relations where only the given bags are established
    fn relations_with(bags: Vec<(&'static str, RelationData)>) -> MockRelations {
        let names: Vec<&'static str> = bags.iter().map(|(name, _)| *name).collect();
        let mut relations = MockRelations::new();
        relations
            .expect_is_established()
            .returning(move |name| names.iter().any(|n| *n == name));
        relations.expect_remote_app_data().returning(move |name| {
            bags.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, bag)| bag.clone())
        });
        relations
    }

    fn peers_with_key(key: Option<&'static str>) -> MockPeerStore {
        let mut peers = MockPeerStore::new();
        peers.expect_is_available().return_const(true);
        peers
            .expect_get()
            .withf(|k| k == COOKIES_KEY)
            .returning(move |_| key.map(str::to_string));
        peers
    }

    fn healthy_supervisor() -> MockSupervisor {
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_can_connect().return_const(true);
        supervisor.expect_add_layer().returning(|_, _, _| Ok(()));
        supervisor.expect_is_running().returning(|_| Ok(false));
        supervisor.expect_start().returning(|_| Ok(()));
        supervisor
            .expect_exec()
            .returning(|_| Ok("App Version: 1.42.0".to_string()));
        supervisor
    }

    fn context(
        relations: MockRelations,
        peers: MockPeerStore,
        supervisor: MockSupervisor,
        leader: bool,
    ) -> Context {
        Context::builder(Arc::new(relations), Arc::new(peers), Arc::new(supervisor))
            .leader(leader)
            .model("testing")
            .build()
    }

    fn env_of(outcome: &ReconcileOutcome) -> BTreeMap<String, EnvValue> {
        outcome
            .layer
            .as_ref()
            .and_then(|l| l.workload())
            .map(|s| s.environment.clone())
            .expect("layer should be rendered")
    }

    /// Story: while the container is still coming up the pass is deferred
    #[tokio::test]
    async fn story_unreachable_container_defers() {
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_can_connect().return_const(false);
        supervisor.expect_add_layer().never();

        let mut peers = MockPeerStore::new();
        peers.expect_is_available().never();

        let ctx = context(relations_with(vec![]), peers, supervisor, true);
        let outcome = reconcile(&ctx).await;

        assert_eq!(
            outcome.status,
            UnitStatus::Waiting(WAITING_FOR_CONTAINER.to_string())
        );
        assert_eq!(outcome.action, Action::Defer);
        assert!(outcome.layer.is_none());
    }

    /// Story: without the peer relation there is nowhere to keep the cookie
    /// key, so nothing is rendered
    #[tokio::test]
    async fn story_missing_peer_relation_defers() {
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_can_connect().return_const(true);
        supervisor.expect_add_layer().never();

        let mut peers = MockPeerStore::new();
        peers.expect_is_available().return_const(false);

        let ctx = context(relations_with(vec![]), peers, supervisor, true);
        let outcome = reconcile(&ctx).await;

        assert_eq!(outcome.status, UnitStatus::Waiting(WAITING_FOR_PEER.to_string()));
        assert_eq!(outcome.action, Action::Defer);
    }

    #[tokio::test]
    async fn test_follower_waits_for_leader_key() {
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_can_connect().return_const(true);
        supervisor.expect_add_layer().never();

        let mut peers = peers_with_key(None);
        peers.expect_set().never();

        let ctx = context(relations_with(vec![]), peers, supervisor, false);
        let outcome = reconcile(&ctx).await;

        assert_eq!(
            outcome.status,
            UnitStatus::Waiting(WAITING_FOR_COOKIE_KEY.to_string())
        );
        assert_eq!(outcome.action, Action::Defer);
    }

    /// Story: the leader's first pass provisions the key and renders it
    #[tokio::test]
    async fn story_leader_provisions_key_and_plans() {
        let mut peers = peers_with_key(None);
        peers
            .expect_set()
            .withf(|k, v| k == COOKIES_KEY && v.len() == 32)
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = context(relations_with(vec![]), peers, healthy_supervisor(), true);
        let outcome = reconcile(&ctx).await;

        assert_eq!(outcome.status, UnitStatus::Active);
        assert_eq!(outcome.action, Action::Done);
        assert_eq!(outcome.workload_version.as_deref(), Some("1.42.0"));

        let env = env_of(&outcome);
        match &env["COOKIES_ENCRYPTION_KEY"] {
            EnvValue::Str(key) => assert_eq!(key.len(), 32),
            other => panic!("unexpected key value {other:?}"),
        }
        assert_eq!(env["HYDRA_ADMIN_URL"], EnvValue::from(""));
        assert_eq!(env["KRATOS_PUBLIC_URL"], EnvValue::from(""));
        assert_eq!(env["BASE_URL"], EnvValue::from(""));
        assert_eq!(env["TRACING_ENABLED"], EnvValue::Bool(false));
        assert!(!env.contains_key("MFA_ENABLED"));
    }

    #[tokio::test]
    async fn test_follower_renders_with_existing_key() {
        let mut relations = relations_with(vec![]);
        relations.expect_update_app_data().never();

        let ctx = context(
            relations,
            peers_with_key(Some(EXISTING_KEY)),
            healthy_supervisor(),
            false,
        );
        let outcome = reconcile(&ctx).await;

        assert_eq!(outcome.status, UnitStatus::Active);
        assert_eq!(
            env_of(&outcome)["COOKIES_ENCRYPTION_KEY"],
            EnvValue::from(EXISTING_KEY)
        );
    }

    /// Story: every integration published → every dependent key rendered
    #[tokio::test]
    async fn story_all_integrations_flow_into_layer() {
        let tempo = "http://tempo-k8s-0.tempo-k8s-endpoints.namespace.svc.cluster.local";
        let relations = relations_with(vec![
            (PEER_RELATION_NAME, RelationData::new()),
            (
                HYDRA_RELATION_NAME,
                RelationData::from([(
                    "admin_endpoint".to_string(),
                    "http://hydra-admin-url:80/testing-hydra".to_string(),
                )]),
            ),
            (
                KRATOS_RELATION_NAME,
                RelationData::from([
                    (
                        "public_endpoint".to_string(),
                        "http://kratos-public-url:80/x".to_string(),
                    ),
                    (
                        "admin_endpoint".to_string(),
                        "http://kratos-admin-url:80/x".to_string(),
                    ),
                    ("mfa_enabled".to_string(), "True".to_string()),
                    (
                        "oidc_webauthn_sequencing_enabled".to_string(),
                        "False".to_string(),
                    ),
                    ("feature_flags".to_string(), "password,totp".to_string()),
                ]),
            ),
            (
                TRACING_RELATION_NAME,
                RelationData::from([(
                    "receivers".to_string(),
                    format!(
                        r#"[{{"protocol": {{"name": "otlp_http", "type": "http"}}, "url": "{tempo}:4318"}},
                            {{"protocol": {{"name": "otlp_grpc", "type": "grpc"}}, "url": "{tempo}:4317"}}]"#
                    ),
                )]),
            ),
        ]);

        let ctx = context(
            relations,
            peers_with_key(Some(EXISTING_KEY)),
            healthy_supervisor(),
            false,
        );
        let outcome = reconcile(&ctx).await;
        let env = env_of(&outcome);

        assert_eq!(
            env["HYDRA_ADMIN_URL"],
            EnvValue::from("http://hydra-admin-url:80/testing-hydra")
        );
        assert_eq!(
            env["KRATOS_PUBLIC_URL"],
            EnvValue::from("http://kratos-public-url:80/x")
        );
        assert_eq!(env["MFA_ENABLED"], EnvValue::Bool(true));
        assert_eq!(env["OIDC_WEBAUTHN_SEQUENCING_ENABLED"], EnvValue::Bool(false));
        assert_eq!(env["FEATURE_FLAGS"], EnvValue::from("password,totp"));
        assert_eq!(env["TRACING_ENABLED"], EnvValue::Bool(true));
        assert_eq!(env["OTEL_HTTP_ENDPOINT"], EnvValue::from(format!("{tempo}:4318")));
        assert_eq!(env["OTEL_GRPC_ENDPOINT"], EnvValue::from(format!("{tempo}:4317")));
    }

    /// Story: the leader tells requirers and Traefik where the UI lives
    #[tokio::test]
    async fn story_leader_publishes_endpoint_and_route() {
        let mut relations = relations_with(vec![
            (LOGIN_UI_ENDPOINT_RELATION_NAME, RelationData::new()),
            (
                PUBLIC_ROUTE_RELATION_NAME,
                RelationData::from([
                    ("scheme".to_string(), "http".to_string()),
                    ("external_host".to_string(), "login.example.com:80".to_string()),
                ]),
            ),
        ]);
        relations
            .expect_update_app_data()
            .withf(|name, data| {
                name == LOGIN_UI_ENDPOINT_RELATION_NAME
                    && data.get("endpoint").map(String::as_str) == Some("https://login.example.com")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        relations
            .expect_update_app_data()
            .withf(|name, data| {
                name == PUBLIC_ROUTE_RELATION_NAME
                    && data
                        .get("config")
                        .is_some_and(|c| c.contains("Host(`login.example.com`)"))
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = context(
            relations,
            peers_with_key(Some(EXISTING_KEY)),
            healthy_supervisor(),
            true,
        );
        let outcome = reconcile(&ctx).await;

        assert_eq!(outcome.status, UnitStatus::Active);
        assert_eq!(
            env_of(&outcome)["BASE_URL"],
            EnvValue::from("https://login.example.com")
        );
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_pass() {
        let mut relations = relations_with(vec![(LOGIN_UI_ENDPOINT_RELATION_NAME, RelationData::new())]);
        relations
            .expect_update_app_data()
            .returning(|_, _| Err(Error::serialization("bag rejected")));

        let ctx = context(
            relations,
            peers_with_key(Some(EXISTING_KEY)),
            healthy_supervisor(),
            true,
        );
        assert_eq!(reconcile(&ctx).await.status, UnitStatus::Active);
    }

    /// Story: a plan Pebble rejects blocks the unit instead of retrying
    #[tokio::test]
    async fn story_rejected_plan_blocks_unit() {
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_can_connect().return_const(true);
        supervisor.expect_add_layer().returning(|_, _, _| Ok(()));
        supervisor.expect_is_running().returning(|_| Ok(true));
        supervisor
            .expect_replan()
            .returning(|| Err(Error::supervisor("replan", "Plan failed")));

        let ctx = context(
            relations_with(vec![]),
            peers_with_key(Some(EXISTING_KEY)),
            supervisor,
            true,
        );
        let outcome = reconcile(&ctx).await;

        assert_eq!(outcome.status, UnitStatus::Blocked(REPLAN_FAILED.to_string()));
        assert_eq!(outcome.action, Action::Done);
    }

    #[tokio::test]
    async fn test_invalid_config_blocks_unit() {
        let mut supervisor = MockSupervisor::new();
        supervisor.expect_can_connect().return_const(true);
        supervisor.expect_add_layer().never();

        let ctx = Context::builder(
            Arc::new(relations_with(vec![])),
            Arc::new(peers_with_key(Some(EXISTING_KEY))),
            Arc::new(supervisor),
        )
        .config(CharmConfig {
            support_email: "nobody".to_string(),
            ..Default::default()
        })
        .build();
        let outcome = reconcile(&ctx).await;

        assert_eq!(
            outcome.status,
            UnitStatus::Blocked("Invalid configuration: support_email".to_string())
        );
    }

    #[test]
    fn test_error_policy_waiting_messages() {
        let cases = [
            (
                Error::container_unavailable("login-ui"),
                WAITING_FOR_CONTAINER,
            ),
            (Error::peer_store_unavailable("peers"), WAITING_FOR_PEER),
            (Error::secret_pending(COOKIES_KEY), WAITING_FOR_COOKIE_KEY),
        ];
        for (error, message) in cases {
            let outcome = error_policy(&error);
            assert_eq!(outcome.status, UnitStatus::Waiting(message.to_string()));
            assert_eq!(outcome.action, Action::Defer);
        }
    }

    #[test]
    fn test_status_serialization() {
        let yaml = serde_yaml::to_string(&UnitStatus::Blocked(REPLAN_FAILED.to_string())).unwrap();
        assert!(yaml.contains("state: blocked"));
        assert!(yaml.contains(REPLAN_FAILED));

        let parsed: UnitStatus = serde_yaml::from_str("state: active").unwrap();
        assert_eq!(parsed, UnitStatus::Active);
    }
}
