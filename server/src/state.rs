use std::sync::Arc;

use gauntlet_config::GauntletConfig;
use gauntlet_config::TeamDirectory;
use gauntlet_council::Council;
use gauntlet_council::ModelTransport;
use gauntlet_council::OpenRouterTransport;
use gauntlet_council::RateLimiter;
use gauntlet_council::TransportError;
use gauntlet_engine::RuleEngine;
use gauntlet_review::ReviewPipeline;
use gauntlet_session::AuditLog;
use gauntlet_session::EventLog;
use gauntlet_session::NotificationStore;
use gauntlet_session::Presence;
use gauntlet_session::SessionRepository;
use gauntlet_session::Versioning;
use gauntlet_store::KeyedStore;

/// Dependency-injected services shared by all request handlers. The
/// store connection pool, configuration, and rule registry are the only
/// process-wide singletons; everything else hangs off them.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GauntletConfig>,
    pub repo: Arc<SessionRepository>,
    pub versioning: Arc<Versioning>,
    pub presence: Arc<Presence>,
    pub events: Arc<EventLog>,
    pub notifications: Arc<NotificationStore>,
    pub audit: Arc<AuditLog>,
    pub pipeline: Arc<ReviewPipeline>,
    pub engine: RuleEngine,
    pub team: Arc<TeamDirectory>,
}

impl AppState {
    /// Wire the services over a store backend and a model transport.
    pub fn new(
        config: GauntletConfig,
        store: Arc<dyn KeyedStore>,
        transport: Arc<dyn ModelTransport>,
    ) -> Self {
        let config = Arc::new(config);
        let session_ttl = config.session.ttl();
        let repo = Arc::new(SessionRepository::new(
            Arc::clone(&store),
            session_ttl,
            config.task_identity.clone(),
        ));
        let versioning = Arc::new(Versioning::new(
            Arc::clone(&store),
            session_ttl,
            config.idempotency.ttl(),
        ));
        let presence = Arc::new(Presence::new(Arc::clone(&store), config.presence.ttl()));
        let events = Arc::new(EventLog::new(Arc::clone(&store), session_ttl));
        let notifications = Arc::new(NotificationStore::new(Arc::clone(&store)));
        let audit = Arc::new(AuditLog::new(store, session_ttl));
        let team = Arc::new(TeamDirectory::new(config.team.clone()));
        let pipeline = Arc::new(ReviewPipeline::new(
            Arc::clone(&repo),
            Arc::clone(&versioning),
            Arc::clone(&audit),
            Arc::clone(&notifications),
            Arc::clone(&team),
            config.review.max_rounds,
            config.bulk_actions.max_batch_size,
        ));
        let council = Council::new(
            config.agentic.council.clone(),
            &config.llm,
            &config.resilience,
            transport,
        );
        let engine = RuleEngine::new(config.agentic.rules.clone(), council);
        Self {
            config,
            repo,
            versioning,
            presence,
            events,
            notifications,
            audit,
            pipeline,
            engine,
            team,
        }
    }

    /// Wire with the real OpenRouter transport built from config.
    pub fn with_openrouter(
        config: GauntletConfig,
        store: Arc<dyn KeyedStore>,
    ) -> Result<Self, TransportError> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let transport = Arc::new(OpenRouterTransport::new(
            &config.llm,
            config.secrets.openrouter_api_key.clone(),
            limiter,
        )?);
        Ok(Self::new(config, store, transport))
    }
}
