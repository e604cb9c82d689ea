use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use pacemaker_core::config::PacemakerConfig;
use pacemaker_core::interfaces::{AdminCommandHandler, EventBus, LlmBackend, OutboundRequest, ThoughtSink};
use pacemaker_core::types::{InboundMessage, OriginatingEvent};
use pacemaker_credentials::CredentialPool;
use pacemaker_llm::LlmClient;
use pacemaker_queue::QueueManager;
use pacemaker_stamina::StaminaController;
use pacemaker_tasks::TaskRunner;

use pacemaker_assembler::BatchAssembler;
use pacemaker_correlator::Correlator;

use crate::admin;
use crate::error::Result;
use crate::handlers::{DeliverReplyHandler, RecordThoughtHandler};
use crate::pipeline::PipelineProcessor;

/// C8: the top-level composition root. Owns every other component and is
/// the only thing the service binary talks to directly (spec §4.8).
pub struct Orchestrator {
    pub(crate) queue: Arc<QueueManager>,
    pub(crate) stamina: Arc<StaminaController>,
    pub(crate) credentials: Arc<CredentialPool>,
    pub(crate) correlator: Arc<Correlator>,
    tasks: Arc<TaskRunner>,
    llm: Arc<LlmClient>,
    bus: Arc<dyn EventBus>,
    admin_handler: Arc<dyn AdminCommandHandler>,
    pub(crate) group_stopped: Arc<AtomicBool>,
    accepting_ingress: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        config: &PacemakerConfig,
        bus: Arc<dyn EventBus>,
        admin_handler: Arc<dyn AdminCommandHandler>,
        thought_sink: Arc<dyn ThoughtSink>,
        llm_backend: Arc<dyn LlmBackend>,
    ) -> Result<Arc<Self>> {
        let credentials = Arc::new(CredentialPool::new(
            config.credentials.primary.clone(),
            config.credentials.backup.clone(),
        )?);
        let stamina = Arc::new(StaminaController::new(config.stamina.clone()));
        let llm = Arc::new(LlmClient::new(
            config.llm.clone(),
            config.bot.clone(),
            credentials.clone(),
            llm_backend,
        ));
        let assembler = Arc::new(BatchAssembler::new(config.bot.bot_id.clone()));
        let processor = Arc::new(PipelineProcessor::new(assembler, llm.clone()));

        let tasks = TaskRunner::new();
        tasks.register(pacemaker_core::types::TaskKind::DeliverReply, Arc::new(DeliverReplyHandler::new(bus.clone())));
        tasks.register(pacemaker_core::types::TaskKind::RecordThought, Arc::new(RecordThoughtHandler::new(thought_sink)));

        let correlator = Arc::new(Correlator::new(tasks.clone(), config.tasks.max_attempts));

        let group_stopped = Arc::new(AtomicBool::new(false));
        let queue = QueueManager::new(
            config.scheduler.clone(),
            config.bot.clone(),
            stamina.clone(),
            processor,
            correlator.clone(),
            group_stopped.clone(),
        );

        Ok(Arc::new(Self {
            queue,
            stamina,
            credentials,
            correlator,
            tasks,
            llm,
            bus,
            admin_handler,
            group_stopped,
            accepting_ingress: AtomicBool::new(true),
        }))
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn stamina(&self) -> &Arc<StaminaController> {
        &self.stamina
    }

    pub fn credentials(&self) -> &Arc<CredentialPool> {
        &self.credentials
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// `initialize()` (spec §4.8): probe the LLM backend (non-fatal) and
    /// start every background loop. The service binary owns the shutdown
    /// broadcast; this just spawns against the receiver it is handed.
    pub async fn initialize(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        if !self.llm.health_check().await {
            warn!("llm backend unreachable at startup, continuing in degraded mode");
        }

        tokio::spawn(pacemaker_credentials::run_daily_reset_loop(self.credentials.clone(), shutdown.clone()));
        tokio::spawn(pacemaker_stamina::run_regen_loop(self.stamina.clone(), shutdown.clone()));
        tokio::spawn(pacemaker_correlator::run_eviction_loop(self.correlator.clone(), shutdown.clone()));
        tokio::spawn(Arc::clone(&self.tasks).run(shutdown));

        info!("orchestrator initialized");
    }

    /// Route one inbound event (spec §4.8): admin commands are authorized,
    /// dispatched, and answered immediately; everything else is recorded for
    /// correlation and handed to C4.
    #[instrument(skip(self, message), fields(id = %message.id))]
    pub async fn handle_inbound(self: &Arc<Self>, message: InboundMessage) {
        if !self.accepting_ingress.load(Ordering::SeqCst) {
            warn!("dropping inbound message, orchestrator is shutting down");
            return;
        }

        if self.admin_handler.is_admin(&message.sender_id) {
            if let Some(command) = self.admin_handler.parse(&message.content) {
                let response = admin::dispatch(self, command).await;
                let target = OriginatingEvent::from_inbound(&message);
                if let Err(e) = self.bus.send(OutboundRequest::for_target(&target, response, None)).await {
                    warn!(error = %e, "failed to deliver admin command response");
                }
                return;
            }
        }

        self.correlator.record(message.id.clone(), OriginatingEvent::from_inbound(&message));
        self.queue.enqueue(message).await;
    }

    /// `shutdown()` (spec §4.8): stop accepting ingress, drain C6, flush
    /// whatever C4 is still holding, and report the rest as evicted.
    #[instrument(skip(self))]
    pub async fn shutdown(self: &Arc<Self>) {
        self.accepting_ingress.store(false, Ordering::SeqCst);
        self.queue.flush_all().await;
        self.tasks.shutdown().await;
        let evicted = self.correlator.drain_all();
        if !evicted.is_empty() {
            warn!(count = evicted.len(), "orchestrator shutdown: pending correlations evicted unanswered");
        }
        info!("orchestrator shut down");
    }
}
