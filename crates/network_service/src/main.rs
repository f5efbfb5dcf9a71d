//! # Network Service
//!
//! Serviço de ingestão de telemetria para medidores de consumo de energia.
//!
//! Escuta TCP, aplica as leituras ao registro de entidades, grava o log de
//! medições e registra no console os eventos publicados pelo núcleo.

mod ingest;

use ingest::IngestServer;
use network_core::config::AppConfig;
use network_core::events::{DEFAULT_SUBSCRIBER_CAPACITY, EventBus, NetworkEvent};
use network_core::measurement_log::MeasurementLog;
use network_core::owner::spawn_owner;
use network_core::registry::EntityRegistry;
use network_core::session::Session;
use network_core::topology::TopologyManager;
use network_core::workspace::Workspace;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("Config inválida: {problem}");
        }
        return ExitCode::FAILURE;
    }

    // ── Núcleo ──
    let events = EventBus::new();
    let observer = events.subscribe(DEFAULT_SUBSCRIBER_CAPACITY);
    let log = Arc::new(MeasurementLog::open(&config.log.path));

    let workspace = Workspace::new(
        EntityRegistry::seeded(),
        TopologyManager::new(config.topology.slots),
        events,
    );
    let mut session = Session::new(
        workspace,
        config.undo.max_history,
        Arc::clone(&log),
        config.log.recent_count,
    );
    session.restore_from_log();

    let (owner, _owner_thread) = match spawn_owner(session) {
        Ok(spawned) => spawned,
        Err(e) => {
            error!("Falha ao iniciar a thread dona da sessão: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Servidor TCP ──
    let server = match IngestServer::bind(&config.server, owner, Arc::clone(&log)) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let addr = server.local_addr();
    let _server = match server.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Falha ao iniciar threads do servidor: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ NETWORK SERVICE – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Escutando: {addr}");
    println!("  Workers:   {}", config.server.workers);
    println!("  Log:       {}", log.path().display());
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal: observador de eventos ──
    for event in observer {
        match event {
            NetworkEvent::MeasurementReceived { entity, value } => {
                info!("{} (ID {}) ← {value:.2} kWh [{}]", entity.name, entity.id, entity.status());
            }
            NetworkEvent::AlertTriggered(message) => warn!("{message}"),
            NetworkEvent::UndoStackChanged { depth } => debug!("Histórico de undo: {depth}"),
            other => debug!("Evento: {other:?}"),
        }
    }

    info!("Barramento de eventos encerrado");
    ExitCode::SUCCESS
}
