//! Sessão: o estado completo da aplicação num único dono.
//!
//! Junta o [`Workspace`], o histórico de undo e o log de medições. As ações
//! do usuário passam por aqui e viram comandos no histórico; a ingestão de
//! telemetria chega por [`Session::apply_measurement`].
//!
//! A sessão não é compartilhada entre threads: ela vive dentro da thread
//! dona (ver [`crate::owner`]) e os demais a acessam por mensagens.

use crate::alerts::evaluate_alert;
use crate::commands::{AddEntity, DeleteEntity, MoveEntity, SelectEntity};
use crate::events::NetworkEvent;
use crate::measurement_log::{MeasurementLog, now_timestamp};
use crate::registry::RegistryError;
use crate::types::{Entity, EntityId, Measurement, Slot};
use crate::undo::{Command, CommandError, UndoEngine};
use crate::workspace::Workspace;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Session {
    workspace: Workspace,
    undo: UndoEngine<Workspace>,
    log: Arc<MeasurementLog>,
    recent_count: usize,
}

impl Session {
    pub fn new(
        workspace: Workspace,
        max_history: usize,
        log: Arc<MeasurementLog>,
        recent_count: usize,
    ) -> Self {
        Self {
            workspace,
            undo: UndoEngine::new(max_history),
            log,
            recent_count,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn undo_engine(&self) -> &UndoEngine<Workspace> {
        &self.undo
    }

    pub fn log(&self) -> &MeasurementLog {
        &self.log
    }

    pub fn entity_count(&self) -> usize {
        self.workspace.registry().len()
    }

    // ── Histórico ──

    /// Executa e registra um comando.
    pub fn execute(&mut self, command: Box<dyn Command<Workspace>>) -> Result<(), CommandError> {
        self.undo.execute(command, &mut self.workspace)?;
        self.notify_undo_stack();
        Ok(())
    }

    /// Desfaz a última ação. `Ok(false)` se não havia nada para desfazer.
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        let undone = self.undo.undo(&mut self.workspace)?;
        if undone {
            self.notify_undo_stack();
        }
        Ok(undone)
    }

    pub fn clear_history(&mut self) {
        if self.undo.clear() > 0 {
            self.notify_undo_stack();
        }
    }

    // ── Ações do usuário ──

    pub fn add_entity(&mut self, entity: Entity) -> Result<(), CommandError> {
        self.execute(Box::new(AddEntity::new(entity)))
    }

    pub fn delete_entity(&mut self, id: EntityId) -> Result<(), CommandError> {
        let command = DeleteEntity::new(&self.workspace, id)?;
        self.execute(Box::new(command))
    }

    /// Move a entidade entre bandeja e slots (o equivalente ao arrastar).
    ///
    /// O posicionamento é feito aqui; o histórico só recebe o registro do
    /// movimento. Mover para onde a entidade já está não gera entrada.
    pub fn move_entity(&mut self, id: EntityId, to: Slot) -> Result<(), CommandError> {
        let entity = self
            .workspace
            .registry()
            .find_by_id(id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))?;
        let from = self.workspace.topology().slot_of(id);
        if from == to {
            debug!("Entidade {id} já está em {to}");
            return Ok(());
        }

        match (from, to) {
            (_, Slot::Grid(index)) => {
                self.workspace.place_entity(id, index)?;
            }
            (Slot::Grid(index), Slot::Tray) => {
                self.workspace.remove_from_slot(index);
            }
            (Slot::Tray, Slot::Tray) => {}
        }

        self.execute(Box::new(MoveEntity::new(&entity, from, to)))
    }

    /// Troca a entidade selecionada. Selecionar a mesma entidade não gera entrada.
    pub fn select_entity(&mut self, next: Option<EntityId>) -> Result<(), CommandError> {
        let previous = self.workspace.selection();
        if previous == next {
            return Ok(());
        }
        let command = SelectEntity::new(&self.workspace, previous, next);
        self.execute(Box::new(command))
    }

    /// Devolve todas as entidades para a bandeja, fora do histórico.
    pub fn clear_network(&mut self) -> Vec<EntityId> {
        let returned = self.workspace.clear_grid();
        info!("Rede limpa: {} entidades devolvidas à bandeja", returned.len());
        returned
    }

    // ── Telemetria ──

    /// Aplica uma leitura recebida.
    ///
    /// Ordem: valor no registro e validade das conexões, linha no log,
    /// alerta (se inválido) e por fim `MeasurementReceived`.
    pub fn apply_measurement(&mut self, id: EntityId, value: f64) -> Result<Entity, RegistryError> {
        let previous = self
            .workspace
            .registry()
            .find_by_id(id)
            .map(|e| e.current_value);
        let entity = self.workspace.set_value(id, value)?;

        self.log.append(&Measurement::new(now_timestamp(), id, value));

        let events = self.workspace.events();
        if let Some(alert) = evaluate_alert(&entity) {
            warn!("{}", alert.message);
            events.publish(NetworkEvent::AlertTriggered(alert.message));
        }
        events.publish(NetworkEvent::MeasurementReceived {
            entity: entity.clone(),
            value,
        });

        info!(
            "Entidade {id} atualizada: {:.2} -> {value:.2} kWh",
            previous.unwrap_or_default()
        );
        Ok(entity)
    }

    /// Últimas `n` leituras da entidade, da mais antiga para a mais recente.
    pub fn last_measurements(&self, id: EntityId, n: usize) -> Vec<Measurement> {
        self.log.last_n(id, n)
    }

    /// Últimas leituras com o N configurado.
    pub fn recent_measurements(&self, id: EntityId) -> Vec<Measurement> {
        self.last_measurements(id, self.recent_count)
    }

    /// Recarrega o último valor de cada entidade a partir do log.
    ///
    /// O log guarda o valor com duas casas, e é esse valor que volta. O
    /// status é recalculado a partir dele: uma leitura como `0.336`
    /// (ALERT) é gravada como `0.34` e restaurada como NORMAL.
    pub fn restore_from_log(&mut self) -> usize {
        let values = self.log.latest_values();
        let restored = self.workspace.restore_values(&values);
        if restored > 0 {
            info!("{restored} valores restaurados de {}", self.log.path().display());
        }
        restored
    }

    fn notify_undo_stack(&self) {
        self.workspace.events().publish(NetworkEvent::UndoStackChanged {
            depth: self.undo.len(),
        });
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
