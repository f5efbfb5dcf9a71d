//! Comandos reversíveis sobre o [`Workspace`].

use crate::measurement_log::now_timestamp;
use crate::registry::RegistryError;
use crate::topology::TopologyError;
use crate::types::{Entity, EntityId, Slot};
use crate::undo::{Command, CommandError};
use crate::workspace::{RemovedEntity, Workspace};
use chrono::NaiveDateTime;
use tracing::warn;

// ──────────────────────────────────────────────
// Adicionar
// ──────────────────────────────────────────────

pub struct AddEntity {
    entity: Entity,
    description: String,
    timestamp: NaiveDateTime,
}

impl AddEntity {
    pub fn new(entity: Entity) -> Self {
        Self {
            description: format!("Add entity '{}' (ID: {})", entity.name, entity.id),
            entity,
            timestamp: now_timestamp(),
        }
    }
}

impl Command<Workspace> for AddEntity {
    fn description(&self) -> &str {
        &self.description
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn execute(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        ws.add_entity(self.entity.clone())?;
        Ok(())
    }

    fn undo(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        ws.remove_entity(self.entity.id)
            .ok_or(RegistryError::NotFound(self.entity.id))?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Excluir
// ──────────────────────────────────────────────

/// Exclui a entidade; o undo a recoloca no índice original e no slot que
/// ocupava, se o slot ainda estiver livre.
pub struct DeleteEntity {
    entity_id: EntityId,
    removed: Option<RemovedEntity>,
    description: String,
    timestamp: NaiveDateTime,
}

impl DeleteEntity {
    pub fn new(ws: &Workspace, entity_id: EntityId) -> Result<Self, RegistryError> {
        let entity = ws
            .registry()
            .find_by_id(entity_id)
            .ok_or(RegistryError::NotFound(entity_id))?;
        Ok(Self {
            entity_id,
            removed: None,
            description: format!("Delete entity '{}' (ID: {})", entity.name, entity.id),
            timestamp: now_timestamp(),
        })
    }
}

impl Command<Workspace> for DeleteEntity {
    fn description(&self) -> &str {
        &self.description
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn execute(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        let removed = ws
            .remove_entity(self.entity_id)
            .ok_or(RegistryError::NotFound(self.entity_id))?;
        self.removed = Some(removed);
        Ok(())
    }

    fn undo(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        let removed = self
            .removed
            .take()
            .ok_or_else(|| CommandError::Failed(format!("Nothing to restore for entity {}", self.entity_id)))?;

        if let Err(e) = ws.insert_entity_at(removed.index, removed.entity.clone()) {
            self.removed = Some(removed);
            return Err(e.into());
        }

        if let Some(slot) = removed.slot {
            if ws.topology().occupant(slot).is_none() {
                ws.place_entity(self.entity_id, slot)?;
            } else {
                warn!(
                    "Slot {slot} ocupado; entidade {} restaurada na bandeja",
                    self.entity_id
                );
            }
        }
        if removed.was_selected {
            ws.set_selection_silently(Some(self.entity_id));
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Mover
// ──────────────────────────────────────────────

/// Registro de um movimento já realizado pelo chamador.
///
/// O execute não faz nada; o undo deriva o movimento inverso.
pub struct MoveEntity {
    entity_id: EntityId,
    from: Slot,
    to: Slot,
    description: String,
    timestamp: NaiveDateTime,
}

impl MoveEntity {
    pub fn new(entity: &Entity, from: Slot, to: Slot) -> Self {
        Self {
            entity_id: entity.id,
            from,
            to,
            description: format!("Move '{}' from {from} to {to}", entity.name),
            timestamp: now_timestamp(),
        }
    }

    fn expect_occupant(&self, ws: &Workspace, index: usize) -> Result<(), CommandError> {
        match ws.topology().occupant(index) {
            Some(id) if id == self.entity_id => Ok(()),
            _ => Err(CommandError::Failed(format!(
                "Entity {} is no longer in slot {index}",
                self.entity_id
            ))),
        }
    }

    fn expect_free(&self, ws: &Workspace, index: usize) -> Result<(), CommandError> {
        match ws.topology().occupant(index) {
            Some(occupant) if occupant != self.entity_id => {
                Err(TopologyError::SlotOccupied { index, occupant }.into())
            }
            _ => Ok(()),
        }
    }
}

impl Command<Workspace> for MoveEntity {
    fn description(&self) -> &str {
        &self.description
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn execute(&mut self, _ws: &mut Workspace) -> Result<(), CommandError> {
        Ok(())
    }

    fn undo(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        match (self.from, self.to) {
            // bandeja → slot: volta para a bandeja
            (Slot::Tray, Slot::Grid(to)) => {
                self.expect_occupant(ws, to)?;
                ws.remove_from_slot(to);
            }
            // slot → bandeja: volta para o slot de origem
            (Slot::Grid(from), Slot::Tray) => {
                self.expect_free(ws, from)?;
                ws.place_entity(self.entity_id, from)?;
            }
            // slot → slot: sai do destino, volta para a origem
            (Slot::Grid(from), Slot::Grid(to)) => {
                self.expect_occupant(ws, to)?;
                self.expect_free(ws, from)?;
                ws.remove_from_slot(to);
                ws.place_entity(self.entity_id, from)?;
            }
            (Slot::Tray, Slot::Tray) => {}
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Selecionar
// ──────────────────────────────────────────────

pub struct SelectEntity {
    previous: Option<EntityId>,
    next: Option<EntityId>,
    description: String,
    timestamp: NaiveDateTime,
}

impl SelectEntity {
    pub fn new(ws: &Workspace, previous: Option<EntityId>, next: Option<EntityId>) -> Self {
        let name = |id: Option<EntityId>| {
            id.and_then(|id| ws.registry().find_by_id(id))
                .map_or_else(|| "None".to_string(), |e| e.name.clone())
        };
        Self {
            description: format!("Select entity '{}' (was '{}')", name(next), name(previous)),
            previous,
            next,
            timestamp: now_timestamp(),
        }
    }
}

impl Command<Workspace> for SelectEntity {
    fn description(&self) -> &str {
        &self.description
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn execute(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        if let Some(id) = self.next {
            if !ws.registry().contains(id) {
                return Err(RegistryError::NotFound(id).into());
            }
        }
        ws.set_selection_silently(self.next);
        Ok(())
    }

    fn undo(&mut self, ws: &mut Workspace) -> Result<(), CommandError> {
        ws.set_selection_silently(self.previous);
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
