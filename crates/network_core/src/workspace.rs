//! Estado mutável compartilhado: registro, grade e seleção.
//!
//! É o contexto sobre o qual os comandos de undo operam. Toda mutação que
//! afeta observadores publica o evento correspondente no [`EventBus`].
//! Nenhum método aqui grava histórico de undo.

use crate::events::{EventBus, NetworkEvent};
use crate::registry::{EntityRegistry, RegistryError};
use crate::topology::{NetworkStatistics, TopologyChange, TopologyError, TopologyManager};
use crate::types::{Entity, EntityId, Slot};
use std::collections::BTreeMap;

/// O que foi desfeito ao remover uma entidade, para permitir a restauração.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedEntity {
    pub index: usize,
    pub entity: Entity,
    pub slot: Option<usize>,
    pub was_selected: bool,
}

pub struct Workspace {
    registry: EntityRegistry,
    topology: TopologyManager,
    selection: Option<EntityId>,
    events: EventBus,
}

impl Workspace {
    pub fn new(registry: EntityRegistry, topology: TopologyManager, events: EventBus) -> Self {
        Self {
            registry,
            topology,
            selection: None,
            events,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }

    pub fn selection(&self) -> Option<EntityId> {
        self.selection
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn add_entity(&mut self, entity: Entity) -> Result<(), RegistryError> {
        self.registry.add(entity.clone())?;
        self.events.publish(NetworkEvent::EntityAdded(entity));
        Ok(())
    }

    /// Reinsere na posição original (ou no final, se fora do intervalo).
    pub fn insert_entity_at(&mut self, index: usize, entity: Entity) -> Result<usize, RegistryError> {
        let index = self.registry.insert_at(index, entity.clone())?;
        self.events.publish(NetworkEvent::EntityAdded(entity));
        Ok(index)
    }

    /// Remove do registro. Se a entidade estava na grade, o slot é liberado
    /// antes, então nenhuma conexão fica pendurada.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<RemovedEntity> {
        if !self.registry.contains(id) {
            return None;
        }

        let (slot, change) = self.topology.vacate_entity(id, &self.registry);
        self.publish_change(change);

        let (index, entity) = self.registry.remove(id)?;
        let was_selected = self.selection == Some(id);
        if was_selected {
            self.set_selection_silently(None);
        }
        self.events.publish(NetworkEvent::EntityRemoved(entity.clone()));

        Some(RemovedEntity {
            index,
            entity,
            slot,
            was_selected,
        })
    }

    /// Posiciona a entidade no slot. Retorna a posição anterior.
    pub fn place_entity(&mut self, id: EntityId, index: usize) -> Result<Slot, TopologyError> {
        let (previous, change) = self.topology.place(id, index, &self.registry)?;
        self.publish_change(change);
        Ok(previous)
    }

    /// Esvazia o slot; a entidade volta para a bandeja.
    pub fn remove_from_slot(&mut self, index: usize) -> Option<EntityId> {
        let (removed, change) = self.topology.remove(index, &self.registry);
        self.publish_change(change);
        removed
    }

    /// Devolve todas as entidades posicionadas para a bandeja.
    pub fn clear_grid(&mut self) -> Vec<EntityId> {
        let (returned, change) = self.topology.clear();
        self.publish_change(change);
        returned
    }

    /// Atualiza o valor e recalcula a validade das conexões.
    pub fn set_value(&mut self, id: EntityId, value: f64) -> Result<Entity, RegistryError> {
        let entity = self.registry.set_value(id, value)?.clone();
        self.topology.refresh_validity(&self.registry);
        Ok(entity)
    }

    /// Aplica valores restaurados do log de medições.
    pub fn restore_values(&mut self, values: &BTreeMap<EntityId, f64>) -> usize {
        let restored = self.registry.restore_values(values);
        self.topology.refresh_validity(&self.registry);
        restored
    }

    /// Troca a seleção sem passar pelo histórico de undo.
    pub fn set_selection_silently(&mut self, selection: Option<EntityId>) {
        if self.selection != selection {
            self.selection = selection;
            self.events.publish(NetworkEvent::SelectionChanged(selection));
        }
    }

    pub fn statistics(&self) -> NetworkStatistics {
        self.topology.statistics(&self.registry)
    }

    pub fn connected_entities(&self, id: EntityId) -> Vec<&Entity> {
        self.topology.connected_entities(id, &self.registry)
    }

    fn publish_change(&self, change: TopologyChange) {
        for connection in change.removed {
            self.events.publish(NetworkEvent::ConnectionRemoved(connection));
        }
        for connection in change.added {
            self.events.publish(NetworkEvent::ConnectionAdded(connection));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Connection;

    fn workspace() -> (Workspace, crossbeam_channel::Receiver<NetworkEvent>) {
        let events = EventBus::new();
        let rx = events.subscribe(64);
        let ws = Workspace::new(EntityRegistry::seeded(), TopologyManager::new(12), events);
        (ws, rx)
    }

    #[test]
    fn placement_publishes_connection_events() {
        let (mut ws, rx) = workspace();
        ws.place_entity(0, 0).unwrap();
        ws.place_entity(1, 1).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![NetworkEvent::ConnectionAdded(Connection::new(0, 1, true))]
        );
    }

    #[test]
    fn removing_placed_entity_leaves_no_dangling_connection() {
        let (mut ws, rx) = workspace();
        ws.place_entity(0, 0).unwrap();
        ws.place_entity(1, 1).unwrap();
        ws.place_entity(3, 2).unwrap();
        ws.set_selection_silently(Some(1));
        rx.try_iter().for_each(drop);

        let removed = ws.remove_entity(1).unwrap();
        assert_eq!(removed.index, 1);
        assert_eq!(removed.slot, Some(1));
        assert!(removed.was_selected);
        assert_eq!(ws.selection(), None);
        assert!(ws.topology().connections().iter().all(|c| !c.touches(1)));
        assert_eq!(ws.topology().connections().len(), 1);

        let removed_events = rx
            .try_iter()
            .filter(|e| matches!(e, NetworkEvent::ConnectionRemoved(_)))
            .count();
        assert_eq!(removed_events, 2);
    }

    #[test]
    fn set_value_refreshes_connection_validity() {
        let (mut ws, _rx) = workspace();
        ws.place_entity(0, 0).unwrap();
        ws.place_entity(1, 1).unwrap();

        let entity = ws.set_value(1, 0.1).unwrap();
        assert!(!entity.is_valid());
        assert!(!ws.topology().connections()[0].is_valid);
    }
}
