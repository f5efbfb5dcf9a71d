//! Posicionamento das entidades na grade e grafo de conexões derivado.
//!
//! Toda entidade posicionada se conecta a todas as outras posicionadas
//! (malha simples). Qualquer mudança de posicionamento reconstrói o grafo
//! inteiro em O(k²); com poucas entidades isso é mais simples do que
//! manter o grafo incrementalmente.
//!
//! O gerenciador guarda apenas IDs. Validade das conexões é lida do
//! [`EntityRegistry`] passado em cada operação.

use crate::registry::EntityRegistry;
use crate::types::{Connection, Entity, EntityId, EntityKind, Slot};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Erros de posicionamento.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Slot {index} is outside the grid ({count} slots)")]
    SlotOutOfRange { index: usize, count: usize },

    #[error("Slot {index} is already occupied by entity {occupant}")]
    SlotOccupied { index: usize, occupant: EntityId },

    #[error("Entity with ID {0} not found")]
    UnknownEntity(EntityId),
}

/// Diferença no conjunto de conexões produzida por uma operação.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyChange {
    pub added: Vec<Connection>,
    pub removed: Vec<Connection>,
}

impl TopologyChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    fn merge(&mut self, other: TopologyChange) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

/// Resumo da rede posicionada.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStatistics {
    pub entities: usize,
    pub connections: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl fmt::Display for NetworkStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entities: {}, Connections: {}, Valid: {}, Invalid: {}",
            self.entities, self.connections, self.valid, self.invalid
        )
    }
}

#[derive(Debug, Clone)]
pub struct TopologyManager {
    slots: Vec<Option<EntityId>>,
    connections: Vec<Connection>,
}

impl TopologyManager {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
            connections: Vec::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn occupant(&self, index: usize) -> Option<EntityId> {
        self.slots.get(index).copied().flatten()
    }

    /// Onde a entidade está; [`Slot::Tray`] se não estiver na grade.
    pub fn slot_of(&self, id: EntityId) -> Slot {
        self.slots
            .iter()
            .position(|s| *s == Some(id))
            .map_or(Slot::Tray, Slot::Grid)
    }

    pub fn is_placed(&self, id: EntityId) -> bool {
        self.slot_of(id) != Slot::Tray
    }

    /// Pares (slot, entidade) em ordem de slot.
    pub fn placed(&self) -> Vec<(usize, EntityId)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, s)| s.map(|id| (index, id)))
            .collect()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Posiciona a entidade em um slot vazio.
    ///
    /// Se a entidade já está em outro slot, ela sai de lá primeiro. Retorna
    /// a posição anterior e a diferença de conexões.
    pub fn place(
        &mut self,
        id: EntityId,
        index: usize,
        registry: &EntityRegistry,
    ) -> Result<(Slot, TopologyChange), TopologyError> {
        self.check_index(index)?;
        if !registry.contains(id) {
            return Err(TopologyError::UnknownEntity(id));
        }
        match self.slots[index] {
            Some(occupant) if occupant == id => {
                return Ok((Slot::Grid(index), TopologyChange::default()));
            }
            Some(occupant) => return Err(TopologyError::SlotOccupied { index, occupant }),
            None => {}
        }

        let previous = self.slot_of(id);
        if let Slot::Grid(old) = previous {
            self.slots[old] = None;
        }
        self.slots[index] = Some(id);

        Ok((previous, self.rebuild(registry)))
    }

    /// Esvazia o slot. A entidade removida volta para a bandeja.
    pub fn remove(
        &mut self,
        index: usize,
        registry: &EntityRegistry,
    ) -> (Option<EntityId>, TopologyChange) {
        let Some(id) = self.occupant(index) else {
            return (None, TopologyChange::default());
        };
        self.slots[index] = None;

        let mut change = TopologyChange {
            added: Vec::new(),
            removed: self.drop_connections_of(id),
        };
        change.merge(self.rebuild(registry));
        (Some(id), change)
    }

    /// Tira a entidade da grade, onde quer que esteja.
    pub fn vacate_entity(
        &mut self,
        id: EntityId,
        registry: &EntityRegistry,
    ) -> (Option<usize>, TopologyChange) {
        match self.slot_of(id) {
            Slot::Grid(index) => {
                let (_, change) = self.remove(index, registry);
                (Some(index), change)
            }
            Slot::Tray => (None, TopologyChange::default()),
        }
    }

    /// Devolve todas as entidades para a bandeja.
    pub fn clear(&mut self) -> (Vec<EntityId>, TopologyChange) {
        let returned = self.placed().into_iter().map(|(_, id)| id).collect();
        self.slots.iter_mut().for_each(|s| *s = None);
        let change = TopologyChange {
            added: Vec::new(),
            removed: std::mem::take(&mut self.connections),
        };
        (returned, change)
    }

    /// Insere uma conexão entre `a` e `b`.
    ///
    /// Rejeita laços, pares já conectados (em qualquer ordem), entidades
    /// fora do registro e entidades que não estão na grade.
    pub fn create_connection(
        &mut self,
        a: EntityId,
        b: EntityId,
        registry: &EntityRegistry,
    ) -> bool {
        if a == b || self.connection_exists(a, b) {
            return false;
        }
        if !self.is_placed(a) || !self.is_placed(b) {
            return false;
        }
        let (Some(first), Some(second)) = (registry.find_by_id(a), registry.find_by_id(b)) else {
            return false;
        };
        self.connections
            .push(Connection::new(a, b, first.is_valid() && second.is_valid()));
        true
    }

    /// Conecta todos os pares de entidades posicionadas.
    pub fn create_automatic_connections(&mut self, registry: &EntityRegistry) {
        let placed: Vec<EntityId> = self.placed().into_iter().map(|(_, id)| id).collect();
        for (i, &from) in placed.iter().enumerate() {
            for &to in &placed[i + 1..] {
                self.create_connection(from, to, registry);
            }
        }
    }

    /// Recalcula `is_valid` de cada conexão a partir do estado atual.
    ///
    /// Retorna as conexões cuja validade mudou.
    pub fn refresh_validity(&mut self, registry: &EntityRegistry) -> Vec<Connection> {
        let mut changed = Vec::new();
        for connection in &mut self.connections {
            let valid = [connection.a, connection.b]
                .iter()
                .all(|&id| registry.find_by_id(id).is_some_and(Entity::is_valid));
            if valid != connection.is_valid {
                connection.is_valid = valid;
                changed.push(*connection);
            }
        }
        changed
    }

    /// IDs vizinhos (a uma aresta de distância).
    pub fn neighbors(&self, id: EntityId) -> BTreeSet<EntityId> {
        self.connections.iter().filter_map(|c| c.other(id)).collect()
    }

    pub fn connected_entities<'r>(
        &self,
        id: EntityId,
        registry: &'r EntityRegistry,
    ) -> Vec<&'r Entity> {
        self.neighbors(id)
            .into_iter()
            .filter_map(|n| registry.find_by_id(n))
            .collect()
    }

    pub fn connection_count_for(&self, id: EntityId) -> usize {
        self.connections.iter().filter(|c| c.touches(id)).count()
    }

    /// Entidades fora da grade, na ordem do registro.
    pub fn tray<'r>(&self, registry: &'r EntityRegistry) -> Vec<&'r Entity> {
        registry
            .all()
            .iter()
            .filter(|e| !self.is_placed(e.id))
            .collect()
    }

    /// Bandeja agrupada por tipo de medidor.
    pub fn tray_by_kind<'r>(
        &self,
        registry: &'r EntityRegistry,
    ) -> BTreeMap<EntityKind, Vec<&'r Entity>> {
        let mut groups: BTreeMap<EntityKind, Vec<&'r Entity>> = BTreeMap::new();
        for entity in self.tray(registry) {
            groups.entry(entity.kind).or_default().push(entity);
        }
        groups
    }

    pub fn statistics(&self, registry: &EntityRegistry) -> NetworkStatistics {
        let placed = self.placed();
        let valid = placed
            .iter()
            .filter(|(_, id)| registry.find_by_id(*id).is_some_and(Entity::is_valid))
            .count();
        NetworkStatistics {
            entities: placed.len(),
            connections: self.connections.len(),
            valid,
            invalid: placed.len() - valid,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), TopologyError> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(TopologyError::SlotOutOfRange {
                index,
                count: self.slots.len(),
            })
        }
    }

    fn connection_exists(&self, a: EntityId, b: EntityId) -> bool {
        let key = Connection::new(a, b, false).key();
        self.connections.iter().any(|c| c.key() == key)
    }

    fn drop_connections_of(&mut self, id: EntityId) -> Vec<Connection> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.connections.drain(..).partition(|c| c.touches(id));
        self.connections = kept;
        removed
    }

    /// Descarta o grafo e o reconstrói a partir do posicionamento atual.
    fn rebuild(&mut self, registry: &EntityRegistry) -> TopologyChange {
        let before = std::mem::take(&mut self.connections);
        self.create_automatic_connections(registry);

        let before_keys: HashSet<_> = before.iter().map(Connection::key).collect();
        let after_keys: HashSet<_> = self.connections.iter().map(Connection::key).collect();

        TopologyChange {
            added: self
                .connections
                .iter()
                .filter(|c| !before_keys.contains(&c.key()))
                .copied()
                .collect(),
            removed: before
                .into_iter()
                .filter(|c| !after_keys.contains(&c.key()))
                .collect(),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(topology: &TopologyManager) -> BTreeSet<(EntityId, EntityId)> {
        topology.connections().iter().map(Connection::key).collect()
    }

    #[test]
    fn placing_builds_full_mesh() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(12);

        topology.place(0, 0, &registry).unwrap();
        assert!(topology.connections().is_empty());

        let (previous, change) = topology.place(1, 5, &registry).unwrap();
        assert_eq!(previous, Slot::Tray);
        assert_eq!(change.added, vec![Connection::new(0, 1, true)]);

        topology.place(3, 7, &registry).unwrap();
        assert_eq!(keys(&topology), BTreeSet::from([(0, 1), (0, 3), (1, 3)]));
    }

    #[test]
    fn occupied_slot_is_rejected() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(4);
        topology.place(0, 1, &registry).unwrap();

        let err = topology.place(2, 1, &registry).unwrap_err();
        assert_eq!(err, TopologyError::SlotOccupied { index: 1, occupant: 0 });
        assert_eq!(err.to_string(), "Slot 1 is already occupied by entity 0");
        assert_eq!(
            crate::undo::CommandError::from(err).to_string(),
            "Slot 1 is already occupied by entity 0"
        );
        assert!(matches!(
            topology.place(2, 9, &registry),
            Err(TopologyError::SlotOutOfRange { index: 9, count: 4 })
        ));
        assert_eq!(
            topology.place(77, 2, &registry).unwrap_err(),
            TopologyError::UnknownEntity(77)
        );
    }

    #[test]
    fn moving_between_slots_vacates_source() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(4);
        topology.place(0, 0, &registry).unwrap();
        topology.place(1, 1, &registry).unwrap();

        let (previous, change) = topology.place(0, 3, &registry).unwrap();
        assert_eq!(previous, Slot::Grid(0));
        assert!(change.is_empty());
        assert_eq!(topology.occupant(0), None);
        assert_eq!(topology.slot_of(0), Slot::Grid(3));
        assert_eq!(keys(&topology), BTreeSet::from([(0, 1)]));
    }

    #[test]
    fn remove_cascades_connections() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(6);
        for (slot, id) in [(0, 0), (1, 1), (2, 2)] {
            topology.place(id, slot, &registry).unwrap();
        }

        let (removed, change) = topology.remove(1, &registry);
        assert_eq!(removed, Some(1));
        assert_eq!(change.removed.len(), 2);
        assert!(change.added.is_empty());
        assert!(topology.connections().iter().all(|c| !c.touches(1)));
        assert_eq!(keys(&topology), BTreeSet::from([(0, 2)]));

        assert_eq!(topology.remove(1, &registry).0, None);
    }

    #[test]
    fn create_connection_rejects_loops_and_duplicates() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(4);
        // posiciona sem reconstruir a malha
        topology.slots[0] = Some(1);
        topology.slots[1] = Some(2);

        assert!(!topology.create_connection(1, 1, &registry));
        assert!(topology.create_connection(1, 2, &registry));
        assert!(!topology.create_connection(2, 1, &registry));
        assert!(!topology.create_connection(1, 99, &registry));
        assert_eq!(topology.connections().len(), 1);
    }

    #[test]
    fn create_connection_requires_both_ends_on_grid() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(4);

        assert!(!topology.create_connection(1, 2, &registry));
        assert!(topology.connections().is_empty());

        topology.slots[0] = Some(1);
        assert!(!topology.create_connection(1, 2, &registry));
        assert!(!topology.create_connection(2, 1, &registry));
        assert!(topology.connections().is_empty());
        assert!(topology.placed().iter().all(|&(_, id)| id != 2));
    }

    #[test]
    fn validity_follows_registry() {
        let mut registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(4);
        topology.place(0, 0, &registry).unwrap();
        topology.place(1, 1, &registry).unwrap();
        assert!(topology.connections()[0].is_valid);

        registry.set_value(1, 5.0).unwrap();
        let changed = topology.refresh_validity(&registry);
        assert_eq!(changed.len(), 1);
        assert!(!topology.connections()[0].is_valid);

        assert!(topology.refresh_validity(&registry).is_empty());
    }

    #[test]
    fn neighbors_and_statistics() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(12);
        for (slot, id) in [(0, 0), (1, 2), (2, 4), (3, 5)] {
            topology.place(id, slot, &registry).unwrap();
        }

        assert_eq!(topology.neighbors(2), BTreeSet::from([0, 4, 5]));
        let names: Vec<_> = topology
            .connected_entities(0, &registry)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Office Complex", "Warehouse East", "Server Room"]);

        let stats = topology.statistics(&registry);
        assert_eq!(stats.to_string(), "Entities: 4, Connections: 6, Valid: 2, Invalid: 2");

        let tray = topology.tray_by_kind(&registry);
        assert_eq!(tray[&EntityKind::IntervalMeter].len(), 2);
        assert!(!tray.contains_key(&EntityKind::SmartMeter));
    }

    #[test]
    fn clear_returns_everything_to_tray() {
        let registry = EntityRegistry::seeded();
        let mut topology = TopologyManager::new(12);
        topology.place(0, 0, &registry).unwrap();
        topology.place(1, 1, &registry).unwrap();

        let (returned, change) = topology.clear();
        assert_eq!(returned, vec![0, 1]);
        assert_eq!(change.removed.len(), 1);
        assert!(topology.placed().is_empty());
        assert!(topology.connections().is_empty());
        assert_eq!(topology.tray(&registry).len(), 6);
    }

    proptest! {
        #[test]
        fn mesh_size_is_k_choose_two(slots in prop::collection::btree_set(0usize..12, 0..=6)) {
            let registry = EntityRegistry::seeded();
            let mut topology = TopologyManager::new(12);
            for (id, slot) in slots.iter().enumerate() {
                topology.place(id as EntityId, *slot, &registry).unwrap();
            }

            let k = slots.len();
            prop_assert_eq!(topology.connections().len(), k * k.saturating_sub(1) / 2);
            prop_assert!(topology.connections().iter().all(|c| c.a != c.b));
            prop_assert_eq!(keys(&topology).len(), topology.connections().len());
        }
    }
}
