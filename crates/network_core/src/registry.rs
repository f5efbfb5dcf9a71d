//! Registro canônico das entidades monitoradas.
//!
//! Fonte única de identidade e valor atual. A ordem de inserção é preservada
//! (é a ordem exibida na lista de entidades), por isso o armazenamento é um
//! `Vec` e não um mapa.

use crate::types::{Entity, EntityId, EntityKind};
use std::collections::BTreeMap;

/// Comprimento mínimo do nome de uma entidade nova.
pub const MIN_NAME_LEN: usize = 3;

/// Erros do registro.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Entity with ID {0} not found")]
    NotFound(EntityId),

    #[error("ID {0} already exists")]
    DuplicateId(EntityId),

    #[error("Invalid name '{0}': must be at least {MIN_NAME_LEN} characters")]
    InvalidName(String),
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro com as entidades iniciais (ver [`seed_entities`]).
    pub fn seeded() -> Self {
        Self {
            entities: seed_entities(),
        }
    }

    /// Valida uma entidade candidata: ID único e nome com tamanho mínimo.
    pub fn validate_new(&self, entity: &Entity) -> Result<(), RegistryError> {
        if entity.name.trim().chars().count() < MIN_NAME_LEN {
            return Err(RegistryError::InvalidName(entity.name.clone()));
        }
        if self.contains(entity.id) {
            return Err(RegistryError::DuplicateId(entity.id));
        }
        Ok(())
    }

    /// Adiciona no final.
    pub fn add(&mut self, entity: Entity) -> Result<(), RegistryError> {
        self.validate_new(&entity)?;
        self.entities.push(entity);
        Ok(())
    }

    /// Insere em `index` se estiver no intervalo, senão no final.
    ///
    /// Retorna o índice efetivo.
    pub fn insert_at(&mut self, index: usize, entity: Entity) -> Result<usize, RegistryError> {
        self.validate_new(&entity)?;
        if index <= self.entities.len() {
            self.entities.insert(index, entity);
            Ok(index)
        } else {
            self.entities.push(entity);
            Ok(self.entities.len() - 1)
        }
    }

    /// Remove a entidade e retorna o índice que ela ocupava.
    pub fn remove(&mut self, id: EntityId) -> Option<(usize, Entity)> {
        let index = self.index_of(id)?;
        Some((index, self.entities.remove(index)))
    }

    pub fn find_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn index_of(&self, id: EntityId) -> Option<usize> {
        self.entities.iter().position(|e| e.id == id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index_of(id).is_some()
    }

    /// Atualiza o valor atual. Validade e status são derivados do valor,
    /// então a atualização é atômica por construção.
    pub fn set_value(&mut self, id: EntityId, value: f64) -> Result<&Entity, RegistryError> {
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RegistryError::NotFound(id))?;
        entity.current_value = value;
        Ok(entity)
    }

    /// Todas as entidades, na ordem do registro.
    pub fn all(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Aplica valores restaurados do log sem gerar novas medições.
    ///
    /// IDs desconhecidos são ignorados. Retorna quantas entidades mudaram.
    pub fn restore_values(&mut self, values: &BTreeMap<EntityId, f64>) -> usize {
        let mut restored = 0;
        for entity in &mut self.entities {
            if let Some(&value) = values.get(&entity.id) {
                entity.current_value = value;
                restored += 1;
            }
        }
        restored
    }

    pub fn filter(&self, filter: &EntityFilter) -> Vec<&Entity> {
        self.entities.iter().filter(|e| filter.matches(e)).collect()
    }
}

// ──────────────────────────────────────────────
// Filtro
// ──────────────────────────────────────────────

/// Comparação aplicada ao ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPredicate {
    LessThan(EntityId),
    GreaterThan(EntityId),
    Equal(EntityId),
}

impl IdPredicate {
    pub fn matches(self, id: EntityId) -> bool {
        match self {
            IdPredicate::LessThan(n) => id < n,
            IdPredicate::GreaterThan(n) => id > n,
            IdPredicate::Equal(n) => id == n,
        }
    }
}

/// Filtro da lista de entidades. Campos `None` não restringem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub id: Option<IdPredicate>,
}

impl EntityFilter {
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(kind) = self.kind {
            if entity.kind != kind {
                return false;
            }
        }
        self.id.is_none_or(|p| p.matches(entity.id))
    }
}

/// Entidades com que o serviço inicia.
pub fn seed_entities() -> Vec<Entity> {
    vec![
        Entity::new(0, "Main Building Meter", EntityKind::SmartMeter).with_value(1.2),
        Entity::new(1, "Workshop Meter", EntityKind::IntervalMeter).with_value(2.1),
        Entity::new(2, "Office Complex", EntityKind::SmartMeter).with_value(0.2),
        Entity::new(3, "Factory Line A", EntityKind::IntervalMeter).with_value(1.8),
        Entity::new(4, "Warehouse East", EntityKind::SmartMeter).with_value(3.1),
        Entity::new(5, "Server Room", EntityKind::IntervalMeter).with_value(0.9),
    ]
}
