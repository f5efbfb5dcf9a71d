//! Definição de tipos/structs do domínio: entidades, medições, slots e conexões.
//!
//! Uma entidade é um medidor de consumo de energia. Seu valor atual é válido
//! dentro da faixa [`VALID_MIN`]..=[`VALID_MAX`] (kWh); fora dela fica em alerta.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identificador único de uma entidade no registro.
pub type EntityId = u32;

/// Limite inferior (inclusivo) da faixa válida, em kWh.
pub const VALID_MIN: f64 = 0.34;

/// Limite superior (inclusivo) da faixa válida, em kWh.
pub const VALID_MAX: f64 = 2.73;

/// Valor inicial de uma entidade recém-criada.
pub const DEFAULT_VALUE: f64 = 1.5;

/// Retorna `true` se o valor está dentro da faixa válida (inclusive).
pub fn is_valid_value(value: f64) -> bool {
    (VALID_MIN..=VALID_MAX).contains(&value)
}

// ──────────────────────────────────────────────
// Tipo de medidor
// ──────────────────────────────────────────────

/// Tipo do medidor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    IntervalMeter,
    SmartMeter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::IntervalMeter, EntityKind::SmartMeter];

    /// Nome de exibição do tipo.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::IntervalMeter => "Interval Meter",
            EntityKind::SmartMeter => "Smart Meter",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ──────────────────────────────────────────────
// Status
// ──────────────────────────────────────────────

/// Status derivado do valor atual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueStatus {
    Normal,
    Alert,
}

impl ValueStatus {
    pub fn from_value(value: f64) -> Self {
        if is_valid_value(value) {
            ValueStatus::Normal
        } else {
            ValueStatus::Alert
        }
    }

    /// Rótulo usado nas linhas do log de medições (`NORMAL` / `ALERT`).
    pub fn log_label(self) -> &'static str {
        match self {
            ValueStatus::Normal => "NORMAL",
            ValueStatus::Alert => "ALERT",
        }
    }

    /// Interpreta o rótulo do log. Qualquer coisa diferente de `NORMAL` é alerta.
    pub fn from_log_label(label: &str) -> Self {
        if label.trim() == "NORMAL" {
            ValueStatus::Normal
        } else {
            ValueStatus::Alert
        }
    }

    pub fn is_normal(self) -> bool {
        self == ValueStatus::Normal
    }
}

impl fmt::Display for ValueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueStatus::Normal => f.write_str("Normal"),
            ValueStatus::Alert => f.write_str("Alert"),
        }
    }
}

// ──────────────────────────────────────────────
// Entidade
// ──────────────────────────────────────────────

/// Medidor monitorado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    /// Último valor recebido (kWh)
    pub current_value: f64,
}

impl Entity {
    /// Cria uma entidade com o valor inicial padrão ([`DEFAULT_VALUE`]).
    pub fn new(id: EntityId, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            current_value: DEFAULT_VALUE,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.current_value = value;
        self
    }

    pub fn is_valid(&self) -> bool {
        is_valid_value(self.current_value)
    }

    pub fn status(&self) -> ValueStatus {
        ValueStatus::from_value(self.current_value)
    }
}

// ──────────────────────────────────────────────
// Medição
// ──────────────────────────────────────────────

/// Leitura imutável de uma entidade, como persistida no log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: NaiveDateTime,
    pub entity_id: EntityId,
    pub value: f64,
    pub is_valid: bool,
    pub status: ValueStatus,
}

impl Measurement {
    /// Cria a medição derivando validade e status do valor.
    pub fn new(timestamp: NaiveDateTime, entity_id: EntityId, value: f64) -> Self {
        let status = ValueStatus::from_value(value);
        Self {
            timestamp,
            entity_id,
            value,
            is_valid: status.is_normal(),
            status,
        }
    }
}

// ──────────────────────────────────────────────
// Slots
// ──────────────────────────────────────────────

/// Posição de uma entidade: a bandeja (não posicionada) ou um slot da grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Tray,
    Grid(usize),
}

impl Slot {
    pub fn grid_index(self) -> Option<usize> {
        match self {
            Slot::Tray => None,
            Slot::Grid(index) => Some(index),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Tray => f.write_str("tray"),
            Slot::Grid(index) => write!(f, "slot {index}"),
        }
    }
}

// ──────────────────────────────────────────────
// Conexão
// ──────────────────────────────────────────────

/// Aresta não-direcionada entre duas entidades posicionadas.
///
/// O par é normalizado (`a < b`), então `Connection::new(3, 1)` e
/// `Connection::new(1, 3)` representam a mesma aresta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub a: EntityId,
    pub b: EntityId,
    /// Ambas as pontas com valor válido
    pub is_valid: bool,
}

impl Connection {
    pub fn new(first: EntityId, second: EntityId, is_valid: bool) -> Self {
        let (a, b) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };
        Self { a, b, is_valid }
    }

    /// Chave não-direcionada do par.
    pub fn key(&self) -> (EntityId, EntityId) {
        (self.a, self.b)
    }

    pub fn touches(&self, id: EntityId) -> bool {
        self.a == id || self.b == id
    }

    /// A outra ponta, se `id` é uma das pontas.
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries_are_inclusive() {
        assert!(is_valid_value(0.34));
        assert!(is_valid_value(2.73));
        assert!(!is_valid_value(0.339_999_9));
        assert!(!is_valid_value(2.730_000_1));
    }

    #[test]
    fn entity_status_follows_value() {
        let entity = Entity::new(1, "Workshop Meter", EntityKind::IntervalMeter);
        assert_eq!(entity.current_value, DEFAULT_VALUE);
        assert_eq!(entity.status(), ValueStatus::Normal);

        let alert = entity.with_value(0.10);
        assert!(!alert.is_valid());
        assert_eq!(alert.status().to_string(), "Alert");
        assert_eq!(alert.status().log_label(), "ALERT");
    }

    #[test]
    fn connection_is_unordered() {
        let c1 = Connection::new(3, 1, true);
        let c2 = Connection::new(1, 3, true);
        assert_eq!(c1, c2);
        assert_eq!(c1.key(), (1, 3));
        assert_eq!(c1.other(3), Some(1));
        assert_eq!(c1.other(7), None);
    }

    #[test]
    fn log_label_parsing() {
        assert_eq!(ValueStatus::from_log_label("NORMAL"), ValueStatus::Normal);
        assert_eq!(ValueStatus::from_log_label("ALERT"), ValueStatus::Alert);
    }

    proptest! {
        #[test]
        fn validity_matches_range(value in -10.0_f64..10.0_f64) {
            let entity = Entity::new(0, "Probe", EntityKind::SmartMeter).with_value(value);
            prop_assert_eq!(entity.is_valid(), (0.34..=2.73).contains(&value));
            prop_assert_eq!(entity.status().is_normal(), entity.is_valid());
        }
    }
}
