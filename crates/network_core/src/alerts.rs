//! Sistema de alertas – avaliação do valor de uma entidade contra a faixa válida.

use crate::types::{Entity, EntityId, VALID_MAX, VALID_MIN, ValueStatus};

/// Um alerta disparado por uma leitura fora da faixa.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub entity_id: EntityId,
    pub entity_name: String,
    pub value: f64,
    pub message: String,
}

/// Avalia a entidade e retorna um alerta se o valor atual for inválido.
pub fn evaluate_alert(entity: &Entity) -> Option<Alert> {
    if entity.status() == ValueStatus::Normal {
        return None;
    }

    Some(Alert {
        entity_id: entity.id,
        entity_name: entity.name.clone(),
        value: entity.current_value,
        message: alert_message(entity),
    })
}

/// Texto do alerta, no formato exibido ao operador.
pub fn alert_message(entity: &Entity) -> String {
    format!(
        "ALERT: Entity '{}' (ID: {}) has invalid value: {:.2} kWh (valid range: {VALID_MIN}-{VALID_MAX})",
        entity.name, entity.id, entity.current_value
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;

    #[test]
    fn no_alert_for_normal_value() {
        let entity = Entity::new(0, "Main Building Meter", EntityKind::SmartMeter).with_value(1.2);
        assert!(evaluate_alert(&entity).is_none());
    }

    #[test]
    fn low_value_triggers_alert() {
        let entity = Entity::new(2, "Office Complex", EntityKind::SmartMeter).with_value(0.1);
        let alert = evaluate_alert(&entity).unwrap();
        assert_eq!(alert.entity_id, 2);
        assert_eq!(
            alert.message,
            "ALERT: Entity 'Office Complex' (ID: 2) has invalid value: 0.10 kWh (valid range: 0.34-2.73)"
        );
    }

    #[test]
    fn boundary_values_do_not_alert() {
        let low = Entity::new(1, "Low", EntityKind::IntervalMeter).with_value(0.34);
        let high = Entity::new(1, "High", EntityKind::IntervalMeter).with_value(2.73);
        assert!(evaluate_alert(&low).is_none());
        assert!(evaluate_alert(&high).is_none());
    }
}
