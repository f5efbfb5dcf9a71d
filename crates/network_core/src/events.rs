//! Notificações para observadores (camada de UI ou logger do serviço).
//!
//! Cada assinante recebe seu próprio channel limitado. O envio é
//! não-bloqueante: se o assinante está lento, o evento é descartado para ele.
//! Observadores são responsáveis por levar o evento para a própria thread.

use crate::types::{Connection, Entity, EntityId};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Capacidade padrão do channel de cada assinante.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    MeasurementReceived { entity: Entity, value: f64 },
    AlertTriggered(String),
    ConnectionAdded(Connection),
    ConnectionRemoved(Connection),
    UndoStackChanged { depth: usize },
    EntityAdded(Entity),
    EntityRemoved(Entity),
    SelectionChanged(Option<EntityId>),
}

/// Fan-out de [`NetworkEvent`]. Clonar compartilha a mesma lista de assinantes.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<NetworkEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra um assinante com channel de `capacity` eventos.
    pub fn subscribe(&self, capacity: usize) -> Receiver<NetworkEvent> {
        let (tx, rx) = bounded(capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Publica para todos. Assinantes desconectados são removidos.
    pub fn publish(&self, event: NetworkEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Channel de eventos cheio, descartando {event:?}");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
