//! # Network Core
//!
//! Crate compartilhada com o núcleo do serviço de rede de medidores de
//! energia: registro de entidades, log de medições, topologia da grade,
//! motor de undo e o protocolo de texto do serviço de ingestão.
//!
//! ## Módulos
//! - [`types`] – Entidades, medições, slots e conexões
//! - [`registry`] – Registro de entidades e filtros
//! - [`measurement_log`] – Log append-only e consultas "últimas N"
//! - [`topology`] – Grade de slots e malha de conexões
//! - [`undo`] – Motor de undo genérico
//! - [`commands`] – Comandos reversíveis das ações do usuário
//! - [`workspace`] – Estado mutável sobre o qual os comandos operam
//! - [`session`] – Workspace + histórico + log
//! - [`owner`] – Thread dona da sessão
//! - [`events`] – Notificações para observadores
//! - [`alerts`] – Avaliação da faixa válida
//! - [`protocol`] – Framing e decodificação das mensagens TCP
//! - [`client`] – Cliente bloqueante
//! - [`config`] – Configuração unificada via TOML

pub mod alerts;
pub mod client;
pub mod commands;
pub mod config;
pub mod events;
pub mod measurement_log;
pub mod owner;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod topology;
pub mod types;
pub mod undo;
pub mod workspace;

// Re-exports convenientes
pub use config::{AppConfig, ConfigError, ServerConfig, SimulatorConfig};
pub use events::{EventBus, NetworkEvent};
pub use measurement_log::MeasurementLog;
pub use owner::{OwnerError, OwnerHandle, spawn_owner};
pub use protocol::{ProtocolError, Request, decode_request};
pub use registry::{EntityRegistry, RegistryError};
pub use session::Session;
pub use topology::TopologyManager;
pub use types::{Entity, EntityId, EntityKind, Measurement, Slot};
pub use undo::UndoEngine;
pub use workspace::Workspace;
