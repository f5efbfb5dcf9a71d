//! Motor de undo com histórico LIFO limitado.
//!
//! Genérico sobre o contexto `Ctx` que os comandos mutam. O motor não conhece
//! o domínio: só executa, empilha, desfaz e descarta os mais antigos quando
//! passa do limite.

use crate::registry::RegistryError;
use crate::topology::TopologyError;
use chrono::NaiveDateTime;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Tamanho máximo padrão do histórico.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Texto de [`UndoEngine::last_description`] com histórico vazio.
pub const NOTHING_TO_UNDO: &str = "No actions to undo";

/// Falha ao executar ou desfazer um comando.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("{0}")]
    Failed(String),
}

/// Unidade reversível de mutação.
pub trait Command<Ctx>: Send {
    fn description(&self) -> &str;

    fn timestamp(&self) -> NaiveDateTime;

    fn execute(&mut self, ctx: &mut Ctx) -> Result<(), CommandError>;

    fn undo(&mut self, ctx: &mut Ctx) -> Result<(), CommandError>;
}

pub struct UndoEngine<Ctx> {
    history: VecDeque<Box<dyn Command<Ctx>>>,
    max_history: usize,
}

impl<Ctx> UndoEngine<Ctx> {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history.min(1024)),
            max_history,
        }
    }

    /// Executa o comando e, se der certo, empilha.
    ///
    /// Um comando que falha não entra no histórico e o erro volta ao chamador.
    pub fn execute(
        &mut self,
        mut command: Box<dyn Command<Ctx>>,
        ctx: &mut Ctx,
    ) -> Result<(), CommandError> {
        if let Err(e) = command.execute(ctx) {
            warn!("Erro ao executar '{}': {e}", command.description());
            return Err(e);
        }

        info!(
            "Executado: {} às {}",
            command.description(),
            command.timestamp().format("%H:%M:%S")
        );
        self.history.push_back(command);
        self.enforce_limit();
        Ok(())
    }

    /// Desfaz o comando do topo.
    ///
    /// `Ok(false)` quando não há nada para desfazer. Se o undo falhar, o
    /// comando volta para o topo para permitir nova tentativa.
    pub fn undo(&mut self, ctx: &mut Ctx) -> Result<bool, CommandError> {
        let Some(mut command) = self.history.pop_back() else {
            info!("Nada para desfazer");
            return Ok(false);
        };

        match command.undo(ctx) {
            Ok(()) => {
                info!(
                    "Desfeito: {} (executado às {})",
                    command.description(),
                    command.timestamp().format("%H:%M:%S")
                );
                Ok(true)
            }
            Err(e) => {
                warn!("Erro ao desfazer '{}': {e}", command.description());
                self.history.push_back(command);
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Descrição do comando no topo.
    pub fn last_description(&self) -> &str {
        self.history
            .back()
            .map_or(NOTHING_TO_UNDO, |c| c.description())
    }

    /// Histórico em ordem cronológica, `HH:MM:SS - descrição`.
    pub fn history(&self) -> Vec<String> {
        self.history
            .iter()
            .map(|c| format!("{} - {}", c.timestamp().format("%H:%M:%S"), c.description()))
            .collect()
    }

    /// Esvazia o histórico e retorna quantos comandos foram descartados.
    pub fn clear(&mut self) -> usize {
        let count = self.history.len();
        self.history.clear();
        info!("Histórico de undo limpo ({count} comandos removidos)");
        count
    }

    fn enforce_limit(&mut self) {
        let excess = self.history.len().saturating_sub(self.max_history);
        if excess > 0 {
            self.history.drain(..excess);
            debug!("Histórico de undo reduzido para {} itens", self.max_history);
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
