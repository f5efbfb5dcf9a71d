//! Thread dona da sessão.
//!
//! A [`Session`] fica dentro de uma única thread; quem precisa ler ou mudar
//! o estado envia um job pelo canal e espera a resposta. Assim as conexões
//! TCP e a interface nunca tocam no estado diretamente.

use crate::session::Session;
use crossbeam_channel::{Sender, bounded, unbounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

type Job = Box<dyn FnOnce(&mut Session) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OwnerError {
    #[error("thread dona da sessão encerrada")]
    Stopped,

    #[error("job terminou sem resposta")]
    NoReply,
}

/// Acesso à sessão a partir de qualquer thread.
#[derive(Clone)]
pub struct OwnerHandle {
    tx: Sender<Job>,
}

impl OwnerHandle {
    /// Roda `f` na thread dona e devolve o resultado.
    pub fn call<R, F>(&self, f: F) -> Result<R, OwnerError>
    where
        F: FnOnce(&mut Session) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        let job: Job = Box::new(move |session| {
            let _ = reply_tx.send(f(session));
        });
        self.tx.send(job).map_err(|_| OwnerError::Stopped)?;
        reply_rx.recv().map_err(|_| OwnerError::NoReply)
    }
}

/// Inicia a thread dona. Ela termina quando todos os handles são descartados
/// e devolve a sessão no `join`.
pub fn spawn_owner(session: Session) -> std::io::Result<(OwnerHandle, JoinHandle<Session>)> {
    let (tx, rx) = unbounded::<Job>();

    let handle = thread::Builder::new()
        .name("network-owner".into())
        .spawn(move || {
            let mut session = session;
            info!("Thread dona da sessão iniciada");
            for job in rx {
                if catch_unwind(AssertUnwindSafe(|| job(&mut session))).is_err() {
                    error!("Job da sessão entrou em pânico; estado mantido");
                }
            }
            info!("Thread dona da sessão encerrada");
            session
        })?;

    Ok((OwnerHandle { tx }, handle))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::measurement_log::MeasurementLog;
    use crate::registry::EntityRegistry;
    use crate::topology::TopologyManager;
    use crate::undo::DEFAULT_MAX_HISTORY;
    use crate::workspace::Workspace;
    use std::sync::Arc;

    fn session(dir: &tempfile::TempDir) -> Session {
        let log = Arc::new(MeasurementLog::open(dir.path().join("measurements.txt")));
        let ws = Workspace::new(EntityRegistry::seeded(), TopologyManager::new(12), EventBus::new());
        Session::new(ws, DEFAULT_MAX_HISTORY, log, 5)
    }

    #[test]
    fn calls_run_on_owner_thread() {
        let dir = tempfile::tempdir().unwrap();
        let (owner, join) = spawn_owner(session(&dir)).unwrap();

        let name = owner
            .call(|_| thread::current().name().map(str::to_owned))
            .unwrap();
        assert_eq!(name.as_deref(), Some("network-owner"));
        assert_eq!(owner.call(|s| s.entity_count()).unwrap(), 6);

        drop(owner);
        let session = join.join().unwrap();
        assert_eq!(session.entity_count(), 6);
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let (owner, join) = spawn_owner(session(&dir)).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let owner = owner.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        let value = 0.5 + f64::from(i) * 0.1;
                        owner.call(move |s| s.apply_measurement(0, value)).unwrap().unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let entries = owner.call(|s| s.last_measurements(0, 1000)).unwrap();
        assert_eq!(entries.len(), 80);

        drop(owner);
        join.join().unwrap();
    }

    #[test]
    fn panicking_job_does_not_kill_owner() {
        let dir = tempfile::tempdir().unwrap();
        let (owner, join) = spawn_owner(session(&dir)).unwrap();

        let result: Result<(), _> = owner.call(|_| panic!("boom"));
        assert_eq!(result, Err(OwnerError::NoReply));
        assert_eq!(owner.call(|s| s.entity_count()).unwrap(), 6);

        drop(owner);
        join.join().unwrap();
    }
}
