//! Servidor TCP de ingestão de telemetria.
//!
//! Uma thread aceita conexões e as repassa por channel para um pool fixo de
//! workers. Cada conexão carrega uma única requisição: o worker lê um frame,
//! despacha para a thread dona da sessão e fecha o socket.

use crossbeam_channel::{Receiver, bounded};
use network_core::config::ServerConfig;
use network_core::measurement_log::MeasurementLog;
use network_core::owner::OwnerHandle;
use network_core::protocol::{FrameError, Request, decode_request, read_frame};
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Conexões aceitas aguardando worker, por worker.
const QUEUE_PER_WORKER: usize = 16;

/// Falha ao abrir o listener. Fatal na inicialização.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Falha ao fazer bind em {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Tudo que um worker precisa para atender uma conexão.
#[derive(Clone)]
struct Dispatcher {
    owner: OwnerHandle,
    log: Arc<MeasurementLog>,
    timeout: Duration,
    max_frame_bytes: usize,
}

pub struct IngestServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    workers: usize,
    dispatcher: Dispatcher,
}

impl IngestServer {
    pub fn bind(
        config: &ServerConfig,
        owner: OwnerHandle,
        log: Arc<MeasurementLog>,
    ) -> Result<Self, BindError> {
        let addr = config.bind_addr();
        let bind_err = |source: io::Error| BindError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        Ok(Self {
            listener,
            local_addr,
            workers: config.workers.max(1),
            dispatcher: Dispatcher {
                owner,
                log,
                timeout: config.read_timeout(),
                max_frame_bytes: config.max_frame_bytes,
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Inicia a thread de accept e o pool de workers.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let (tx, rx) = bounded::<TcpStream>(self.workers * QUEUE_PER_WORKER);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(self.workers);
        for n in 0..self.workers {
            let rx: Receiver<TcpStream> = rx.clone();
            let dispatcher = self.dispatcher.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("ingest-worker-{n}"))
                    .spawn(move || {
                        for stream in rx {
                            dispatcher.handle_connection(stream);
                        }
                    })?,
            );
        }

        let listener = self.listener;
        let flag = Arc::clone(&shutdown);
        let accept = thread::Builder::new()
            .name("tcp-accept".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    match stream {
                        Ok(stream) => {
                            if tx.send(stream).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Erro ao aceitar conexão: {e}"),
                    }
                }
                debug!("Thread de accept encerrada");
            })?;

        info!(
            "Servidor de ingestão escutando em {} ({} workers)",
            self.local_addr, self.workers
        );

        Ok(ServerHandle {
            local_addr: self.local_addr,
            shutdown,
            accept: Some(accept),
            workers,
        })
    }
}

/// Servidor em execução.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Para de aceitar conexões, termina as pendentes e aguarda as threads.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);

        // acorda o accept bloqueado
        let mut wake = self.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        let _ = TcpStream::connect_timeout(&wake, Duration::from_secs(1));

        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("Servidor de ingestão encerrado");
    }
}

impl Dispatcher {
    fn handle_connection(&self, mut stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "?".to_string(), |a| a.to_string());

        if let Err(e) = stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
        {
            warn!("Falha ao configurar timeouts para {peer}: {e}");
            return;
        }

        let frame = match read_frame(&mut stream, self.max_frame_bytes) {
            Ok(frame) => frame,
            Err(FrameError::Io(e)) => {
                warn!("Erro lendo de {peer}: {e}");
                return;
            }
            Err(FrameError::Protocol(e)) => {
                self.log.append_error(&e.to_string());
                return;
            }
        };
        debug!("Mensagem de {peer}: {frame}");

        match decode_request(&frame) {
            Ok(Request::CountQuery) => self.reply_count(&mut stream, &peer),
            Ok(Request::Measurement { entity_id, value }) => self.apply(entity_id, value),
            Err(e) => self.log.append_error(&e.to_string()),
        }
    }

    fn reply_count(&self, stream: &mut TcpStream, peer: &str) {
        let count = match self.owner.call(|s| s.entity_count()) {
            Ok(count) => count,
            Err(e) => {
                error!("Contagem indisponível: {e}");
                return;
            }
        };

        if let Err(e) = stream
            .write_all(count.to_string().as_bytes())
            .and_then(|()| stream.flush())
        {
            warn!("Erro respondendo a {peer}: {e}");
        }
    }

    fn apply(&self, entity_id: u32, value: f64) {
        let result = self.owner.call(move |s| {
            let result = s.apply_measurement(entity_id, value);
            if let Err(e) = &result {
                s.log().append_error(&e.to_string());
            }
            result
        });

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Medição descartada: {e}"),
            Err(e) => error!("Medição para {entity_id} perdida: {e}"),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
