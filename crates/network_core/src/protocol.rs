//! Protocolo de texto do serviço de ingestão.
//!
//! Uma conexão TCP carrega exatamente uma requisição:
//!
//! ```text
//! Need object count        → resposta: contagem em ASCII decimal, sem terminador
//! Entitet_<id>:<valor>     → sem resposta; atualiza a entidade
//! ```
//!
//! O frame termina no primeiro `\n` (com `\r` opcional antes) ou no fim do
//! stream, o que vier primeiro, e é limitado a `max_frame_bytes`. Sem
//! terminador e com o socket aberto, o que chegou até o timeout é o frame.

use std::io::{self, Read};
use tracing::debug;

/// Consulta de contagem de entidades.
pub const COUNT_QUERY: &str = "Need object count";

/// Prefixo de uma mensagem de medição.
pub const MEASUREMENT_PREFIX: &str = "Entitet_";

/// Porta TCP padrão do serviço.
pub const DEFAULT_PORT: u16 = 25675;

/// Tamanho máximo padrão de um frame.
pub const MAX_FRAME_LEN: usize = 1024;

/// Requisição decodificada.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    CountQuery,
    Measurement { entity_id: u32, value: f64 },
}

/// Mensagem mal formada. O texto vai para o log de medições.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty message")]
    Empty,

    #[error("Message exceeds {0} bytes")]
    FrameTooLong(usize),

    #[error("Message is not valid UTF-8")]
    NotUtf8,

    #[error("Unknown message: {0}")]
    Unknown(String),

    #[error("Invalid entity ID: {0}")]
    MalformedId(String),

    #[error("Invalid value: {0}")]
    MalformedValue(String),
}

/// Falha ao ler um frame do socket.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Erro de I/O: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Lê um frame: até `\n` ou EOF, no máximo `max_len` bytes de conteúdo.
///
/// Clientes que mandam a mensagem sem terminador e deixam o socket aberto
/// também são atendidos: a consulta de contagem é reconhecida assim que
/// chega completa, e qualquer outro conteúdo já recebido vira o frame
/// quando a leitura estoura o timeout.
///
/// Retorna o texto já sem `\r` final e sem espaços nas pontas.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<String, FrameError> {
    let mut raw = Vec::with_capacity(max_len.min(MAX_FRAME_LEN) + 1);
    let mut chunk = [0u8; 256];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) && !raw.is_empty() => {
                debug!("Timeout com {} bytes pendentes; usando como frame", raw.len());
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }

        let received = &chunk[..n];
        if let Some(end) = received.iter().position(|&b| b == b'\n') {
            raw.extend_from_slice(&received[..end]);
            check_len(&raw, max_len)?;
            return finish_frame(raw);
        }
        raw.extend_from_slice(received);
        check_len(&raw, max_len)?;

        if raw.trim_ascii() == COUNT_QUERY.as_bytes() {
            break;
        }
    }

    finish_frame(raw)
}

/// Timeout de leitura: `WouldBlock` no Unix, `TimedOut` no Windows.
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn check_len(raw: &[u8], max_len: usize) -> Result<(), ProtocolError> {
    if raw.len() > max_len {
        Err(ProtocolError::FrameTooLong(max_len))
    } else {
        Ok(())
    }
}

fn finish_frame(mut raw: Vec<u8>) -> Result<String, FrameError> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }

    let text = String::from_utf8(raw).map_err(|_| ProtocolError::NotUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ProtocolError::Empty.into());
    }
    Ok(text.to_string())
}

/// Interpreta o texto de um frame.
pub fn decode_request(frame: &str) -> Result<Request, ProtocolError> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if frame == COUNT_QUERY {
        return Ok(Request::CountQuery);
    }

    let Some(body) = frame.strip_prefix(MEASUREMENT_PREFIX) else {
        return Err(ProtocolError::Unknown(frame.to_string()));
    };
    let Some((id, value)) = body.split_once(':') else {
        return Err(ProtocolError::Unknown(frame.to_string()));
    };

    let entity_id = id
        .trim()
        .parse::<u32>()
        .map_err(|_| ProtocolError::MalformedId(id.to_string()))?;
    let value = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProtocolError::MalformedValue(value.to_string()))?;

    Ok(Request::Measurement { entity_id, value })
}

/// Texto de uma requisição, com `\n` final.
pub fn encode_request(request: &Request) -> String {
    match request {
        Request::CountQuery => format!("{COUNT_QUERY}\n"),
        Request::Measurement { entity_id, value } => {
            format!("{MEASUREMENT_PREFIX}{entity_id}:{value:.2}\n")
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
