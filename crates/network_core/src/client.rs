//! Cliente bloqueante do serviço de ingestão (uma requisição por conexão).

use crate::protocol::{Request, encode_request};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

/// Pergunta quantas entidades o serviço conhece.
pub fn query_object_count(addr: SocketAddr, timeout: Duration) -> io::Result<usize> {
    let mut stream = connect(addr, timeout)?;
    stream.write_all(encode_request(&Request::CountQuery).as_bytes())?;
    stream.shutdown(Shutdown::Write)?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    reply
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("resposta inválida '{reply}': {e}")))
}

/// Envia uma medição. Não há resposta.
pub fn send_measurement(
    addr: SocketAddr,
    entity_id: u32,
    value: f64,
    timeout: Duration,
) -> io::Result<()> {
    send_raw(addr, &encode_request(&Request::Measurement { entity_id, value }), timeout)
}

/// Envia texto arbitrário e fecha a escrita.
pub fn send_raw(addr: SocketAddr, message: &str, timeout: Duration) -> io::Result<()> {
    let mut stream = connect(addr, timeout)?;
    stream.write_all(message.as_bytes())?;
    stream.shutdown(Shutdown::Write)?;

    // espera o servidor fechar, para que a mensagem já tenha sido processada
    let mut sink = Vec::new();
    stream.read_to_end(&mut sink)?;
    Ok(())
}
