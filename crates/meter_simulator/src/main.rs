//! # Meter Simulator
//!
//! Simula medidores de energia: pergunta ao serviço quantas entidades
//! existem e, a cada intervalo, envia uma leitura aleatória para uma delas.
//!
//! ## Uso
//! ```bash
//! meter_simulator              # usa config.toml ao lado do executável
//! ```

use network_core::client::{query_object_count, send_measurement};
use network_core::config::{AppConfig, SimulatorConfig};
use rand::Rng;
use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Timeout de conexão/leitura de cada requisição.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Espera entre tentativas de obter a contagem.
const RETRY_DELAY: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let sim = &config.simulator;
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("Config inválida: {problem}");
        }
        return ExitCode::FAILURE;
    }

    let addr = match resolve(sim) {
        Some(addr) => addr,
        None => {
            error!("Não foi possível resolver {}", sim.server_addr());
            return ExitCode::FAILURE;
        }
    };
    let interval = Duration::from_secs_f64(sim.interval_secs);

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ METER SIMULATOR – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Destino:   {addr}");
    println!("  Intervalo: {:.1}s", sim.interval_secs);
    println!("  Faixa:     {:.2}–{:.2} kWh", sim.min_value, sim.max_value);
    println!("══════════════════════════════════════════════");
    println!();

    let mut count = wait_for_count(addr);
    let mut rng = rand::rng();

    // ── Loop principal ──
    loop {
        let cycle_start = Instant::now();

        let entity_id = rng.random_range(0..count);
        let value = rng.random_range(sim.min_value..=sim.max_value);
        match send_measurement(addr, entity_id, value, REQUEST_TIMEOUT) {
            Ok(()) => info!("→ Entitet_{entity_id}:{value:.2}"),
            Err(e) => {
                error!("Erro ao enviar medição: {e}");
                count = wait_for_count(addr);
            }
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}

fn resolve(sim: &SimulatorConfig) -> Option<SocketAddr> {
    sim.server_addr().to_socket_addrs().ok()?.next()
}

/// Bloqueia até o serviço responder com uma contagem positiva.
fn wait_for_count(addr: SocketAddr) -> u32 {
    loop {
        match query_object_count(addr, REQUEST_TIMEOUT) {
            Ok(count) if count > 0 => {
                info!("Serviço conhece {count} entidades");
                return u32::try_from(count).unwrap_or(u32::MAX);
            }
            Ok(_) => warn!("Serviço sem entidades, aguardando..."),
            Err(e) => warn!("Serviço indisponível em {addr}: {e}. Tentando novamente..."),
        }
        std::thread::sleep(RETRY_DELAY);
    }
}
