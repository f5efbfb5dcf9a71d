//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável, compartilhado pelo serviço
//! e pelo simulador.

use crate::measurement_log::DEFAULT_LOG_FILE;
use crate::protocol::{DEFAULT_PORT, MAX_FRAME_LEN};
use crate::undo::DEFAULT_MAX_HISTORY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Servidor de ingestão TCP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP local para bind
    pub bind_ip: String,
    /// Porta TCP
    pub port: u16,
    /// Threads que atendem conexões
    pub workers: usize,
    /// Timeout de leitura/escrita por conexão (segundos)
    pub read_timeout_secs: f64,
    /// Tamanho máximo de uma mensagem
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            workers: 4,
            read_timeout_secs: 5.0,
            max_frame_bytes: MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_secs)
    }
}

/// Log de medições.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: PathBuf,
    /// N padrão das consultas "últimas N leituras"
    pub recent_count: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_FILE),
            recent_count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Slots da grade (a bandeja não conta)
    pub slots: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self { slots: 12 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    pub max_history: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Simulador de medidores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub server_host: String,
    pub port: u16,
    /// Intervalo entre envios (segundos)
    pub interval_secs: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            interval_secs: 1.0,
            min_value: 0.0,
            max_value: 3.5,
        }
    }
}

impl SimulatorConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.port)
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub topology: TopologyConfig,
    pub undo: UndoConfig,
    pub simulator: SimulatorConfig,
}

/// Nome do arquivo de configuração ao lado do executável.
pub const CONFIG_FILE: &str = "config.toml";

/// Falha ao ler ou gravar o `config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AppConfig {
    /// Lê e interpreta o arquivo. `Ok(None)` se ele não existe.
    pub fn read_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Carrega o arquivo, caindo para o padrão se ele faltar ou não abrir.
    pub fn load(path: &Path) -> Self {
        match Self::read_from(path) {
            Ok(Some(config)) => {
                info!("Configuração carregada de {}", path.display());
                return config;
            }
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
        info!("Usando configuração padrão");
        Self::default()
    }

    /// Grava a configuração como TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// `config.toml` no diretório do executável, ou no diretório atual.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE)
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("Porta do servidor não pode ser 0".into());
        }
        if self.server.workers == 0 {
            errors.push("O servidor precisa de pelo menos 1 worker".into());
        }
        if !(self.server.read_timeout_secs > 0.0 && self.server.read_timeout_secs <= 300.0) {
            errors.push(format!(
                "Timeout de leitura inválido: {} (0–300 s)",
                self.server.read_timeout_secs
            ));
        }
        if self.server.max_frame_bytes < crate::protocol::COUNT_QUERY.len() {
            errors.push(format!(
                "max_frame_bytes muito pequeno: {}",
                self.server.max_frame_bytes
            ));
        }
        if self.log.path.as_os_str().is_empty() {
            errors.push("Caminho do log de medições vazio".into());
        }
        if self.topology.slots == 0 {
            errors.push("A grade precisa de pelo menos 1 slot".into());
        }
        if self.undo.max_history == 0 {
            errors.push("max_history não pode ser 0".into());
        }
        if self.simulator.port == 0 {
            errors.push("Porta do simulador não pode ser 0".into());
        }
        if self.simulator.interval_secs < 0.05 || self.simulator.interval_secs > 60.0 {
            errors.push(format!(
                "Intervalo do simulador inválido: {} (0.05–60.0)",
                self.simulator.interval_secs
            ));
        }
        if !(self.simulator.min_value < self.simulator.max_value) {
            errors.push(format!(
                "Faixa do simulador invertida: {} >= {}",
                self.simulator.min_value, self.simulator.max_value
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.port, parsed.server.port);
        assert_eq!(config.log.path, parsed.log.path);
        assert_eq!(config.simulator.max_value, parsed.simulator.max_value);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[server]
port = 9999
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.server.port, 9999);
        // Outros campos devem ter valor padrão
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.topology.slots, 12);
        assert_eq!(config.undo.max_history, 50);
    }

    #[test]
    fn validate_reports_each_problem() {
        let mut config = AppConfig::default();
        config.server.workers = 0;
        config.topology.slots = 0;
        config.simulator.min_value = 4.0;
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(AppConfig::load(&path).server.port, DEFAULT_PORT);

        std::fs::write(&path, "[server\nport = ").unwrap();
        assert_eq!(AppConfig::load(&path).server.port, DEFAULT_PORT);

        let mut custom = AppConfig::default();
        custom.log.recent_count = 9;
        custom.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).log.recent_count, 9);
    }

    #[test]
    fn read_from_distinguishes_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(AppConfig::read_from(&path).unwrap().is_none());

        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = AppConfig::read_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err:?}");
        assert!(err.to_string().starts_with("Invalid TOML in "), "{err}");
    }

    #[test]
    fn save_into_missing_directory_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(CONFIG_FILE);

        let err = AppConfig::default().save(&path).unwrap_err();
        match &err {
            ConfigError::Write { path: failed, source } => {
                assert_eq!(failed, &path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("erro inesperado: {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn default_path_names_the_config_file() {
        assert!(AppConfig::default_path().ends_with(CONFIG_FILE));
    }
}
