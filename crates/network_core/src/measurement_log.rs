//! Log de medições append-only.
//!
//! Serve como trilha de auditoria e como fonte das consultas "últimas N
//! leituras". Formato das linhas:
//!
//! ```text
//! === Network Service Measurements Log - Started: 2025-09-15 14:23:40 ===
//! [2025-09-15 14:23:45] Entity_ID: 1, Value: 1.55 kWh, Status: NORMAL
//! [2025-09-15 14:23:46] ERROR: Unknown message: hello
//! ```
//!
//! As duas rotas de escrita (`append` e `append_error`) compartilham o mesmo
//! mutex, então linhas nunca se intercalam. Falhas de I/O vão para o
//! `tracing` e a linha é descartada.

use crate::types::{EntityId, Measurement, ValueStatus};
use chrono::{Local, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Nome padrão do arquivo de log.
pub const DEFAULT_LOG_FILE: &str = "measurements.txt";

/// Formato dos timestamps (`yyyy-MM-dd HH:mm:ss`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ERROR_MARKER: &str = "] ERROR: ";

/// Linha persistida malformada.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Error parsing measurement line: {line} - {reason}")]
pub struct LogParseError {
    pub line: String,
    pub reason: String,
}

impl LogParseError {
    fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub struct MeasurementLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MeasurementLog {
    /// Abre o log, criando o arquivo com a linha de cabeçalho se não existir.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let log = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        log.ensure_header();
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grava uma medição. Nunca falha para o chamador.
    pub fn append(&self, measurement: &Measurement) {
        self.append_line(&format_measurement(measurement));
    }

    /// Grava uma linha `ERROR:` sob o mesmo lock das medições.
    pub fn append_error(&self, message: &str) {
        let line = format_error(now_timestamp(), message);
        warn!("{line}");
        self.append_line(&line);
    }

    /// Últimas `n` medições da entidade, da mais antiga para a mais recente.
    ///
    /// Varre o arquivo inteiro. Linhas malformadas entre as `n` finais são
    /// puladas e registradas como erro.
    pub fn last_n(&self, entity_id: EntityId, n: usize) -> Vec<Measurement> {
        let lines = match self.read_lines() {
            Ok(lines) => lines,
            Err(e) => {
                self.append_error(&format!(
                    "Error reading measurements for entity {entity_id}: {e}"
                ));
                return Vec::new();
            }
        };

        let needle = format!("Entity_ID: {entity_id},");
        let candidates: Vec<&String> = lines
            .iter()
            .filter(|line| !is_error_line(line) && line.contains(&needle))
            .collect();
        let start = candidates.len().saturating_sub(n);

        let mut measurements = Vec::with_capacity(candidates.len() - start);
        let mut failures = Vec::new();
        for line in &candidates[start..] {
            match parse_measurement_line(line) {
                Ok(m) => measurements.push(m),
                Err(e) => failures.push(e),
            }
        }

        // Fora do lock de leitura: append_error toma o mesmo mutex.
        for failure in failures {
            self.append_error(&failure.to_string());
        }

        measurements
    }

    /// Último valor registrado de cada entidade presente no log, com a
    /// precisão de duas casas em que foi gravado.
    pub fn latest_values(&self) -> BTreeMap<EntityId, f64> {
        let mut values = BTreeMap::new();
        let lines = match self.read_lines() {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Não foi possível ler {}: {e}", self.path.display());
                return values;
            }
        };

        for line in lines.iter().filter(|l| is_measurement_candidate(l)) {
            match parse_measurement_line(line) {
                Ok(m) => {
                    values.insert(m.entity_id, m.value);
                }
                Err(e) => debug!("Ignorando linha do log: {e}"),
            }
        }
        values
    }

    fn ensure_header(&self) {
        let _guard = self.lock();
        if self.path.exists() {
            return;
        }
        let header = header_line(now_timestamp());
        if let Err(e) = fs::write(&self.path, format!("{header}\n")) {
            error!("Erro ao criar log {}: {e}", self.path.display());
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));

        if let Err(e) = result {
            error!("Erro ao gravar em {}: {e}", self.path.display());
        }
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        let _guard = self.lock();
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // O mutex não protege dados; um panic em outra thread não invalida nada.
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ──────────────────────────────────────────────
// Formato das linhas
// ──────────────────────────────────────────────

/// Hora local com precisão de segundos.
pub fn now_timestamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn header_line(timestamp: NaiveDateTime) -> String {
    format!(
        "=== Network Service Measurements Log - Started: {} ===",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

pub fn format_measurement(measurement: &Measurement) -> String {
    format!(
        "[{}] Entity_ID: {}, Value: {:.2} kWh, Status: {}",
        measurement.timestamp.format(TIMESTAMP_FORMAT),
        measurement.entity_id,
        measurement.value,
        measurement.status.log_label()
    )
}

pub fn format_error(timestamp: NaiveDateTime, message: &str) -> String {
    format!("[{}] ERROR: {message}", timestamp.format(TIMESTAMP_FORMAT))
}

fn is_error_line(line: &str) -> bool {
    line.contains(ERROR_MARKER)
}

fn is_measurement_candidate(line: &str) -> bool {
    line.starts_with('[') && !is_error_line(line)
}

/// Interpreta uma linha de medição.
pub fn parse_measurement_line(line: &str) -> Result<Measurement, LogParseError> {
    let body = line
        .strip_prefix('[')
        .ok_or_else(|| LogParseError::new(line, "missing '['"))?;
    let (timestamp, rest) = body
        .split_once("] Entity_ID: ")
        .ok_or_else(|| LogParseError::new(line, "missing Entity_ID"))?;
    let (id, rest) = rest
        .split_once(", Value: ")
        .ok_or_else(|| LogParseError::new(line, "missing Value"))?;
    let (value, status) = rest
        .split_once(" kWh, Status: ")
        .ok_or_else(|| LogParseError::new(line, "missing Status"))?;

    let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|e| LogParseError::new(line, format!("bad timestamp: {e}")))?;
    let entity_id = id
        .trim()
        .parse::<EntityId>()
        .map_err(|e| LogParseError::new(line, format!("bad entity id: {e}")))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| LogParseError::new(line, format!("bad value: {e}")))?;
    let status = ValueStatus::from_log_label(status);

    Ok(Measurement {
        timestamp,
        entity_id,
        value,
        is_valid: status.is_normal(),
        status,
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn temp_log() -> (tempfile::TempDir, MeasurementLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::open(dir.path().join(DEFAULT_LOG_FILE));
        (dir, log)
    }

    #[test]
    fn creates_header_on_open() {
        let (_dir, log) = temp_log();
        let content = fs::read_to_string(log.path()).unwrap();
        assert!(content.starts_with("=== Network Service Measurements Log - Started: "));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn reopen_keeps_existing_content() {
        let (dir, log) = temp_log();
        log.append(&Measurement::new(ts(10, 0, 0), 1, 1.0));
        drop(log);

        let log = MeasurementLog::open(dir.path().join(DEFAULT_LOG_FILE));
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn line_format() {
        let m = Measurement::new(ts(14, 23, 45), 1, 1.554);
        assert_eq!(
            format_measurement(&m),
            "[2025-09-15 14:23:45] Entity_ID: 1, Value: 1.55 kWh, Status: NORMAL"
        );
        assert_eq!(
            format_error(ts(14, 23, 46), "Unknown message: hi"),
            "[2025-09-15 14:23:46] ERROR: Unknown message: hi"
        );
    }

    #[test]
    fn append_then_last_one() {
        let (_dir, log) = temp_log();
        let m = Measurement::new(ts(8, 30, 0), 3, 1.4249);
        log.append(&m);

        let last = log.last_n(3, 1);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].timestamp, m.timestamp);
        assert_eq!(last[0].entity_id, 3);
        assert!((last[0].value - 1.42).abs() < 1e-9);
        assert_eq!(last[0].status, m.status);
        assert!(last[0].is_valid);
    }

    #[test]
    fn last_n_is_most_recent_last_and_exact_on_id() {
        let (_dir, log) = temp_log();
        for (i, value) in [0.5, 0.6, 0.7, 0.8].into_iter().enumerate() {
            log.append(&Measurement::new(ts(9, 0, i as u32), 1, value));
            log.append(&Measurement::new(ts(9, 0, i as u32), 12, 2.0));
        }
        log.append_error("Entity with ID 1 not found");

        let last = log.last_n(1, 2);
        let values: Vec<f64> = last.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![0.7, 0.8]);
        assert!(last.iter().all(|m| m.entity_id == 1));

        assert_eq!(log.last_n(1, 10).len(), 4);
        assert!(log.last_n(99, 5).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_and_reported() {
        let (_dir, log) = temp_log();
        log.append(&Measurement::new(ts(9, 0, 0), 4, 3.1));
        {
            let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
            writeln!(file, "[garbage] Entity_ID: 4, Value: abc kWh, Status: NORMAL").unwrap();
        }

        let last = log.last_n(4, 5);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].status, ValueStatus::Alert);

        let content = fs::read_to_string(log.path()).unwrap();
        assert!(content.lines().last().unwrap().contains("ERROR: Error parsing measurement line"));
    }

    #[test]
    fn latest_values_keeps_last_reading_per_entity() {
        let (_dir, log) = temp_log();
        log.append(&Measurement::new(ts(9, 0, 0), 0, 1.0));
        log.append(&Measurement::new(ts(9, 0, 1), 1, 2.0));
        log.append(&Measurement::new(ts(9, 0, 2), 0, 0.25));

        let values = log.latest_values();
        assert_eq!(values.len(), 2);
        assert_eq!(values[&0], 0.25);
        assert_eq!(values[&1], 2.0);
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let (_dir, log) = temp_log();
        let log = Arc::new(log);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        if i % 5 == 0 {
                            log.append_error(&format!("worker {t} error {i}"));
                        } else {
                            log.append(&Measurement::new(now_timestamp(), t, 1.0));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().skip(1).collect();
        assert_eq!(lines.len(), 8 * 25);
        for line in lines {
            assert!(
                is_error_line(line) || parse_measurement_line(line).is_ok(),
                "linha corrompida: {line}"
            );
        }
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let err = parse_measurement_line("[2025-09-15 10:00:00] Entity_ID: 1").unwrap_err();
        assert_eq!(err.reason, "missing Value");
    }
}
