use std::io::Write;

/// Sink for an environment's log lines. Implementations prefix each line
/// themselves, `log!` writes the rest of it.
pub trait Logger {
    fn line_writer(&mut self) -> Option<&mut dyn Write>;
}

/// Discards everything
#[derive(Debug, Default)]
pub struct DummyLogger;

/// Keeps the log in memory. Whatever was not drained is dumped to stderr when
/// the logger is dropped.
#[derive(Debug)]
pub struct VecLogger(u32, Vec<u8>);

/// Appends to a file
#[derive(Debug)]
pub struct FileLogger(u32, std::fs::File);

fn secs_since_unix_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.)
}

impl FileLogger {
    pub fn new(env_id: u32, file: std::fs::File) -> Self {
        Self(env_id, file)
    }
}

impl VecLogger {
    pub fn new(env_id: u32) -> Self {
        Self(env_id, Default::default())
    }

    /// Takes the buffered log
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.1)
    }
}

/////////////////
impl Logger for DummyLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }
}

impl Logger for VecLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        let _ = write!(&mut self.1, "ENV({}) at {:.6} ", self.0, secs_since_unix_epoch());
        Some(self)
    }
}

impl Logger for FileLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        let _ = write!(&mut self.1, "ENV({}) at {:.6} ", self.0, secs_since_unix_epoch());
        Some(&mut self.1)
    }
}

///////////////////
impl Drop for VecLogger {
    fn drop(&mut self) {
        if self.1.is_empty() {
            return;
        }
        let stderr = std::io::stderr();
        let mut lock = stderr.lock();
        let _ = writeln!(lock, "--- DROP LOG DUMP ---");
        let _ = lock.write_all(self.1.as_slice());
    }
}

impl Write for VecLogger {
    fn flush(&mut self) -> Result<(), std::io::Error> {
        Ok(())
    }
    fn write(&mut self, data: &[u8]) -> Result<usize, std::io::Error> {
        self.1.extend_from_slice(data);
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "no_logging"))]
    fn test_vec_logger_prefixes_lines() {
        let mut logger = VecLogger::new(7);
        log!(logger, "hello {}", 3);
        log!(logger, "world");
        let text = String::from_utf8(logger.drain()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ENV(7) at "));
        assert!(lines[0].ends_with(" hello 3"));
        assert!(lines[1].ends_with(" world"));
    }

    #[test]
    fn test_dummy_logger_is_silent() {
        let mut logger = DummyLogger;
        assert!(logger.line_writer().is_none());
    }
}
