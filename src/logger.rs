use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

// 追加写入文件的日志器，警告及以上同时输出到标准错误
pub struct Logger {
    file: Mutex<File>,
    level: LevelFilter,
}

impl Logger {
    pub fn new(log_path: &Path, level: LevelFilter) -> Result<Self, std::io::Error> {
        if let Some(dir) = log_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Logger {
            file: Mutex::new(file),
            level,
        })
    }

    pub fn init(log_path: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
        let logger = Self::new(log_path, level)?;
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format(record: &Record) -> String {
        format!(
            "{} {:<5} {} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = Self::format(record);
        if record.level() <= Level::Warn {
            eprint!("{}", entry);
        }
        let _ = self.file().write_all(entry.as_bytes());
    }

    fn flush(&self) {
        let _ = self.file().flush();
    }
}

// 日志文件无法打开时退回到 env_logger 输出到标准错误
pub fn init(log_dir: &Path, level: LevelFilter) {
    let log_path = log_dir.join("app.log");
    if let Err(e) = Logger::init(&log_path, level) {
        eprintln!("初始化日志文件 {} 失败: {}", log_path.display(), e);
        env_logger::Builder::new().filter_level(level).init();
    }
}
