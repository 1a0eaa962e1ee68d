use crate::config::EnvSource;
use crate::factory::ProviderSummary;
use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

static FLYER_LOGGER: Lazy<FlyerLogger> = Lazy::new(FlyerLogger::new);
static INSTALLED: AtomicBool = AtomicBool::new(false);

pub fn init() -> Result<(), String> {
    init_with_config(LoggerConfig::default())
}

/// Installs the logger, or reconfigures it if it is already installed.
pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    FLYER_LOGGER.update_config(config.clone());

    if !INSTALLED.swap(true, Ordering::SeqCst) {
        if let Err(e) = log::set_logger(&*FLYER_LOGGER) {
            INSTALLED.store(false, Ordering::SeqCst);
            return Err(format!("Failed to set logger: {:?}", e));
        }
    }

    log::set_max_level(config.min_level.to_log_level_filter());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn to_log_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }

    pub fn to_log_level_filter(&self) -> log::LevelFilter {
        self.to_log_level().to_level_filter()
    }

    pub fn from_log_level(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level '{}'", s)),
        }
    }
}

/// One formatted log line, also the shape written in JSON mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub context: HashMap<String, serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: String, module: String, file: String, line: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message,
            module,
            file,
            line,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_file_location: bool,
    pub show_module: bool,
    pub include_timestamp: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_to_file: bool,
    pub log_file_path: String,
    /// Only records from modules under these prefixes get through. Empty
    /// means everything; reqwest and hyper are noisy at debug.
    pub module_allowlist: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_file_location: false,
            show_module: true,
            include_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_to_file: false,
            log_file_path: "flyergen.log".to_string(),
            module_allowlist: vec!["flyergen".to_string()],
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `FLYERGEN_LOG` picks a preset (`development` or `production`);
    /// `FLYERGEN_LOG_LEVEL`, `FLYERGEN_LOG_JSON` and `FLYERGEN_LOG_FILE`
    /// override individual fields.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = match env.var("FLYERGEN_LOG").as_deref().map(str::trim) {
            Some("production") | Some("prod") => Self::production(),
            Some("development") | Some("dev") => Self::development(),
            _ => Self::default(),
        };

        if let Some(raw) = env.var("FLYERGEN_LOG_LEVEL") {
            match raw.parse() {
                Ok(level) => config.min_level = level,
                Err(e) => eprintln!("flyergen: ignoring FLYERGEN_LOG_LEVEL: {}", e),
            }
        }
        if let Some(raw) = env.var("FLYERGEN_LOG_JSON") {
            config.output_json = matches!(raw.trim(), "1" | "true" | "yes");
        }
        if let Some(path) = env.var("FLYERGEN_LOG_FILE").filter(|p| !p.trim().is_empty()) {
            config = config.with_file_output(path.trim());
        }
        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_to_file = true;
        self.log_file_path = path.to_string();
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.module_allowlist = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            log_to_file: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_emojis: true,
            output_json: false,
            show_file_location: true,
            ..Default::default()
        }
    }

    fn allows_module(&self, target: &str) -> bool {
        self.module_allowlist.is_empty()
            || self
                .module_allowlist
                .iter()
                .any(|prefix| target.starts_with(prefix.as_str()))
    }
}

pub struct FlyerLogger {
    config: Mutex<LoggerConfig>,
    log_file: Mutex<Option<File>>,
}

impl FlyerLogger {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            log_file: Mutex::new(None),
        }
    }

    pub fn update_config(&self, new_config: LoggerConfig) {
        let mut log_file = self.log_file.lock().unwrap_or_else(|e| e.into_inner());
        *log_file = None;
        if new_config.log_to_file {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&new_config.log_file_path)
            {
                Ok(file) => *log_file = Some(file),
                Err(e) => eprintln!(
                    "flyergen: cannot open log file {}: {}",
                    new_config.log_file_path, e
                ),
            }
        }

        let mut config = self.config.lock().unwrap_or_else(|e| e.into_inner());
        *config = new_config;
    }

    fn format_console_output(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        let mut output = String::new();

        if config.include_timestamp {
            let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
            if config.show_colors {
                output.push_str(&format!("{} ", timestamp.bright_black()));
            } else {
                output.push_str(&format!("{} ", timestamp));
            }
        }

        let level_str = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };
        if config.show_colors {
            output.push_str(&format!(
                "[{}] ",
                level_str.color(entry.level.color()).bold()
            ));
        } else {
            output.push_str(&format!("[{}] ", level_str));
        }

        if config.show_module && !entry.module.is_empty() {
            if config.show_colors {
                output.push_str(&format!("{}: ", entry.module.bright_blue()));
            } else {
                output.push_str(&format!("{}: ", entry.module));
            }
        }

        if config.show_colors {
            output.push_str(&entry.message.white().bold().to_string());
        } else {
            output.push_str(&entry.message);
        }

        if !entry.context.is_empty() {
            let context = serde_json::to_string(&entry.context).unwrap_or_default();
            if config.show_colors {
                output.push_str(&format!(" {}", context.bright_cyan()));
            } else {
                output.push_str(&format!(" {}", context));
            }
        }

        if config.show_file_location {
            let location = format!("{}:{}", entry.file, entry.line);
            if config.show_colors {
                output.push_str(&format!(" ({})", location.bright_black()));
            } else {
                output.push_str(&format!(" ({})", location));
            }
        }

        output
    }

    fn render(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        if config.output_json {
            serde_json::to_string(entry).unwrap_or_default()
        } else {
            self.format_console_output(entry, config)
        }
    }

    fn write_to_file(&self, line: &str) {
        let mut log_file = self.log_file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = log_file.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }

    fn create_log_entry(&self, record: &Record) -> LogEntry {
        let entry = LogEntry::new(
            LogLevel::from_log_level(record.level()),
            record.args().to_string(),
            record.module_path().unwrap_or("unknown").to_string(),
            record.file().unwrap_or("unknown").to_string(),
            record.line().unwrap_or(0),
        );
        if record.target() != entry.module {
            entry.with_context("target", serde_json::Value::String(record.target().to_string()))
        } else {
            entry
        }
    }
}

impl Default for FlyerLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for FlyerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let config = self.config.lock().unwrap_or_else(|e| e.into_inner());
        metadata.level() <= config.min_level.to_log_level()
            && config.allows_module(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = self.create_log_entry(record);
        let config = self.config.lock().unwrap_or_else(|e| e.into_inner()).clone();

        let line = self.render(&entry, &config);
        if entry.level >= LogLevel::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }

        if config.log_to_file {
            // Files never get ANSI escapes.
            let plain = if config.show_colors && !config.output_json {
                self.render(&entry, &config.clone().with_colors(false))
            } else {
                line
            };
            self.write_to_file(&plain);
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        let mut log_file = self.log_file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = log_file.as_mut() {
            let _ = file.flush();
        }
    }
}

/// Measures one operation; logs once, on `finish` or on drop.
pub struct Timer {
    start: Instant,
    name: String,
    finished: bool,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting timer: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
            finished: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(mut self) -> Duration {
        self.finished = true;
        let duration = self.elapsed();
        log::debug!("⏱️  '{}' took {}ms", self.name, duration.as_millis());
        duration
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!(
                "⏱️  '{}' abandoned after {}ms",
                self.name,
                self.elapsed().as_millis()
            );
        }
    }
}

/// First few characters of a secret, for confirming which key is loaded.
pub fn redact(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", shown)
    }
}

pub fn log_startup_info(app_name: &str, version: &str) {
    log::info!("🚀 Starting {} v{}", app_name, version);
    log::info!("📝 Logger initialized successfully");
}

pub fn log_provider_summary(summary: &[ProviderSummary]) {
    log::info!("⚙️  Image providers:");
    for row in summary {
        let state = match (row.configured, row.enabled) {
            (true, true) => "✅",
            (true, false) => "⏸️ ",
            _ => "❌",
        };
        log::info!(
            "   {} {:<22} priority {:>3}{}",
            state,
            row.provider.display_name(),
            row.priority,
            if row.is_default { "  (default)" } else { "" }
        );
    }
}
