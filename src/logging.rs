//! Logging initialization. A thin wrapper over `env_logger`; the
//! format/level choice comes from the configuration record; actual log
//! call sites live throughout the crate via the `log` facade.

use crate::config::{LogFormat, LoggingConfig};
use log::LevelFilter;
use std::io::Write;

pub fn init(config: &LoggingConfig) {
    let level: LevelFilter = config.level.parse().unwrap_or(LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if config.format == LogFormat::Json {
        builder.format(|buf, record| {
            writeln!(
                buf,
                r#"{{"level":"{}","target":"{}","message":"{}"}}"#,
                record.level(),
                record.target(),
                record.args().to_string().replace('"', "\\\"")
            )
        });
    }

    if let Some(path) = &config.file {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }

    let _ = builder.try_init();
}
