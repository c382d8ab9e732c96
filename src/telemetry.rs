use std::io::Write;

use chrono::{SecondsFormat, Utc};
use env_logger::Env;
use log::Record;
use serde_json::json;

/// Installs the global logger. `RUST_LOG` overrides the default `info` filter.
///
/// With `json` set every record is written as a single JSON object per line.
pub fn init_logger(json: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if json {
        builder.format(|buf, record| writeln!(buf, "{}", json_line(record)));
    }
    builder.init();
}

fn json_line(record: &Record) -> serde_json::Value {
    json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "level": record.level().as_str(),
        "target": record.target(),
        "module": record.module_path(),
        "file": record.file(),
        "line": record.line(),
        "message": record.args().to_string(),
    })
}
