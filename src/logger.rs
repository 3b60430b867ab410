use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};

/// 安装全局 logger, 级别由 RUST_LOG 决定, 默认 info
pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
