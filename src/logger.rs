use anyhow::Result;
use chrono::Local;
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use std::fs::create_dir_all;
use std::io::{self, Write};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

// 按小时滚动时保留的日志文件数
const MAX_LOG_FILES: usize = 24;

// 同时写入标准输出和文件
struct DualWriter {
    console: io::Stdout,
    file: Box<dyn Write + Send>,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let console_result = self.console.write(buf);
        let _ = self.file.write(buf);
        console_result
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        let _ = self.file.flush();
        Ok(())
    }
}

/// 初始化日志，`log_dir` 不为空时额外写入按小时滚动的日志文件
pub fn init_logger(log_dir: Option<&Path>) -> Result<()> {
    let target = match log_dir {
        Some(dir) => {
            if !dir.exists() {
                create_dir_all(dir)?;
            }

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_prefix("xray-exporter")
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(dir)?;

            // 设置非阻塞写入
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // guard被drop后后台写线程会退出，进程生命周期内保留
            Box::leak(Box::new(guard));

            env_logger::Target::Pipe(Box::new(DualWriter {
                console: io::stdout(),
                file: Box::new(non_blocking),
            }))
        }
        None => env_logger::Target::Stdout,
    };

    env_logger::Builder::new()
        .format(|buf, record| {
            let mut style = buf.style();
            let level_color = match record.level() {
                Level::Error => Color::Red,
                Level::Warn => Color::Yellow,
                Level::Info => Color::Green,
                Level::Debug => Color::Blue,
                Level::Trace => Color::Cyan,
            };
            style.set_color(level_color);

            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let level_str = style.value(format!("{:<5}", record.level()));

            writeln!(
                buf,
                "[{} {} {}] {}",
                timestamp,
                level_str,
                record.target(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        // 应用RUST_LOG环境变量指定的过滤器
        .parse_env("RUST_LOG")
        .target(target)
        .try_init()?;

    if let Some(dir) = log_dir {
        log::info!("日志文件保存在 {}，每小时滚动，保留最新的{}个文件", dir.display(), MAX_LOG_FILES);
    }

    Ok(())
}
