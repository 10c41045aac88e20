use std::io::Write;

/// 安装全局 logger
///
/// 输出格式：带颜色的等级与时间，下一行灰色显示模块与源码位置。
/// 默认等级为 Info，可以通过 `RUST_LOG` 覆盖。
pub fn init_log() {
    env_logger::Builder::new()
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Info => level_color(buf, log::Level::Info, anstyle::AnsiColor::Green),
                log::Level::Warn => level_color(buf, log::Level::Warn, anstyle::AnsiColor::Yellow),
                log::Level::Error => level_color(buf, log::Level::Error, anstyle::AnsiColor::Red),
                level => buf.default_level_style(level),
            };
            let location_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(0);
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.3f");
            let module = record.module_path().unwrap_or("");

            writeln!(
                buf,
                "{level_style}[{time}] {}: {}{level_style:#}\n\t {location_style}In {module} At {file}:{line}{location_style:#}",
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn level_color(buf: &env_logger::fmt::Formatter, level: log::Level, color: anstyle::AnsiColor) -> anstyle::Style {
    buf.default_level_style(level).fg_color(Some(anstyle::Color::Ansi(color)))
}
