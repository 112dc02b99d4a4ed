use log::LevelFilter;

pub fn to_level_filter(ulevel: u64) -> LevelFilter {
    match ulevel {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the global logger. `RUST_LOG` still overrides per-module filters. Calling this twice
/// keeps the first logger.
pub fn init_logging(ulevel: u64) {
    let _ = env_logger::Builder::new()
        .filter_level(to_level_filter(ulevel))
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}
