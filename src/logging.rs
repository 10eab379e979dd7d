use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Logger configuration: `verbose` selects debug over info, then `directives`
/// (`RUST_LOG` syntax, e.g. `enso_cmip6::composite=trace`) refine it.
fn logger_builder(verbose: bool, directives: Option<&str>) -> Builder {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter_level(default_level);
    if let Some(directives) = directives {
        builder.parse_filters(directives);
    }
    builder
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    builder
}

/// Initialize the global logger.
///
/// Records go to stderr so stdout keeps only the progress lines.
pub fn init_logging(verbose: bool) {
    let directives = std::env::var("RUST_LOG").ok();
    let _ = logger_builder(verbose, directives.as_deref()).try_init();
}
