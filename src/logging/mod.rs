// Diagnostic logging
//
// Everything goes to stderr so stdout carries only commands and replies.

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Level for the `tern` target at a given `-v` count.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` directives are honoured; the
/// verbosity flag sets the level for this crate on top of them.
pub fn init(verbosity: u8) {
    let level = level_for(verbosity);
    let directive: Directive = format!("tern={}", level)
        .parse()
        .unwrap_or_else(|_| level.into());

    let result = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .try_init();

    if result.is_ok() {
        tracing::debug!("Logging initialized (verbosity: {})", verbosity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0), Level::WARN);
        assert_eq!(level_for(1), Level::INFO);
        assert_eq!(level_for(2), Level::DEBUG);
        assert_eq!(level_for(7), Level::TRACE);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(0);
        init(3);
    }
}
