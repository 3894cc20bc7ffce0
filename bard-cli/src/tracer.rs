use shared::config::{LogFormat, LoggingConfig};
use std::io;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::{
    EnvFilter,
    filter::LevelFilter,
    fmt::{self, MakeWriter},
};

/// Installs the global subscriber. Logs go to stderr so they never mix with streamed replies.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn initialize_tracing(logging: &LoggingConfig) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(subscriber_with_writer(logging, io::stderr))
}

pub(crate) fn subscriber_with_writer<W>(
    logging: &LoggingConfig,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(logging))
        .with_target(false)
        .with_level(true)
        .with_writer(writer);

    match logging.format {
        LogFormat::Json => Box::new(builder.json().with_ansi(false).finish()),
        LogFormat::Text => Box::new(builder.with_ansi(true).finish()),
    }
}

/// `RUST_LOG` wins; otherwise the configured level. A level that is not a plain level name is
/// tried as a filter directive.
fn build_env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match logging.level.parse::<LevelFilter>() {
            Ok(level) => EnvFilter::builder()
                .with_default_directive(level.into())
                .parse_lossy(""),
            Err(_) => EnvFilter::try_new(&logging.level)
                .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string())),
        }
    })
}
