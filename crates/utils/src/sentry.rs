use sentry_tracing::{EventFilter, SentryLayer};
use tracing::Level;

const SENTRY_DSN_ENV: &str = "SENTRY_DSN";

/// Initialise the sentry client when `SENTRY_DSN` is set. The returned guard
/// must be held for the lifetime of the process.
pub fn init_once() -> Option<::sentry::ClientInitGuard> {
    let dsn = std::env::var(SENTRY_DSN_ENV).ok().filter(|d| !d.is_empty())?;
    let environment = if cfg!(debug_assertions) {
        "dev"
    } else {
        "production"
    };

    Some(::sentry::init((
        dsn,
        ::sentry::ClientOptions {
            release: ::sentry::release_name!(),
            environment: Some(environment.into()),
            ..Default::default()
        },
    )))
}

/// Forwards `error` events to sentry and records `warn`/`info` as breadcrumbs.
pub fn sentry_layer<S>() -> SentryLayer<S>
where
    S: tracing::Subscriber,
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    sentry_tracing::layer()
        .span_filter(|meta| {
            matches!(
                *meta.level(),
                Level::DEBUG | Level::INFO | Level::WARN | Level::ERROR
            )
        })
        .event_filter(|meta| match *meta.level() {
            Level::ERROR => EventFilter::Event,
            Level::DEBUG | Level::INFO | Level::WARN => EventFilter::Breadcrumb,
            Level::TRACE => EventFilter::Ignore,
        })
}
