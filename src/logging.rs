use eyre::{
    Context as _,
    Result,
};
use std::fmt;
use tracing::{
    Event,
    Subscriber,
};
use tracing_subscriber::{
    fmt::{
        format::Writer,
        FmtContext,
        FormatEvent,
        FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Error reports plus a console subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(BracketLevel)
                .with_filter(filter),
        )
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .wrap_err("Failed to initialize tracing subscriber")
}

/// One line per event: `[LEVEL] message key=value ...`.
pub struct BracketLevel;

impl<S, N> FormatEvent<S, N> for BracketLevel
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        write!(writer, "[{}] ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
