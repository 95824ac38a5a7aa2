//! Custom event formatter that adds `trace_id` and `span_id` to each log line (§10.A).
//!
//! The Gateway opens one span per inbound message (`channel`, `message_id` fields); every log
//! line emitted while handling that message is then correlated by this prefix.

use std::fmt;

use tracing_core::Subscriber;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::{LookupSpan, SpanRef};

/// Plain-text formatter prefixing `trace_id=X span_id=Y` from the current span scope, same shape
/// as the pack's own CLI formatter.
pub struct TextWithSpanIds {
    timer: SystemTime,
}

impl Default for TextWithSpanIds {
    fn default() -> Self {
        Self { timer: SystemTime::default() }
    }
}

impl TextWithSpanIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S, N> FormatEvent<S, N> for TextWithSpanIds
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing_core::Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;
        if let Some(span) = ctx.parent_span() {
            let span_id = span.id().into_u64().to_string();
            let trace_id = span
                .scope()
                .from_root()
                .next()
                .map(|root: SpanRef<'_, S>| root.id().into_u64().to_string())
                .unwrap_or_else(|| span_id.clone());
            write!(writer, " trace_id={} span_id={}", trace_id, span_id)?;
        }

        write!(writer, " {}: {}: ", event.metadata().level(), event.metadata().target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
