//! Logging setup (spec.md §4.K / SPEC_FULL.md §4.K), matching the teacher's
//! `tracing_subscriber::registry()` + `ErrorLayer` + `EnvFilter` shape
//! (`packages/hurry/src/bin/hurry/log.rs`), with `STAVE_LOG` in place of
//! `HURRY_LOG` and no daemon-mode file-logging branch (`stave` has no
//! daemon).

use std::io::BufWriter;

use clap::ValueEnum;
use color_eyre::Result;
use color_eyre::eyre::Context as _;
use tracing_error::ErrorLayer;
use tracing_flame::{FlameLayer, FlushGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _};

pub const LOG_ENV_VAR: &str = "STAVE_LOG";

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum WhenColor {
    Always,
    Never,
    Auto,
}

/// Build the process-wide tracing subscriber: an `ErrorLayer` so
/// `color_eyre` reports carry a captured span trace, a stderr-writing `fmt`
/// layer filtered by `STAVE_LOG`, and (when `profile` is set via `-v`'s
/// debug escalation) a `tracing-flame` layer writing a flamegraph-ready
/// trace to the given path.
pub fn make_logger(
    profile: Option<&std::path::Path>,
    color: WhenColor,
) -> Result<(impl tracing::Subscriber, Option<FlushGuard<BufWriter<std::fs::File>>>)> {
    let (flame_layer, flame_guard) = if let Some(profile) = profile {
        FlameLayer::with_file(profile)
            .with_context(|| format!("set up profiling to {profile:?}"))
            .map(|(layer, guard)| (Some(layer), Some(guard)))?
    } else {
        (None, None)
    };

    let logger = tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with({
            let layer = tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(std::io::stderr);
            match color {
                WhenColor::Always => layer.with_ansi(true),
                WhenColor::Never => layer.with_ansi(false),
                WhenColor::Auto => layer,
            }
            .with_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_env_var(LOG_ENV_VAR)
                    .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
                    .from_env_lossy(),
            )
        })
        .with(flame_layer);

    Ok((logger, flame_guard))
}
