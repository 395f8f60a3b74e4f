//! `teslog parse`: build session logs from snapshot files, stdin, or a
//! followed file.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::info;

use teslog_core::{CachedLocator, CoordinateLocator, Locate, Pipeline, PipelineOptions, StreamSink};

use crate::archive::RotatingSink;
use crate::config::{parse_zone, TeslogConfig};
use crate::db::Db;
use crate::geocode::NominatimGeocoder;
use crate::input::{Follower, Input};

const FOLLOW_POLL: Duration = Duration::from_millis(500);

#[derive(Args, Debug, Default)]
pub struct ParseArgs {
    /// Snapshot files to read in order; `-` is stdin. Stdin when none given.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Keep reading FILE as it grows, after the other inputs
    #[arg(short, long, value_name = "FILE")]
    pub follow: Option<PathBuf>,

    /// Lines of the followed file to replay before following
    #[arg(short = 'n', long)]
    pub numlines: Option<usize>,

    /// Display zone for reports: local, utc, +HH:MM, or a name like America/Los_Angeles
    #[arg(long)]
    pub timezone: Option<String>,

    /// Archive every accepted line into hourly-rotated files under DIR
    #[arg(long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,

    /// Do not print session reports
    #[arg(long)]
    pub nosummary: bool,

    /// Copy every accepted line to stdout
    #[arg(long)]
    pub echo: bool,

    /// Persist sessions to this SQLite file (enables the store)
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Resolve towns and addresses with the reverse geocoder
    #[arg(long)]
    pub geocode: bool,

    /// Also accept snapshots taken while the car was not online
    #[arg(long)]
    pub want_offline: bool,

    /// Close and report open sessions when the input ends
    #[arg(long)]
    pub close_at_end: bool,
}

pub fn run(args: &ParseArgs, config: &TeslogConfig) -> Result<(), String> {
    let zone = match &args.timezone {
        Some(timezone) => parse_zone(timezone)?,
        None => config.zone()?,
    };
    let options = PipelineOptions {
        want_offline: args.want_offline || config.want_offline,
        summary: !args.nosummary,
        gap_alert_secs: config.gap_alert_secs,
        zone,
        close_at_end: args.close_at_end,
    };

    let use_store = args.store.is_some() || config.store.enabled;
    let geocode = args.geocode || config.geocode.enabled;
    let db = if use_store || geocode {
        let path = match &args.store {
            Some(path) => path.clone(),
            None => config.store_path()?,
        };
        info!(path = %path.display(), "Opening session store");
        Some(Db::new(path)?)
    } else {
        None
    };

    let locator: Box<dyn Locate + '_> = match db.as_ref().filter(|_| geocode) {
        Some(db) => Box::new(CachedLocator::with_zoom(
            NominatimGeocoder::new(&config.geocode)?,
            db,
            config.geocode.zoom,
        )),
        None => Box::new(CoordinateLocator),
    };

    let archive = match args.outdir.as_ref().or(config.archive.outdir.as_ref()) {
        Some(outdir) => {
            let sink = RotatingSink::new(outdir.clone())?;
            info!(outdir = %sink.outdir().display(), "Archiving accepted lines");
            Some(sink)
        }
        None => None,
    };
    let echo = args.echo.then(|| StreamSink::new(io::stdout()));

    let mut pipeline = Pipeline::new(options, locator.as_ref(), io::stdout());
    if let Some(db) = db.as_ref().filter(|_| use_store) {
        pipeline = pipeline.with_store(db);
    }
    if let Some(sink) = &archive {
        pipeline = pipeline.with_sink(sink);
    }
    if let Some(sink) = &echo {
        pipeline = pipeline.with_sink(sink);
    }

    let inputs: Vec<Input> = if args.files.is_empty() && args.follow.is_none() {
        vec![Input::Stdin]
    } else {
        args.files.iter().map(|path| Input::from_arg(path)).collect()
    };
    for input in &inputs {
        info!(input = %input.label(), "Reading input");
        let reader = input.open()?;
        pipeline.run(reader)?;
    }

    if let Some(path) = &args.follow {
        let lines = args.numlines.unwrap_or(config.follow_lines);
        let mut follower = Follower::open(path, lines)?;
        follower.run(FOLLOW_POLL, |line| {
            pipeline.process_line(line).map_err(String::from)
        })?;
    }

    pipeline.finish()?;
    Ok(())
}
