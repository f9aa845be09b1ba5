//! Command line surface: positional `main_folder`, plus configuration flags.
//! Configuration layers a config file loaded through the `config` crate, with
//! CLI flags overriding whatever it sets and hard defaults underneath.

use std::path::PathBuf;

use clap::Parser;
use config::{Config, File};
use serde::{Deserialize, Serialize};

use vtrie_core::PipelineConfig;

use crate::error::CliError;

/// on platforms where forking breaks the geometry backend, workers must spawn
/// fresh rather than fork. This is a deployment toggle, not a correctness
/// concern — `rayon`'s global pool already always spawns fresh OS threads, so
/// this flag is accepted and otherwise a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize, Default)]
pub enum StartMethod {
    #[default]
    Spawn,
    Fork,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct VtrieApp {
    /// root of the conventional directory layout (`0_external/` … `7_requests/`).
    pub main_folder: PathBuf,

    /// optional TOML config file overlaying the defaults below; CLI flags take
    /// precedence over whatever it sets.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StartMethod::Spawn)]
    pub start_method: StartMethod,

    #[arg(long)]
    pub wkid: Option<i32>,

    /// a document-store URL prefix to emit alongside output rows; unused by the
    /// core, plumbed through for a downstream document-store collaborator.
    #[arg(long)]
    pub hyperlink: Option<String>,

    #[arg(long)]
    pub snap_distance_bound_m: Option<f64>,

    #[arg(long)]
    pub parallelism: Option<usize>,

    /// global timeout, e.g. `30m`, `2h`; unset is unlimited.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<std::time::Duration>,
}

impl VtrieApp {
    /// resolves the layered [`PipelineConfig`]: CLI flags, then the config
    /// file, then hard defaults.
    pub fn resolve_pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        let mut builder = Config::builder();
        if let Some(path) = &self.config {
            builder = builder.add_source(File::from(path.as_path()));
        }
        let file_config = builder.build()?;

        let wkid = self
            .wkid
            .or_else(|| file_config.get::<i32>("wkid").ok())
            .unwrap_or(4326);
        let snap_distance_bound_m = self
            .snap_distance_bound_m
            .or_else(|| file_config.get::<f64>("snap_distance_bound_m").ok())
            .unwrap_or(vtrie_core::geolocator::DEFAULT_SNAP_DISTANCE_BOUND_M);
        let timeout = self.timeout.or_else(|| {
            file_config
                .get::<String>("timeout")
                .ok()
                .and_then(|s| humantime::parse_duration(&s).ok())
        });
        let qaqc_lookback_orders = file_config
            .get::<Vec<usize>>("qaqc_lookback_orders")
            .ok()
            .and_then(|v| <[usize; 3]>::try_from(v).ok())
            .unwrap_or(PipelineConfig::default().qaqc_lookback_orders);
        let stationary_distance_m = file_config
            .get::<f64>("stationary_distance_m")
            .unwrap_or(PipelineConfig::default().stationary_distance_m);
        let speed_ceiling_kmh = file_config
            .get::<f64>("speed_ceiling_kmh")
            .unwrap_or(PipelineConfig::default().speed_ceiling_kmh);
        let max_arrival_offset_s = file_config
            .get::<f64>("max_arrival_offset_s")
            .unwrap_or(PipelineConfig::default().max_arrival_offset_s);

        Ok(PipelineConfig {
            wkid,
            snap_distance_bound_m,
            qaqc_lookback_orders,
            stationary_distance_m,
            speed_ceiling_kmh,
            max_arrival_offset_s,
            timeout,
        })
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(num_cpus_or_one)
    }
}

fn num_cpus_or_one() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
