use crate::config::Config;
use anyhow::{Context, Result};
use epidyn::{
    Integrator, SweepSettings, sweep_r0,
    utils::{arange, linspace},
};
use glob::glob;
use rmp_serde::encode;
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
    integrator: Integrator,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        let integrator = Integrator::new(cfg.solver);

        Ok(Self {
            sim_dir,
            cfg,
            integrator,
        })
    }

    /// Integrate the model over the trace grid and save the trajectory in
    /// long format.
    pub fn run_trace(&self) -> Result<()> {
        let trace = &self.cfg.trace;
        let times = arange(trace.t_min, trace.t_max, trace.t_step);

        let trajectory = self
            .integrator
            .trace(
                &self.cfg.model,
                &self.cfg.init.state,
                (trace.t_min, trace.t_max),
                &times,
            )
            .context("failed to trace trajectory")?;
        log::info!("sampled {} states", trajectory.len());

        let records = trajectory.to_records();
        write_file(self.trajectory_file(), &records).context("failed to save trajectory")?;

        Ok(())
    }

    /// Sweep the basic reproduction number and save the final sizes.
    pub fn run_sweep(&self) -> Result<()> {
        let sweep = &self.cfg.sweep;
        let r0_values = linspace(sweep.r0_min, sweep.r0_max, sweep.n_points);
        let settings = SweepSettings {
            t_start: self.cfg.trace.t_min,
            horizon: sweep.horizon,
            compartment: sweep.compartment,
            on_failure: sweep.on_failure,
        };

        let result = sweep_r0(
            &self.integrator,
            &self.cfg.model,
            &self.cfg.init.state,
            &r0_values,
            &settings,
        )
        .context("failed to sweep reproduction number")?;

        let n_failed = result.n_failed();
        if n_failed > 0 {
            log::warn!("{n_failed} of {} sweep points failed", result.len());
        }

        write_file(self.sweep_file(), &result).context("failed to save sweep")?;

        Ok(())
    }

    /// Remove every output file from the simulation directory.
    pub fn clean_sim(&self) -> Result<()> {
        let pattern = self.sim_dir.join("*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for file in glob(pattern)
            .context("failed to glob output files")?
            .filter_map(Result::ok)
        {
            fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
            log::info!("removed {file:?}");
        }
        Ok(())
    }

    fn trajectory_file(&self) -> PathBuf {
        self.sim_dir.join("trajectory.msgpack")
    }

    fn sweep_file(&self) -> PathBuf {
        self.sim_dir.join("sweep.msgpack")
    }
}

fn write_file<P: AsRef<Path>, T: Serialize + ?Sized>(file: P, value: &T) -> Result<()> {
    let file = file.as_ref();
    let handle = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(handle);
    encode::write_named(&mut writer, value).context("failed to serialize value")?;
    writer.flush().context("failed to flush writer stream")?;
    log::info!("saved {file:?}");
    Ok(())
}
