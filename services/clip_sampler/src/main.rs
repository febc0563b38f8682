mod configuration;
mod job;

use anyhow::{anyhow, Result};
use configuration::ServiceConfiguration;
use job::ClipJob;
use log::{debug, info};
use std::env::args;
use std::io::{BufWriter, Write};

fn main() -> Result<()> {
    env_logger::init();
    info!(
        "Clip sampler, vidseg_core version {} ({:08x})",
        vidseg_core::version(),
        vidseg_core::version_crc32()
    );

    let conf_arg = args()
        .nth(1)
        .ok_or_else(|| anyhow!("missing configuration argument"))?;
    info!("Configuration: {}", conf_arg);
    let conf = ServiceConfiguration::new(&conf_arg)?;
    debug!("Configuration: {:?}", conf);

    let job = ClipJob::new(&conf)?;
    info!(
        "Sampling {} clips from each of {} records",
        conf.sampling.clips_per_record,
        job.record_count()
    );
    let summaries = job.run()?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for summary in &summaries {
        writeln!(out, "{}", serde_json::to_string(summary)?)?;
    }
    out.flush()?;
    info!("Emitted {} clips", summaries.len());
    Ok(())
}
