use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use axisim::sim::config::{Config, FabricConfig, SimConfig, Topology, TrafficConfig};
use axisim::sim::log::init_logging;
use axisim::sim::top::{Sim, SimReport};
use clap::Parser;
use toml::Table;

#[derive(Parser)]
#[command(version, about)]
struct AxisimArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override the cycle limit")]
    cycles: Option<u64>,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug, 3:trace)")]
    log: Option<u64>,
    #[arg(long, help = "Override the random seed")]
    seed: Option<u64>,
    #[arg(long, help = "Override the topology")]
    topology: Option<Topology>,
    #[arg(long, help = "Write a CSV of sink transfers")]
    trace: Option<PathBuf>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

fn print_summary(report: &SimReport) {
    println!("topology: {:?}", report.topology);
    println!("cycles: {}", report.cycles);
    println!("beats sent: {}", report.beats_sent);
    for sink in &report.sinks {
        println!("{}: {} beats, {} frames", sink.port, sink.beats, sink.frames);
    }
    for (name, counters) in &report.status {
        println!(
            "{}: overflow={} bad_frame={} good_frame={}",
            name, counters.overflow, counters.bad_frame, counters.good_frame
        );
    }
    if report.unrouted > 0 {
        println!("unrouted frames: {}", report.unrouted);
    }
    if report.outstanding > 0 {
        println!("outstanding frames: {}", report.outstanding);
    }
    for v in &report.violations {
        println!("protocol violation: {}", v);
    }
    for m in &report.mismatches {
        println!("mismatch: {}", m);
    }
    println!("{}", if report.passed() { "PASS" } else { "FAIL" });
}

fn run(argv: AxisimArgs) -> anyhow::Result<bool> {
    let config = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;
    let config_table: Table = toml::from_str(&config).context("cannot parse config toml")?;
    let mut sim_config = SimConfig::from_section(config_table.get("sim"))?;
    let traffic_config = TrafficConfig::from_section(config_table.get("traffic"))?;
    let mut fabric_config = FabricConfig::from_section(config_table.get("fabric"))?;

    // override toml configs with argv
    sim_config.log_level = argv.log.unwrap_or(sim_config.log_level);
    sim_config.cycles = argv.cycles.unwrap_or(sim_config.cycles);
    sim_config.seed = argv.seed.unwrap_or(sim_config.seed);
    sim_config.trace = argv.trace.or(sim_config.trace);
    fabric_config.topology = argv.topology.unwrap_or(fabric_config.topology);

    init_logging(sim_config.log_level);

    let mut sim = Sim::new(sim_config, traffic_config, fabric_config)?;
    let report = sim.simulate()?;
    if argv.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(report.passed())
}

pub fn main() -> ExitCode {
    let argv = AxisimArgs::parse();
    match run(argv) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
