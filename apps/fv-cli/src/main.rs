use clap::{Parser, Subcommand, ValueEnum};
use fv_controls::ControllerConfig;
use fv_core::{RoomId, SECONDS_PER_HOUR};
use fv_project::{ControllerDef, ProjectError, ValidationError, build_scenario, controller_config};
use fv_sim::{SimError, SimRecord, Simulation};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level, debug};

#[derive(Parser)]
#[command(name = "fv-cli")]
#[command(about = "floorvalve CLI - valve control for floor heating loops", long_about = None)]
struct Cli {
    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a site file
    Validate {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
    },
    /// List rooms in a site and their effective controller settings
    Rooms {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
    },
    /// Print the default controller settings
    Defaults {
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },
    /// Run a site through the closed-loop simulation
    Simulate {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
        /// Override the end time in hours
        #[arg(long)]
        hours: Option<f64>,
        /// Override the plant time step in seconds
        #[arg(long)]
        dt: Option<f64>,
        /// Print the full record as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Write the recorded samples as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

type CliResult<T> = Result<T, CliError>;

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Validate { site_path } => cmd_validate(&site_path),
        Commands::Rooms { site_path } => cmd_rooms(&site_path),
        Commands::Defaults { format } => cmd_defaults(format),
        Commands::Simulate {
            site_path,
            hours,
            dt,
            json,
            csv,
        } => cmd_simulate(&site_path, hours, dt, json, csv.as_deref()),
    }
}

fn cmd_validate(site_path: &Path) -> CliResult<()> {
    println!("Validating site: {}", site_path.display());
    let site = fv_project::load(site_path)?;
    let warnings = fv_project::validate_site(&site)?;
    for warning in &warnings {
        println!("⚠ {}", warning);
    }
    println!("✓ Site is valid ({} rooms)", site.rooms.len());
    Ok(())
}

fn cmd_rooms(site_path: &Path) -> CliResult<()> {
    let site = fv_project::load(site_path)?;

    if site.rooms.is_empty() {
        println!("No rooms found in site");
        return Ok(());
    }
    println!("Rooms in '{}':", site.name);
    for room in &site.rooms {
        let config = controller_config(&room.id, &room.controller)?;
        let step = config
            .valve_step()
            .map(|s| format!("step {}", s.label()))
            .unwrap_or_else(|| format!("{}%", config.max_step_percent()));
        println!(
            "  {} - {} (target {:.1} °C, {}, max {}, min cycle {:.0}s)",
            room.id,
            room.display_name(),
            config.clamp_target(room.target_c),
            config.mode(),
            step,
            config.min_cycle_duration_s()
        );
    }
    Ok(())
}

fn cmd_defaults(format: Format) -> CliResult<()> {
    let def = ControllerDef::from_config(&ControllerConfig::default());
    let text = match format {
        Format::Yaml => serde_yaml::to_string(&def)?,
        Format::Json => serde_json::to_string_pretty(&def)? + "\n",
    };
    print!("{}", text);
    Ok(())
}

fn cmd_simulate(
    site_path: &Path,
    hours: Option<f64>,
    dt: Option<f64>,
    json: bool,
    csv: Option<&Path>,
) -> CliResult<()> {
    let site = fv_project::load(site_path)?;
    let (scenario, mut opts) = build_scenario(&site)?;
    if let Some(hours) = hours {
        opts.t_end = hours * SECONDS_PER_HOUR;
    }
    if let Some(dt) = dt {
        opts.dt = dt;
    }
    let t_end = opts.t_end;
    if !json {
        println!("Simulating site: {} ({} rooms)", site.name, scenario.rooms.len());
        println!("  dt = {:.1} s, t_end = {:.1} h", opts.dt, t_end / SECONDS_PER_HOUR);
    }

    let started = Instant::now();
    let mut sim = Simulation::new(scenario, opts)?;
    let mut last_fraction = -1.0_f64;
    while !sim.is_finished() {
        sim.step()?;
        let fraction = if t_end > 0.0 { sim.time() / t_end } else { 1.0 };
        if !json && (fraction - last_fraction) >= 0.01 {
            render_progress(fraction.min(1.0), sim.time(), t_end);
            last_fraction = fraction;
        }
    }
    let record = sim.finish();
    debug!(wall_s = started.elapsed().as_secs_f64(), "simulation wall time");

    if let Some(path) = csv {
        write_csv(path, &record)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    clear_progress_line();
    println!("✓ Simulation completed in {:.2}s", started.elapsed().as_secs_f64());
    print_summary(&record, t_end);
    if let Some(path) = csv {
        println!("✓ Exported {} samples to {}", record.samples.len(), path.display());
    }
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(80));
    let _ = io::stdout().flush();
}

fn render_progress(fraction: f64, t: f64, t_end: f64) {
    let width = 28usize;
    let filled = ((fraction * width as f64).round() as usize).min(width);
    print!(
        "\r[{}{}] {:>6.2}%  t={:.1}/{:.1}h",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled)),
        fraction * 100.0,
        t / SECONDS_PER_HOUR,
        t_end / SECONDS_PER_HOUR
    );
    let _ = io::stdout().flush();
}

fn print_summary(record: &SimRecord, t_end: f64) {
    println!("\nRooms:");
    for snapshot in &record.snapshots {
        let room: &RoomId = &snapshot.room_id;
        // Last quarter of the run.
        let tail: Vec<f64> = record
            .samples_for(room)
            .filter(|s| s.t >= 0.75 * t_end)
            .map(|s| s.room_c)
            .collect();
        let commands = record.commands.iter().filter(|c| &c.room == room).count();
        println!("  {} ({})", room, snapshot.mode);
        if let Some(target) = snapshot.target_temperature {
            println!("    Target:       {:.1} °C", target);
        }
        if let Some(current) = snapshot.current_temperature {
            println!("    Final:        {:.2} °C", current);
        }
        if !tail.is_empty() {
            let mean = tail.iter().sum::<f64>() / tail.len() as f64;
            let min = tail.iter().copied().fold(f64::INFINITY, f64::min);
            let max = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            println!("    Last quarter: mean {:.2} °C, range {:.2} - {:.2} °C", mean, min, max);
        }
        println!(
            "    Valve:        {}% commanded, {} commands",
            snapshot.commanded_position, commands
        );
        if let Some(avg) = snapshot.average_position {
            println!("    Avg position: {:.1}%", avg);
        }
        let exercise = &snapshot.exercise;
        match exercise.last_exercise_time {
            Some(t) => println!("    Exercise:     {} (last at {})", exercise.state, t),
            None => println!("    Exercise:     {}", exercise.state),
        }
    }
    println!("\n  Commands: {}", record.commands.len());
    println!("  Failed events: {}", record.errors);
}

fn write_csv(path: &Path, record: &SimRecord) -> CliResult<()> {
    let mut csv = String::from("time_s,room,room_c,slab_c,valve,commanded\n");
    for s in &record.samples {
        csv.push_str(&format!(
            "{},{},{:.4},{:.4},{:.2},{}\n",
            s.t, s.room, s.room_c, s.slab_c, s.valve, s.commanded
        ));
    }
    std::fs::write(path, csv)?;
    Ok(())
}
