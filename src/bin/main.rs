use clap::{Parser, Subcommand};
use particle_linking::{CsvTrajectory, LinkConfig, PredictorKind, Trajectory};
use std::path::PathBuf;

/// Command-line tool for linking particle positions into trajectories
#[derive(Parser)]
#[command(name = "particle-link")]
#[command(about = "Link particle positions across frames into trajectories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link particle positions and add a trajectory id column
    Link {
        /// Path to the particle CSV file (must contain the position and frame columns)
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV path (default: overwrite the input file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML file with linking parameters; flags below take precedence
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum displacement between consecutive frames (default: 1.5)
        #[arg(short, long)]
        search_range: Option<f64>,

        /// Frames a particle may vanish and keep its id (default: 0)
        #[arg(short, long)]
        memory: Option<usize>,

        /// Largest subnetwork solved exactly (default: 45)
        #[arg(long)]
        max_subnet_size: Option<usize>,

        /// Enable adaptive search, never shrinking the search range below this value
        #[arg(long)]
        adaptive_stop: Option<f64>,

        /// Factor applied to the search range at each adaptive step (default: 0.95)
        #[arg(long)]
        adaptive_step: Option<f64>,

        /// Comma-separated position columns (default: x,y,z)
        #[arg(long, value_delimiter = ',')]
        pos_columns: Option<Vec<String>>,

        /// Frame column (default: frame)
        #[arg(long)]
        frame_column: Option<String>,

        /// Name of the trajectory id column to write (default: particle)
        #[arg(long)]
        particle_column: Option<String>,

        /// Motion predictor (default: nearest-velocity)
        #[arg(long, value_enum)]
        predictor: Option<PredictorKind>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Summarize a linked CSV: first frame, last frame and length of every trajectory
    Summarize {
        /// Path to the linked CSV (from link command)
        #[arg(short, long)]
        input: PathBuf,

        /// Trajectory id column (default: particle)
        #[arg(long, default_value = "particle")]
        particle_column: String,

        /// Frame column (default: frame)
        #[arg(long, default_value = "frame")]
        frame_column: String,

        /// Output CSV path (default: auto-generated from input path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Link {
            input,
            output,
            config,
            search_range,
            memory,
            max_subnet_size,
            adaptive_stop,
            adaptive_step,
            pos_columns,
            frame_column,
            particle_column,
            predictor,
            quiet,
        } => {
            println!("Linking particles: {:?}", input);

            let mut link_config = match config {
                Some(path) => match LinkConfig::from_toml_file(&path) {
                    Ok(c) => {
                        println!("✅ Loaded config from {:?}", path);
                        c
                    }
                    Err(e) => {
                        eprintln!("❌ Error loading config: {}", e);
                        std::process::exit(1);
                    }
                },
                None => LinkConfig::default(),
            };

            if let Some(v) = search_range {
                link_config.search_range = v;
            }
            if let Some(v) = memory {
                link_config.memory = v;
            }
            if let Some(v) = max_subnet_size {
                link_config.max_subnet_size = v;
            }
            if adaptive_stop.is_some() {
                link_config.adaptive_stop = adaptive_stop;
            }
            if let Some(v) = adaptive_step {
                link_config.adaptive_step = v;
            }
            if let Some(v) = pos_columns {
                link_config.pos_columns = v;
            }
            if let Some(v) = frame_column {
                link_config.frame_column = v;
            }
            if let Some(v) = particle_column {
                link_config.particle_column = v;
            }
            if let Some(v) = predictor {
                link_config.predictor = v;
            }

            println!(
                "Search range: {}, memory: {}, max subnet size: {}",
                link_config.search_range, link_config.memory, link_config.max_subnet_size
            );

            let traj = CsvTrajectory::new(&input);

            match traj.link(&link_config, output.as_deref(), !quiet) {
                Ok(summary) => {
                    println!(
                        "✅ Linked {} rows across {} frames into {} trajectories",
                        summary.rows, summary.frames, summary.trajectories
                    );
                    let written = output.unwrap_or(input);
                    println!("📄 Results saved to: {:?}", written);
                }
                Err(e) => {
                    eprintln!("❌ Error linking trajectories: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Summarize {
            input,
            particle_column,
            frame_column,
            output,
        } => {
            println!("Summarizing trajectories: {:?}", input);

            let traj = CsvTrajectory::new(&input);

            match traj.summarize(&particle_column, &frame_column, output.as_deref()) {
                Ok(tracks) => {
                    println!("✅ Summarized {} trajectories", tracks.len());
                    let written = output.unwrap_or_else(|| traj.tracks_path());
                    println!("📄 Summary saved to: {:?}", written);
                }
                Err(e) => {
                    eprintln!("❌ Error summarizing trajectories: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
