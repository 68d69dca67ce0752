use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use voxreg::image::io::{load_image, save_image};
use voxreg::kernel::{BSplineKernel, Boundary};
use voxreg::plugin::split_chain;
use voxreg::transform::warp::warp;
use voxreg::{
    FilterChain, Image, NonrigidRegister, PluginCategory, Registry, RegistrationConfig, Size2D,
    StepSink, VoxRegError, VoxRegResult,
};

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "voxreg image registration toolbox")]
struct Cli {
    /// Print the JSON schema of the register configuration and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example register configuration and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long, global = true)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a filter chain over an image.
    Filter {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Filter descriptors, applied in order (a single `a+b` chain works too).
        #[arg(value_name = "DESCR", required = true)]
        filters: Vec<String>,
    },
    /// Register a moving image to a fixed image.
    Register {
        /// JSON configuration; flags override its values.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(short = 'i', long, value_name = "FILE")]
        source: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        reference: Option<PathBuf>,
        /// Transformation output file.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Cost term descriptor; repeat for several terms.
        #[arg(long = "cost", value_name = "DESCR")]
        costs: Vec<String>,
        #[arg(long, value_name = "DESCR")]
        transform: Option<String>,
        #[arg(long, value_name = "DESCR")]
        minimizer: Option<String>,
        #[arg(long, value_name = "N")]
        levels: Option<usize>,
        /// Write the deformed source image.
        #[arg(long, value_name = "FILE")]
        deformed: Option<PathBuf>,
        /// Write the deformed source of every level into this directory.
        #[arg(long, value_name = "DIR")]
        save_steps: Option<PathBuf>,
    },
    /// List plugins and their parameters.
    Plugins {
        /// Restrict the listing to one category.
        category: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RegisterJson {
    source: Option<PathBuf>,
    reference: Option<PathBuf>,
    output: Option<PathBuf>,
    deformed: Option<PathBuf>,
    save_steps: Option<PathBuf>,
    registration: RegistrationConfig,
}

/// Saves the deformed source of every level as `step-<level>.png`.
struct DirectorySink {
    dir: PathBuf,
}

impl StepSink for DirectorySink {
    fn save_step(&mut self, level: usize, size: Size2D, image: &Image) -> VoxRegResult<()> {
        let path = self.dir.join(format!("step-{level}.png"));
        tracing::info!(level, %size, path = %path.display(), "saving level result");
        save_image(&path, image)
    }
}

fn required(value: Option<PathBuf>, what: &str) -> VoxRegResult<PathBuf> {
    value.ok_or_else(|| VoxRegError::invalid(format!("no {what} given")))
}

fn run_filter(registry: &Registry, input: &Path, output: &Path, filters: &[String]) -> VoxRegResult<()> {
    let mut members = Vec::new();
    for descriptor in filters {
        members.extend(split_chain(descriptor)?);
    }
    let chain = FilterChain::from_descriptors(registry, &members)?;
    let image = load_image(input)?;
    let result = chain.run(&image)?;
    save_image(output, &result)
}

#[allow(clippy::too_many_arguments)]
fn run_register(
    registry: &Registry,
    config: Option<PathBuf>,
    source: Option<PathBuf>,
    reference: Option<PathBuf>,
    output: Option<PathBuf>,
    costs: Vec<String>,
    transform: Option<String>,
    minimizer: Option<String>,
    levels: Option<usize>,
    deformed: Option<PathBuf>,
    save_steps: Option<PathBuf>,
) -> VoxRegResult<()> {
    let mut json = match &config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|err| VoxRegError::Io {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
            serde_json::from_str::<RegisterJson>(&text).map_err(|err| {
                VoxRegError::invalid(format!("{}: {err}", path.display()))
            })?
        }
        None => RegisterJson::default(),
    };
    if !costs.is_empty() {
        json.registration.costs = costs;
    }
    if let Some(transform) = transform {
        json.registration.transform = transform;
    }
    if let Some(minimizer) = minimizer {
        json.registration.minimizer = minimizer;
    }
    if let Some(levels) = levels {
        json.registration.levels = levels;
    }
    let source = required(source.or(json.source), "source image (-i)")?;
    let reference = required(reference.or(json.reference), "reference image (-r)")?;
    let output = required(output.or(json.output), "transformation output (-o)")?;
    let deformed = deformed.or(json.deformed);
    let save_steps = save_steps.or(json.save_steps);

    let mut engine = NonrigidRegister::new(registry, json.registration)?;
    if let Some(dir) = save_steps {
        fs::create_dir_all(&dir).map_err(|err| VoxRegError::Io {
            path: dir.display().to_string(),
            reason: err.to_string(),
        })?;
        engine = engine.with_step_sink(Box::new(DirectorySink { dir }));
    }

    let src = load_image(&source)?;
    let reference = load_image(&reference)?;
    let outcome = engine.run(&src, &reference)?;
    for (level, report) in outcome.levels.iter().enumerate() {
        tracing::info!(
            level,
            size = %report.size,
            parameters = report.parameters,
            initial = report.initial_cost,
            final_cost = report.final_cost,
            converged = report.outcome.converged,
            "level finished"
        );
    }
    voxreg::write_transform_file(&output, outcome.transform.as_ref())?;
    if let Some(path) = deformed {
        let image = warp(&src, outcome.transform.as_ref(), BSplineKernel::cubic(), Boundary::Mirror)?;
        save_image(&path, &image)?;
    }
    Ok(())
}

fn run_plugins(registry: &Registry, category: Option<String>) -> VoxRegResult<()> {
    let categories = match category {
        Some(name) => vec![name.parse::<PluginCategory>()?],
        None => PluginCategory::ALL.to_vec(),
    };
    for category in categories {
        println!("{}:", category.name());
        print!("{}", registry.help(category));
    }
    Ok(())
}

fn run(cli: Cli) -> VoxRegResult<()> {
    let registry = Registry::with_defaults();
    match cli.command {
        Some(Command::Filter {
            input,
            output,
            filters,
        }) => run_filter(&registry, &input, &output, &filters),
        Some(Command::Register {
            config,
            source,
            reference,
            output,
            costs,
            transform,
            minimizer,
            levels,
            deformed,
            save_steps,
        }) => run_register(
            &registry, config, source, reference, output, costs, transform, minimizer, levels,
            deformed, save_steps,
        ),
        Some(Command::Plugins { category }) => run_plugins(&registry, category),
        None => Err(VoxRegError::invalid(
            "no command given, see --help for filter, register and plugins",
        )),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        let filter = match "voxreg=info".parse() {
            Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
            Err(_) => EnvFilter::from_default_env(),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return ExitCode::SUCCESS;
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
