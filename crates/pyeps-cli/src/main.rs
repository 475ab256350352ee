use clap::{Parser, Subcommand};
use pyeps::{
    commands::{descriptor, find, list, origin, project},
    exit_codes::{self, Family},
    logger,
    runtime::{load_config, RuntimeSelection},
    GlobalOpts,
};
use std::io::Write;

#[derive(Parser)]
#[command(name = "pyeps")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Locate Python entry points",
    long_about = "pyeps lists entry points of installed Python packages, reads them from \
                  setup.py and pyproject.toml files, and finds the file and line where an \
                  entry point's callable is defined. Python code is never executed."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entry points of installed packages
    List {
        /// Only entry points in this group
        group: Option<String>,
    },
    /// Read the entry points a setup.py descriptor registers
    Descriptor {
        /// Treat SOURCE as script text instead of a path
        #[arg(long)]
        inline: bool,
        /// Path to setup.py, or its text
        source: String,
        /// Only entry points in this group
        group: Option<String>,
    },
    /// Read the entry points a pyproject.toml declares
    Project {
        /// Treat SOURCE as manifest text instead of a path
        #[arg(long)]
        inline: bool,
        /// Path to pyproject.toml, or its text
        source: String,
        /// Only entry points in this group
        group: Option<String>,
    },
    /// Find where an installed entry point is defined
    Find {
        /// Entry point name
        name: String,
        /// Entry point group
        group: String,
    },
    /// Print the file a module would be loaded from
    Origin {
        /// Dotted module name
        module: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init(cli.global.verbosity_level(), cli.global.quiet) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }

    let config = load_config(&cli.global);
    let selection = RuntimeSelection::new(&cli.global, &config);

    let (family, result) = match &cli.command {
        Commands::List { group } => (Family::List, list::handle_list(group.as_deref(), &selection)),
        Commands::Descriptor {
            inline,
            source,
            group,
        } => (
            Family::Descriptor,
            descriptor::handle_descriptor(source, *inline, group.as_deref()),
        ),
        Commands::Project {
            inline,
            source,
            group,
        } => (
            Family::Project,
            project::handle_project(source, *inline, group.as_deref()),
        ),
        Commands::Find { name, group } => (Family::Find, find::handle_find(name, group, &selection)),
        Commands::Origin { module } => (Family::Origin, origin::handle_origin(module, &selection)),
    };

    let code = match result {
        Ok(output) => write_output(&output),
        Err(e) => {
            logger::error(&format!("{:#}", e));
            exit_codes::for_error(family, &e)
        }
    };
    std::process::exit(code);
}

/// Write the whole result at once; a broken stdout is unexpected
fn write_output(output: &str) -> i32 {
    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(output.as_bytes()).and_then(|()| stdout.flush()) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            logger::error(&format!("Failed to write output: {}", e));
            exit_codes::UNEXPECTED
        }
    }
}
