use capsium::package::Package;
use capsium::package::metadata::Metadata;
use capsium::{config, output, packager};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capsium")]
#[command(about = "Load, inspect, and pack Capsium content packages")]
#[command(long_about = "\
Load, inspect, and pack Capsium content packages

A package is a directory (or a .cap zip archive of one) holding static web
content, optional datasets, and four JSON documents describing them.

Package structure:

  my_package/
  ├── metadata.json        # name, version (required)
  ├── manifest.json        # content inventory (generated when absent)
  ├── routes.json          # URL → file or dataset (generated when absent)
  ├── storage.json         # dataset registry (generated when absent)
  ├── content/
  │   └── index.html       # served at / and /index
  └── data/
      ├── animals.yaml     # dataset, served at /api/v1/data/animals
      └── animals_schema.yaml

Every command that takes PACKAGE accepts a directory or a .cap archive.
Archives are extracted to a private scratch directory, removed on exit.

Run 'capsium gen-config' to generate a documented capsium.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./capsium.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show metadata, content, datasets, and routes
    Info { package: PathBuf },
    /// Show metadata.json
    Metadata { package: PathBuf },
    /// Show the content manifest
    Manifest { package: PathBuf },
    /// Show registered datasets
    Storage { package: PathBuf },
    /// Show the route table
    Routes { package: PathBuf },
    /// Validate routes and dataset schemas without writing anything
    Check { package: PathBuf },
    /// Write the generated documents into a package directory
    Solidify { package: PathBuf },
    /// Create <name>-<version>.cap from a package
    Pack {
        package: PathBuf,
        /// Output directory (overrides pack.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing archive (overrides pack.force)
        #[arg(short, long, overrides_with = "no_force")]
        force: bool,
        /// Refuse to overwrite even when pack.force is set
        #[arg(long, overrides_with = "force")]
        no_force: bool,
    },
    /// Extract a .cap archive into a directory
    Unpack {
        archive: PathBuf,
        /// Destination directory (default: ./<archive stem>)
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// Create a new package skeleton
    New {
        dir: PathBuf,
        /// Package name (default: directory name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "0.1.0")]
        version: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Print a stock capsium.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Info { package } => {
            let package = Package::load(&package)?;
            output::print_info(&package);
            package.dispose()?;
        }
        Command::Metadata { package } => {
            let package = Package::load(&package)?;
            output::print_metadata(package.metadata());
            package.dispose()?;
        }
        Command::Manifest { package } => {
            let package = Package::load(&package)?;
            output::print_manifest(package.manifest());
            package.dispose()?;
        }
        Command::Storage { package } => {
            let package = Package::load(&package)?;
            output::print_storage(package.storage());
            package.dispose()?;
        }
        Command::Routes { package } => {
            let package = Package::load(&package)?;
            output::print_routes(package.routes());
            package.dispose()?;
        }
        Command::Check { package } => {
            println!("==> Checking {}", package.display());
            let mut package = Package::load(&package)?;
            package.validate()?;
            output::print_check(&package);
            package.dispose()?;
        }
        Command::Solidify { package } => {
            let package = Package::load(&package)?;
            if package.load_type() == capsium::package::LoadType::Archive {
                return Err("solidify needs a package directory, not an archive".into());
            }
            package.solidify()?;
            println!("==> Wrote documents to {}", package.root().display());
        }
        Command::Pack {
            package,
            output,
            force,
            no_force,
        } => {
            let settings = config::load_config(cli.config.as_deref())?;
            let force_flag = match (force, no_force) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let force = settings.pack.resolve_force(force_flag);
            let output_dir = output.unwrap_or(settings.pack.output_dir);
            let options = packager::PackOptions::new(output_dir).force(force);

            let package = Package::load(&package)?;
            let archive = packager::pack(&package, &options)?;
            let digest = packager::archive_digest(&archive)?;
            output::print_pack_output(package.metadata(), &archive, &digest);
            package.dispose()?;
        }
        Command::Unpack { archive, dest } => {
            let dest = dest.unwrap_or_else(|| default_unpack_dir(&archive));
            let entries = packager::unpack(&archive, &dest)?;
            output::print_unpack_output(&archive, &dest, entries);
        }
        Command::New {
            dir,
            name,
            version,
            description,
        } => {
            let name = match name {
                Some(name) => name,
                None => dir_name(&dir).ok_or("cannot derive a package name, pass --name")?,
            };
            let mut metadata = Metadata::new(name, version);
            metadata.description = description;
            let package = Package::init(&dir, metadata)?;
            println!("==> Created {}", package.root().display());
            output::print_routes(package.routes());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "capsium=debug" } else { "capsium=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_unpack_dir(archive: &Path) -> PathBuf {
    archive
        .file_stem()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("unpacked"))
}

fn dir_name(dir: &Path) -> Option<String> {
    std::path::absolute(dir)
        .ok()?
        .file_name()?
        .to_str()
        .map(String::from)
}
