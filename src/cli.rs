// ============================================================================
// Tessera CLI: drive the tiling engine from the command line
// ============================================================================
//
// Usage examples:
//   tessera create --source assets/paper4.jpg --cols 6 --rows 6
//   tessera session new <INSTANCE> 2 1
//   tessera session background <INSTANCE> <SESSION> -o start.jpg
//   tessera session submit <INSTANCE> <SESSION> -i edited.jpg
//   tessera composite <INSTANCE> -o composite.jpg
//
// Every command names its instance explicitly; there is no default instance.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::error;
use serde::Serialize;
use uuid::Uuid;

use tessera::{EngineSettings, Instance, Location, Session, Workspace};

/// Tessera tiling & compositing engine.
#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    version,
    about = "Split a source image into tiles, collect tile edits, rebuild the composite"
)]
pub struct CliArgs {
    /// Settings file (key=value). Defaults to the per-user config location.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Data directory, overriding `data_root` from the settings file.
    #[arg(long, global = true, value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// Clip tile overrides to their cell instead of letting them spill over.
    #[arg(long, global = true)]
    pub clip_overrides: bool,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an instance from a source image and build its first composite.
    Create {
        /// Source image. Defaults to `default_source` from the settings.
        #[arg(short, long, value_name = "IMAGE")]
        source: Option<PathBuf>,
        /// Grid columns. Defaults to `step_count_x`.
        #[arg(long)]
        cols: Option<u32>,
        /// Grid rows. Defaults to `step_count_y`.
        #[arg(long)]
        rows: Option<u32>,
    },
    /// Print an instance's metadata as JSON.
    Info { instance: Uuid },
    /// Rebuild an instance's composite from its source and tiles.
    Rebuild { instance: Uuid },
    /// Write an instance's current composite to a file.
    Composite {
        instance: Uuid,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// List the cells that have an override.
    Tiles { instance: Uuid },
    /// Editing sessions.
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Open a session on one cell and print it as JSON.
    New { instance: Uuid, x: u32, y: u32 },
    /// Print a session as JSON, searching every instance.
    Info { session: Uuid },
    /// Write a session's starting image to a file.
    Background {
        instance: Uuid,
        session: Uuid,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Submit an edit: an image file, or a text file holding base64 / a data-URI.
    Submit {
        instance: Uuid,
        session: Uuid,
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

impl CliArgs {
    /// Settings from the file, then command-line overrides on top.
    pub fn settings(&self) -> EngineSettings {
        let mut settings = match &self.config {
            Some(path) => EngineSettings::load_from(path),
            None => EngineSettings::load(),
        };
        if let Some(root) = &self.data_root {
            settings.data_root = root.clone();
        }
        if self.clip_overrides {
            settings.clip_overrides = true;
        }
        settings
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one command and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_command(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_command(args: &CliArgs) -> tessera::Result<()> {
    let workspace = Workspace::new(args.settings())?;

    match &args.command {
        Command::Create { source, cols, rows } => {
            let settings = workspace.settings();
            let source = source.clone().unwrap_or_else(|| settings.default_source.clone());
            let cols = cols.unwrap_or(settings.step_count_x);
            let rows = rows.unwrap_or(settings.step_count_y);
            let instance = Instance::create(&workspace, &source, cols, rows)?;
            instance.rebuild_composite()?;
            print_json(instance.record());
        }
        Command::Info { instance } => {
            let instance = Instance::open(&workspace, *instance)?;
            print_json(instance.record());
        }
        Command::Rebuild { instance } => {
            let instance = Instance::open(&workspace, *instance)?;
            instance.rebuild_composite()?;
        }
        Command::Composite { instance, output } => {
            let instance = Instance::open(&workspace, *instance)?;
            write_file(output, &instance.composite_bytes()?)?;
        }
        Command::Tiles { instance } => {
            let instance = Instance::open(&workspace, *instance)?;
            for location in instance.tile_locations()? {
                println!("{}", location);
            }
        }
        Command::Session(cmd) => run_session(&workspace, cmd)?,
    }
    Ok(())
}

fn run_session(workspace: &Arc<Workspace>, cmd: &SessionCommand) -> tessera::Result<()> {
    match cmd {
        SessionCommand::New { instance, x, y } => {
            let instance = Arc::new(Instance::open(workspace, *instance)?);
            let session = Session::create(&instance, Location::new(*x, *y))?;
            print_json(&session.record());
        }
        SessionCommand::Info { session } => {
            let session = Session::find(workspace, *session)?;
            print_json(&session.record());
        }
        SessionCommand::Background { instance, session, output } => {
            let instance = Arc::new(Instance::open(workspace, *instance)?);
            let session = Session::open(&instance, *session)?;
            write_file(output, &session.read_background()?)?;
        }
        SessionCommand::Submit { instance, session, input } => {
            let instance = Arc::new(Instance::open(workspace, *instance)?);
            let session = Session::open(&instance, *session)?;
            session.submit_edit(&read_input(input)?)?;
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("could not serialize output: {}", e),
    }
}

fn read_input(path: &Path) -> tessera::Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| tessera::Error::InputUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> tessera::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    tessera::BlobStore::new(dir).write(&tessera::BlobKey::new(name), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_session_commands() {
        let id = Uuid::new_v4();
        let args = CliArgs::try_parse_from(["tessera", "session", "new", &id.to_string(), "2", "1", "--data-root", "/tmp/x"])
            .unwrap();
        assert_eq!(args.data_root, Some(PathBuf::from("/tmp/x")));
        match args.command {
            Command::Session(SessionCommand::New { instance, x, y }) => {
                assert_eq!(instance, id);
                assert_eq!((x, y), (2, 1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_negative_coordinates_and_bad_ids() {
        let id = Uuid::new_v4().to_string();
        assert!(CliArgs::try_parse_from(["tessera", "session", "new", &id, "-1", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["tessera", "info", "not-a-uuid"]).is_err());
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited.jpg");
        match read_input(&path) {
            Err(tessera::Error::InputUnreadable { path: reported, source }) => {
                assert_eq!(reported, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected: {:?}", other),
        }

        std::fs::write(&path, b"payload").unwrap();
        assert_eq!(read_input(&path).unwrap(), b"payload");
    }

    #[test]
    fn command_line_overrides_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("tessera.cfg");
        std::fs::write(&cfg, "data_root=/from/file\nstep_count_x=3\n").unwrap();
        let args = CliArgs::try_parse_from([
            "tessera",
            "--config",
            cfg.to_str().unwrap(),
            "--clip-overrides",
            "tiles",
            &Uuid::new_v4().to_string(),
        ])
        .unwrap();
        let settings = args.settings();
        assert_eq!(settings.data_root, PathBuf::from("/from/file"));
        assert_eq!(settings.step_count_x, 3);
        assert!(settings.clip_overrides);
    }
}
