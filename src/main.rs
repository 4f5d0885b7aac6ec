// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use crossterm::event::{Event, KeyEventKind};
use tracing::{info, Level};

use tapedeck::clock::list_devices;
use tapedeck::config::AppConfig;
use tapedeck::control::{ControlAction, KeyboardController, SeekSteps};
use tapedeck::project::Project;
use tapedeck::session::Session;
use tapedeck::ui::{App, View};

fn print_usage() {
    println!("tapedeck - multitrack tape recorder");
    println!();
    println!("Usage: tapedeck [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --project <NAME>     Project to open (default from config)");
    println!("  --dir <DIR>          Directory holding projects");
    println!("  --config <FILE>      Configuration file (default tapedeck.toml)");
    println!("  --log <FILE>         Log file (default <dir>/tapedeck.log)");
    println!("  --verbose            Log debug messages");
    println!("  --list-devices       List audio input and output devices");
    println!("  --save-as <NAME>     Copy the project to NAME and exit");
    println!("  --help               Show this help message");
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    project: Option<String>,
    dir: Option<PathBuf>,
    config: Option<PathBuf>,
    log: Option<PathBuf>,
    verbose: bool,
    list_devices: bool,
    save_as: Option<String>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", name))
        };
        match arg.as_str() {
            "--project" => options.project = Some(value("--project")?),
            "--dir" => options.dir = Some(PathBuf::from(value("--dir")?)),
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--log" => options.log = Some(PathBuf::from(value("--log")?)),
            "--save-as" => options.save_as = Some(value("--save-as")?),
            "--verbose" => options.verbose = true,
            "--list-devices" => options.list_devices = true,
            "--help" | "-h" => options.help = true,
            other => return Err(anyhow!("Unknown option: {}", other)),
        }
    }
    Ok(options)
}

fn init_logging(path: &Path, verbose: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {:?}", path))?;
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .init();
    Ok(())
}

fn print_devices() -> Result<()> {
    let (outputs, inputs) = list_devices()?;
    println!("Output devices:");
    for name in outputs {
        println!("  {}", name);
    }
    println!("Input devices:");
    for name in inputs {
        println!("  {}", name);
    }
    Ok(())
}

/// Redraw and handle keys until the user quits
fn run(app: &mut App, session: &mut Session, config: &AppConfig) -> Result<()> {
    while app.is_running() {
        session.poll();
        let view = View::from_session(session);
        app.draw(&view)?;

        let Some(Event::Key(key)) = app.poll_event()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let tracks = view.snapshot.tracks.len();
        let Some(action) = app.handle_key(key.code, key.modifiers, tracks) else {
            continue;
        };
        if action == ControlAction::ClearErrors {
            session.clear_errors();
            continue;
        }

        let steps = SeekSteps::new(&config.transport, view.snapshot.sample_rate);
        if let Some(command) = action.command(app.state().selected, &view.snapshot, &steps) {
            if !session.send(command) {
                app.state_mut().set_status(format!("{:?} not sent", action));
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args)?;

    if options.help {
        print_usage();
        return Ok(());
    }
    if options.list_devices {
        return print_devices();
    }

    let mut config = AppConfig::load_or_default(options.config.as_deref())?;
    if let Some(dir) = options.dir.clone() {
        config.project_dir = dir;
    }
    if let Some(project) = options.project.clone() {
        config.project = project;
    }

    let log_path = options.log.clone().unwrap_or_else(|| config.log_path());
    init_logging(&log_path, options.verbose)?;
    info!(project = %config.project, dir = %config.project_dir.display(), "tapedeck starting");

    let mut project = Project::new(config.project_dir.clone(), config.project.clone());

    if let Some(name) = options.save_as {
        let settings = project.load_settings()?;
        project.save_as(&name, &settings)?;
        println!("Saved project as {}", project.name());
        return Ok(());
    }

    let mut app = App::new(KeyboardController::with_defaults())
        .context("Failed to set up the terminal")?;
    app.set_frame_rate(config.ui.frame_rate);

    let mut session = Session::open(config.clone(), project, &mut |percent| {
        let _ = app.draw_import(percent);
    })?;

    let result = run(&mut app, &mut session, &config);
    drop(app);
    let closed = session.close();

    result.and(closed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("tapedeck")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(&args(&["--project", "song", "--dir", "/tmp/tapes", "--verbose"])).unwrap();
        assert_eq!(options.project.as_deref(), Some("song"));
        assert_eq!(options.dir, Some(PathBuf::from("/tmp/tapes")));
        assert!(options.verbose);
        assert!(!options.list_devices);

        assert_eq!(parse_args(&args(&[])).unwrap(), Options::default());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--project"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }
}
