mod commands;
mod terminal;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use sigbench_host::{
    DataFiles, DylibBackend, EventOutcome, HostConfig, HostEvent, ModuleHost, ModuleLoader,
    ModuleRegistry, ParamSlot, WindowRect,
};
use sigbench_module_sdk::{Figure, Invocation, PlaybackHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, Selector, HELP};
use crate::terminal::{describe_figure, TerminalSurface};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = cli.host.resolve()?;
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config),
        Commands::Scan => scan(&config),
        Commands::Validate(args) => validate(&config, args),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Interactive host for Signal Workbench processing modules")]
struct Cli {
    #[command(flatten)]
    host: HostArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the host interactively from standard input (default).
    Run,
    /// List the modules found in the module directory.
    Scan,
    /// Load one module and run it once.
    Validate(ValidateArgs),
}

#[derive(Args)]
struct HostArgs {
    /// Directory scanned for module libraries.
    #[arg(long, global = true)]
    modules_dir: Option<PathBuf>,
    /// Directory offering data files; repeat to add more.
    #[arg(long = "data-dir", global = true)]
    data_dirs: Vec<PathBuf>,
    /// Where the session is persisted.
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,
    /// Host configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Do not hand modules a playback handle.
    #[arg(long, global = true)]
    no_playback: bool,
    /// Usable screen area as `x,y,width,height`; an off-screen window from
    /// the last session is moved back inside it.
    #[arg(long, global = true, value_parser = commands::parse_rect)]
    display: Option<WindowRect>,
}

impl HostArgs {
    fn resolve(&self) -> Result<HostConfig> {
        let mut config = match self.config.clone().or_else(HostConfig::default_path) {
            Some(path) => HostConfig::load(&path)?,
            None => HostConfig::default(),
        };
        if let Some(dir) = &self.modules_dir {
            config.modules_dir = dir.clone();
        }
        if !self.data_dirs.is_empty() {
            config.data_dirs = self.data_dirs.clone();
        }
        if let Some(path) = &self.session_file {
            config.session_file = path.clone();
        }
        if self.no_playback {
            config.playback = false;
        }
        if self.display.is_some() {
            config.display = self.display;
        }
        Ok(config)
    }
}

#[derive(Args)]
struct ValidateArgs {
    /// Module name as listed by `scan`.
    module: String,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    param1: u8,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    param2: u8,
    /// Data file handed to the module; defaults to the first one found.
    #[arg(long)]
    file: Option<String>,
}

fn run(config: &HostConfig) -> Result<()> {
    let backend = DylibBackend::new().context("failed to prepare module shadow directory")?;
    let mut host = ModuleHost::from_config(
        config,
        Box::new(backend),
        Box::new(TerminalSurface),
        config.display,
    );
    info!("session file: {}", host.session().path().display());
    print_modules(&host);
    print_files(&host);

    let outcome = host.start();
    report(&host, &outcome);
    println!("type `help` for commands");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read from stdin")?;
        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err:#}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = dispatch(&mut host, command) {
            eprintln!("{err:#}");
        }
        host.drain_playback();
    }

    host.handle(HostEvent::Shutdown);
    host.drain_playback();
    Ok(())
}

fn dispatch(host: &mut ModuleHost, command: Command) -> Result<()> {
    match command {
        Command::Event(event) => {
            let outcome = host.handle(event);
            report(host, &outcome);
        }
        Command::SelectModule(selector) => {
            let index = resolve(&selector, host.registry().names(), "module")?;
            let outcome = host.handle(HostEvent::ModuleSelected(index));
            report(host, &outcome);
        }
        Command::SelectFile(selector) => {
            let index = resolve(&selector, host.data_files().names(), "data file")?;
            let outcome = host.handle(HostEvent::FileSelected(index));
            report(host, &outcome);
        }
        Command::SaveFigure(path) => {
            let json = serde_json::to_string_pretty(host.figure())?;
            fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("figure written to {}", path.display());
        }
        Command::Status => print_status(host),
        Command::Modules => print_modules(host),
        Command::Files => print_files(host),
        Command::Help => println!("{HELP}"),
        Command::Quit | Command::Empty => {}
    }
    Ok(())
}

fn resolve<'a>(
    selector: &Selector,
    names: impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<usize> {
    selector
        .resolve(names)
        .ok_or_else(|| anyhow!("no {what} named {selector:?}"))
}

fn report(host: &ModuleHost, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Idle => {}
        EventOutcome::Invoked(Ok(())) => print!("{}", describe_figure(host.figure())),
        // Already shown through the notification surface.
        EventOutcome::Invoked(Err(_)) => {}
        EventOutcome::LoadFailed(err) => eprintln!("{err}"),
    }
}

fn print_status(host: &ModuleHost) {
    let state = host.state();
    let module = host
        .active_module()
        .map(|module| format!("{} (generation {})", module.name(), module.generation()))
        .unwrap_or_else(|| "none".to_string());
    let file = host
        .selected_file()
        .map(|file| file.name.clone())
        .unwrap_or_else(|| "none".to_string());
    println!("module:  {module}");
    println!("file:    {file}");
    println!(
        "params:  {} / {} (displayed {} / {})",
        state.param1,
        state.param2,
        host.displayed(ParamSlot::First),
        host.displayed(ParamSlot::Second)
    );
    let rect = state.window_rect;
    println!(
        "window:  {}x{} at ({}, {})",
        rect.width, rect.height, rect.x, rect.y
    );
    println!("runs:    {}", host.scheduler().invocations());
    if let Some(err) = host.loader().last_error() {
        println!("last load error: {err}");
    }
}

fn print_modules(host: &ModuleHost) {
    if host.registry().is_empty() {
        println!("no modules found");
    }
    let selected = host.state().selected_module_index;
    for (index, name) in host.registry().names().enumerate() {
        let marker = if index == selected { '*' } else { ' ' };
        println!("{marker} [{index}] {name}");
    }
}

fn print_files(host: &ModuleHost) {
    if host.data_files().is_empty() {
        println!("no data files found");
    }
    let selected = host.state().selected_file_index;
    for (index, name) in host.data_files().names().enumerate() {
        let marker = if index == selected { '*' } else { ' ' };
        println!("{marker} <{index}> {name}");
    }
}

fn scan(config: &HostConfig) -> Result<()> {
    let backend = DylibBackend::new().context("failed to prepare module shadow directory")?;
    let registry = ModuleRegistry::scan(&config.modules_dir, &backend);
    println!(
        "{} module(s) in {}",
        registry.len(),
        config.modules_dir.display()
    );
    for module in registry.modules() {
        println!("  {:<24} {}", module.name, module.path.display());
    }
    if !registry.rejected().is_empty() {
        println!("rejected:");
        for rejection in registry.rejected() {
            println!("  {:<24} {}", rejection.descriptor.name, rejection.error);
        }
    }
    Ok(())
}

fn validate(config: &HostConfig, args: ValidateArgs) -> Result<()> {
    let backend = DylibBackend::new().context("failed to prepare module shadow directory")?;
    let mut loader = ModuleLoader::new(Box::new(backend), &config.modules_dir);
    let module = loader.load_or_reload(&args.module)?;
    println!("loaded `{}` from {}", module.name(), module.path().display());

    let data_file = match args.file {
        Some(file) => file,
        None => DataFiles::scan(&config.data_dirs, &config.data_extensions)
            .get(0)
            .map(|file| file.argument())
            .unwrap_or_default(),
    };
    let playback = config.playback.then(PlaybackHandle::channel);
    let invocation = Invocation {
        param1: args.param1,
        param2: args.param2,
        data_file: &data_file,
        playback: playback.as_ref().map(|(handle, _)| handle),
    };
    let mut figure = Figure::new();
    module
        .invoke(&invocation, &mut figure)
        .map_err(|detail| anyhow!("module `{}` failed: {detail}", module.name()))?;
    print!("{}", describe_figure(&figure));
    Ok(())
}
