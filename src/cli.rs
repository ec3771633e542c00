use crate::{
    app::{CliVerbosity, StartupMode},
    archive, authoring, backup,
    config::{ConfigStore, JsonConfigStore, PathConfig, PathPrompt},
    game::{self, GameLayout},
    installer, logging,
    progress::ProgressSink,
    ui,
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    config: Option<PathBuf>,
    verbosity: CliVerbosity,
}

#[derive(Debug)]
enum CliAction {
    Ui {
        startup_file: Option<PathBuf>,
    },
    Command(CliCommand),
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Apply(PathBuf),
    ApplyPack(PathBuf),
    Restore,
    Backup,
    Status,
    List(PathBuf),
    CreateMod { source: PathBuf, output: PathBuf },
    CreatePack { output: PathBuf, mods: Vec<PathBuf> },
    SetPath(Option<PathBuf>),
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, action) = parse_args(&args)?;
    let store: Box<dyn ConfigStore> = Box::new(match &global.config {
        Some(path) => JsonConfigStore::new(path),
        None => JsonConfigStore::default(),
    });
    let paths = PathConfig::new(store);

    match action {
        CliAction::Ui { startup_file } => {
            let log_path = logging::init(StartupMode::Ui, global.verbosity)?;
            ui::run(paths, log_path, startup_file)
        }
        CliAction::Command(CliCommand::Help) => {
            print_help();
            Ok(())
        }
        CliAction::Command(CliCommand::Version) => {
            println!("Rainbow Modloader v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Command(command) => {
            logging::init(StartupMode::Cli, global.verbosity)?;
            run_command(command, &global, &paths)
        }
    }
}

fn parse_args(args: &[String]) -> Result<(GlobalOptions, CliAction)> {
    let (global, tokens) = parse_global_options(args)?;
    let Some(head) = tokens.first() else {
        return Ok((global, CliAction::Ui { startup_file: None }));
    };
    let rest = &tokens[1..];

    let command = match head.as_str() {
        "help" | "--help" | "-h" => CliCommand::Help,
        "version" | "--version" | "-V" => CliCommand::Version,
        "apply" => CliCommand::Apply(single_path(head, rest)?),
        "apply-pack" => CliCommand::ApplyPack(single_path(head, rest)?),
        "restore" => CliCommand::Restore,
        "backup" => CliCommand::Backup,
        "status" => CliCommand::Status,
        "list" => CliCommand::List(single_path(head, rest)?),
        "create-mod" => {
            let [source, output] = rest else {
                bail!("create-mod requires <data-dir> <out.{}>", game::MOD_EXTENSION);
            };
            CliCommand::CreateMod {
                source: PathBuf::from(source),
                output: PathBuf::from(output),
            }
        }
        "create-pack" => {
            let Some((output, mods)) = rest.split_first() else {
                bail!(
                    "create-pack requires <out.{}> <mod.{}>...",
                    game::MODPACK_EXTENSION,
                    game::MOD_EXTENSION
                );
            };
            CliCommand::CreatePack {
                output: PathBuf::from(output),
                mods: mods.iter().map(PathBuf::from).collect(),
            }
        }
        "set-path" => match rest {
            [] => CliCommand::SetPath(None),
            [dir] => CliCommand::SetPath(Some(PathBuf::from(dir))),
            _ => bail!("set-path takes at most one folder"),
        },
        value if rest.is_empty() && is_launch_file(value) => {
            return Ok((
                global,
                CliAction::Ui {
                    startup_file: Some(PathBuf::from(value)),
                },
            ));
        }
        other => bail!("Unknown command: {other} (see 'rainbow-modloader help')"),
    };
    Ok((global, CliAction::Command(command)))
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut config = None;
    let mut verbosity = CliVerbosity::Normal;
    let mut tokens = Vec::new();
    let mut stop_parsing = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if stop_parsing {
            tokens.push(arg.to_string());
            continue;
        }
        match arg.as_str() {
            "--" => stop_parsing = true,
            "--format" => {
                let Some(value) = iter.next() else {
                    bail!("--format requires a value");
                };
                format = parse_format(value)?;
            }
            value if value.starts_with("--format=") => {
                format = parse_format(value.trim_start_matches("--format="))?;
            }
            "--config" => {
                let Some(value) = iter.next() else {
                    bail!("--config requires a file");
                };
                config = Some(PathBuf::from(value));
            }
            value if value.starts_with("--config=") => {
                config = Some(PathBuf::from(value.trim_start_matches("--config=")));
            }
            "-q" | "--quiet" => verbosity = CliVerbosity::Quiet,
            "--verbose" => verbosity = CliVerbosity::Verbose,
            "--verbosity" => {
                let Some(level) = iter.next() else {
                    bail!("--verbosity requires a level");
                };
                verbosity = match level.as_str() {
                    "quiet" | "minimal" => CliVerbosity::Quiet,
                    "normal" | "info" => CliVerbosity::Normal,
                    "verbose" => CliVerbosity::Verbose,
                    "debug" | "trace" => CliVerbosity::Debug,
                    _ => bail!("Unknown verbosity: {level}"),
                };
            }
            value if is_verbose_flag(value) => {
                verbosity = if value.len() > 2 {
                    CliVerbosity::Debug
                } else {
                    CliVerbosity::Verbose
                };
            }
            _ => tokens.push(arg.to_string()),
        }
    }

    Ok((
        GlobalOptions {
            format,
            config,
            verbosity,
        },
        tokens,
    ))
}

/// `-v`, `-vv`, `-vvv`...
fn is_verbose_flag(value: &str) -> bool {
    value
        .strip_prefix('-')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|ch| ch == 'v'))
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::parse(value)
        .with_context(|| format!("Unknown format: {value} (use 'text' or 'json')"))
}

fn single_path(command: &str, rest: &[String]) -> Result<PathBuf> {
    match rest {
        [path] => Ok(PathBuf::from(path)),
        [] => bail!("{command} requires a path"),
        _ => bail!("{command} takes a single path"),
    }
}

fn is_launch_file(value: &str) -> bool {
    let path = std::path::Path::new(value);
    game::is_mod_archive_path(path) || game::is_modpack_path(path)
}

fn run_command(
    command: CliCommand,
    global: &GlobalOptions,
    paths: &PathConfig<Box<dyn ConfigStore>>,
) -> Result<()> {
    let quiet = global.verbosity == CliVerbosity::Quiet;
    match command {
        CliCommand::Apply(path) => {
            let layout = resolve_layout(paths)?;
            let mut progress = ConsoleProgress::new(!quiet);
            let report = installer::apply_mod(&layout, &path, &mut progress)?;
            progress.finish();
            println!("{}", report.summary());
        }
        CliCommand::ApplyPack(path) => {
            let layout = resolve_layout(paths)?;
            let mut progress = ConsoleProgress::new(!quiet);
            let report = installer::apply_modpack(&layout, &path, &mut progress)?;
            progress.finish();
            println!("{}", report.summary());
        }
        CliCommand::Backup => {
            let layout = resolve_layout(paths)?;
            let mut progress = ConsoleProgress::new(!quiet);
            let outcome = backup::ensure_backup(&layout, &mut progress)?;
            progress.finish();
            println!("{}", outcome.message());
        }
        CliCommand::Restore => {
            let layout = resolve_layout(paths)?;
            let mut progress = ConsoleProgress::new(!quiet);
            let outcome = backup::restore(&layout, &mut progress)?;
            progress.finish();
            println!(
                "Mods removed. Original content restored ({} files).",
                outcome.files
            );
        }
        CliCommand::Status => print_status(paths, global.format)?,
        CliCommand::List(path) => print_entries(&path, global.format)?,
        CliCommand::CreateMod { source, output } => {
            let mut progress = ConsoleProgress::new(!quiet);
            let report = authoring::create_mod(&source, &output, &mut progress)?;
            progress.finish();
            println!(
                "Mod created: {} ({} entries)",
                report.output.display(),
                report.entries
            );
        }
        CliCommand::CreatePack { output, mods } => {
            let mut progress = ConsoleProgress::new(!quiet);
            let report = authoring::create_modpack(&mods, &output, &mut progress)?;
            progress.finish();
            println!(
                "Modpack created: {} ({} mods)",
                report.output.display(),
                report.entries
            );
        }
        CliCommand::SetPath(Some(dir)) => {
            let path = paths.save_game_path(&dir)?;
            println!("Game path set to {}", path.display());
        }
        CliCommand::SetPath(None) => {
            let mut prompt = StdinPrompt::new(io::stdin().lock());
            match paths.set_game_path(&mut prompt)? {
                Some(path) => println!("Game path set to {}", path.display()),
                None => println!("Game path unchanged."),
            }
        }
        CliCommand::Help | CliCommand::Version => {}
    }
    Ok(())
}

fn resolve_layout(paths: &PathConfig<Box<dyn ConfigStore>>) -> Result<GameLayout> {
    let mut prompt = StdinPrompt::new(io::stdin().lock());
    let root = paths.get_game_path(&mut prompt)?;
    Ok(GameLayout::open(&root)?)
}

#[derive(Serialize)]
struct StatusOutput {
    config_path: String,
    game_path: Option<String>,
    content_dir: Option<String>,
    content_present: bool,
    backup_dir: Option<String>,
    backup_present: bool,
    error: Option<String>,
}

fn print_status(paths: &PathConfig<Box<dyn ConfigStore>>, format: OutputFormat) -> Result<()> {
    let stored = paths.stored_game_path();
    let (game_path, error) = match stored {
        Ok(path) => (path, None),
        Err(err) => (None, Some(err.to_string())),
    };
    let layout = game_path
        .as_deref()
        .and_then(|path| GameLayout::open(path).ok());
    let error = error.or_else(|| match (&game_path, &layout) {
        (None, _) => Some("no game path configured".to_string()),
        (Some(path), None) => Some(format!("game folder not found: {}", path.display())),
        _ => None,
    });

    let output = StatusOutput {
        config_path: paths.store().location(),
        game_path: game_path.as_ref().map(|path| path.display().to_string()),
        content_dir: layout
            .as_ref()
            .map(|layout| layout.content_dir().display().to_string()),
        content_present: layout.as_ref().is_some_and(GameLayout::has_content),
        backup_dir: layout
            .as_ref()
            .map(|layout| layout.backup_dir().display().to_string()),
        backup_present: layout.as_ref().is_some_and(GameLayout::has_backup),
        error,
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Config: {}", output.config_path);
            println!(
                "Game path: {}",
                output.game_path.as_deref().unwrap_or("(not set)")
            );
            if let Some(content_dir) = &output.content_dir {
                let state = if output.content_present { "" } else { " (missing)" };
                println!("Content: {content_dir}{state}");
            }
            if let Some(backup_dir) = &output.backup_dir {
                let state = if output.backup_present { "present" } else { "none yet" };
                println!("Backup: {backup_dir} ({state})");
            }
            if let Some(error) = output.error {
                println!("Warning: {error}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct EntryListItem {
    name: String,
    size: u64,
    kind: &'static str,
}

fn print_entries(path: &std::path::Path, format: OutputFormat) -> Result<()> {
    let items: Vec<EntryListItem> = archive::list_entries(path)?
        .into_iter()
        .map(|entry| EntryListItem {
            kind: if entry.is_dir {
                "dir"
            } else if entry.is_mod {
                "mod"
            } else {
                "file"
            },
            name: entry.name,
            size: entry.size,
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("Archive is empty.");
            }
            for item in items {
                println!("{:<4} {:>10} {}", item.kind, item.size, item.name);
            }
        }
    }
    Ok(())
}

/// Single rewritten stderr line; a new status starts a new line.
struct ConsoleProgress {
    enabled: bool,
    last_status: Option<String>,
}

impl ConsoleProgress {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_status: None,
        }
    }

    fn finish(&mut self) {
        if self.enabled && self.last_status.take().is_some() {
            eprintln!();
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn report(&mut self, status: &str, percent: f32) {
        if !self.enabled {
            return;
        }
        let mut stderr = io::stderr().lock();
        if self
            .last_status
            .as_deref()
            .is_some_and(|last| last != status)
        {
            let _ = writeln!(stderr);
        }
        let _ = write!(stderr, "\r{status} {percent:>3.0}%");
        let _ = stderr.flush();
        self.last_status = Some(status.to_string());
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Reads folder selections from a line-oriented reader. An empty line or EOF
/// cancels.
struct StdinPrompt<R> {
    reader: R,
}

impl<R: BufRead> StdinPrompt<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> PathPrompt for StdinPrompt<R> {
    fn select_directory(&mut self, title: &str) -> io::Result<Option<PathBuf>> {
        eprint!("{title} (empty to cancel): ");
        io::stderr().flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let value = line.trim().trim_matches(|ch| ch == '"' || ch == '\'');
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(value)))
    }
}

fn print_help() {
    println!("Rainbow Modloader v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  rainbow-modloader                          Launch TUI");
    println!("  rainbow-modloader <file.rsm|file.rsmp>     Launch TUI and apply the file");
    println!("  rainbow-modloader apply <mod.rsm>          Apply a mod");
    println!("  rainbow-modloader apply-pack <pack.rsmp>   Apply every mod in a modpack");
    println!("  rainbow-modloader restore                  Remove mods (restore the backup)");
    println!("  rainbow-modloader backup                   Create the backup if missing");
    println!("  rainbow-modloader status                   Show game path and backup state");
    println!("  rainbow-modloader list <archive>           List archive entries");
    println!("  rainbow-modloader create-mod <data> <out.rsm>");
    println!("                                             Pack a data folder into a mod");
    println!("  rainbow-modloader create-pack <out.rsmp> <mod.rsm>...");
    println!("                                             Bundle two or more mods");
    println!("  rainbow-modloader set-path [dir]           Change the game folder");
    println!();
    println!("Global options:");
    println!(
        "  --config <file>                  Config file (default ./{})",
        game::CONFIG_FILE_NAME
    );
    println!("  --format <json|text>             Output format for status/list");
    println!("  -q, --quiet                      Errors only, no progress");
    println!("  -v, -vv                          Increase verbosity");
    println!("  --verbosity <level>              quiet | normal | verbose | debug");
    println!("  -h, --help                       Show help");
    println!("  -V, --version                    Show version");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn command(values: &[&str]) -> CliCommand {
        match parse_args(&args(values)).unwrap().1 {
            CliAction::Command(command) => command,
            CliAction::Ui { .. } => panic!("expected a command"),
        }
    }

    #[test]
    fn no_arguments_launch_ui() {
        let (global, action) = parse_args(&[]).unwrap();
        assert!(matches!(action, CliAction::Ui { startup_file: None }));
        assert_eq!(global.verbosity, CliVerbosity::Normal);
    }

    #[test]
    fn bare_mod_path_launches_ui_with_file() {
        for file in ["cool.rsm", "Pack.RSMP"] {
            let (_, action) = parse_args(&args(&[file])).unwrap();
            match action {
                CliAction::Ui { startup_file } => {
                    assert_eq!(startup_file, Some(PathBuf::from(file)))
                }
                CliAction::Command(_) => panic!("expected ui"),
            }
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["notes.txt"])).is_err());
    }

    #[test]
    fn subcommands_parse_paths() {
        assert_eq!(
            command(&["apply", "x.rsm"]),
            CliCommand::Apply(PathBuf::from("x.rsm"))
        );
        assert_eq!(
            command(&["create-mod", "data", "out.rsm"]),
            CliCommand::CreateMod {
                source: PathBuf::from("data"),
                output: PathBuf::from("out.rsm"),
            }
        );
        assert_eq!(
            command(&["create-pack", "p.rsmp", "a.rsm", "b.rsm"]),
            CliCommand::CreatePack {
                output: PathBuf::from("p.rsmp"),
                mods: vec![PathBuf::from("a.rsm"), PathBuf::from("b.rsm")],
            }
        );
        assert_eq!(command(&["set-path"]), CliCommand::SetPath(None));
        assert!(parse_args(&args(&["apply"])).is_err());
        assert!(parse_args(&args(&["create-mod", "data"])).is_err());
    }

    #[test]
    fn global_options_anywhere() {
        let (global, action) =
            parse_args(&args(&["status", "--format", "json", "-vv", "--config=cfg.json"]))
                .unwrap();
        assert_eq!(global.format, OutputFormat::Json);
        assert_eq!(global.verbosity, CliVerbosity::Debug);
        assert_eq!(global.config, Some(PathBuf::from("cfg.json")));
        assert!(matches!(action, CliAction::Command(CliCommand::Status)));

        let (global, _) = parse_args(&args(&["-q", "restore"])).unwrap();
        assert_eq!(global.verbosity, CliVerbosity::Quiet);
        assert!(parse_args(&args(&["--format", "yaml", "status"])).is_err());
    }

    #[test]
    fn double_dash_keeps_dash_paths() {
        assert_eq!(
            command(&["apply", "--", "-weird.rsm"]),
            CliCommand::Apply(PathBuf::from("-weird.rsm"))
        );
    }

    #[test]
    fn stdin_prompt_reads_and_cancels() {
        let mut prompt = StdinPrompt::new(Cursor::new("\"/games/smatrs\"\n\n"));
        assert_eq!(
            prompt.select_directory("Game").unwrap(),
            Some(PathBuf::from("/games/smatrs"))
        );
        assert_eq!(prompt.select_directory("Game").unwrap(), None);
        assert_eq!(prompt.select_directory("Game").unwrap(), None);
    }
}
