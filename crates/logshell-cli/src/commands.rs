use super::args::Cli;
use crate::host::CliHost;
use crate::render::Renderer;
use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use logshell_index::{LogStore, init_schema};
use logshell_runtime::{
    CommandResult, Config, Dispatcher, Mode, Permissions, resolve_workspace_path,
};
use rusqlite::Connection;
use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;

/// Returns `Ok(false)` when any statement failed.
pub fn run(cli: Cli) -> Result<bool> {
    let data_dir = resolve_workspace_path(cli.data_dir.as_deref())?;
    let config = Config::load_from(&data_dir.join("config.toml"))
        .with_context(|| format!("loading config from {}", data_dir.display()))?;

    let mut store = LogStore::new();
    for path in &cli.files {
        store
            .add_path(path)
            .with_context(|| format!("unable to open {}", path.display()))?;
    }

    let db = Connection::open_in_memory()?;
    init_schema(&db)?;

    let mut dispatcher = Dispatcher::new(db, Box::new(CliHost::new(store)))?;
    dispatcher.apply_config(&config, &data_dir);
    if cli.read_only {
        dispatcher.ctx_mut().set_permissions(Permissions::ReadOnly);
    }

    let stdin_is_terminal = io::stdin().is_terminal();
    dispatcher.set_headless(cli.headless || !stdin_is_terminal);

    let flag = dispatcher.interrupt_flag();
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!("unable to install interrupt handler: {}", err);
    }

    dispatcher.refresh_host();

    let renderer = Renderer::new(cli.format);
    let mut init_cmds = cli.init_commands();
    if init_cmds.is_empty() && !stdin_is_terminal {
        init_cmds.push("|-".to_string());
    }

    let ok = if !init_cmds.is_empty() {
        run_batch(&mut dispatcher, &renderer, &init_cmds)?
    } else if !cli.headless {
        run_interactive(&mut dispatcher, &renderer)?
    } else {
        true
    };

    if dispatcher.is_interrupted() {
        dispatcher.abandon_captures();
    } else {
        dispatcher.wait_for_captures();
    }
    Ok(ok)
}

/// Entries are rendered as they finish so their output interleaves with
/// search hits printed by the host.
fn run_batch(dispatcher: &mut Dispatcher, renderer: &Renderer, cmds: &[String]) -> Result<bool> {
    let mut ok = true;
    let mut written: io::Result<()> = Ok(());
    dispatcher.execute_init_commands_with(cmds, |d, cmd, (result, _alt_msg)| {
        if written.is_err() {
            return;
        }
        written = match result {
            Ok(_) if Mode::split(cmd).0 == Mode::Query && d.results().rows.len() > 1 => {
                renderer.results(d.results())
            }
            Ok(msg) => renderer.message(cmd, &msg),
            Err(err) => {
                ok = false;
                renderer.error(cmd, &err)
            }
        };
    });
    written?;
    Ok(ok)
}

fn run_interactive(dispatcher: &mut Dispatcher, renderer: &Renderer) -> Result<bool> {
    let stdin = io::stdin();
    let mut ok = true;
    loop {
        eprint!("logshell> ");
        io::stderr().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            eprintln!();
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        dispatcher.clear_interrupt();
        dispatcher.refresh_host();
        let result: CommandResult = dispatcher.execute_any(line);
        match result {
            Ok(msg) => renderer.message(line, &msg)?,
            Err(err) => {
                ok = false;
                renderer.error(line, &err)?;
            }
        }
        dispatcher.poll_captures();
    }
    Ok(ok)
}
