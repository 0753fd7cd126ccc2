//! Routes a prefixed line to the command table, the host's search, the query
//! runner or the script executor.

use crate::builtins;
use crate::capture::CaptureHandle;
use crate::command::{Command, CommandMap, CommandResult};
use crate::config::Config;
use crate::context::{ContextStacks, ExecutionContext, Permissions};
use crate::host::HostServices;
use crate::query::{QueryOutput, register_functions};
use crate::results::{ResultSet, RowCallback};
use crate::script::ScriptResolver;
use crate::sql_commands;
use logshell_types::{ErrorKind, Snippet, UserMessage};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Command,
    Search,
    Query,
    Script,
}

impl Mode {
    pub fn from_prefix(c: char) -> Option<Mode> {
        match c {
            ':' => Some(Mode::Command),
            '/' => Some(Mode::Search),
            ';' => Some(Mode::Query),
            '|' => Some(Mode::Script),
            _ => None,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            Mode::Command => ':',
            Mode::Search => '/',
            Mode::Query => ';',
            Mode::Script => '|',
        }
    }

    /// Split a line into its mode and payload. A line without a known
    /// prefix is a command.
    pub fn split(line: &str) -> (Mode, &str) {
        let line = line.trim();
        match line.chars().next().and_then(Mode::from_prefix) {
            Some(mode) => (mode, &line[1..]),
            None => (Mode::Command, line),
        }
    }
}

/// Result of one batch entry: the outcome plus the status-line hint.
pub type BatchResult = (CommandResult, String);

pub struct Dispatcher {
    pub(crate) ctx: ExecutionContext,
    pub(crate) commands: CommandMap,
    pub(crate) sql_commands: CommandMap,
    pub(crate) db: Connection,
    pub(crate) host: Box<dyn HostServices>,
    pub(crate) scripts: ScriptResolver,
    pub(crate) results: Box<dyn RowCallback>,
    pub(crate) captures: Vec<CaptureHandle>,
    pub(crate) exec_count: usize,
    headless: bool,
    interrupted: Arc<AtomicBool>,
}

impl AsMut<ExecutionContext> for Dispatcher {
    fn as_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }
}

impl Dispatcher {
    pub fn new(db: Connection, host: Box<dyn HostServices>) -> crate::Result<Self> {
        register_functions(&db)?;

        let mut commands = CommandMap::new();
        builtins::register(&mut commands);
        let mut sql_cmds = CommandMap::new();
        sql_commands::register(&mut sql_cmds);

        Ok(Self {
            ctx: ExecutionContext::new(),
            commands,
            sql_commands: sql_cmds,
            db,
            host,
            scripts: ScriptResolver::default(),
            results: Box::new(ResultSet::default()),
            captures: Vec::new(),
            exec_count: 0,
            headless: false,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn in_memory(host: Box<dyn HostServices>) -> crate::Result<Self> {
        Self::new(Connection::open_in_memory()?, host)
    }

    /// Install globals, permissions, key columns and script directories.
    pub fn apply_config(&mut self, config: &Config, data_dir: &Path) {
        config.install_globals(&mut self.ctx);
        if config.read_only {
            self.ctx.set_permissions(Permissions::ReadOnly);
        }
        self.results = Box::new(ResultSet::new(config.key_columns.clone()));
        self.scripts
            .set_search_dirs(config.script_search_dirs(data_dir));
    }

    pub fn set_headless(&mut self, headless: bool) {
        self.headless = headless;
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub fn set_row_callback(&mut self, callback: Box<dyn RowCallback>) {
        self.results = callback;
    }

    pub fn set_script_resolver(&mut self, resolver: ScriptResolver) {
        self.scripts = resolver;
    }

    pub fn script_resolver(&self) -> &ScriptResolver {
        &self.scripts
    }

    pub fn register_command(&mut self, command: Command) {
        self.commands.insert(command);
    }

    pub fn commands(&self) -> &CommandMap {
        &self.commands
    }

    pub fn sql_commands(&self) -> &CommandMap {
        &self.sql_commands
    }

    pub fn ctx(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    pub fn db(&self) -> &Connection {
        &self.db
    }

    pub fn host(&self) -> &dyn HostServices {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn HostServices {
        self.host.as_mut()
    }

    pub fn results(&self) -> &ResultSet {
        self.results.results()
    }

    /// Flag checked between script statements; setting it fails the rest
    /// of the running script.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Execute a top-level line, then refresh the host's inputs when running
    /// headless or inside a script.
    pub fn execute_any(&mut self, line: &str) -> CommandResult {
        let result = self.dispatch(line);
        self.refresh_after_exec();
        result
    }

    /// Execute a line without the post-execution refresh.
    pub fn dispatch(&mut self, line: &str) -> CommandResult {
        let (mode, payload) = Mode::split(line);
        self.dispatch_mode(mode, payload).map(|out| out.summary)
    }

    pub(crate) fn dispatch_mode(&mut self, mode: Mode, payload: &str) -> Result<QueryOutput, UserMessage> {
        match mode {
            Mode::Command => self.execute_command(payload).map(QueryOutput::from_summary),
            Mode::Search => {
                tracing::info!("searching {} view for: {}", self.host.active_view(), payload);
                self.host.execute_search(payload);
                Ok(QueryOutput::default())
            }
            Mode::Query => self.run_query(payload),
            Mode::Script => self.execute_file(payload, true).map(QueryOutput::from_summary),
        }
    }

    /// Look up and run a `:` command. The handler's help text is current
    /// while it runs.
    pub fn execute_command(&mut self, cmdline: &str) -> CommandResult {
        tracing::info!("executing: {}", cmdline);

        let args: Vec<String> = cmdline.split_whitespace().map(String::from).collect();
        let Some(name) = args.first() else {
            return Err(self
                .ctx
                .make_error(ErrorKind::NoCommandGiven, "no command to execute"));
        };
        let Some(cmd) = self.commands.get(name) else {
            return Err(self
                .ctx
                .make_error(ErrorKind::UnknownCommand, format!("unknown command - {}", name)));
        };

        let (help, func) = (cmd.help.clone(), cmd.func);
        let mut this = self.enter_help(help);
        func(&mut this, cmdline, &args)
    }

    /// Run one statement read from `source` under its own provenance frame.
    pub(crate) fn execute_statement(
        &mut self,
        source: &str,
        line_number: usize,
        mode: Mode,
        cmdline: &str,
    ) -> CommandResult {
        let snippet = Snippet::new(source, format!("{}{}", mode.prefix(), cmdline))
            .with_line(line_number as i32);
        let mut this = self.enter_source(snippet);
        let retval = this.dispatch_mode(mode, cmdline)?.summary;
        tracing::info!("{}:{}:execute result -- {}", source, line_number, retval);
        Ok(retval)
    }

    pub fn refresh_host(&mut self) {
        self.host.rescan_inputs();
        self.host.rebuild_indexes(&self.db);
    }

    fn refresh_after_exec(&mut self) {
        if self.ctx.is_read_write() && (self.headless || self.ctx.path_depth() > 1) {
            self.refresh_host();
        }
    }

    /// Run the startup batch. Every entry runs under a `command-option`
    /// frame, its outcome is recorded and the host is refreshed afterwards;
    /// a failure does not stop later entries.
    pub fn execute_init_commands(&mut self, cmds: &[String]) -> Vec<BatchResult> {
        let mut msgs = Vec::with_capacity(cmds.len());
        self.execute_init_commands_with(cmds, |_, _, result| msgs.push(result));
        msgs
    }

    /// Like [`Dispatcher::execute_init_commands`], handing each entry's
    /// outcome to `on_result` as soon as it finishes, while the dispatcher
    /// still holds that entry's query results.
    pub fn execute_init_commands_with<F>(&mut self, cmds: &[String], mut on_result: F)
    where
        F: FnMut(&Dispatcher, &str, BatchResult),
    {
        tracing::info!("executing initial commands");

        for (idx, cmd) in cmds.iter().enumerate() {
            self.wait_for_captures();

            let snippet = Snippet::new("command-option", cmd.clone()).with_line(idx as i32 + 1);
            let mut this = self.enter_source(snippet);
            let (mode, payload) = Mode::split(cmd);
            let result = match this.dispatch_mode(mode, payload) {
                Ok(out) => (Ok(out.summary), out.alt_msg),
                Err(err) => (Err(err), String::new()),
            };
            this.refresh_host();
            drop(this);
            on_result(self, cmd, result);
        }
    }
}
