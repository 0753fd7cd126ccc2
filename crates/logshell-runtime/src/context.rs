//! Stacked execution state shared by every statement of a session.
//!
//! Nested invocations (scripts, `:eval`, batch entries) push frames onto the
//! variable, provenance, path and output stacks. Frames are only pushed
//! through the `enter_*` methods of [`ContextStacks`], which hand back a
//! [`Deferred`] guard that pops exactly that frame when it goes out of scope,
//! whichever way the nested call returns.

use logshell_types::{ErrorKind, HelpText, LineValue, Snippet, UserMessage};
use std::collections::BTreeMap;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type VarScope = BTreeMap<String, String>;

/// A writer shared between the output stack and capture workers.
pub type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn shared_sink(writer: impl Write + Send + 'static) -> SharedSink {
    Arc::new(Mutex::new(Box::new(writer)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permissions {
    #[default]
    ReadWrite,
    ReadOnly,
}

pub struct OutputTarget {
    pub name: String,
    pub sink: Option<SharedSink>,
}

impl OutputTarget {
    fn screen(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sink: None,
        }
    }

    fn close(&mut self) {
        if let Some(sink) = self.sink.take()
            && let Ok(mut writer) = sink.lock()
            && let Err(err) = writer.flush()
        {
            tracing::warn!("failed to flush output {}: {}", self.name, err);
        }
    }
}

pub struct ExecutionContext {
    local_vars: Vec<VarScope>,
    global_vars: VarScope,
    overrides: VarScope,
    outputs: Vec<OutputTarget>,
    sources: Vec<Snippet>,
    path_stack: Vec<PathBuf>,
    dry_run: bool,
    perms: Permissions,
    current_help: Option<HelpText>,
    line_values: Vec<LineValue>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            local_vars: vec![VarScope::new()],
            global_vars: VarScope::new(),
            overrides: VarScope::new(),
            outputs: vec![OutputTarget::screen("screen")],
            sources: vec![Snippet::new("command", "").with_line(1)],
            path_stack: vec![PathBuf::from(".")],
            dry_run: false,
            perms: Permissions::ReadWrite,
            current_help: None,
            line_values: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, perms: Permissions) -> Self {
        self.perms = perms;
        self
    }

    pub fn set_permissions(&mut self, perms: Permissions) {
        self.perms = perms;
    }

    pub fn is_read_only(&self) -> bool {
        self.perms == Permissions::ReadOnly
    }

    pub fn is_read_write(&self) -> bool {
        self.perms == Permissions::ReadWrite
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    // -- variables --------------------------------------------------------

    pub fn push_scope(&mut self, vars: VarScope) {
        self.local_vars.push(vars);
    }

    pub fn pop_scope(&mut self) {
        assert!(self.local_vars.len() > 1, "cannot pop the root variable scope");
        self.local_vars.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.local_vars.len()
    }

    /// The innermost local scope.
    pub fn local_vars(&self) -> &VarScope {
        self.local_vars
            .last()
            .expect("local scope stack is never empty")
    }

    pub fn local_vars_mut(&mut self) -> &mut VarScope {
        self.local_vars
            .last_mut()
            .expect("local scope stack is never empty")
    }

    pub fn set_local_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.local_vars_mut().insert(name.into(), value.into());
    }

    pub fn global_var(&self, name: &str) -> Option<&str> {
        self.global_vars.get(name).map(String::as_str)
    }

    pub fn set_global_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.global_vars.insert(name.into(), value.into());
    }

    pub fn overrides(&self) -> &VarScope {
        &self.overrides
    }

    /// Bind a query parameter by its full placeholder name (`$x`, `:x`, ...),
    /// taking precedence over every other source.
    pub fn set_override(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.overrides.insert(name.into(), value.into());
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Local scope, then global scope, then the process environment.
    pub fn lookup_var(&self, name: &str) -> Option<String> {
        self.local_vars()
            .get(name)
            .or_else(|| self.global_vars.get(name))
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    pub fn line_values(&self) -> &[LineValue] {
        &self.line_values
    }

    pub fn set_line_values(&mut self, values: Vec<LineValue>) {
        self.line_values = values;
    }

    // -- provenance -------------------------------------------------------

    pub fn current_source(&self) -> &Snippet {
        self.sources
            .last()
            .expect("provenance stack is never empty")
    }

    pub fn source_depth(&self) -> usize {
        self.sources.len()
    }

    // -- paths ------------------------------------------------------------

    /// Directory relative script references resolve against.
    pub fn current_dir(&self) -> &Path {
        self.path_stack
            .last()
            .expect("path stack is never empty")
    }

    pub fn path_depth(&self) -> usize {
        self.path_stack.len()
    }

    // -- output -----------------------------------------------------------

    pub fn output(&self) -> Option<SharedSink> {
        self.outputs.last().and_then(|o| o.sink.clone())
    }

    pub fn output_name(&self) -> &str {
        self.outputs.last().map(|o| o.name.as_str()).unwrap_or("screen")
    }

    pub fn output_depth(&self) -> usize {
        self.outputs.len()
    }

    /// Replace the active output target, closing the previous sink.
    pub fn set_output(&mut self, name: impl Into<String>, sink: SharedSink) {
        let name = name.into();
        tracing::info!("redirecting command output to: {}", name);
        if let Some(top) = self.outputs.last_mut() {
            top.close();
            *top = OutputTarget {
                name,
                sink: Some(sink),
            };
        }
    }

    /// Reset the active output target to the screen, closing its sink.
    pub fn clear_output(&mut self) {
        if let Some(top) = self.outputs.last_mut() {
            if top.sink.is_some() {
                tracing::info!("redirecting command output to screen");
            }
            top.close();
            *top = OutputTarget::screen("default");
        }
    }

    /// Write a line to the active output; returns false when there is none.
    pub fn write_output(&self, text: &str, newline: bool) -> std::io::Result<bool> {
        let Some(sink) = self.output() else {
            return Ok(false);
        };
        let mut writer = sink
            .lock()
            .map_err(|_| std::io::Error::other("output sink poisoned"))?;
        writer.write_all(text.as_bytes())?;
        if newline {
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(true)
    }

    // -- diagnostics ------------------------------------------------------

    pub fn current_help(&self) -> Option<&HelpText> {
        self.current_help.as_ref()
    }

    /// Attach the current provenance and help to a message.
    pub fn add_error_context(&self, msg: UserMessage) -> UserMessage {
        let msg = msg.with_snippet(self.current_source().clone());
        match &self.current_help {
            Some(help) => msg.with_help(help.format_for_term()),
            None => msg,
        }
    }

    pub fn make_error(&self, kind: ErrorKind, message: impl Into<String>) -> UserMessage {
        self.add_error_context(UserMessage::error(message).with_kind(kind))
    }
}

impl AsMut<ExecutionContext> for ExecutionContext {
    fn as_mut(&mut self) -> &mut ExecutionContext {
        self
    }
}

/// Runs `on_exit` against the borrowed owner when dropped. Derefs to the
/// owner so work inside the scope goes through the guard.
pub struct Deferred<'a, T, F>
where
    F: FnOnce(&mut T),
{
    target: &'a mut T,
    on_exit: Option<F>,
}

impl<'a, T, F> Deferred<'a, T, F>
where
    F: FnOnce(&mut T),
{
    pub fn new(target: &'a mut T, on_exit: F) -> Self {
        Self {
            target,
            on_exit: Some(on_exit),
        }
    }
}

impl<T, F> Deref for Deferred<'_, T, F>
where
    F: FnOnce(&mut T),
{
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T, F> DerefMut for Deferred<'_, T, F>
where
    F: FnOnce(&mut T),
{
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T, F> Drop for Deferred<'_, T, F>
where
    F: FnOnce(&mut T),
{
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit(self.target);
        }
    }
}

/// Scoped pushes onto the context stacks, available on anything that owns
/// an `ExecutionContext`.
pub trait ContextStacks: AsMut<ExecutionContext> + Sized {
    fn enter_source(&mut self, snippet: Snippet) -> Deferred<'_, Self, impl FnOnce(&mut Self)> {
        let ctx = self.as_mut();
        ctx.sources.push(snippet);
        let depth = ctx.sources.len();
        Deferred::new(self, move |owner: &mut Self| {
            let ctx = owner.as_mut();
            debug_assert_eq!(ctx.sources.len(), depth, "provenance stack out of order");
            ctx.sources.pop();
        })
    }

    fn enter_scope(&mut self, vars: VarScope) -> Deferred<'_, Self, impl FnOnce(&mut Self)> {
        let ctx = self.as_mut();
        ctx.push_scope(vars);
        let depth = ctx.local_vars.len();
        Deferred::new(self, move |owner: &mut Self| {
            let ctx = owner.as_mut();
            debug_assert_eq!(ctx.local_vars.len(), depth, "scope stack out of order");
            ctx.pop_scope();
        })
    }

    fn enter_path(&mut self, dir: PathBuf) -> Deferred<'_, Self, impl FnOnce(&mut Self)> {
        let ctx = self.as_mut();
        ctx.path_stack.push(dir);
        let depth = ctx.path_stack.len();
        Deferred::new(self, move |owner: &mut Self| {
            let ctx = owner.as_mut();
            debug_assert_eq!(ctx.path_stack.len(), depth, "path stack out of order");
            ctx.path_stack.pop();
        })
    }

    /// Push an output frame; on exit its sink is closed and the frame popped.
    fn enter_output(
        &mut self,
        name: impl Into<String>,
        sink: Option<SharedSink>,
    ) -> Deferred<'_, Self, impl FnOnce(&mut Self)> {
        let name = name.into();
        if sink.is_some() {
            tracing::info!("redirecting command output to: {}", name);
        }
        let ctx = self.as_mut();
        ctx.outputs.push(OutputTarget { name, sink });
        let depth = ctx.outputs.len();
        Deferred::new(self, move |owner: &mut Self| {
            let ctx = owner.as_mut();
            debug_assert_eq!(ctx.outputs.len(), depth, "output stack out of order");
            ctx.clear_output();
            ctx.outputs.pop();
        })
    }

    /// Make `help` the current help text; the previous one is restored on exit.
    fn enter_help(&mut self, help: HelpText) -> Deferred<'_, Self, impl FnOnce(&mut Self)> {
        let previous = self.as_mut().current_help.replace(help);
        Deferred::new(self, move |owner: &mut Self| {
            owner.as_mut().current_help = previous;
        })
    }
}

impl<T: AsMut<ExecutionContext>> ContextStacks for T {}
