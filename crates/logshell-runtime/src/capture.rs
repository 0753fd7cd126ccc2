use crate::context::SharedSink;
use crate::dispatch::Dispatcher;
use std::io::{Read, Write};
use std::process::Child;
use std::thread::JoinHandle;

/// Tracks the output of a command started by `:sh`.
///
/// When the output is drained by a worker thread the handle can be polled,
/// waited on, or abandoned. Output handed to the host as a virtual input is
/// complete as soon as it is registered.
pub struct CaptureHandle {
    name: String,
    worker: Option<JoinHandle<()>>,
    child: Option<Child>,
}

impl CaptureHandle {
    pub fn ready(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: None,
            child: None,
        }
    }

    /// Copy everything from `reader` into `sink` on a worker thread.
    pub fn drain_to(
        name: impl Into<String>,
        mut reader: Box<dyn Read + Send>,
        sink: SharedSink,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let thread_name = name.clone();
        let worker = std::thread::Builder::new()
            .name("pipe-drain".to_string())
            .spawn(move || {
                let mut buffer = [0u8; 4096];
                loop {
                    let count = match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(count) => count,
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            tracing::warn!("capture of {} stopped: {}", thread_name, err);
                            break;
                        }
                    };
                    let Ok(mut out) = sink.lock() else {
                        break;
                    };
                    if let Err(err) = out.write_all(&buffer[..count]) {
                        tracing::warn!("unable to write output of {}: {}", thread_name, err);
                        break;
                    }
                }
                if let Ok(mut out) = sink.lock() {
                    let _ = out.flush();
                }
            })?;

        Ok(Self {
            name,
            worker: Some(worker),
            child: None,
        })
    }

    /// Reap `child` when the capture is waited on.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&mut self) -> bool {
        let worker_done = self.worker.as_ref().is_none_or(|w| w.is_finished());
        let child_done = match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        };
        worker_done && child_done
    }

    /// Block until the output has been fully copied and the command exited.
    pub fn wait(mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("capture worker for {} panicked", self.name);
        }
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) if !status.success() => {
                    tracing::warn!("{} exited with {}", self.name, status);
                }
                Ok(_) => {}
                Err(err) => tracing::warn!("unable to wait for {}: {}", self.name, err),
            }
        }
    }

    /// Stop tracking the capture; the worker keeps running detached.
    pub fn abandon(self) {
        tracing::debug!("abandoning capture of {}", self.name);
    }
}

impl Dispatcher {
    /// Route a command's output: into the active output sink when there is
    /// one, otherwise to the host as a new virtual input.
    pub fn pipe_callback(
        &mut self,
        cmdline: &str,
        reader: Box<dyn Read + Send>,
    ) -> std::io::Result<CaptureHandle> {
        match self.ctx.output() {
            Some(sink) => CaptureHandle::drain_to(cmdline, reader, sink),
            None => {
                let desc = format!("[{}] Output of {}", self.exec_count, cmdline);
                self.exec_count += 1;
                self.host.add_virtual_input(&desc, reader);
                Ok(CaptureHandle::ready(desc))
            }
        }
    }

    /// Drop finished captures; returns how many are still running.
    pub fn poll_captures(&mut self) -> usize {
        let mut running = Vec::new();
        for mut capture in self.captures.drain(..) {
            if capture.is_finished() {
                capture.wait();
            } else {
                running.push(capture);
            }
        }
        self.captures = running;
        self.captures.len()
    }

    pub fn wait_for_captures(&mut self) {
        for capture in self.captures.drain(..) {
            capture.wait();
        }
    }

    pub fn abandon_captures(&mut self) {
        for capture in self.captures.drain(..) {
            capture.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::shared_sink;
    use crate::testing::dispatcher_with_log;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drain_into_active_output() {
        let (mut d, log) = dispatcher_with_log();
        let buf = SharedBuf::default();
        d.ctx_mut().set_output("buffer", shared_sink(buf.clone()));

        let handle = d
            .pipe_callback("printf", Box::new(Cursor::new("a\nb\n")))
            .unwrap();
        handle.wait();

        assert_eq!(&*buf.0.lock().unwrap(), b"a\nb\n");
        assert!(log.virtual_inputs().is_empty());
    }

    #[test]
    fn test_without_output_registers_virtual_input() {
        let (mut d, log) = dispatcher_with_log();
        let mut first = d.pipe_callback("ls", Box::new(Cursor::new("x\n"))).unwrap();
        let second = d.pipe_callback("ls -l", Box::new(Cursor::new("y\n"))).unwrap();

        assert!(first.is_finished());
        assert_eq!(second.name(), "[1] Output of ls -l");
        assert_eq!(
            log.virtual_inputs(),
            vec!["[0] Output of ls".to_string(), "[1] Output of ls -l".to_string()]
        );
    }

    #[test]
    fn test_poll_keeps_running_captures() {
        let (mut d, _log) = dispatcher_with_log();
        d.captures.push(CaptureHandle::ready("done"));
        assert_eq!(d.poll_captures(), 0);
        assert!(d.captures.is_empty());
    }

    #[test]
    fn test_abandon_drops_tracked_captures() {
        let (mut d, _log) = dispatcher_with_log();
        let buf = SharedBuf::default();
        d.ctx_mut().set_output("buffer", shared_sink(buf.clone()));
        let handle = d
            .pipe_callback("yes", Box::new(Cursor::new("y\n")))
            .unwrap();
        d.captures.push(handle);
        d.captures.push(CaptureHandle::ready("done"));

        d.abandon_captures();
        assert!(d.captures.is_empty());
        assert_eq!(d.poll_captures(), 0);
    }
}
