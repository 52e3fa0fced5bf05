use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

use tracing::{error, info};

use crate::{
    config::{DumpTarget, TraceConfig},
    error::Result,
    tracer,
};

/// Owns the calling thread's root trace context for its lifetime.
///
/// Starting a session resets the thread's tracer state. Finishing or dropping
/// it writes the root context, followed by the memory space manifest and the
/// dependency export when configured, to the configured target. Each appended
/// section starts with a `#` header line.
#[must_use = "the root context is dumped when the session is dropped"]
pub struct Session {
    config: TraceConfig,
    finished: bool,
}

impl Session {
    pub fn start(config: TraceConfig) -> Self {
        tracer::reset(config.clone());
        info!(output = ?config.output, "trace session started");
        Self {
            config,
            finished: false,
        }
    }

    /// Starts a session configured from `MEMTRACE_*` environment variables.
    pub fn from_env() -> Self {
        Self::start(TraceConfig::from_env())
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Dumps the root context now, reporting failures to the caller.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.write_out()
    }

    /// Writes everything the session would dump to `sink`, regardless of the
    /// configured target.
    pub fn write_to(&self, sink: &mut impl Write) -> Result<()> {
        tracer::root_context().dump(sink)?;
        if self.config.manifest {
            writeln!(sink, "# manifest")?;
            tracer::dump_manifest(sink)?;
        }
        if self.config.dependencies {
            writeln!(sink, "# dependencies")?;
            tracer::dump_dependencies(sink)?;
        }
        Ok(())
    }

    fn write_out(&self) -> Result<()> {
        match &self.config.output {
            DumpTarget::Off => Ok(()),
            DumpTarget::Stdout => self.write_to(&mut io::stdout().lock()),
            DumpTarget::Stderr => self.write_to(&mut io::stderr().lock()),
            DumpTarget::File(path) => {
                let mut file = BufWriter::new(File::create(path)?);
                self.write_to(&mut file)?;
                file.flush()?;
                Ok(())
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.write_out() {
            error!(%err, "failed to dump the root trace context");
        }
    }
}
