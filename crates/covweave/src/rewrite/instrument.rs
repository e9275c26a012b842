//! Instrumentation entry points

use super::rewriter::Rewriter;
use crate::config::ExclusionConfig;
use crate::log::{CoverageLogger, NullLogger};
use crate::map::{ModuleMap, SkippedMember};
use crate::model::Module;
use crate::result::{CovError, CovResult};
use crate::select::PointSelector;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Something that can be checked for and then put through instrumentation
pub trait Instrument {
    /// Dry run: whether [`Instrument::instrument`] would accept the module
    ///
    /// Mutates nothing.
    fn can_instrument(&self) -> CovResult<()>;

    /// Rewrite the module and produce its map
    fn instrument(&self) -> CovResult<InstrumentedModule>;
}

impl<I: Instrument + ?Sized> Instrument for Box<I> {
    fn can_instrument(&self) -> CovResult<()> {
        (**self).can_instrument()
    }

    fn instrument(&self) -> CovResult<InstrumentedModule> {
        (**self).instrument()
    }
}

impl<I: Instrument + ?Sized> Instrument for &I {
    fn can_instrument(&self) -> CovResult<()> {
        (**self).can_instrument()
    }

    fn instrument(&self) -> CovResult<InstrumentedModule> {
        (**self).instrument()
    }
}

/// Result of instrumenting one module
#[derive(Debug, Clone)]
pub struct InstrumentedModule {
    /// Rewritten module, carrying the instrumented marker
    pub module: Module,
    /// Instrumentation map of the module
    pub map: ModuleMap,
    /// Members left out by exclusion rules
    pub excluded: Vec<SkippedMember>,
    /// File the module was loaded from, if any
    pub source: Option<PathBuf>,
}

/// Where a module comes from
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Serialized module on disk
    File(PathBuf),
    /// Module already in memory
    Loaded(Module),
}

/// Instruments a single module
pub struct ModuleInstrumenter {
    source: ModuleSource,
    rewriter: Rewriter,
    logger: Arc<dyn CoverageLogger>,
}

impl std::fmt::Debug for ModuleInstrumenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstrumenter")
            .field("source", &self.label())
            .finish_non_exhaustive()
    }
}

impl ModuleInstrumenter {
    /// Instrumenter for a module file
    pub fn from_path(path: impl Into<PathBuf>, exclusions: &ExclusionConfig) -> CovResult<Self> {
        Self::with_source(ModuleSource::File(path.into()), exclusions)
    }

    /// Instrumenter for a module already in memory
    pub fn from_module(module: Module, exclusions: &ExclusionConfig) -> CovResult<Self> {
        Self::with_source(ModuleSource::Loaded(module), exclusions)
    }

    fn with_source(source: ModuleSource, exclusions: &ExclusionConfig) -> CovResult<Self> {
        Ok(Self {
            source,
            rewriter: Rewriter::new(PointSelector::new(exclusions)?),
            logger: Arc::new(NullLogger),
        })
    }

    /// Report exclusions and skipped members to `logger`
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn CoverageLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Module path, or module name for in-memory sources
    #[must_use]
    pub fn label(&self) -> String {
        match &self.source {
            ModuleSource::File(path) => path.display().to_string(),
            ModuleSource::Loaded(module) => module.name.clone(),
        }
    }

    /// Source path, if the module comes from a file
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ModuleSource::File(path) => Some(path.as_path()),
            ModuleSource::Loaded(_) => None,
        }
    }

    fn load(&self) -> CovResult<Cow<'_, Module>> {
        match &self.source {
            ModuleSource::File(path) => Module::load(path).map(Cow::Owned),
            ModuleSource::Loaded(module) => Ok(Cow::Borrowed(module)),
        }
    }

    fn check(&self, module: &Module) -> CovResult<()> {
        let refuse = |reason: String| CovError::NotInstrumentable {
            module: module.name.clone(),
            reason,
        };
        if module.is_instrumented() {
            return Err(refuse("module is already instrumented".to_string()));
        }
        if let Some(reason) = self.rewriter.selector().filter().module_exclusion(module) {
            return Err(refuse(reason));
        }
        Ok(())
    }
}

impl Instrument for ModuleInstrumenter {
    fn can_instrument(&self) -> CovResult<()> {
        let module = self.load()?;
        self.check(&module)
    }

    fn instrument(&self) -> CovResult<InstrumentedModule> {
        let module = self.load()?;
        self.check(&module)?;
        let outcome = self.rewriter.rewrite(&module, self.logger.as_ref());
        let excluded = outcome.selection.excluded.clone();
        Ok(InstrumentedModule {
            module: outcome.module,
            map: outcome.selection.into_map(),
            excluded,
            source: self.path().map(Path::to_path_buf),
        })
    }
}

/// Decorator reporting each step of the wrapped instrumenter
pub struct LoggingInstrumenter<I> {
    inner: I,
    label: String,
    logger: Arc<dyn CoverageLogger>,
}

impl<I: std::fmt::Debug> std::fmt::Debug for LoggingInstrumenter<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingInstrumenter")
            .field("inner", &self.inner)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<I> LoggingInstrumenter<I> {
    /// Wrap `inner`, naming it `label` in messages
    pub fn new(inner: I, label: impl Into<String>, logger: Arc<dyn CoverageLogger>) -> Self {
        Self {
            inner,
            label: label.into(),
            logger,
        }
    }

    /// The wrapped instrumenter
    pub const fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I: Instrument> Instrument for LoggingInstrumenter<I> {
    fn can_instrument(&self) -> CovResult<()> {
        self.logger.verbose(&format!("checking {}", self.label));
        let result = self.inner.can_instrument();
        if let Err(e) = &result {
            self.logger
                .info(&format!("skipping {}: {e}", self.label), false);
        }
        result
    }

    fn instrument(&self) -> CovResult<InstrumentedModule> {
        let started = Instant::now();
        self.logger
            .verbose(&format!("instrumenting {}", self.label));
        match self.inner.instrument() {
            Ok(done) => {
                self.logger.info(
                    &format!(
                        "instrumented {}: {} points in {} methods, {} members not instrumented ({} ms)",
                        self.label,
                        done.map.points.len(),
                        done.map.methods.len(),
                        done.map.skipped.len(),
                        started.elapsed().as_millis()
                    ),
                    true,
                );
                Ok(done)
            }
            Err(e) => {
                self.logger
                    .warning(&format!("failed to instrument {}: {e}", self.label));
                Err(e)
            }
        }
    }
}
