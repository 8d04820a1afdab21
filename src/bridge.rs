//! The bridge facade: owns the registry, the view ledger and the config.
//!
//! Calls on one `Bridge` are serialized through `&mut self`. Callers that
//! share a bridge across threads wrap it in a lock, as the C ABI does.

use crate::config::Config;
use crate::engine::{BuiltinEngine, Engine};
use crate::error::Result;
use crate::marshal::ViewLedger;
use crate::params::{Parameters, SampleFormat};
use crate::registry::{Handle, InstanceRegistry};

pub struct Bridge<E: Engine = BuiltinEngine> {
    pub(crate) registry: InstanceRegistry<E>,
    pub(crate) ledger: ViewLedger,
    pub(crate) config: Config,
}

impl Bridge<BuiltinEngine> {
    pub fn new() -> Self {
        Self::with_engine(BuiltinEngine::new(), Config::default())
    }
}

impl Default for Bridge<BuiltinEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Bridge<E> {
    pub fn with_engine(engine: E, config: Config) -> Self {
        Self {
            registry: InstanceRegistry::new(engine),
            ledger: ViewLedger::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &E {
        self.registry.engine()
    }

    /// Create an instance using the configured sample format.
    pub fn create_instance(&mut self, sample_rate: i32, samples_per_frame: i32) -> Result<Handle> {
        self.create_instance_with_format(sample_rate, samples_per_frame, self.config.sample_format)
    }

    pub fn create_instance_with_format(
        &mut self,
        sample_rate: i32,
        samples_per_frame: i32,
        format: SampleFormat,
    ) -> Result<Handle> {
        let params = Parameters::build_with_format(sample_rate, samples_per_frame, format)
            .map_err(|e| {
                log::error!("Refusing to create instance: {}", e);
                e
            })?
            .with_sound_marker_threshold(self.config.sound_marker_threshold);
        self.registry.create(params)
    }

    pub fn destroy_instance(&mut self, handle: Handle) -> Result<()> {
        self.registry.destroy(handle)
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.registry.validate(handle)
    }

    pub fn parameters(&self, handle: Handle) -> Result<Parameters> {
        Ok(self.registry.entry(handle)?.params)
    }

    pub fn live_instances(&self) -> usize {
        self.registry.live_count()
    }

    /// Buffer views acquired and not yet released. Zero between calls.
    pub fn outstanding_views(&self) -> usize {
        self.ledger.outstanding()
    }

    pub fn ledger(&self) -> &ViewLedger {
        &self.ledger
    }
}
