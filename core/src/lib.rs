//! Reactive behaviour arbitration.
//!
//! Modules register properties (observable values) and states (behaviours
//! gated by temporal constraints over signals). Spikes are emitted on
//! signals; a state whose constraint is satisfied fires its handler, and
//! when several fire at once the most specific ones win the properties they
//! write.
//!
//! ```ignore
//! let ctx = Context::builder().catalog(catalog).build();
//! ctx.add_module("echo")?;
//! ctx.run()?;
//! ctx.set(&QualifiedName::parse("rawio:in")?, "hello")?;
//! ctx.shutdown()?;
//! ```

mod activation;
mod causality;
mod clock;
mod constraint;
mod context;
mod error;
mod handler;
mod module;
mod property;
mod registry;
mod spike;
mod state;

pub use arbiter_types::{
    ActivationId, Age, AgeWindow, PropertyEvent, QualifiedName, Signal, SpikeId, StateId,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use constraint::{Conjunction, Constraint, Leaf, SignalRef, s};
pub use context::{Context, ContextBuilder, Phase, TickReport};
pub use error::{ContextError, PropertyAccess};
pub use handler::StateContext;
pub use module::{Module, ModuleCatalog};
pub use property::Property;
pub use registry::{ActivationInfo, Removal};
pub use spike::Spike;
pub use state::{Handler, State};
