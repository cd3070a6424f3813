//! Stock modules.
//!
//! | Module  | Properties            | States                             |
//! |---------|-----------------------|------------------------------------|
//! | `rawio` | `in`, `out`           | none                               |
//! | `echo`  | none                  | `echoed`: copies `in` to `out`     |

pub mod echo;
pub mod rawio;

use arbiter_core::ModuleCatalog;

/// Every stock module, by name.
#[must_use]
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with(rawio::NAME, rawio::declare)
        .with(echo::NAME, echo::declare)
}
