//! Flash-sale entry points: the `SaleFacade` and process bootstrap helpers.

pub mod bootstrap;
pub mod facade;

pub use facade::{FacadeError, SaleFacade};
