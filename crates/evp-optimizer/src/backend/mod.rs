//! 求解器後端

pub mod goodlp;

pub use goodlp::{Backend, GoodLpSolver};
