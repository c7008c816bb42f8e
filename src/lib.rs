//! Sequence prediction over hashed value identities.
//!
//! Values are reduced to 64-bit UIDs ([`hasher`]), fed as n-gram "flows"
//! into a per-node transition log ([`nodelog`]) and ranked with Bayes'
//! theorem ([`theorem`]). [`Predictor`] ties it together and can persist
//! its state through [`storage`].

pub mod classmap;
pub mod error;
pub mod hasher;
pub mod kvs;
pub mod model;
pub mod nodelog;
pub mod parser;
pub mod predictor;
pub mod storage;
pub mod theorem;

pub use classmap::{ClassMap, MemClassMap};
pub use error::{BayesError, Result};
pub use model::{Item, Value};
pub use nodelog::{NodeLog, NodeLogger};
pub use predictor::{Prediction, Predictor, PredictorConfig};
pub use storage::DumpFormat;
