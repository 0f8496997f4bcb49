pub mod app;
pub mod candidate;
pub mod catalog;
pub mod config;
pub mod data_object;
pub mod database;
pub mod domain;
pub mod error;
pub mod exofop;
pub mod inference;
pub mod lightcurve;
pub mod mast;
pub mod output;
pub mod slurm;
pub mod stellar;
pub mod store;
pub mod tic_entry;
