//! Single-record prediction front ends.
//!
//! Each front end turns its labelled controls into a [`service::FeatureRow`]
//! and hands it to a [`service::PredictionService`] built once at startup.

pub mod fraud;
pub mod heart;
pub mod service;
