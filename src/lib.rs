//! kdeploy: lifecycle engine for versioned kubeware bundles
//!
//! A kubeware is a named, versioned set of Services and ReplicationControllers
//! deployed together. This crate deploys, upgrades (rolling or recreate) and
//! deletes kubewares through a narrow [`client::ResourceClient`] seam.

pub mod client;
pub mod config;
pub mod controller;
pub mod kubeware;
pub mod shutdown;
