//! Core library for the inquiry-to-booking approval pipeline.
//!
//! Guests submit stay inquiries through a villa site; the pipeline quotes the
//! stay, notifies the property owner with signed one-click approve/decline
//! links, drives a hosted payment checkout on approval, and finalizes a
//! booking record once the payment provider reports completion. Transport
//! concerns (SMTP, the payment provider's API, the document database) sit
//! behind the narrow traits in [`notify`], [`checkout`], and [`store`].

pub mod availability;
pub mod checkout;
pub mod config;
pub mod error;
pub mod intake;
pub mod lifecycle;
pub mod notify;
pub mod owner_action;
pub mod pricing;
pub mod signing;
pub mod store;
pub mod telemetry;
