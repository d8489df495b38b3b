//! MedVoice - Voice-Driven Medical Intake Assistant
//!
//! This crate conducts a voice intake conversation with a patient, moving
//! through a fixed sequence of information-gathering stages and producing a
//! structured clinical record from unstructured speech.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
