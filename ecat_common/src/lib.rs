//! EtherCAT Bridge Common Library
//!
//! This crate provides the types shared between the notification bridge and
//! its native backends.
//!
//! # Module Structure
//!
//! - [`notify`] - Notification codes, channels and log classifications
//! - [`native`] - `NativeMaster` trait and C callback signatures
//! - [`params`] - Initialization parameters and run modes
//! - [`error`] - Result codes and error types
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Bridge-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecat_common::prelude::*;
//!
//! assert_eq!("onMaster".parse::<Channel>().unwrap(), Channel::Master);
//! ```

pub mod config;
pub mod consts;
pub mod error;
pub mod native;
pub mod notify;
pub mod params;
pub mod prelude;
